pub mod actor;
pub mod rate_limit;
pub mod response;

pub use actor::x_user_middleware;
pub use rate_limit::{rate_limit_middleware, RateKey, ScopedLimiter};
pub use response::{ApiResponse, ApiResult, Message};
