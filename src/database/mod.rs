pub mod manager;
pub mod postgres;
pub mod query_builder;
pub mod store;

pub use manager::{connect_lazy, DatabaseError};
pub use postgres::PgStore;
pub use store::{RecordStore, SessionToken};
