//! Shared state and the router of each service.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::auth::LoginThrottle;
use crate::cli::Service;
use crate::config::AppConfig;
use crate::database::RecordStore;
use crate::handlers;
use crate::middleware::{rate_limit_middleware, x_user_middleware, RateKey, ScopedLimiter};
use crate::rate_limit::{Limits, RateLimiter, Scope};
use crate::read_client::ReadSource;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub read: Arc<dyn ReadSource>,
    pub login_throttle: LoginThrottle,
    pub limiter: RateLimiter,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, read: Arc<dyn ReadSource>, config: AppConfig) -> Self {
        let login_throttle = LoginThrottle::new(
            config.security.login_max_attempts,
            Duration::from_secs(config.security.login_lock_secs),
        );
        let limiter = RateLimiter::new(Limits::from_config(&config.api));

        Self { store, read, login_throttle, limiter, config: Arc::new(config) }
    }

    fn limited(&self, router: Router<AppState>, scope: Scope) -> Router<AppState> {
        if !self.config.api.enable_rate_limiting {
            return router;
        }
        let scoped = ScopedLimiter { limiter: self.limiter.clone(), scope, key: RateKey::Caller };
        router.route_layer(from_fn_with_state(scoped, rate_limit_middleware))
    }
}

fn read_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/read/api/get-data", get(handlers::read::get_data))
        .route_layer(from_fn(x_user_middleware));
    state.limited(routes, Scope::Read)
}

fn create_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/insert", post(handlers::create::insert))
        .route_layer(from_fn(x_user_middleware));
    state.limited(routes, Scope::Create)
}

fn update_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/update-one/:id", put(handlers::update::update_one))
        .route_layer(from_fn(x_user_middleware));
    state.limited(routes, Scope::Update)
}

fn delete_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/delete", delete(handlers::delete::delete_many))
        .route("/delete/:id", delete(handlers::delete::delete_one))
        .route_layer(from_fn(x_user_middleware));
    state.limited(routes, Scope::Delete)
}

fn auth_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/me", get(handlers::auth::me))
        .route("/register", post(handlers::auth::register));
    state.limited(routes, Scope::Auth)
}

/// Routes for one service (or all of them), plus `/health`.
pub fn router(service: Service, state: AppState) -> Router {
    let routes = match service {
        Service::Read => read_routes(&state),
        Service::Create => create_routes(&state),
        Service::Update => update_routes(&state),
        Service::Delete => delete_routes(&state),
        Service::Auth => auth_routes(&state),
        Service::All => Router::new()
            .merge(read_routes(&state))
            .merge(create_routes(&state))
            .merge(update_routes(&state))
            .merge(delete_routes(&state))
            .merge(auth_routes(&state)),
        // Served by `gateway::router`, which needs no store
        Service::Gateway => Router::new(),
    };

    routes.route("/health", get(handlers::health::health)).with_state(state)
}
