//! Edge gateway in front of the five services.
//!
//! `/read`, `/create`, `/update` and `/delete` require a bearer token that the
//! Auth Service accepts on `/me`; the verified user then replaces whatever
//! `X-User` the client sent. `/auth` is forwarded without a session check.
//! Every route is rate limited by client address, never by a header the
//! client controls.

pub mod proxy;
pub mod session;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::from_fn_with_state,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use url::Url;

use crate::config::{AppConfig, GatewayUpstreams};
use crate::middleware::{rate_limit_middleware, RateKey, ScopedLimiter};
use crate::rate_limit::{Limits, RateLimiter, Scope};

/// A service the gateway forwards to, keyed by its path prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Read,
    Create,
    Update,
    Delete,
    Auth,
}

impl Upstream {
    pub const ALL: [Upstream; 5] = [Upstream::Read, Upstream::Create, Upstream::Update, Upstream::Delete, Upstream::Auth];

    pub fn prefix(&self) -> &'static str {
        match self {
            Upstream::Read => "/read",
            Upstream::Create => "/create",
            Upstream::Update => "/update",
            Upstream::Delete => "/delete",
            Upstream::Auth => "/auth",
        }
    }

    /// Upper-case name used in 502 messages
    pub fn label(&self) -> &'static str {
        match self {
            Upstream::Read => "READ",
            Upstream::Create => "CREATE",
            Upstream::Update => "UPDATE",
            Upstream::Delete => "DELETE",
            Upstream::Auth => "AUTH",
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Upstream::Read => Scope::Read,
            Upstream::Create => Scope::Create,
            Upstream::Update => Scope::Update,
            Upstream::Delete => Scope::Delete,
            Upstream::Auth => Scope::Auth,
        }
    }

    pub fn requires_session(&self) -> bool {
        !matches!(self, Upstream::Auth)
    }
}

#[derive(Clone)]
pub struct GatewayState {
    client: reqwest::Client,
    upstreams: Arc<GatewayUpstreams>,
    limiter: RateLimiter,
    rate_limiting: bool,
}

impl GatewayState {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let upstreams = config.services.gateway.clone();
        for upstream in Upstream::ALL {
            let base = base_url(&upstreams, upstream);
            Url::parse(base).map_err(|e| anyhow::anyhow!("invalid {} upstream {:?}: {}", upstream.label(), base, e))?;
        }

        let client = reqwest::Client::builder().timeout(config.gateway_timeout()).build()?;
        Ok(Self {
            client,
            upstreams: Arc::new(upstreams),
            limiter: RateLimiter::new(Limits::from_config(&config.api)),
            rate_limiting: config.api.enable_rate_limiting,
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn base_url(&self, upstream: Upstream) -> &str {
        base_url(&self.upstreams, upstream)
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

fn base_url(upstreams: &GatewayUpstreams, upstream: Upstream) -> &str {
    match upstream {
        Upstream::Read => &upstreams.read_url,
        Upstream::Create => &upstreams.create_url,
        Upstream::Update => &upstreams.update_url,
        Upstream::Delete => &upstreams.delete_url,
        Upstream::Auth => &upstreams.auth_url,
    }
}

pub fn router(state: GatewayState) -> Router {
    let mut app = Router::new().route("/health", get(health));
    for upstream in Upstream::ALL {
        app = app.merge(upstream_routes(&state, upstream));
    }
    app.with_state(state)
}

fn upstream_routes(state: &GatewayState, upstream: Upstream) -> Router<GatewayState> {
    let forward = move |State(gw): State<GatewayState>, request: Request| async move {
        proxy::forward(&gw, upstream, request).await
    };

    let mut routes = Router::new().route(&format!("{}/*rest", upstream.prefix()), any(forward));
    if upstream.requires_session() {
        routes = routes.route_layer(from_fn_with_state(state.clone(), session::require_session));
    }
    // Added last so it runs first: over-limit callers never reach `/me`
    if state.rate_limiting {
        let scoped = ScopedLimiter { limiter: state.limiter.clone(), scope: upstream.scope(), key: RateKey::ClientAddress };
        routes = routes.route_layer(from_fn_with_state(scoped, rate_limit_middleware));
    }
    routes
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
