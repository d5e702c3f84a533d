use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use school_services::app::{router, AppState};
use school_services::auth::sweep::{spawn_sweep, Sweep};
use school_services::cli::{Cli, Service};
use school_services::config::{config, AppConfig};
use school_services::database::{connect_lazy, PgStore, RecordStore};
use school_services::gateway::{self, GatewayState};
use school_services::read_client::{HttpReadClient, ReadSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL, JWT_SECRET, etc. are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = config().clone();
    tracing::info!(service = %cli.service, environment = ?config.environment, "starting school services");

    let sweep_every = Duration::from_secs(config.security.token_sweep_interval_secs.max(1));
    let enable_cors = config.security.enable_cors;

    let app = match cli.service {
        Service::Gateway => gateway_app(&config, sweep_every)?,
        service => service_app(service, config, sweep_every)?,
    };

    let mut app = app.layer(TraceLayer::new_for_http());
    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    let bind_addr = format!("0.0.0.0:{}", cli.resolve_port());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!(service = %cli.service, addr = %bind_addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;
    Ok(())
}

fn gateway_app(config: &AppConfig, sweep_every: Duration) -> anyhow::Result<Router> {
    let state = GatewayState::new(config).context("gateway upstreams")?;
    if config.api.enable_rate_limiting {
        spawn_sweep(Sweep { limiter: Some(state.limiter().clone()), ..Sweep::default() }, sweep_every);
    }
    Ok(gateway::router(state))
}

fn service_app(service: Service, config: AppConfig, sweep_every: Duration) -> anyhow::Result<Router> {
    let pool = connect_lazy(&config.database).context("database configuration")?;
    let store: Arc<dyn RecordStore> = Arc::new(PgStore::new(pool));
    let read: Arc<dyn ReadSource> = Arc::new(
        HttpReadClient::new(&config.services.read_service_url, config.read_timeout())
            .context("read service client")?,
    );

    let state = AppState::new(store, read, config);
    let sweep = Sweep {
        tokens: service.sweeps_tokens().then(|| state.store.clone()),
        login_throttle: service.sweeps_tokens().then(|| state.login_throttle.clone()),
        limiter: state.config.api.enable_rate_limiting.then(|| state.limiter.clone()),
    };
    if !sweep.is_empty() {
        spawn_sweep(sweep, sweep_every);
    }

    Ok(router(service, state))
}
