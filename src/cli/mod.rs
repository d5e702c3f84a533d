use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "school-services")]
#[command(about = "School management services: read, create, update, delete and auth")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Port to listen on (default: PORT, then the service default)")]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub service: Service,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    #[command(about = "Read Service: GET /read/api/get-data")]
    Read,

    #[command(about = "Create Service: POST /insert")]
    Create,

    #[command(about = "Update Service: PUT /update-one/:id")]
    Update,

    #[command(about = "Delete Service: DELETE /delete[/:id]")]
    Delete,

    #[command(about = "Auth Service: /login, /logout, /me, /register")]
    Auth,

    #[command(about = "Every service on one port, for local development")]
    All,

    #[command(about = "Gateway: authenticates callers and proxies /read, /create, /update, /delete and /auth")]
    Gateway,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Read => "read",
            Service::Create => "create",
            Service::Update => "update",
            Service::Delete => "delete",
            Service::Auth => "auth",
            Service::All => "all",
            Service::Gateway => "gateway",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Service::Read => 4000,
            Service::Create => 4001,
            Service::Update => 4002,
            Service::Delete => 4003,
            Service::Auth => 4004,
            Service::All => 4000,
            Service::Gateway => 8080,
        }
    }

    /// Services that own session tokens run the expiry sweep
    pub fn sweeps_tokens(&self) -> bool {
        matches!(self, Service::Auth | Service::All)
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Cli {
    /// `--port`, then `PORT`, then the service default
    pub fn resolve_port(&self) -> u16 {
        self.port
            .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or_else(|| self.service.default_port())
    }
}
