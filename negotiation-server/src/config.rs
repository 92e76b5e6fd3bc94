//! Server configuration.
//!
//! Values come from the command line, falling back to environment variables
//! (`BIND_ADDR`, `PORT`, `APP_ENV`, `DATABASE_URL`, `MAX_BODY_BYTES`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Default request body limit: 1 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Self::Development => "info,negotiation_core=debug,negotiation_server=debug",
            Self::Test => "warn",
            Self::Staging | Self::Production => "info",
        }
    }
}

/// Where negotiation records are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    File(PathBuf),
}

impl FromStr for StoreConfig {
    type Err = String;

    /// Accepts `memory`, `memory:` or `file:<path>`.
    fn from_str(url: &str) -> Result<Self, Self::Err> {
        match url.trim() {
            "memory" | "memory:" | "memory://" => Ok(Self::Memory),
            other => match other.strip_prefix("file:") {
                Some(rest) => {
                    let path = rest.strip_prefix("//").unwrap_or(rest);
                    if path.is_empty() {
                        Err("file store URL has no path".to_string())
                    } else {
                        Ok(Self::File(PathBuf::from(path)))
                    }
                }
                None => Err(format!(
                    "unsupported database URL '{}': expected 'memory:' or 'file:<path>'",
                    other
                )),
            },
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    /// Record store backend.
    pub store: StoreConfig,
    /// Max request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            environment: Environment::Development,
            store: StoreConfig::Memory,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address.
    pub fn with_addr(addr: impl Into<SocketAddr>) -> Self {
        Self {
            bind_addr: addr.into(),
            ..Default::default()
        }
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "negotiation-server",
    version,
    about = "Provider-side DSP contract negotiation server"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind: SocketAddr,

    /// Override the port of the bind address
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Deployment environment
    #[arg(long, env = "APP_ENV", value_enum, default_value = "development")]
    pub environment: Environment,

    /// Record store: `memory:` or `file:<path>`
    #[arg(long, env = "DATABASE_URL", default_value = "memory:")]
    pub database_url: StoreConfig,

    /// Maximum request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        let mut bind_addr = cli.bind;
        if let Some(port) = cli.port {
            bind_addr.set_port(port);
        }
        ServerConfig::with_addr(bind_addr)
            .with_environment(cli.environment)
            .with_store(cli.database_url)
            .with_max_body_bytes(cli.max_body_bytes)
    }
}
