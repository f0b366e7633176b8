//! request-guard server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                 REQUEST GUARD                │
//!     Client Request     │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!     ───────────────────┼─▶│   net   │──▶│ security │──▶│  session  │  │
//!                        │  │ tcp/tls │   │ headers  │   │ bind+gate │  │
//!                        │  └─────────┘   └──────────┘   └─────┬─────┘  │
//!                        │                                     │        │
//!                        │                   redirect ◀── anonymous?    │
//!                        │                                     │        │
//!                        │                               ┌─────▼─────┐  │
//!     Client Response    │                               │application│  │
//!     ◀──────────────────┼───────────────────────────────│  routes   │  │
//!                        │                               └───────────┘  │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use request_guard::config::{load_config, validation::validate_config, ConfigError, GuardConfig};
use request_guard::http::routes::app_router;
use request_guard::observability::{logging, metrics};
use request_guard::{GuardServer, Shutdown};

#[derive(Parser)]
#[command(name = "request-guard")]
#[command(about = "Security header policy and session gate for web applications", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability);

    tracing::info!("request-guard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        secure_headers_enabled = config.security.secure_headers_enabled,
        trust_forwarded_proto = config.security.trust_forwarded_proto,
        login_path = %config.session.login_path,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = GuardServer::new(config, app_router());
    server.serve(shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
