//! aioli development server.
//!
//! Hosts the built-in units behind the HTTP layer.
//!
//! ```text
//! config file ─▶ Application ─▶ load_units ─▶ HttpServer::run
//!                                                 │
//!                         SIGINT / SIGTERM ─▶ Shutdown ─▶ drain ─▶ unit shutdown hooks
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use aioli::config::{load_config, ApplicationConfig, ProcessEnv, RawConfig};
use aioli::lifecycle::signals::spawn_signal_handler;
use aioli::observability::{logging, metrics};
use aioli::{units, Application, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "aioli")]
#[command(about = "Run the aioli development server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen host (overrides `dev_host`)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides `dev_port`)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let raw = match &args.config {
        Some(path) => load_config(path)?,
        None => RawConfig::new(),
    };
    let settings = ApplicationConfig::resolve(&raw, &ProcessEnv)?;

    logging::init(args.debug || settings.debug, &settings.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "aioli starting");

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut app = Application::builder()
        .config(raw)
        .env(ProcessEnv)
        .units(units::builtin()?)
        .build()?;

    let summary = app.load_units();
    for (unit, error) in &summary.failed {
        tracing::warn!(unit = %unit, error = %error, "Unit not loaded");
    }

    let host = args.host.unwrap_or_else(|| settings.dev_host.clone());
    let port = args.port.unwrap_or(settings.dev_port);
    let listener = TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(Arc::new(app));
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
