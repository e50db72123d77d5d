//! Tech Web Server entry point.

use std::path::PathBuf;

use clap::Parser;

use tech_web_server::config::{load_config, ObservabilityConfig};
use tech_web_server::lifecycle;
use tech_web_server::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "tech-web-server")]
#[command(about = "Virtual-host web server with a FastCGI gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/server.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&ObservabilityConfig::default());
            tracing::error!(path = ?args.config, error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    init_logging(&config.observability);

    // axum-server may pull in a second provider; pin ring for the process.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("Process-wide crypto provider already installed");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        http_port = config.listener.http_port,
        https_port = config.listener.https_port,
        "tech-web-server starting"
    );

    lifecycle::run(config, &args.config).await?;
    Ok(())
}
