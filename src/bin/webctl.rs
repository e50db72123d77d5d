//! Operator CLI: inspect a configuration without starting the server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use tech_web_server::config::load_config;
use tech_web_server::fastcgi::InterpreterPool;
use tech_web_server::tls::{select_primary, TlsContextStore};
use tech_web_server::vhost::VirtualHostRegistry;

#[derive(Parser)]
#[command(name = "webctl")]
#[command(about = "Management CLI for the Tech Web Server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a configuration, list its virtual hosts
    Check {
        #[arg(short, long, default_value = "config/server.toml")]
        config: PathBuf,
    },
    /// List certificates and the primary one the HTTPS listener would use
    Certs {
        #[arg(short, long, default_value = "config/server.toml")]
        config: PathBuf,
    },
    /// Try to connect to every configured interpreter
    Probe {
        #[arg(short, long, default_value = "config/server.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let report = match cli.command {
        Commands::Check { config } => {
            let config = load_config(&config)?;
            let registry = VirtualHostRegistry::from_config(&config);
            let hosts: Vec<Value> = registry
                .hosts()
                .map(|vhost| {
                    json!({
                        "domain": vhost.domain,
                        "port": vhost.port,
                        "document_root": vhost.document_root,
                        "php_enabled": vhost.php_enabled,
                        "php_version": vhost.php_version,
                        "ssl_enabled": vhost.ssl_enabled,
                        "ssl_redirect": vhost.ssl_redirect,
                        "rewrite_rules": vhost.rewrite.rules_count(),
                    })
                })
                .collect();
            json!({
                "valid": !registry.is_empty(),
                "configured_entries": config.virtual_hosts.len(),
                "virtual_hosts": hosts,
            })
        }
        Commands::Certs { config } => {
            let config = load_config(&config)?;
            let store = TlsContextStore::from_config(&config.tls);
            let registry = VirtualHostRegistry::from_config(&config);
            let certificates: Vec<Value> = store
                .list_available_certificates()
                .into_iter()
                .map(|info| {
                    let validation = store.validate_certificate(&info.domain);
                    json!({
                        "certificate": info,
                        "valid": validation.is_ok(),
                        "error": validation.err().map(|e| e.to_string()),
                    })
                })
                .collect();
            let primary = select_primary(&store, &registry);
            json!({
                "cert_dir": config.tls.cert_dir,
                "certificates": certificates,
                "primary": primary.map(|p| json!({ "name": p.name, "source": p.source })),
            })
        }
        Commands::Probe { config } => {
            let config = load_config(&config)?;
            let pool = InterpreterPool::from_config(&config.php);
            let results = pool.test_all_connections().await;
            let interpreters: Vec<Value> = results
                .into_iter()
                .map(|(version, up)| {
                    let address = pool.get(&version).map(|c| c.address().to_string());
                    json!({ "version": version, "address": address, "available": up })
                })
                .collect();
            json!({ "interpreters": interpreters })
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
