//! Signalhub - signaling relay for peer-to-peer sessions
//!
//! Peers join named rooms over WebSocket (or raw TCP) and exchange
//! offers, answers and ICE candidates through the relay.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use signalhub_core::Config;
use signalhub_net::{Hub, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line flags; each overrides the config file
#[derive(Debug, Parser)]
#[command(name = "signalhub", version, about = "Room-based WebRTC signaling relay")]
struct Args {
    /// Config file (default: platform config dir, then built-in defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// WebSocket listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Enable the raw TCP listener on this address
    #[arg(long)]
    tcp_listen: Option<SocketAddr>,
}

impl Args {
    fn into_config(self) -> signalhub_core::Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(tcp_listen) = self.tcp_listen {
            config.server.tcp_listen = Some(tcp_listen);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Signalhub");

    if let Err(e) = run(config).await {
        tracing::error!("Signalhub stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> signalhub_net::Result<()> {
    let hub = Hub::spawn(config.hub.event_buffer);
    let server = Server::start(&config.server, &config.hub, hub).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, shutting down");
    server.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signalhub.toml");
        fs::write(&path, "[server]\nlisten = \"127.0.0.1:9000\"\n\n[hub]\nmailbox_capacity = 4\n").unwrap();

        let args = Args::try_parse_from([
            "signalhub",
            "--config",
            path.to_str().unwrap(),
            "--tcp-listen",
            "127.0.0.1:9001",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.server.listen, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.server.tcp_listen, Some("127.0.0.1:9001".parse::<SocketAddr>().unwrap()));
        assert_eq!(config.hub.mailbox_capacity, 4);
    }

    #[test]
    fn test_missing_config_file_fails() {
        let args = Args::try_parse_from(["signalhub", "--config", "/nonexistent/signalhub.toml"])
            .unwrap();
        assert!(args.into_config().is_err());
    }
}
