//! The switchboard server binary.
//!
//! A thin harness around the library: load configuration, seed the in-memory
//! directory, construct the hub, and serve sessions until interrupted.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use switchboard::{app, Config, Directory, Hub, MemoryDirectory};

#[derive(Parser, Debug)]
#[command(
    name = "switchboard",
    about = "Signaling and relay hub for real-time chat and WebRTC calls"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "switchboard.toml")]
    config: PathBuf,

    /// Listen address, overriding the configuration file
    #[arg(long)]
    listen: Option<SocketAddr>,
}

/// Load the configuration file, or die trying.
fn load_config(path: &Path) -> Config {
    match Config::from_file(path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "Failed to load configuration from {}: {}",
                path.display(),
                err
            );
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal<D: Directory>(hub: Arc<Hub<D>>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("interrupt received; closing all sessions");
    hub.shutdown().await;
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = if args.config.exists() {
        load_config(&args.config)
    } else {
        info!(
            "no configuration file at {}; using defaults",
            args.config.display()
        );
        Config::default()
    };
    let listen = args.listen.unwrap_or(config.listen);

    let directory = MemoryDirectory::new();
    config.directory.apply(&directory);
    info!(
        "directory seeded with {} users and {} groups",
        config.directory.users.len(),
        config.directory.groups.len()
    );

    let hub = Arc::new(Hub::new(directory, config.signaling));
    let app = app(hub.clone());

    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("Failed to bind {}: {}", listen, err);
            std::process::exit(1);
        }
    };
    info!("listening on {}", listen);

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await
    {
        eprintln!("server error: {}", err);
        std::process::exit(1);
    }
}
