// =============================================================================
// Matrixon Pseudo-Identity Server - Main Entry Point
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Serves the client leave-room API on top of the room-scoped
//   pseudo-identity store.
//
// Runtime Requirements:
//   • MATRIXON_CONFIG or --config pointing to a TOML config file
//   • A SQLite file path or PostgreSQL database (or the memory backend)
//
// =============================================================================

use std::{net::SocketAddr, time::Instant};

use anyhow::Context;
use matrixon_db::Database;
use matrixon_pseudoid::{Config, Services};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

mod clap;

#[cfg(all(not(target_env = "msvc"), feature = "jemalloc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(all(not(target_env = "msvc"), feature = "jemalloc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = clap::parse();

    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.log)?;
    info!("📁 Configuration loaded from {:?}", args.config);

    match args.command {
        clap::Commands::CheckConfig => {
            info!("✅ Configuration for {} is valid", config.server_name);
            Ok(())
        }
        clap::Commands::Start { address, port } => {
            if let Some(address) = address {
                info!("📡 Address override from CLI: {}", address);
                config.address = address;
            }
            if let Some(port) = port {
                info!("🔌 Port override from CLI: {}", port);
                config.port = port;
            }
            start_server(config).await
        }
    }
}

fn init_tracing(directives: &str) -> anyhow::Result<()> {
    let filter_layer = match EnvFilter::try_new(directives) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("It looks like your log config is invalid. The following error occurred while parsing it: {e}");
            EnvFilter::new("warn")
        }
    };

    let subscriber = tracing_subscriber::Registry::default()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::Layer::new());
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")
}

async fn start_server(config: Config) -> anyhow::Result<()> {
    let start = Instant::now();
    info!("🚀 Starting Matrixon pseudo-identity server {}", clap::version());

    let db = Database::open(&config.database).await.context("failed to open database")?;
    let services = Services::build(&config, db).await?;
    let app = services.router();

    let addr = SocketAddr::from((config.address, config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("✅ Listening on {} (started in {:?})", addr, start.elapsed());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("✅ Server shutdown completed successfully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("❌ Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let sig: &str;

    tokio::select! {
        _ = ctrl_c => { sig = "Ctrl+C"; },
        _ = terminate => { sig = "SIGTERM"; },
    }

    warn!("Received {}, shutting down...", sig);
}
