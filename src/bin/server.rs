//! orderkv Server Binary
//!
//! Serves an in-memory key-value store over TCP.

use std::sync::Arc;

use clap::Parser;
use orderkv::network::Server;
use orderkv::{Config, MemoryStore};
use tracing_subscriber::{fmt, EnvFilter};

/// orderkv Server
#[derive(Parser, Debug)]
#[command(name = "orderkv-server")]
#[command(about = "Key-value store server backing the order repository")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    listen: String,

    /// Number of connection worker threads
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Maximum client connections open at once
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Close client connections idle for this many seconds (0 = never)
    #[arg(short, long, default_value = "60")]
    idle_timeout_secs: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,orderkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("orderkv Server v{}", orderkv::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .listen_addr(&args.listen)
        .workers(args.workers)
        .max_connections(args.max_connections)
        .idle_timeout_ms(args.idle_timeout_secs * 1000)
        .build();

    let store = Arc::new(MemoryStore::new());

    let server = match Server::bind(config, store) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
