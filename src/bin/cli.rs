//! orderkv CLI Client
//!
//! Drives the order repository against a running orderkv server.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use orderkv::{
    Config, Context, Cursor, FindAllPage, KvStore, Order, OrderId, OrderRepository, RemoteStore,
};
use tracing_subscriber::{fmt, EnvFilter};

/// orderkv CLI
#[derive(Parser, Debug)]
#[command(name = "orderkv-cli")]
#[command(about = "CLI for the orderkv order repository")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    server: String,

    /// Per-command timeout in milliseconds (0 = none)
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert a new order given as JSON
    Insert {
        /// The order document
        order: String,
    },

    /// Get an order by id
    Get {
        /// The order id
        id: OrderId,
    },

    /// Replace an existing order given as JSON
    Update {
        /// The order document
        order: String,
    },

    /// Delete an order by id
    Delete {
        /// The order id
        id: OrderId,
    },

    /// List one page of orders
    List {
        /// Page size
        #[arg(long, default_value = "10")]
        size: usize,

        /// Cursor returned by the previous page
        #[arg(long, default_value = "0")]
        cursor: Cursor,
    },

    /// Ping the server
    Ping,
}

fn parse_order(text: &str) -> Result<Order, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid order JSON: {}", e))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

fn run(args: Args) -> Result<(), String> {
    let config = Config::builder().server_addr(&args.server).build();
    let store = RemoteStore::new(config.clone()).map_err(|e| e.to_string())?;
    let repo = OrderRepository::with_config(store, &config).map_err(|e| e.to_string())?;

    let ctx = if args.timeout_ms > 0 {
        Context::with_timeout(std::time::Duration::from_millis(args.timeout_ms))
    } else {
        Context::background()
    };

    match args.command {
        Commands::Insert { order } => {
            let order = parse_order(&order)?;
            repo.insert(&ctx, &order).map_err(|e| e.to_string())?;
            println!("inserted {}", order.order_id);
        }
        Commands::Get { id } => {
            let order = repo.find_by_id(&ctx, id).map_err(|e| e.to_string())?;
            println!("{}", to_json(&order)?);
        }
        Commands::Update { order } => {
            let order = parse_order(&order)?;
            repo.update(&ctx, &order).map_err(|e| e.to_string())?;
            println!("updated {}", order.order_id);
        }
        Commands::Delete { id } => {
            repo.delete_by_id(&ctx, id).map_err(|e| e.to_string())?;
            println!("deleted {}", id);
        }
        Commands::List { size, cursor } => {
            let page = repo
                .find_all(&ctx, FindAllPage::at(size, cursor))
                .map_err(|e| e.to_string())?;
            println!("{}", to_json(&page.orders)?);
            match page.next {
                Some(next) => println!("next cursor: {}", next),
                None => println!("next cursor: done"),
            }
        }
        Commands::Ping => {
            repo.store().ping(&ctx).map_err(|e| e.to_string())?;
            println!("PONG");
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}
