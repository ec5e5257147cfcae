//! resttree server
//!
//! Serves the demo widgets tree over HTTP.
//!
//! ```text
//!   Client ──▶ axum Router ──▶ middleware (request id, trace, timeout,
//!                              body limit, panic catch, live data)
//!                         ──▶ Dispatcher (blocking pool)
//!                              ├─ navigator  path → trail / action / redirect
//!                              ├─ verbs      HEAD GET POST PUT PATCH DELETE
//!                              ├─ headers    ETag, Expires, Cache-Control
//!                              └─ negotiation gzip, compact JSON
//!                         ──▶ resource tree (demo widgets)
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use resttree::config::{load_config, validate_config, ServerConfig};
use resttree::demo::{self, Widget, WidgetStore};
use resttree::lifecycle::{signals, Shutdown};
use resttree::observability::{logging, metrics};
use resttree::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "resttree", version, about = "REST resource tree server")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Override `mount.prefix`.
    #[arg(long)]
    prefix: Option<String>,

    /// Seed the store with a few widgets.
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(prefix) = args.prefix {
        config.mount.prefix = prefix;
    }
    validate_config(&config).map_err(resttree::config::ConfigError::Validation)?;

    logging::init(&config.observability.log_level);
    logging::install_panic_hook();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        prefix = %config.mount.prefix,
        request_timeout_secs = config.timeouts.request_secs,
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

    let store = WidgetStore::new();
    if args.seed {
        store.insert(Widget::new("42", "sprocket"));
        store.insert(Widget::new("43", "flange"));
    }
    let server = HttpServer::new(config.clone(), demo::tree(store)?)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_on_signal(&signal_shutdown).await;
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
