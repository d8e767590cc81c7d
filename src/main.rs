//! rpcwire demo server - serves a handful of endpoints over HTTP.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use rpcwire::{
    transport::http::{start_server, HttpServerConfig, DEFAULT_PATH},
    EndpointMap, Handler, Passthrough, Value,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "rpcwire-serve")]
#[command(about = "Serve demo RPC endpoints over HTTP")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Path the RPC endpoint is mounted at
    #[arg(long, default_value = DEFAULT_PATH)]
    path: String,

    /// Send results untagged instead of through the tagged JSON serializer
    #[arg(long)]
    passthrough: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn endpoints() -> EndpointMap {
    EndpointMap::new()
        .with("ping", || async { anyhow::Ok("pong") })
        .with("add", |a: f64, b: f64| async move { anyhow::Ok(a + b) })
        .with("echo", |value: Value| async move { anyhow::Ok(value) })
        .with("now", || async { anyhow::Ok(Utc::now()) })
        .with("secondsUntil", |when: DateTime<Utc>| async move {
            anyhow::Ok((when - Utc::now()).num_seconds())
        })
        .with("fail", |message: Option<String>| async move {
            Err::<(), _>(anyhow::anyhow!(message.unwrap_or_default()))
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG wins over --debug
    let log_level = if args.debug { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let endpoints = endpoints();
    info!(
        "Starting rpcwire server with endpoints: {}",
        endpoints.names().collect::<Vec<_>>().join(", ")
    );

    let handler = if args.passthrough {
        Handler::with_serializer(endpoints, Passthrough)
    } else {
        Handler::new(endpoints)
    };

    let config = HttpServerConfig {
        host: args.host,
        port: args.port,
        path: args.path,
        ..Default::default()
    };
    let addr = start_server(handler, &config).await?;

    // Machine-readable port for whoever spawned us
    println!("RPC_PORT={}", addr.port());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
