//! ebeast-probe: talk to a running sound engine over Jsonipc.
//!
//! Opens a session, optionally calls one server method, then follows engine
//! events and SHM values until the duration elapses or Ctrl-C.
//!
//! ## Usage
//!
//! ```bash
//! # Handshake and engine state only
//! ebeast-probe --url ws://127.0.0.1:27239/ --protocol auth.XXXX
//!
//! # Call a server method with JSON arguments
//! ebeast-probe --call get_version --args '[]'
//!
//! # Print the 32-bit float at SHM offset 4096 every frame for 5 seconds
//! ebeast-probe --shm-offset 4096 --duration-ms 5000
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ebeast_jsonipc::events::EventStream;
use ebeast_jsonipc::{ClientConfig, Connector, EventConnection, RemoteObject, Session};
use ebeast_telemetry::{init_tracing, TelemetryConfig};
use serde_json::Value;
use tokio_stream::StreamExt;
use tracing::info;

/// Jsonipc probe for the ebeast sound engine
#[derive(Parser, Debug)]
#[command(name = "ebeast-probe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine WebSocket URL (default: EBEAST_JSONIPC_URL or ws://127.0.0.1:27239/)
    #[arg(long)]
    url: Option<String>,

    /// Authentication subprotocol (default: EBEAST_JSONIPC_PROTOCOL)
    #[arg(long)]
    protocol: Option<String>,

    /// Server method to call once connected
    #[arg(long)]
    call: Option<String>,

    /// JSON array of arguments for --call
    #[arg(long, default_value = "[]")]
    args: String,

    /// Server event to print while running
    #[arg(long)]
    follow: Option<String>,

    /// SHM byte offset of a 32-bit float to print each active frame
    #[arg(long)]
    shm_offset: Option<u64>,

    /// How long to keep following events and SHM values
    #[arg(long, default_value = "0")]
    duration_ms: u64,

    /// Log level filter
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&TelemetryConfig::for_tool("ebeast-probe", &args.log_level))?;

    let mut config = ClientConfig::from_env();
    if let Some(url) = args.url.clone() {
        config.connection.url = url;
    }
    if args.protocol.is_some() {
        config.connection.protocol = args.protocol.clone();
    }

    let connector = Connector::from_config(&config);
    let session = Session::start(&connector, &config)
        .await
        .with_context(|| format!("failed to open {}", config.connection.url))?;
    println!(
        "connected: server {} engine_active={}",
        session.server().proxy(),
        session.is_engine_active()
    );

    if let Some(method) = &args.call {
        let call_args: Vec<Value> =
            serde_json::from_str(&args.args).context("--args must be a JSON array")?;
        let result = session.server().call(method, call_args).await?;
        println!("{} -> {}", method, serde_json::to_string_pretty(&result.into_value())?);
    }

    let mut events = match &args.follow {
        Some(selector) => {
            let (connection, stream) = session
                .hub()
                .connect_stream(session.server().proxy(), selector)
                .await?;
            Some((connection, stream))
        }
        None => None,
    };

    let shm = args.shm_offset.map(|offset| {
        let handle = session.shm_subscribe(offset, 4);
        let shm = Arc::clone(session.shm());
        let frame = session.add_frame_handler(move |active| {
            if active {
                if let Some(value) = shm.snapshot().f32_at(handle.position) {
                    println!("shm[{}] = {}", offset, value);
                }
            }
            true
        });
        (handle, frame)
    });

    if args.duration_ms > 0 {
        let deadline = tokio::time::sleep(Duration::from_millis(args.duration_ms));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = tokio::signal::ctrl_c() => break,
                _ = session.connection().closed() => {
                    info!("Engine closed the connection");
                    break;
                }
                event = next_event(&mut events) => match event {
                    Some(event) => println!("event: {}", event),
                    None => events = None,
                },
            }
        }
    }

    if let Some((handle, frame)) = shm {
        frame.remove();
        session.shm_unsubscribe(handle);
    }
    if let Some((connection, _)) = events {
        connection.disconnect().await?;
    }

    let stats = session.connection().pending_stats();
    info!(
        registered = stats.total_registered.load(Ordering::Relaxed),
        completed = stats.total_completed.load(Ordering::Relaxed),
        rejected = stats.total_rejected.load(Ordering::Relaxed),
        unknown_replies = stats.total_unknown.load(Ordering::Relaxed),
        outstanding = session.connection().pending_count(),
        oldest_ms = session
            .connection()
            .oldest_pending_age()
            .map(|age| age.as_millis() as u64),
        "Request summary"
    );
    session.shutdown().await;
    Ok(())
}

async fn next_event(
    events: &mut Option<(EventConnection, EventStream)>,
) -> Option<Value> {
    match events {
        Some((_, stream)) => stream.next().await,
        None => std::future::pending().await,
    }
}
