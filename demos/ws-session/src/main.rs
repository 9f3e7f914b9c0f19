//! WebSocket Session Demo
//!
//! Connects a monitored session to a WebSocket chat server, prints every
//! message event, and sends each stdin line as a message.
//!
//! # Input
//!
//! ```text
//! alice: hello there      send "hello there" to alice
//! /stats                  print session statistics
//! /reconnect              force a reconnect
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package ws-session -- --url ws://127.0.0.1:9000 --probe-interval 30
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use vigil::core::{MessageDelivered, MessageDeliveryFailed, MessageReceived};
use vigil::prelude::*;
use vigil::transport::websocket::{WsClientConfig, WsSessionTransport};
use vigil::{ListenerResult, MessageListener};

#[derive(Debug, Parser)]
#[command(version, about = "Monitored WebSocket chat session")]
struct Args {
    /// Server URL.
    #[arg(long, default_value = "ws://127.0.0.1:9000")]
    url: String,

    /// Configuration file; searched for in the usual places when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Adapter name used for per-adapter watchdog overrides.
    #[arg(long, default_value = "websocket")]
    adapter: String,

    /// Overrides the probe interval, in seconds.
    #[arg(long)]
    probe_interval: Option<u64>,
}

/// Prints every message event.
struct ConsoleListener;

impl MessageListener for ConsoleListener {
    fn on_delivered(&self, event: &MessageDelivered) -> ListenerResult {
        println!("→ {}: {}", event.to, event.message.content);
        Ok(())
    }

    fn on_received(&self, event: &MessageReceived) -> ListenerResult {
        println!("← {}: {}", event.from, event.message.content);
        Ok(())
    }

    fn on_delivery_failed(&self, event: &MessageDeliveryFailed) -> ListenerResult {
        println!("✗ {} ({}): {}", event.to, event.failure, event.message.content);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigLoader::new().file(path).load(),
        None => ConfigLoader::new().load(),
    }
    .context("loading configuration")?;
    init_from_config(&config.logging);

    let mut watchdog = config.watchdog_for(&args.adapter);
    if let Some(secs) = args.probe_interval {
        watchdog = watchdog.with_probe_interval(Duration::from_secs(secs));
    }

    let transport = Arc::new(WsSessionTransport::new(WsClientConfig::new(&args.url)));
    let session = ProtocolSession::builder(&args.adapter)
        .config(watchdog)
        .transport(transport.clone())
        .build()?;
    session.subscribe(Arc::new(ConsoleListener));

    let mut states = session.state_changes();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!(state = %state, "Connection state");
        }
    });

    transport
        .connect(session.handler())
        .await
        .with_context(|| format!("connecting to {}", args.url))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                handle_line(&session, line.trim()).await;
            }
        }
    }

    session.shutdown();
    transport.close();
    Ok(())
}

async fn handle_line(session: &ProtocolSession, line: &str) {
    match line {
        "" => {}
        "/stats" => println!("{:#?}", session.stats()),
        "/reconnect" => match session.escalate() {
            Ok(escalation) if escalation.is_started() => info!("Reconnect started"),
            Ok(_) => warn!("Reconnect already in progress"),
            Err(e) => error!(error = %e, "Cannot reconnect"),
        },
        _ => {
            let Some((to, text)) = line.split_once(':') else {
                warn!("Expected '<contact>: <message>'");
                return;
            };
            session
                .send(Contact::new(to.trim()), Message::text(text.trim()))
                .await;
        }
    }
}
