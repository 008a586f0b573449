//! idiamant-bridge - Netatmo iDiamant to MQTT bridge
//!
//! Keeps a Netatmo token alive, discovers Bubendorff shutters, polls their
//! state and relays position commands.

mod bridge;
mod config;
mod engine;
mod error;
mod models;
mod netatmo;
mod state;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bridge::{Bridge, ConsoleTransport, Topics};
use crate::engine::{EngineSettings, EventSink, SyncEngine};
use crate::models::InboundEvent;
use crate::netatmo::{ClientCredentials, NetatmoClient};
use crate::state::StateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idiamant_bridge=info".into()),
        )
        .init();

    tracing::info!("Starting idiamant-bridge...");

    // Load configuration
    let config = config::Config::load()?;
    tracing::info!("Configuration loaded");

    let state = StateStore::load(&config.state.path);
    let token = state.token();

    let api = Arc::new(NetatmoClient::new(&config.netatmo)?);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::channel(64);

    let engine = SyncEngine::new(
        api,
        ClientCredentials::from(&config.netatmo),
        token,
        EngineSettings::from(&config.polling),
        EventSink::new(outbound_tx),
    );

    let topics = Topics::new(&config.mqtt.topic);
    let transport = Arc::new(ConsoleTransport::new(&config.mqtt));
    start_background_tasks(
        Bridge::new(transport, topics.clone(), state, inbound_tx.clone()),
        outbound_rx,
        topics,
        inbound_tx,
    );

    engine.run(inbound_rx).await?;
    tracing::info!("idiamant-bridge stopped");
    Ok(())
}

/// Start background tasks (event pump, console reader, signal watcher)
fn start_background_tasks(
    bridge: Bridge,
    outbound_rx: mpsc::UnboundedReceiver<models::EngineEvent>,
    topics: Topics,
    inbound_tx: mpsc::Sender<InboundEvent>,
) {
    tokio::spawn(bridge.run(outbound_rx));

    bridge::spawn_console_reader(topics, inbound_tx.clone());

    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = inbound_tx.send(InboundEvent::Shutdown).await;
    });

    tracing::info!("Background tasks started");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
