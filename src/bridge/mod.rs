//! Bridge between the engine's event channels and the message transport

pub mod topics;
pub mod transport;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::BridgeError;
use crate::models::{ConnectionState, EngineEvent, GeneratedToken, InboundEvent};
use crate::state::StateStore;

pub use topics::Topics;
pub use transport::{ConsoleTransport, Transport};

/// Outbound event pump: engine events → publications, subscriptions and
/// persisted token updates.
pub struct Bridge {
    transport: Arc<dyn Transport>,
    topics: Topics,
    state: StateStore,
    inbound: mpsc::Sender<InboundEvent>,
    transport_connected: bool,
}

impl Bridge {
    pub fn new(
        transport: Arc<dyn Transport>,
        topics: Topics,
        state: StateStore,
        inbound: mpsc::Sender<InboundEvent>,
    ) -> Self {
        Self {
            transport,
            topics,
            state,
            inbound,
            transport_connected: false,
        }
    }

    /// Runs until the engine drops its sender
    pub async fn run(mut self, mut outbound: mpsc::UnboundedReceiver<EngineEvent>) {
        while let Some(event) = outbound.recv().await {
            if let Err(e) = self.forward(event).await {
                tracing::warn!("[Bridge] {}", e);
            }
        }
        tracing::debug!("[Bridge] Engine channel closed");
    }

    async fn forward(&mut self, event: EngineEvent) -> Result<(), BridgeError> {
        match event {
            EngineEvent::Telemetry(frame) => {
                self.publish(&self.topics.frame(&frame.id), &frame, false)
                    .await
            }
            EngineEvent::Diagnostic(frame) => {
                self.publish(&self.topics.frame(frame.id), &frame, false)
                    .await
            }
            EngineEvent::Discovery(config) => {
                self.publish(&self.topics.config(&config.id), &config, true)
                    .await
            }
            EngineEvent::Subscribe(id) => {
                self.transport.subscribe(&self.topics.command(&id)).await
            }
            EngineEvent::TokenUpdated(token) => {
                tracing::info!("[State] Saving refreshed token");
                self.state.save_token(&token).await
            }
            EngineEvent::ConnectionState(ConnectionState::Connected) => {
                self.on_api_connected().await
            }
            EngineEvent::ConnectionState(ConnectionState::AuthorizationRequired) => {
                tracing::warn!(
                    "[Bridge] Netatmo authorization required: enter `authorize {{\"access_token\":..,\"refresh_token\":..,\"expires_in\":..}}`"
                );
                Ok(())
            }
        }
    }

    async fn publish<T: Serialize>(
        &self,
        topic: &str,
        payload: &T,
        retain: bool,
    ) -> Result<(), BridgeError> {
        let body = serde_json::to_string(payload)?;
        self.transport.publish(topic, &body, retain).await
    }

    /// Bring the transport up on first API connection, then let the engine
    /// synchronize.
    async fn on_api_connected(&mut self) -> Result<(), BridgeError> {
        if !self.transport_connected {
            self.transport.connect().await?;
            self.transport.publish(&self.topics.connected(), "1", true).await?;
            self.transport.subscribe(&self.topics.refresh()).await?;
            self.transport_connected = true;
        }
        if self.inbound.send(InboundEvent::TransportConnected).await.is_err() {
            tracing::debug!("[Bridge] Engine stopped, not reporting connection");
        }
        Ok(())
    }
}

/// Parse one console line: `<topic> <payload>` is routed like a broker
/// message, `authorize <json>` carries a generated token.
pub fn console_event(line: &str, topics: &Topics) -> Option<InboundEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    if head == "authorize" {
        return match serde_json::from_str::<GeneratedToken>(rest.trim()) {
            Ok(generated) => Some(InboundEvent::Authorized(generated)),
            Err(e) => {
                tracing::warn!("[Bridge] Invalid authorization result: {}", e);
                None
            }
        };
    }

    let event = topics.route(head, rest.trim());
    if event.is_none() {
        tracing::debug!("[Bridge] Ignoring console line {:?}", line);
    }
    event
}

/// Read stdin on a plain thread so that a pending read never holds up
/// runtime shutdown.
pub fn spawn_console_reader(topics: Topics, inbound: mpsc::Sender<InboundEvent>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("[Bridge] Console read failed: {}", e);
                    break;
                }
            };
            if let Some(event) = console_event(&line, &topics) {
                if inbound.blocking_send(event).is_err() {
                    break;
                }
            }
        }
        tracing::debug!("[Bridge] Console input closed");
    });
}
