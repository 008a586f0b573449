//! CommandDispatcher: inbound position commands → vendor setstate

use std::sync::Arc;

use crate::engine::poller::PollingScheduler;
use crate::engine::registry::DeviceRegistry;
use crate::engine::session::ApiSession;
use crate::engine::EventSink;
use crate::error::BridgeError;
use crate::models::{DiagnosticFrame, EngineEvent};
use crate::netatmo::client::PATH_SET_STATE;
use crate::netatmo::types::SetStateRequest;

pub struct CommandDispatcher {
    session: Arc<ApiSession>,
    registry: Arc<DeviceRegistry>,
    poller: Arc<PollingScheduler>,
    events: EventSink,
}

impl CommandDispatcher {
    pub fn new(
        session: Arc<ApiSession>,
        registry: Arc<DeviceRegistry>,
        poller: Arc<PollingScheduler>,
        events: EventSink,
    ) -> Self {
        Self {
            session,
            registry,
            poller,
            events,
        }
    }

    /// Resolve `module_topic` against the registry and send the new target
    /// position. On success the module's location is re-polled at once.
    pub async fn handle_command(
        &self,
        module_topic: &str,
        target_position: &str,
    ) -> Result<(), BridgeError> {
        let Some(module) = self.registry.lookup(module_topic).await else {
            tracing::warn!("[Dispatcher] Module {} is unknown, please make refresh", module_topic);
            self.events.emit(EngineEvent::Diagnostic(DiagnosticFrame::info(format!(
                "{} is unknown, please make refresh",
                module_topic
            ))));
            return Err(BridgeError::UnknownModule(module_topic.to_string()));
        };

        if !module.module_type.accepts_commands() {
            return Err(BridgeError::InvalidCommand {
                module: module.id,
                reason: format!("{} modules take no position", module.module_type.as_code()),
            });
        }
        let position: i64 = target_position.trim().parse().map_err(|_| BridgeError::InvalidCommand {
            module: module.id.clone(),
            reason: format!("target position {:?} is not an integer", target_position),
        })?;

        tracing::info!(
            "[Dispatcher] Set {} ({}) to position {}",
            module.name,
            module.id,
            position
        );
        let request = SetStateRequest::single(
            &module.location_id,
            &module.id,
            position,
            module.bridge_id.as_deref(),
        );

        let response = match self.session.set_state(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("[Dispatcher] setstate for {} failed: {}", module.id, e);
                if let BridgeError::Api { ref payload, .. } = e {
                    self.events
                        .emit(EngineEvent::Diagnostic(DiagnosticFrame::error(payload.clone())));
                }
                return Err(e);
            }
        };

        // HTTP 200 can still carry per-module failures
        if let Some(error) = response.first_error() {
            tracing::error!("[Dispatcher] setstate for {} rejected: {}", module.id, error);
            self.events
                .emit(EngineEvent::Diagnostic(DiagnosticFrame::error(error.clone())));
            return Err(BridgeError::Api {
                path: PATH_SET_STATE.to_string(),
                status: 200,
                code: error.get("code").and_then(|c| c.as_i64()),
                message: error.to_string(),
                payload: error.clone(),
            });
        }

        if let Err(e) = self.poller.refresh_location(&module.location_id).await {
            tracing::warn!(
                "[Dispatcher] Status refresh after command on {} failed: {}",
                module.id,
                e
            );
        }
        Ok(())
    }
}
