//! Authentication & device-synchronization engine
//!
//! `SyncEngine` owns the token manager, registry, poller and dispatcher and
//! reacts to inbound events from the transport side. Everything it has to
//! say to the outside goes through an [`EventSink`].

pub mod dispatcher;
pub mod poller;
pub mod registry;
pub mod session;
pub mod telemetry;
pub mod token;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::config::PollingConfig;
use crate::error::BridgeError;
use crate::models::{ConnectionState, EngineEvent, InboundEvent, Token};
use crate::netatmo::{ClientCredentials, VendorApi};

use self::dispatcher::CommandDispatcher;
use self::poller::PollingScheduler;
use self::registry::DeviceRegistry;
use self::session::ApiSession;
use self::token::TokenManager;

/// Outbound half of the engine's event channel
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("[Engine] Event receiver closed, dropping event");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub auth_retry: Duration,
}

impl From<&PollingConfig> for EngineSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.interval_secs),
            auth_retry: Duration::from_secs(config.auth_retry_secs),
        }
    }
}

pub struct SyncEngine {
    settings: EngineSettings,
    session: Arc<ApiSession>,
    registry: Arc<DeviceRegistry>,
    poller: Arc<PollingScheduler>,
    dispatcher: Arc<CommandDispatcher>,
    events: EventSink,
    /// Vendor API reachable with a usable token
    connected: bool,
    /// Transport is up but the last synchronization did not complete
    sync_pending: bool,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn VendorApi>,
        credentials: ClientCredentials,
        token: Token,
        settings: EngineSettings,
        events: EventSink,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(api.clone(), credentials, token, events.clone()));
        let session = Arc::new(ApiSession::new(api, tokens, events.clone()));
        let registry = Arc::new(DeviceRegistry::new());
        let poller = Arc::new(PollingScheduler::new(
            session.clone(),
            registry.clone(),
            events.clone(),
        ));
        let dispatcher = Arc::new(CommandDispatcher::new(
            session.clone(),
            registry.clone(),
            poller.clone(),
            events.clone(),
        ));

        Self {
            settings,
            session,
            registry,
            poller,
            dispatcher,
            events,
            connected: false,
            sync_pending: false,
        }
    }

    /// Authenticate with the current token and announce the outcome
    pub async fn connect(&mut self) -> bool {
        self.connected = self.session.tokens().authenticate().await;
        if self.connected {
            tracing::info!("[Engine] Connected to Netatmo API");
            self.events
                .emit(EngineEvent::ConnectionState(ConnectionState::Connected));
        } else {
            tracing::warn!("[Engine] Netatmo API authorization required");
            self.events.emit(EngineEvent::ConnectionState(
                ConnectionState::AuthorizationRequired,
            ));
        }
        self.connected
    }

    /// Main loop. Returns on shutdown, or with an error when there is
    /// nothing to synchronize.
    ///
    /// The retry tick re-authenticates while disconnected and re-runs a
    /// synchronization that failed on a request error.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<InboundEvent>) -> Result<(), BridgeError> {
        self.connect().await;

        let retry_every = self.settings.auth_retry;
        let mut retry = time::interval_at(Instant::now() + retry_every, retry_every);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = inbound.recv() => match event {
                    None | Some(InboundEvent::Shutdown) => {
                        tracing::info!("[Engine] Shutting down");
                        self.poller.stop().await;
                        return Ok(());
                    }
                    Some(event) => self.handle(event).await?,
                },
                _ = retry.tick(), if !self.connected || self.sync_pending => {
                    if !self.connected {
                        tracing::info!("[Engine] Retrying Netatmo authentication");
                        self.connect().await;
                    } else {
                        tracing::info!("[Engine] Retrying synchronization");
                        self.synchronize().await?;
                    }
                }
            }
        }
    }

    pub async fn handle(&mut self, event: InboundEvent) -> Result<(), BridgeError> {
        match event {
            InboundEvent::TransportConnected => self.synchronize().await,
            InboundEvent::TransportDisconnected => {
                tracing::warn!("[Engine] Transport disconnected, pausing polling");
                self.sync_pending = false;
                self.poller.stop().await;
                Ok(())
            }
            InboundEvent::Command {
                module_topic,
                target_position,
            } => {
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = dispatcher
                        .handle_command(&module_topic, &target_position)
                        .await
                    {
                        tracing::warn!("[Engine] Command on {} failed: {}", module_topic, e);
                    }
                });
                Ok(())
            }
            InboundEvent::Refresh(payload) => {
                if payload != "refresh" {
                    tracing::debug!("[Engine] Ignoring refresh payload {:?}", payload);
                    return Ok(());
                }
                tracing::info!("[Engine] Refresh requested, rebuilding topology");
                self.poller.stop().await;
                {
                    let _paused = self.poller.pause().await;
                    self.registry.reset().await;
                }
                self.synchronize().await
            }
            InboundEvent::Authorized(generated) => {
                self.session.tokens().install(generated).await;
                self.connect().await;
                Ok(())
            }
            InboundEvent::Shutdown => {
                self.poller.stop().await;
                Ok(())
            }
        }
    }

    /// Discover when the registry is empty, then publish status and keep
    /// the poller running. A populated registry is never re-discovered.
    /// Until this completes, the run loop retries it on every retry tick.
    async fn synchronize(&mut self) -> Result<(), BridgeError> {
        self.sync_pending = true;
        if !self.connected {
            tracing::warn!("[Engine] Netatmo API not connected, waiting for authorization");
            return Ok(());
        }

        if self.registry.is_empty().await {
            let discovered = {
                let _paused = self.poller.pause().await;
                self.registry.discover(&self.session, &self.events).await
            };
            match discovered {
                Ok(added) => tracing::info!(
                    "[Engine] Discovery done: {} locations, {} modules",
                    added,
                    self.registry.module_count().await
                ),
                Err(BridgeError::EmptyTopology) => {
                    tracing::error!("[Engine] No location with Bubendorff products, nothing to poll");
                    return Err(BridgeError::EmptyTopology);
                }
                Err(e) => {
                    tracing::error!(
                        "[Engine] Discovery failed, retrying in {}s: {}",
                        self.settings.auth_retry.as_secs(),
                        e
                    );
                    if e.is_fatal_auth() {
                        self.connected = false;
                    }
                    return Ok(());
                }
            }
        } else {
            tracing::info!("[Engine] Reconnected, republishing status");
        }

        self.poller.poll_cycle().await;
        self.poller.start(self.settings.poll_interval).await;
        self.sync_pending = false;
        Ok(())
    }
}
