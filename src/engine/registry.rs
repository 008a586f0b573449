//! Location/module topology cache
//!
//! Built by discovery, kept for the process lifetime and cleared only when
//! an explicit refresh is requested.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::engine::session::ApiSession;
use crate::engine::EventSink;
use crate::error::BridgeError;
use crate::models::{EngineEvent, Location, Module, ModuleConfig, ModuleType};
use crate::netatmo::types::{HomeData, HomeModuleInfo, ModuleStatus};

#[derive(Default)]
struct Topology {
    /// Discovery order, which is also poll order
    locations: Vec<Location>,
    /// Flap index: module id → module, across all locations
    modules: HashMap<String, Module>,
}

#[derive(Default)]
pub struct DeviceRegistry {
    topology: RwLock<Topology>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the topology and register every location not known yet.
    /// Returns the number of newly registered locations.
    pub async fn discover(
        &self,
        session: &ApiSession,
        events: &EventSink,
    ) -> Result<usize, BridgeError> {
        let homes = session.homes_data().await?.body.homes;
        let mut added = 0;

        for home in homes {
            let infos = match home.modules {
                Some(ref modules) if !modules.is_empty() => modules,
                _ => {
                    tracing::info!("[Registry] Location {} have no Bubendorff products", home.name);
                    continue;
                }
            };
            if self.has_location(&home.id).await {
                tracing::debug!("[Registry] Existing location : {}", home.name);
                continue;
            }

            tracing::info!("[Registry] Location {}: reading Bubendorff products", home.name);
            let statuses = session
                .home_status(&home.id)
                .await?
                .body
                .home
                .and_then(|h| h.modules)
                .unwrap_or_default();
            if statuses.is_empty() {
                tracing::warn!("[Registry] No modules returned by API for {}", home.name);
                continue;
            }

            let modules = build_modules(&home, infos, &statuses);
            if self.insert(&home, &modules).await {
                added += 1;
                self.announce(&home, &modules, events);
            }
        }

        if self.is_empty().await {
            return Err(BridgeError::EmptyTopology);
        }
        Ok(added)
    }

    async fn insert(&self, home: &HomeData, modules: &[Module]) -> bool {
        let mut topology = self.topology.write().await;
        // Re-checked under the write lock: discovery may run concurrently
        if topology.locations.iter().any(|l| l.id == home.id) {
            return false;
        }
        topology.locations.push(Location {
            id: home.id.clone(),
            name: home.name.clone(),
        });
        for module in modules {
            if let Some(existing) = topology.modules.get(&module.id) {
                tracing::warn!(
                    "[Registry] Module {} already registered under location {}",
                    module.id,
                    existing.location_id
                );
                continue;
            }
            topology.modules.insert(module.id.clone(), module.clone());
        }
        true
    }

    fn announce(&self, home: &HomeData, modules: &[Module], events: &EventSink) {
        for module in modules {
            let config = ModuleConfig {
                id: module.id.clone(),
                home: home.name.clone(),
                name: module.name.clone(),
                module_type: module.module_type.clone(),
                gateway: module.bridge_id.clone(),
                position_step: module.position_step,
            };
            tracing::debug!("[Registry] Module found : {:?}", config);
            events.emit(EngineEvent::Discovery(config));

            if module.module_type.accepts_commands() {
                tracing::debug!("[Registry] Request subscribe to topic: {}", module.id);
                events.emit(EngineEvent::Subscribe(module.id.clone()));
            }
        }
    }

    pub async fn lookup(&self, module_id: &str) -> Option<Module> {
        self.topology.read().await.modules.get(module_id).cloned()
    }

    pub async fn locations(&self) -> Vec<Location> {
        self.topology.read().await.locations.clone()
    }

    pub async fn location(&self, location_id: &str) -> Option<Location> {
        self.topology
            .read()
            .await
            .locations
            .iter()
            .find(|l| l.id == location_id)
            .cloned()
    }

    pub async fn has_location(&self, location_id: &str) -> bool {
        self.location(location_id).await.is_some()
    }

    pub async fn is_empty(&self) -> bool {
        self.topology.read().await.locations.is_empty()
    }

    pub async fn module_count(&self) -> usize {
        self.topology.read().await.modules.len()
    }

    /// Forget everything; callers re-run `discover` afterward
    pub async fn reset(&self) {
        let mut topology = self.topology.write().await;
        topology.locations.clear();
        topology.modules.clear();
        tracing::info!("[Registry] Topology cleared");
    }
}

/// Names come from homesdata; type, bridge and step from homestatus
fn build_modules(home: &HomeData, infos: &[HomeModuleInfo], statuses: &[ModuleStatus]) -> Vec<Module> {
    let infos: HashMap<&str, &HomeModuleInfo> =
        infos.iter().map(|info| (info.id.as_str(), info)).collect();

    statuses
        .iter()
        .map(|status| {
            let info = infos.get(status.id.as_str());
            let code = status
                .module_type
                .as_deref()
                .or_else(|| info.and_then(|i| i.module_type.as_deref()))
                .unwrap_or_default();
            Module {
                id: status.id.clone(),
                name: info
                    .and_then(|i| i.name.clone())
                    .unwrap_or_else(|| status.id.clone()),
                module_type: ModuleType::from_code(code),
                location_id: home.id.clone(),
                bridge_id: status.bridge.clone(),
                position_step: status.target_position_step,
            }
        })
        .collect()
}
