//! Netatmo energy API payloads (homesdata, homestatus, setstate, oauth2/token)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomesDataResponse {
    pub body: HomesDataBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomesDataBody {
    #[serde(default)]
    pub homes: Vec<HomeData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Absent when the home has no Bubendorff product
    pub modules: Option<Vec<HomeModuleInfo>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeModuleInfo {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub module_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeStatusResponse {
    #[serde(default)]
    pub body: HomeStatusBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeStatusBody {
    pub home: Option<HomeStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeStatus {
    pub modules: Option<Vec<ModuleStatus>>,
}

/// Live state of one module; every reading is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: Option<String>,
    #[serde(default)]
    pub reachable: Option<bool>,
    pub bridge: Option<String>,
    pub current_position: Option<i64>,
    #[serde(rename = "target_position:step")]
    pub target_position_step: Option<i64>,
    pub battery_level: Option<i64>,
    pub rf_strength: Option<i64>,
    pub wifi_strength: Option<i64>,
    pub last_seen: Option<i64>,
}

// ============================================================================
// setstate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetStateRequest {
    pub home: SetStateHome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetStateHome {
    pub id: String,
    pub modules: Vec<SetStateModule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetStateModule {
    pub id: String,
    pub target_position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
}

impl SetStateRequest {
    pub fn single(
        home_id: &str,
        module_id: &str,
        target_position: i64,
        bridge: Option<&str>,
    ) -> Self {
        Self {
            home: SetStateHome {
                id: home_id.to_string(),
                modules: vec![SetStateModule {
                    id: module_id.to_string(),
                    target_position,
                    bridge: bridge.map(|b| b.to_string()),
                }],
            },
        }
    }
}

/// `{"status":"ok"}` on success; per-module failures come back in `body.errors`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetStateResponse {
    pub body: Option<SetStateErrors>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetStateErrors {
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

impl SetStateResponse {
    pub fn first_error(&self) -> Option<&serde_json::Value> {
        self.body.as_ref().and_then(|b| b.errors.first())
    }
}

// ============================================================================
// oauth2/token
// ============================================================================

/// Raw refresh-grant answer; completeness is checked by the token manager
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// Error envelope shared by the API and the OAuth endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEnvelope {
    pub error: Option<serde_json::Value>,
    pub error_description: Option<String>,
}

impl ErrorEnvelope {
    pub fn code(&self) -> Option<i64> {
        self.error.as_ref()?.get("code")?.as_i64()
    }

    /// Most specific human-readable message the vendor gave
    pub fn message(&self) -> Option<String> {
        if let Some(ref description) = self.error_description {
            return Some(description.clone());
        }
        let error = self.error.as_ref()?;
        if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
            return Some(message.to_string());
        }
        Some(match error {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}
