//! Data models for the iDiamant bridge

use serde::{Deserialize, Serialize};

// ============================================================================
// Token
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
}

impl Token {
    /// Usable iff the access token is present and strictly unexpired at `now`
    pub fn is_usable_at(&self, now: i64) -> bool {
        !self.access_token.is_empty() && self.expires_at > now
    }

    pub fn is_usable(&self) -> bool {
        self.is_usable_at(chrono::Utc::now().timestamp())
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Authorization result produced by the external web flow
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratedToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl GeneratedToken {
    pub fn into_token(self, now: i64) -> Token {
        Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now + self.expires_in,
        }
    }
}

// ============================================================================
// Topology
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub id: String,
    pub name: String,
}

/// Bubendorff module family as reported by the vendor `type` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleType {
    /// NBR: reversible motor
    ReversibleMotor,
    /// NBO: opaque motor
    OpaqueMotor,
    /// NBS: slat motor
    SlatMotor,
    /// NBG: gateway bridge
    GatewayBridge,
    Other(String),
}

impl ModuleType {
    pub fn from_code(code: &str) -> Self {
        match code {
            "NBR" => ModuleType::ReversibleMotor,
            "NBO" => ModuleType::OpaqueMotor,
            "NBS" => ModuleType::SlatMotor,
            "NBG" => ModuleType::GatewayBridge,
            other => ModuleType::Other(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            ModuleType::ReversibleMotor => "NBR",
            ModuleType::OpaqueMotor => "NBO",
            ModuleType::SlatMotor => "NBS",
            ModuleType::GatewayBridge => "NBG",
            ModuleType::Other(code) => code,
        }
    }

    /// Motorized covers take position commands; everything else is read-only
    pub fn accepts_commands(&self) -> bool {
        matches!(
            self,
            ModuleType::ReversibleMotor | ModuleType::OpaqueMotor | ModuleType::SlatMotor
        )
    }
}

impl Serialize for ModuleType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub id: String,
    pub name: String,
    pub module_type: ModuleType,
    pub location_id: String,
    pub bridge_id: Option<String>,
    pub position_step: Option<i64>,
}

// ============================================================================
// Outbound frames
// ============================================================================

/// Normalized module state, one per module per poll cycle.
/// Every optional field is absent unless the vendor record carried it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryFrame {
    pub id: String,
    pub reachable: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rfstatus: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifistatus: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeutc: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_step: Option<i64>,
}

/// Module description published once per discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleConfig {
    pub id: String,
    pub home: String,
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_step: Option<i64>,
}

/// Frame published on a fixed id (`error`, `infos`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticFrame {
    pub id: &'static str,
    pub data: serde_json::Value,
}

impl DiagnosticFrame {
    pub fn error(data: serde_json::Value) -> Self {
        Self { id: "error", data }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            id: "infos",
            data: serde_json::Value::String(message.into()),
        }
    }
}

// ============================================================================
// Engine events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// No usable credentials: the user must run the authorization flow
    AuthorizationRequired,
}

/// Events the engine sends outward
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Telemetry(TelemetryFrame),
    Discovery(ModuleConfig),
    Diagnostic(DiagnosticFrame),
    TokenUpdated(Token),
    Subscribe(String),
    ConnectionState(ConnectionState),
}

/// Events the engine consumes
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    TransportConnected,
    TransportDisconnected,
    Command {
        module_topic: String,
        target_position: String,
    },
    Refresh(String),
    Authorized(GeneratedToken),
    Shutdown,
}
