//! Vendor module status → telemetry frame

use crate::models::TelemetryFrame;
use crate::netatmo::types::ModuleStatus;

/// Sparse projection: a reading is copied only when the vendor sent it
pub fn normalize(status: &ModuleStatus) -> TelemetryFrame {
    TelemetryFrame {
        id: status.id.clone(),
        reachable: u8::from(status.reachable.unwrap_or(false)),
        position: status.current_position,
        battery: status.battery_level,
        rfstatus: status.rf_strength,
        wifistatus: status.wifi_strength,
        timeutc: status.last_seen,
        gateway: status.bridge.clone(),
        position_step: status.target_position_step,
    }
}
