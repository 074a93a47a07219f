//! Device registry information
//!
//! Entities hang off two kinds of device: one gateway per home and one
//! device per room, linked to the gateway.

use serde::Serialize;

use crate::{DOMAIN, GATEWAY_MODEL, GATEWAY_NAME, MANUFACTURER, ROOM_MODEL};

/// Device an entity belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// `(domain, device id)`
    pub identifiers: (String, String),
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    /// Parent device identifiers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device: Option<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_area: Option<String>,
}

impl DeviceInfo {
    /// The home gateway
    pub fn gateway(home_id: &str) -> Self {
        Self {
            identifiers: gateway_identifiers(home_id),
            name: GATEWAY_NAME.to_string(),
            manufacturer: MANUFACTURER.to_string(),
            model: GATEWAY_MODEL.to_string(),
            via_device: None,
            suggested_area: None,
        }
    }

    /// A room, reached through the gateway
    pub fn room(home_id: &str, room_id: &str, room_name: &str) -> Self {
        Self {
            identifiers: (DOMAIN.to_string(), format!("room_{}_{}", home_id, room_id)),
            name: room_name.to_string(),
            manufacturer: MANUFACTURER.to_string(),
            model: ROOM_MODEL.to_string(),
            via_device: Some(gateway_identifiers(home_id)),
            suggested_area: Some(room_name.to_string()),
        }
    }
}

fn gateway_identifiers(home_id: &str) -> (String, String) {
    (DOMAIN.to_string(), format!("gateway_{}", home_id))
}
