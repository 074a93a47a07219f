//! Entity contracts shared by all platforms
//!
//! Every entity reads the latest coordinator snapshot; none of them keep
//! their own copy of vendor data. Platforms with commands implement an extra
//! async trait ([`ClimateEntity`], [`SelectEntity`]) reachable through the
//! downcast helpers on [`Entity`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intuis_api::IntuisApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::coordinator::Coordinator;
use crate::device::DeviceInfo;
use crate::models::{HvacMode, Preset};

/// Errors raised by entity commands
#[derive(Debug, Error)]
pub enum EntityError {
    #[error(transparent)]
    Api(#[from] IntuisApiError),

    #[error("temperature {temp} outside of [{min}, {max}]")]
    TemperatureOutOfRange { temp: f64, min: f64, max: f64 },

    #[error("unsupported preset mode: {0}")]
    UnsupportedPreset(String),

    #[error("unsupported hvac mode: {0}")]
    UnsupportedHvacMode(String),

    #[error("unknown option: {0}")]
    UnknownOption(String),
}

/// Entity platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Climate,
    Sensor,
    BinarySensor,
    Select,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Climate,
        Platform::Sensor,
        Platform::BinarySensor,
        Platform::Select,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Climate => "climate",
            Platform::Sensor => "sensor",
            Platform::BinarySensor => "binary_sensor",
            Platform::Select => "select",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered state of one entity at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub unique_id: String,
    pub platform: Platform,
    pub name: String,
    /// `unknown` when there is no value, `unavailable` when the coordinator
    /// failed
    pub state: String,
    pub attributes: Map<String, Value>,
    pub available: bool,
    pub last_updated: DateTime<Utc>,
}

pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Read side of every entity
pub trait Entity: Send + Sync {
    fn platform(&self) -> Platform;

    fn unique_id(&self) -> &str;

    fn name(&self) -> &str;

    fn device_info(&self) -> &DeviceInfo;

    fn coordinator(&self) -> &Arc<Coordinator>;

    /// Current value, `None` when unknown
    fn state(&self) -> Option<String>;

    fn attributes(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Available while the last refresh succeeded
    fn available(&self) -> bool {
        let coordinator = self.coordinator();
        coordinator.last_update_success() && coordinator.data().is_some()
    }

    fn snapshot(&self) -> EntityState {
        let available = self.available();
        let state = if available {
            self.state().unwrap_or_else(|| STATE_UNKNOWN.to_string())
        } else {
            STATE_UNAVAILABLE.to_string()
        };
        EntityState {
            unique_id: self.unique_id().to_string(),
            platform: self.platform(),
            name: self.name().to_string(),
            state,
            attributes: self.attributes(),
            available,
            last_updated: Utc::now(),
        }
    }

    fn as_climate(&self) -> Option<&dyn ClimateEntity> {
        None
    }

    fn as_select(&self) -> Option<&dyn SelectEntity> {
        None
    }
}

/// Thermostat commands
#[async_trait]
pub trait ClimateEntity: Entity {
    async fn set_hvac_mode(&self, mode: HvacMode) -> Result<(), EntityError>;

    /// Manual setpoint, optionally for a limited time
    async fn set_temperature(
        &self,
        temperature: f64,
        duration: Option<std::time::Duration>,
    ) -> Result<(), EntityError>;

    async fn set_preset_mode(&self, preset: Preset) -> Result<(), EntityError>;
}

/// Option picker commands
#[async_trait]
pub trait SelectEntity: Entity {
    fn options(&self) -> Vec<String>;

    fn current_option(&self) -> Option<String>;

    async fn select_option(&self, option: &str) -> Result<(), EntityError>;
}
