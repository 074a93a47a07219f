//! Intuis Connect integration
//!
//! Exposes a Muller/Intuis heating installation as Home Assistant style
//! entities:
//!
//! - one climate entity per room (mode, preset, target temperature)
//! - gateway sensors (energy, counts, thermostat mode) and room sensors
//! - window and presence binary sensors
//! - a select for the active weekly schedule
//!
//! A [`Coordinator`] polls the cloud for each config entry; entities read
//! its latest [`CoordinatorData`] snapshot.

pub mod binary_sensor;
pub mod climate;
pub mod config;
pub mod config_flow;
pub mod coordinator;
pub mod device;
pub mod entity;
pub mod entry;
pub mod models;
pub mod payload;
pub mod select;
pub mod sensor;
pub mod setup;

pub use config::{ConfigError, IntegrationConfig};
pub use config_flow::{ConfigFlow, FlowResult, UserInput};
pub use coordinator::{ConfigEntryNotReady, Coordinator, CoordinatorData, UpdateFailed};
pub use device::DeviceInfo;
pub use entity::{ClimateEntity, Entity, EntityError, EntityState, Platform, SelectEntity};
pub use entry::{ConfigEntry, EntryData, EntryOptions, EntryState};
pub use models::{HvacMode, Preset, RoomDevice, Schedule};
pub use setup::{EntryRuntime, IntuisConnect, SetupError};

/// Integration domain
pub const DOMAIN: &str = "intuis_connect";

pub const MANUFACTURER: &str = "Muller/Intuis";
pub const GATEWAY_NAME: &str = "Intuis Gateway";
pub const GATEWAY_MODEL: &str = "Gateway";
pub const ROOM_MODEL: &str = "Room";

/// Polling interval of a new entry, in seconds
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 90;

/// `gethomemeasure` scale of a new entry
pub const DEFAULT_MEASURE_SCALE: &str = "1day";
