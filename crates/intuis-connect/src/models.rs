//! Typed views over the coordinator snapshot

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coordinator::CoordinatorData;
use crate::entity::EntityError;
use crate::payload;

/// Climate operating mode exposed to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    /// Following the schedule
    Auto,
    /// Manual setpoint (or frost protection)
    Heat,
    Off,
}

impl HvacMode {
    pub const ALL: [HvacMode; 3] = [HvacMode::Auto, HvacMode::Heat, HvacMode::Off];

    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Auto => "auto",
            HvacMode::Heat => "heat",
            HvacMode::Off => "off",
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HvacMode {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(HvacMode::Auto),
            "heat" => Ok(HvacMode::Heat),
            "off" => Ok(HvacMode::Off),
            other => Err(EntityError::UnsupportedHvacMode(other.to_string())),
        }
    }
}

/// Room preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Home,
    Away,
    /// Frost protection
    Hg,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Home, Preset::Away, Preset::Hg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Home => "home",
            Preset::Away => "away",
            Preset::Hg => "hg",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Preset::Home),
            "away" => Ok(Preset::Away),
            "hg" => Ok(Preset::Hg),
            other => Err(EntityError::UnsupportedPreset(other.to_string())),
        }
    }
}

/// Map the room setpoint mode (and home mode) to hvac mode and preset
///
/// A room in `home` mode follows the home: a home in frost protection or
/// away reports that preset instead of `home`.
pub fn room_mode_to_hvac_and_preset(
    room_mode: &str,
    home_mode: Option<&str>,
) -> (HvacMode, Option<Preset>) {
    let home_mode = home_mode.map(str::to_lowercase);
    match room_mode.to_lowercase().as_str() {
        "off" => (HvacMode::Off, None),
        "manual" => (HvacMode::Heat, None),
        "away" => (HvacMode::Auto, Some(Preset::Away)),
        "hg" => (HvacMode::Heat, Some(Preset::Hg)),
        "home" => match home_mode.as_deref() {
            Some("hg") => (HvacMode::Heat, Some(Preset::Hg)),
            Some("away") => (HvacMode::Auto, Some(Preset::Away)),
            _ => (HvacMode::Auto, Some(Preset::Home)),
        },
        _ => (HvacMode::Auto, None),
    }
}

/// One heating zone as seen by the integration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomDevice {
    pub id: String,
    pub name: String,
    pub current_temp: Option<f64>,
    pub target_temp: Option<f64>,
    pub hvac_mode: HvacMode,
    pub preset_mode: Option<Preset>,
    /// The room is currently asking for heat
    pub heating: bool,
    pub window_open: Option<bool>,
    pub presence: Option<bool>,
}

impl RoomDevice {
    /// Build the view of one home room record
    pub fn from_record(data: &CoordinatorData, record: &Value) -> Option<Self> {
        let id = payload::record_id(record)?;
        let name = record
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Room {}", id));

        let status = &data.status;
        let room_mode = payload::room_field(status, &id, "therm_setpoint_mode")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let home_mode = payload::home_mode(status);
        let (hvac_mode, preset_mode) =
            room_mode_to_hvac_and_preset(room_mode, home_mode.as_deref());

        Some(Self {
            current_temp: payload::room_number(status, &id, "therm_measured_temperature"),
            target_temp: data.room_setpoint(&id),
            hvac_mode,
            preset_mode,
            heating: payload::room_number(status, &id, "heating_power_request")
                .map(|p| p > 0.0)
                .unwrap_or(false),
            window_open: window_open(status, &id),
            presence: payload::room_field(status, &id, "presence").and_then(Value::as_bool),
            id,
            name,
        })
    }
}

/// `open_window`, else the older `window_open` field of a status room
pub fn window_open(status: &Value, room_id: &str) -> Option<bool> {
    payload::room_field(status, room_id, "open_window")
        .or_else(|| payload::room_field(status, room_id, "window_open"))
        .and_then(Value::as_bool)
}

/// A weekly heating schedule of the home
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub selected: bool,
}

impl Schedule {
    /// Schedules with both an id and a name
    pub fn list(home: &Value) -> Vec<Schedule> {
        payload::schedules(home)
            .iter()
            .filter_map(|s| {
                Some(Schedule {
                    id: payload::record_id(s)?,
                    name: s.get("name")?.as_str()?.to_string(),
                    selected: s.get("selected").and_then(Value::as_bool).unwrap_or(false),
                })
            })
            .collect()
    }
}
