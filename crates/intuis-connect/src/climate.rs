//! Climate platform: one thermostat per room

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use intuis_api::{RoomMode, RoomModeOptions};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::coordinator::{Coordinator, CoordinatorData};
use crate::device::DeviceInfo;
use crate::entity::{ClimateEntity, Entity, EntityError, Platform};
use crate::models::{HvacMode, Preset, RoomDevice};

pub const MIN_TEMP: f64 = 7.0;
pub const MAX_TEMP: f64 = 30.0;
pub const TEMPERATURE_UNIT: &str = "°C";

/// Thermostat of one room
pub struct RoomClimate {
    coordinator: Arc<Coordinator>,
    home_id: String,
    room_id: String,
    name: String,
    unique_id: String,
    device: DeviceInfo,
}

impl RoomClimate {
    pub fn new(coordinator: Arc<Coordinator>, home_id: &str, room: &RoomDevice) -> Self {
        Self {
            coordinator,
            home_id: home_id.to_string(),
            room_id: room.id.clone(),
            name: format!("{} Climate", room.name),
            unique_id: format!("intuis_{}_{}_climate", home_id, room.id),
            device: DeviceInfo::room(home_id, &room.id, &room.name),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The room as seen in the latest snapshot
    pub fn room(&self) -> Option<RoomDevice> {
        let data = self.coordinator.data()?;
        data.rooms().into_iter().find(|r| r.id == self.room_id)
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.room()?.current_temp
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.room()?.target_temp
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        self.room().map(|r| r.hvac_mode)
    }

    pub fn preset_mode(&self) -> Option<Preset> {
        self.room()?.preset_mode
    }

    /// `off`, else `heating` while the room asks for power, else `idle`
    pub fn hvac_action(&self) -> Option<&'static str> {
        let room = self.room()?;
        Some(match (room.hvac_mode, room.heating) {
            (HvacMode::Off, _) => "off",
            (_, true) => "heating",
            (_, false) => "idle",
        })
    }

    async fn send_room_mode(&self, mode: RoomMode) -> Result<(), EntityError> {
        self.coordinator
            .api()
            .set_room_mode(&self.home_id, &self.room_id, mode, RoomModeOptions::default())
            .await?;
        Ok(())
    }
}

impl Entity for RoomClimate {
    fn platform(&self) -> Platform {
        Platform::Climate
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    fn state(&self) -> Option<String> {
        self.hvac_mode().map(|m| m.to_string())
    }

    fn attributes(&self) -> Map<String, Value> {
        let room = self.room();
        let mut attrs = Map::new();
        attrs.insert(
            "hvac_modes".into(),
            json!(HvacMode::ALL.iter().map(HvacMode::as_str).collect::<Vec<_>>()),
        );
        attrs.insert(
            "preset_modes".into(),
            json!(Preset::ALL.iter().map(Preset::as_str).collect::<Vec<_>>()),
        );
        attrs.insert("min_temp".into(), json!(MIN_TEMP));
        attrs.insert("max_temp".into(), json!(MAX_TEMP));
        attrs.insert("temperature_unit".into(), json!(TEMPERATURE_UNIT));
        attrs.insert(
            "current_temperature".into(),
            json!(room.as_ref().and_then(|r| r.current_temp)),
        );
        attrs.insert(
            "temperature".into(),
            json!(room.as_ref().and_then(|r| r.target_temp)),
        );
        attrs.insert(
            "preset_mode".into(),
            json!(room.as_ref().and_then(|r| r.preset_mode).map(|p| p.as_str())),
        );
        attrs.insert("hvac_action".into(), json!(self.hvac_action()));
        attrs
    }

    fn as_climate(&self) -> Option<&dyn ClimateEntity> {
        Some(self)
    }
}

#[async_trait]
impl ClimateEntity for RoomClimate {
    async fn set_hvac_mode(&self, mode: HvacMode) -> Result<(), EntityError> {
        let room_mode = match mode {
            HvacMode::Off => RoomMode::Off,
            HvacMode::Heat => RoomMode::Manual,
            HvacMode::Auto => RoomMode::Home,
        };
        info!(room_id = %self.room_id, hvac_mode = %mode, "Setting hvac mode");
        self.send_room_mode(room_mode).await?;
        self.coordinator.request_refresh().await;
        Ok(())
    }

    async fn set_temperature(
        &self,
        temperature: f64,
        duration: Option<Duration>,
    ) -> Result<(), EntityError> {
        if !(MIN_TEMP..=MAX_TEMP).contains(&temperature) {
            return Err(EntityError::TemperatureOutOfRange {
                temp: temperature,
                min: MIN_TEMP,
                max: MAX_TEMP,
            });
        }

        info!(room_id = %self.room_id, temperature, "Setting target temperature");
        self.send_room_mode(RoomMode::Manual).await?;
        self.coordinator
            .api()
            .set_room_setpoint(&self.home_id, &self.room_id, temperature, duration)
            .await?;
        self.coordinator.request_refresh().await;
        Ok(())
    }

    async fn set_preset_mode(&self, preset: Preset) -> Result<(), EntityError> {
        let room_mode = match preset {
            Preset::Home => RoomMode::Home,
            Preset::Away => RoomMode::Away,
            Preset::Hg => RoomMode::Hg,
        };
        info!(room_id = %self.room_id, preset = %preset, "Setting preset");
        self.send_room_mode(room_mode).await?;
        self.coordinator.request_refresh().await;
        Ok(())
    }
}

/// One climate entity per room with an id
pub fn setup_entities(coordinator: &Arc<Coordinator>, data: &CoordinatorData) -> Vec<Arc<RoomClimate>> {
    let entities: Vec<_> = data
        .rooms()
        .iter()
        .map(|room| Arc::new(RoomClimate::new(coordinator.clone(), &data.home_id, room)))
        .collect();
    debug!(count = entities.len(), "Created climate entities");
    entities
}
