//! Binary sensor platform: open window and presence per room

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::coordinator::{Coordinator, CoordinatorData};
use crate::device::DeviceInfo;
use crate::entity::{Entity, Platform};
use crate::models;
use crate::payload;
use crate::DOMAIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySensorKind {
    WindowOpen,
    Presence,
}

impl BinarySensorKind {
    pub fn device_class(&self) -> &'static str {
        match self {
            BinarySensorKind::WindowOpen => "window",
            BinarySensorKind::Presence => "occupancy",
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            BinarySensorKind::WindowOpen => "window",
            BinarySensorKind::Presence => "presence",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BinarySensorKind::WindowOpen => "Window Open",
            BinarySensorKind::Presence => "Presence",
        }
    }

    fn read(&self, status: &Value, room_id: &str) -> Option<bool> {
        match self {
            BinarySensorKind::WindowOpen => models::window_open(status, room_id),
            BinarySensorKind::Presence => {
                payload::room_field(status, room_id, "presence").and_then(Value::as_bool)
            }
        }
    }
}

pub struct RoomBinarySensor {
    coordinator: Arc<Coordinator>,
    kind: BinarySensorKind,
    room_id: String,
    name: String,
    unique_id: String,
    device: DeviceInfo,
}

impl RoomBinarySensor {
    pub fn new(
        coordinator: Arc<Coordinator>,
        kind: BinarySensorKind,
        home_id: &str,
        room_id: &str,
        room_name: &str,
    ) -> Self {
        Self {
            coordinator,
            kind,
            room_id: room_id.to_string(),
            name: format!("{} {}", room_name, kind.label()),
            unique_id: format!("{}_room_{}_{}", DOMAIN, room_id, kind.suffix()),
            device: DeviceInfo::room(home_id, room_id, room_name),
        }
    }

    pub fn kind(&self) -> BinarySensorKind {
        self.kind
    }

    pub fn is_on(&self) -> Option<bool> {
        let data = self.coordinator.data()?;
        self.kind.read(&data.status, &self.room_id)
    }
}

impl Entity for RoomBinarySensor {
    fn platform(&self) -> Platform {
        Platform::BinarySensor
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
        self.is_on()
            .map(|on| if on { "on" } else { "off" }.to_string())
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("device_class".into(), json!(self.kind.device_class()));
        attrs
    }
}

/// Binary sensors for the status fields present in `data`
pub fn setup_entities(
    coordinator: &Arc<Coordinator>,
    data: &CoordinatorData,
) -> Vec<Arc<RoomBinarySensor>> {
    let mut entities = Vec::new();
    for room in data.rooms() {
        for kind in [BinarySensorKind::WindowOpen, BinarySensorKind::Presence] {
            if kind.read(&data.status, &room.id).is_some() {
                entities.push(Arc::new(RoomBinarySensor::new(
                    coordinator.clone(),
                    kind,
                    &data.home_id,
                    &room.id,
                    &room.name,
                )));
            }
        }
    }
    debug!(count = entities.len(), "Created binary sensor entities");
    entities
}
