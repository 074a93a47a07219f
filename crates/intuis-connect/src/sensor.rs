//! Sensor platform
//!
//! Gateway sensors describe the whole home (energy, counts, thermostat
//! mode); room sensors expose measured and target temperatures and the room
//! mode. A sensor is only created when its value exists in the snapshot used
//! at setup, but its value is always read from the latest snapshot.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::coordinator::{Coordinator, CoordinatorData};
use crate::device::DeviceInfo;
use crate::entity::{Entity, Platform};
use crate::payload;

/// What a sensor measures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorKind {
    EnergyToday,
    RoomsCount,
    ModulesCount,
    ThermMode,
    RoomMeasured { room_id: String },
    RoomSetpoint { room_id: String },
    RoomMode { room_id: String },
}

impl SensorKind {
    /// Read the value out of a snapshot
    pub fn value(&self, data: &CoordinatorData) -> Option<SensorValue> {
        match self {
            SensorKind::EnergyToday => {
                payload::energy_day_value(&data.measures).map(SensorValue::Float)
            }
            SensorKind::RoomsCount => Some(SensorValue::Count(data.room_records().len())),
            SensorKind::ModulesCount => Some(SensorValue::Count(data.module_count())),
            SensorKind::ThermMode => data
                .home
                .get("therm_mode")
                .and_then(Value::as_str)
                .map(|m| SensorValue::Text(m.to_string())),
            SensorKind::RoomMeasured { room_id } => {
                data.room_measured(room_id).map(SensorValue::Float)
            }
            SensorKind::RoomSetpoint { room_id } => {
                data.room_setpoint(room_id).map(SensorValue::Float)
            }
            SensorKind::RoomMode { room_id } => {
                payload::room_field(&data.status, room_id, "therm_setpoint_mode")
                    .and_then(Value::as_str)
                    .map(|m| SensorValue::Text(m.to_string()))
            }
        }
    }

    fn unit(&self) -> Option<&'static str> {
        match self {
            SensorKind::EnergyToday => Some("kWh"),
            SensorKind::RoomMeasured { .. } | SensorKind::RoomSetpoint { .. } => Some("°C"),
            _ => None,
        }
    }

    fn device_class(&self) -> Option<&'static str> {
        match self {
            SensorKind::EnergyToday => Some("energy"),
            SensorKind::RoomMeasured { .. } | SensorKind::RoomSetpoint { .. } => {
                Some("temperature")
            }
            _ => None,
        }
    }

    fn state_class(&self) -> Option<&'static str> {
        match self {
            SensorKind::EnergyToday => Some("total_increasing"),
            SensorKind::RoomsCount
            | SensorKind::ModulesCount
            | SensorKind::RoomMeasured { .. }
            | SensorKind::RoomSetpoint { .. } => Some("measurement"),
            _ => None,
        }
    }

    fn entity_category(&self) -> Option<&'static str> {
        match self {
            SensorKind::RoomsCount | SensorKind::ModulesCount | SensorKind::ThermMode => {
                Some("diagnostic")
            }
            _ => None,
        }
    }
}

/// A sensor reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Float(f64),
    Count(usize),
    Text(String),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Float(v) => write!(f, "{}", v),
            SensorValue::Count(n) => write!(f, "{}", n),
            SensorValue::Text(s) => f.write_str(s),
        }
    }
}

pub struct IntuisSensor {
    coordinator: Arc<Coordinator>,
    kind: SensorKind,
    name: String,
    unique_id: String,
    device: DeviceInfo,
}

impl IntuisSensor {
    pub fn new(
        coordinator: Arc<Coordinator>,
        kind: SensorKind,
        name: impl Into<String>,
        unique_id: impl Into<String>,
        device: DeviceInfo,
    ) -> Self {
        Self {
            coordinator,
            kind,
            name: name.into(),
            unique_id: unique_id.into(),
            device,
        }
    }

    pub fn kind(&self) -> &SensorKind {
        &self.kind
    }

    pub fn native_value(&self) -> Option<SensorValue> {
        let data = self.coordinator.data()?;
        self.kind.value(&data)
    }
}

impl Entity for IntuisSensor {
    fn platform(&self) -> Platform {
        Platform::Sensor
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
        self.native_value().map(|v| v.to_string())
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        let described = [
            ("unit_of_measurement", self.kind.unit()),
            ("device_class", self.kind.device_class()),
            ("state_class", self.kind.state_class()),
            ("entity_category", self.kind.entity_category()),
        ];
        for (key, value) in described {
            if let Some(value) = value {
                attrs.insert(key.into(), json!(value));
            }
        }
        attrs
    }
}

/// Gateway and room sensors for the values present in `data`
pub fn setup_entities(coordinator: &Arc<Coordinator>, data: &CoordinatorData) -> Vec<Arc<IntuisSensor>> {
    let home_id = data.home_id.as_str();
    let gateway = DeviceInfo::gateway(home_id);
    let mut entities = Vec::new();

    let mut add = |kind: SensorKind, name: String, unique_id: String, device: &DeviceInfo| {
        if kind.value(data).is_some() {
            entities.push(Arc::new(IntuisSensor::new(
                coordinator.clone(),
                kind,
                name,
                unique_id,
                device.clone(),
            )));
        }
    };

    add(
        SensorKind::EnergyToday,
        "Energy Today".into(),
        format!("intuis_{}_energy_today", home_id),
        &gateway,
    );
    add(
        SensorKind::RoomsCount,
        "Rooms Count".into(),
        format!("intuis_{}_rooms_count", home_id),
        &gateway,
    );
    add(
        SensorKind::ModulesCount,
        "Modules Count".into(),
        format!("intuis_{}_modules_count", home_id),
        &gateway,
    );
    add(
        SensorKind::ThermMode,
        "Therm Mode".into(),
        format!("intuis_{}_therm_mode", home_id),
        &gateway,
    );

    for room in data.rooms() {
        let device = DeviceInfo::room(home_id, &room.id, &room.name);
        let prefix = format!("intuis_{}_{}", home_id, room.id);
        add(
            SensorKind::RoomMeasured { room_id: room.id.clone() },
            format!("{} Measured", room.name),
            format!("{}_measured", prefix),
            &device,
        );
        add(
            SensorKind::RoomSetpoint { room_id: room.id.clone() },
            format!("{} Setpoint", room.name),
            format!("{}_setpoint", prefix),
            &device,
        );
        add(
            SensorKind::RoomMode { room_id: room.id.clone() },
            format!("{} Mode", room.name),
            format!("{}_mode", prefix),
            &device,
        );
    }

    debug!(count = entities.len(), "Created sensor entities");
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> CoordinatorData {
        CoordinatorData {
            home_id: "h".into(),
            home: json!({
                "id": "h",
                "therm_mode": "schedule",
                "rooms": [{"id": "r1", "name": "Salon", "therm_measured_temperature": 18.5}],
                "modules": [{"id": "m1"}, {"id": "m2"}]
            }),
            status: json!({"body": {"home": {"rooms": [
                {"id": "r1", "therm_setpoint_mode": "manual", "therm_setpoint_temperature": 21}
            ]}}}),
            measures: json!({"body": {"measures": [{"value": [4.25]}]}}),
            configs: None,
        }
    }

    #[test]
    fn test_values_from_snapshot() {
        let data = data();
        let room = || "r1".to_string();
        assert_eq!(SensorKind::EnergyToday.value(&data), Some(SensorValue::Float(4.25)));
        assert_eq!(SensorKind::RoomsCount.value(&data), Some(SensorValue::Count(1)));
        assert_eq!(SensorKind::ModulesCount.value(&data), Some(SensorValue::Count(2)));
        assert_eq!(
            SensorKind::ThermMode.value(&data),
            Some(SensorValue::Text("schedule".into()))
        );
        // Measured falls back to the home room record
        assert_eq!(
            SensorKind::RoomMeasured { room_id: room() }.value(&data),
            Some(SensorValue::Float(18.5))
        );
        assert_eq!(
            SensorKind::RoomSetpoint { room_id: room() }.value(&data),
            Some(SensorValue::Float(21.0))
        );
        assert_eq!(
            SensorKind::RoomMode { room_id: room() }.value(&data),
            Some(SensorValue::Text("manual".into()))
        );
    }

    #[test]
    fn test_missing_values() {
        let mut data = data();
        data.home = json!({"id": "h", "therm_mode": 3});
        data.measures = json!({});
        assert_eq!(SensorKind::EnergyToday.value(&data), None);
        assert_eq!(SensorKind::ThermMode.value(&data), None);
        assert_eq!(SensorKind::RoomsCount.value(&data), Some(SensorValue::Count(0)));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(SensorValue::Float(19.5).to_string(), "19.5");
        assert_eq!(SensorValue::Float(20.0).to_string(), "20");
        assert_eq!(SensorValue::Count(3).to_string(), "3");
    }
}
