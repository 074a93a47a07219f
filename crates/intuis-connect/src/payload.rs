//! Field lookups in raw vendor payloads
//!
//! `homestatus`, `getconfigs` and `gethomemeasure` are kept as raw JSON in
//! the coordinator snapshot; these helpers pull individual values out of
//! them, tolerating the shapes seen in the wild.

use serde_json::Value;

/// Room or home id rendered as a string (`id`, else `_id`)
pub fn record_id(record: &Value) -> Option<String> {
    ["id", "_id"]
        .iter()
        .filter_map(|key| record.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn find_in_rooms<'a>(rooms: Option<&'a Value>, room_id: &str) -> Option<&'a Value> {
    rooms?
        .as_array()?
        .iter()
        .find(|room| record_id(room).as_deref() == Some(room_id))
}

/// The room record in `body.home.rooms`, else in top-level `rooms`
pub fn find_room<'a>(payload: &'a Value, room_id: &str) -> Option<&'a Value> {
    find_in_rooms(payload.pointer("/body/home/rooms"), room_id)
        .or_else(|| find_in_rooms(payload.get("rooms"), room_id))
}

/// A scalar field of a room; objects and arrays are ignored
pub fn room_field<'a>(payload: &'a Value, room_id: &str, field: &str) -> Option<&'a Value> {
    find_room(payload, room_id)?
        .get(field)
        .filter(|v| matches!(v, Value::Number(_) | Value::String(_) | Value::Bool(_)))
}

/// A numeric field of a room
pub fn room_number(payload: &Value, room_id: &str, field: &str) -> Option<f64> {
    room_field(payload, room_id, field)?.as_f64()
}

/// The home thermostat mode from a status payload, when it is one of
/// `home`, `away`, `hg`
pub fn home_mode(status: &Value) -> Option<String> {
    let mode = status
        .pointer("/body/home/therm_mode")
        .or_else(|| status.pointer("/home/therm_mode"))?
        .as_str()?
        .to_lowercase();
    matches!(mode.as_str(), "home" | "away" | "hg").then_some(mode)
}

/// The weekly schedules listed on a home object
pub fn schedules(home: &Value) -> &[Value] {
    home.get("therm_schedules")
        .and_then(Value::as_array)
        .filter(|s| !s.is_empty())
        .or_else(|| home.get("schedules").and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// The schedule flagged `selected`, else the first one
pub fn selected_schedule(home: &Value) -> Option<&Value> {
    let schedules = schedules(home);
    schedules
        .iter()
        .find(|s| s.get("selected").and_then(Value::as_bool) == Some(true))
        .or_else(|| schedules.first())
}

/// The room setpoint of the active schedule in a `getconfigs` payload
///
/// Zone temperatures (`zones[].rooms_temp[]`) take precedence over the
/// schedule's own `rooms[]` list.
pub fn room_setpoint_from_configs(configs: &Value, room_id: &str) -> Option<f64> {
    let home = configs.pointer("/body/home")?;
    let selected = selected_schedule(home)?;

    let from_zones = selected
        .get("zones")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|zone| zone.get("rooms_temp").and_then(Value::as_array))
        .flatten()
        .find(|rt| id_matches(rt.get("room_id"), room_id))
        .and_then(|rt| rt.get("temp"))
        .and_then(Value::as_f64);
    if from_zones.is_some() {
        return from_zones;
    }

    selected
        .get("rooms")
        .and_then(Value::as_array)?
        .iter()
        .find(|room| id_matches(room.get("id"), room_id))
        .and_then(|room| room.get("therm_setpoint_temperature"))
        .and_then(Value::as_f64)
}

fn id_matches(value: Option<&Value>, room_id: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == room_id,
        Some(Value::Number(n)) => n.to_string() == room_id,
        _ => false,
    }
}

/// Today's energy from a `gethomemeasure` payload
///
/// Reads the first measure of `measures` (or `body.measures`) and returns the
/// first numeric among `value`, `energy`, `kwh`, `sum`, `data`, taking the
/// head of an array value.
pub fn energy_day_value(measures: &Value) -> Option<f64> {
    let series = measures
        .get("measures")
        .and_then(Value::as_array)
        .or_else(|| measures.pointer("/body/measures").and_then(Value::as_array))?;
    let first = series.first()?;

    for key in ["value", "energy", "kwh", "sum", "data"] {
        match first.get(key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::Array(items)) => {
                if let Some(v) = items.first().and_then(Value::as_f64) {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}
