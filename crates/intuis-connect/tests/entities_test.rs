//! Platform entities built from a live snapshot of the fake Intuis cloud

use std::sync::Arc;
use std::time::Duration;

use intuis_api::paths::*;
use intuis_api::testing::FakeIntuis;
use intuis_api::IntuisApi;
use intuis_connect::binary_sensor::{self, BinarySensorKind};
use intuis_connect::climate::{self, RoomClimate};
use intuis_connect::select;
use intuis_connect::sensor::{self, SensorValue};
use intuis_connect::{
    ClimateEntity, Coordinator, Entity, EntityError, HvacMode, Preset, SelectEntity,
};
use serde_json::json;
use tokio_test::assert_err;

async fn loaded(fake: &FakeIntuis) -> Arc<Coordinator> {
    let api = Arc::new(IntuisApi::new(fake.client_config(), fake.credentials()).unwrap());
    let coordinator = Arc::new(Coordinator::new("Intuis (test)", api, "1day"));
    coordinator.refresh().await.unwrap();
    coordinator
}

fn climates(coordinator: &Arc<Coordinator>) -> Vec<Arc<RoomClimate>> {
    climate::setup_entities(coordinator, &coordinator.data().unwrap())
}

// ============================================================================
// Climate
// ============================================================================

#[tokio::test]
async fn test_one_climate_per_room() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let climates = climates(&coordinator);

    assert_eq!(climates.len(), 2);
    let salon = &climates[0];
    assert_eq!(salon.name(), "Salon Climate");
    assert_eq!(salon.unique_id(), "intuis_home-1_r1_climate");
    assert_eq!(salon.device_info().identifiers.1, "room_home-1_r1");
    assert_eq!(salon.current_temperature(), Some(19.5));
    assert_eq!(salon.target_temperature(), Some(20.0));
    assert_eq!(salon.hvac_mode(), Some(HvacMode::Auto));
    assert_eq!(salon.preset_mode(), Some(Preset::Home));
    assert_eq!(salon.hvac_action(), Some("heating"));

    let chambre = &climates[1];
    assert_eq!(chambre.target_temperature(), Some(16.5));
    assert_eq!(chambre.preset_mode(), Some(Preset::Away));
    assert_eq!(chambre.hvac_action(), Some("idle"));
}

#[tokio::test]
async fn test_climate_snapshot() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let state = climates(&coordinator)[0].snapshot();

    assert_eq!(state.state, "auto");
    assert!(state.available);
    assert_eq!(state.attributes["hvac_modes"], json!(["auto", "heat", "off"]));
    assert_eq!(state.attributes["preset_modes"], json!(["home", "away", "hg"]));
    assert_eq!(state.attributes["min_temp"], 7.0);
    assert_eq!(state.attributes["max_temp"], 30.0);
    assert_eq!(state.attributes["temperature"], 20.0);
    assert_eq!(state.attributes["preset_mode"], "home");
}

#[tokio::test]
async fn test_set_hvac_mode_sends_room_mode() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let salon = climates(&coordinator).remove(0);

    salon.set_hvac_mode(HvacMode::Off).await.unwrap();
    assert_eq!(salon.hvac_mode(), Some(HvacMode::Off));
    assert_eq!(salon.hvac_action(), Some("off"));

    salon.set_hvac_mode(HvacMode::Heat).await.unwrap();
    assert_eq!(salon.hvac_mode(), Some(HvacMode::Heat));

    salon.set_hvac_mode(HvacMode::Auto).await.unwrap();
    let modes: Vec<_> = fake
        .requests_to(SETSTATE_PATH)
        .iter()
        .map(|r| r.json.as_ref().unwrap()["home"]["rooms"][0]["therm_setpoint_mode"].clone())
        .collect();
    assert_eq!(modes, vec![json!("off"), json!("manual"), json!("home")]);
}

#[tokio::test]
async fn test_set_temperature_goes_manual_then_setpoint() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let chambre = climates(&coordinator).remove(1);

    chambre
        .set_temperature(21.5, Some(Duration::from_secs(3600)))
        .await
        .unwrap();

    assert_eq!(fake.requests_to(SETSTATE_PATH).len(), 1);
    let form = &fake.requests_to(SETROOMTHERMPOINT_PATH)[0].form;
    assert_eq!(form["room_id"], "r2");
    assert_eq!(form["temp"], "21.5");
    assert!(form.contains_key("endtime"));

    assert_eq!(chambre.target_temperature(), Some(21.5));
    assert_eq!(chambre.hvac_mode(), Some(HvacMode::Heat));
}

#[tokio::test]
async fn test_set_temperature_out_of_range() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let salon = climates(&coordinator).remove(0);

    let err = assert_err!(salon.set_temperature(35.0, None).await);
    assert!(matches!(err, EntityError::TemperatureOutOfRange { .. }));
    assert!(salon.set_temperature(6.5, None).await.is_err());
    assert!(fake.requests_to(SETROOMTHERMPOINT_PATH).is_empty());

    // Bounds are inclusive
    salon.set_temperature(7.0, None).await.unwrap();
    salon.set_temperature(30.0, None).await.unwrap();
}

#[tokio::test]
async fn test_set_preset_mode() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let salon = climates(&coordinator).remove(0);

    salon.set_preset_mode(Preset::Hg).await.unwrap();
    assert_eq!(salon.preset_mode(), Some(Preset::Hg));
    assert_eq!(salon.hvac_mode(), Some(HvacMode::Heat));

    salon.set_preset_mode("away".parse().unwrap()).await.unwrap();
    assert_eq!(salon.preset_mode(), Some(Preset::Away));

    assert!(matches!(
        "boost".parse::<Preset>(),
        Err(EntityError::UnsupportedPreset(_))
    ));
}

#[tokio::test]
async fn test_climate_reachable_through_entity() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let entity: Arc<dyn Entity> = climates(&coordinator).remove(0);

    assert!(entity.as_select().is_none());
    entity
        .as_climate()
        .unwrap()
        .set_hvac_mode(HvacMode::Heat)
        .await
        .unwrap();
    assert_eq!(entity.state().as_deref(), Some("heat"));
}

// ============================================================================
// Sensors
// ============================================================================

#[tokio::test]
async fn test_sensors_created_for_present_values() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let sensors = sensor::setup_entities(&coordinator, &coordinator.data().unwrap());

    let ids: Vec<_> = sensors.iter().map(|s| s.unique_id().to_string()).collect();
    assert_eq!(
        ids,
        vec![
            "intuis_home-1_energy_today",
            "intuis_home-1_rooms_count",
            "intuis_home-1_modules_count",
            "intuis_home-1_therm_mode",
            "intuis_home-1_r1_measured",
            "intuis_home-1_r1_setpoint",
            "intuis_home-1_r1_mode",
            "intuis_home-1_r2_measured",
            "intuis_home-1_r2_setpoint",
            "intuis_home-1_r2_mode",
        ]
    );

    let energy = &sensors[0];
    assert_eq!(energy.name(), "Energy Today");
    assert_eq!(energy.native_value(), Some(SensorValue::Float(12.5)));
    let attrs = energy.attributes();
    assert_eq!(attrs["unit_of_measurement"], "kWh");
    assert_eq!(attrs["state_class"], "total_increasing");
    assert_eq!(energy.device_info().identifiers.1, "gateway_home-1");

    assert_eq!(sensors[2].native_value(), Some(SensorValue::Count(3)));
    assert_eq!(sensors[2].attributes()["entity_category"], "diagnostic");
    assert_eq!(sensors[7].name(), "Chambre Measured");
    assert_eq!(sensors[9].snapshot().state, "away");
}

#[tokio::test]
async fn test_sensors_skip_missing_values() {
    let fake = FakeIntuis::start().await;
    fake.set_measures(json!({"body": {"measures": []}}));
    fake.set_homestatus(json!({"body": {"home": {"rooms": [{"id": "r1"}]}}}));
    fake.fail_getconfigs(true);
    let coordinator = loaded(&fake).await;

    let sensors = sensor::setup_entities(&coordinator, &coordinator.data().unwrap());
    let ids: Vec<_> = sensors.iter().map(|s| s.unique_id()).collect();
    assert_eq!(
        ids,
        vec![
            "intuis_home-1_rooms_count",
            "intuis_home-1_modules_count",
            "intuis_home-1_therm_mode",
        ]
    );
}

#[tokio::test]
async fn test_sensor_values_follow_latest_snapshot() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let sensors = sensor::setup_entities(&coordinator, &coordinator.data().unwrap());
    let setpoint = sensors
        .iter()
        .find(|s| s.unique_id() == "intuis_home-1_r1_setpoint")
        .unwrap();
    assert_eq!(setpoint.state().as_deref(), Some("20"));

    let mut status = fake.homestatus();
    status["body"]["home"]["rooms"][0]["therm_setpoint_temperature"] = json!(22.5);
    fake.set_homestatus(status);
    coordinator.refresh().await.unwrap();

    assert_eq!(setpoint.state().as_deref(), Some("22.5"));
}

#[tokio::test]
async fn test_entities_unavailable_after_failed_refresh() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let sensors = sensor::setup_entities(&coordinator, &coordinator.data().unwrap());

    fake.fail_homestatus(true);
    assert!(coordinator.refresh().await.is_err());

    let state = sensors[0].snapshot();
    assert!(!state.available);
    assert_eq!(state.state, "unavailable");
}

// ============================================================================
// Binary sensors
// ============================================================================

#[tokio::test]
async fn test_binary_sensors_for_present_fields() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let sensors = binary_sensor::setup_entities(&coordinator, &coordinator.data().unwrap());

    // Only r1 reports window and presence
    assert_eq!(sensors.len(), 2);
    let window = &sensors[0];
    assert_eq!(window.kind(), BinarySensorKind::WindowOpen);
    assert_eq!(window.name(), "Salon Window Open");
    assert_eq!(window.unique_id(), "intuis_connect_room_r1_window");
    assert_eq!(window.attributes()["device_class"], "window");
    assert_eq!(window.snapshot().state, "off");

    let presence = &sensors[1];
    assert_eq!(presence.unique_id(), "intuis_connect_room_r1_presence");
    assert_eq!(presence.attributes()["device_class"], "occupancy");
    assert_eq!(presence.is_on(), Some(true));
}

#[tokio::test]
async fn test_legacy_window_field() {
    let fake = FakeIntuis::start().await;
    fake.set_homestatus(json!({"body": {"home": {"rooms": [
        {"id": "r2", "window_open": true}
    ]}}}));
    let coordinator = loaded(&fake).await;
    let sensors = binary_sensor::setup_entities(&coordinator, &coordinator.data().unwrap());

    assert_eq!(sensors.len(), 1);
    assert_eq!(sensors[0].name(), "Chambre Window Open");
    assert_eq!(sensors[0].state().as_deref(), Some("on"));
}

// ============================================================================
// Select
// ============================================================================

#[tokio::test]
async fn test_schedule_select() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let selects = select::setup_entities(&coordinator, &coordinator.data().unwrap());
    let schedule = &selects[0];

    assert_eq!(schedule.name(), "Intuis Active Schedule");
    assert_eq!(schedule.unique_id(), "intuis_home-1_schedule");
    assert_eq!(schedule.options(), vec!["Semaine", "Vacances"]);
    assert_eq!(schedule.current_option().as_deref(), Some("Semaine"));

    schedule.select_option("Vacances").await.unwrap();

    let form = &fake.requests_to(SWITCHHOMESCHEDULE_PATH)[0].form;
    assert_eq!(form["schedule_id"], "s2");
    assert_eq!(schedule.current_option().as_deref(), Some("Vacances"));
    assert_eq!(schedule.snapshot().state, "Vacances");
}

#[tokio::test]
async fn test_unknown_schedule_is_rejected() {
    let fake = FakeIntuis::start().await;
    let coordinator = loaded(&fake).await;
    let selects = select::setup_entities(&coordinator, &coordinator.data().unwrap());

    let err = selects[0].select_option("Weekend").await.unwrap_err();
    assert!(matches!(err, EntityError::UnknownOption(name) if name == "Weekend"));
    assert!(fake.requests_to(SWITCHHOMESCHEDULE_PATH).is_empty());
}
