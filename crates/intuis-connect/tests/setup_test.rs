//! Config flow and entry lifecycle against the fake Intuis cloud

use std::collections::BTreeMap;

use intuis_api::paths::*;
use intuis_api::testing::{FakeIntuis, FAKE_PASSWORD, FAKE_USERNAME};
use intuis_connect::{
    ConfigEntry, EntryData, EntryOptions, EntryState, FlowResult, IntuisConnect, Platform,
    SetupError, UserInput,
};
use tokio_test::assert_ok;

fn hass(fake: &FakeIntuis) -> IntuisConnect {
    IntuisConnect::new(fake.client_config())
}

fn entry(options: EntryOptions) -> ConfigEntry {
    ConfigEntry::new(
        format!("Intuis ({})", FAKE_USERNAME),
        FAKE_USERNAME,
        EntryData {
            username: FAKE_USERNAME.into(),
            password: FAKE_PASSWORD.into(),
        },
        options,
    )
}

// ============================================================================
// Config flow
// ============================================================================

#[tokio::test]
async fn test_flow_shows_empty_form() {
    let fake = FakeIntuis::start().await;
    let hass = hass(&fake);

    let result = hass.config_flow().step_user(None).await;
    assert_eq!(
        result,
        FlowResult::ShowForm {
            step_id: "user".into(),
            errors: BTreeMap::new(),
        }
    );
    assert!(fake.requests().is_empty());
}

#[tokio::test]
async fn test_flow_creates_entry() {
    let fake = FakeIntuis::start().await;
    let hass = hass(&fake);

    let input = UserInput::new(format!("  {}  ", FAKE_USERNAME.to_uppercase()), FAKE_PASSWORD);
    // The fake only accepts the exact username
    let result = hass.config_flow().step_user(Some(input)).await;
    assert!(matches!(result, FlowResult::ShowForm { .. }));

    let result = hass
        .config_flow()
        .step_user(Some(UserInput::new(format!(" {} ", FAKE_USERNAME), FAKE_PASSWORD)))
        .await;
    let FlowResult::CreateEntry {
        title,
        unique_id,
        data,
        options,
    } = result
    else {
        panic!("expected an entry, got {:?}", result);
    };
    assert_eq!(title, "Intuis (user@example.com)");
    assert_eq!(unique_id, "user@example.com");
    assert_eq!(data.username, FAKE_USERNAME);
    assert_eq!(data.password, FAKE_PASSWORD);
    assert_eq!(options.update_interval, 90);
    assert_eq!(options.measure_scale, "1day");
    assert_eq!(fake.requests_to(HOMESDATA_PATH).len(), 1);
}

#[tokio::test]
async fn test_flow_invalid_auth() {
    let fake = FakeIntuis::start().await;
    let hass = hass(&fake);

    let result = hass
        .config_flow()
        .step_user(Some(UserInput::new(FAKE_USERNAME, "wrong")))
        .await;

    let FlowResult::ShowForm { step_id, errors } = result else {
        panic!("expected the form again");
    };
    assert_eq!(step_id, "user");
    assert_eq!(errors["base"], "invalid_auth");
}

#[tokio::test]
async fn test_flow_cannot_connect() {
    let fake = FakeIntuis::start().await;
    fake.fail_token_requests(10);
    let hass = hass(&fake);

    let result = hass
        .config_flow()
        .step_user(Some(UserInput::new(FAKE_USERNAME, FAKE_PASSWORD)))
        .await;

    let FlowResult::ShowForm { errors, .. } = result else {
        panic!("expected the form again");
    };
    assert_eq!(errors["base"], "cannot_connect");
}

#[tokio::test]
async fn test_flow_aborts_when_already_configured() {
    let fake = FakeIntuis::start().await;
    let hass = hass(&fake);
    hass.add_entry(entry(EntryOptions::default())).unwrap();

    let result = hass
        .config_flow()
        .step_user(Some(UserInput::new("User@Example.com", FAKE_PASSWORD)))
        .await;

    assert_eq!(
        result,
        FlowResult::Abort {
            reason: "already_configured".into()
        }
    );
    assert!(fake.requests().is_empty());
}

// ============================================================================
// Entry lifecycle
// ============================================================================

#[tokio::test]
async fn test_flow_to_loaded_entry() {
    let fake = FakeIntuis::start().await;
    let hass = hass(&fake);

    let result = hass
        .config_flow()
        .step_user(Some(UserInput::new(FAKE_USERNAME, FAKE_PASSWORD)))
        .await;
    let entry_id = hass.create_entry(result).unwrap().unwrap();
    assert_eq!(hass.entry(&entry_id).unwrap().state, EntryState::NotLoaded);

    let runtime = assert_ok!(hass.setup_entry(&entry_id).await);

    assert_eq!(hass.entry(&entry_id).unwrap().state, EntryState::Loaded);
    assert!(runtime.coordinator.is_polling());
    assert_eq!(runtime.climates.len(), 2);
    assert_eq!(runtime.sensors.len(), 10);
    assert_eq!(runtime.binary_sensors.len(), 2);
    assert_eq!(runtime.selects.len(), 1);

    let entities = hass.entities(&entry_id);
    assert_eq!(entities.len(), 15);
    for platform in Platform::ALL {
        assert!(entities.iter().any(|e| e.platform() == platform));
    }
    assert!(runtime.states().iter().all(|s| s.available));
    assert!(runtime.find("intuis_home-1_schedule").is_some());

    hass.unload_entry(&entry_id).await.unwrap();
}

#[tokio::test]
async fn test_unload_stops_polling() {
    let fake = FakeIntuis::start().await;
    let hass = hass(&fake);
    let entry_id = hass.add_entry(entry(EntryOptions::default())).unwrap();
    let runtime = hass.setup_entry(&entry_id).await.unwrap();

    hass.unload_entry(&entry_id).await.unwrap();

    assert!(!runtime.coordinator.is_polling());
    assert!(hass.entities(&entry_id).is_empty());
    assert!(hass.runtime(&entry_id).is_none());
    assert_eq!(hass.entry(&entry_id).unwrap().state, EntryState::NotLoaded);

    // Loading again works
    hass.setup_entry(&entry_id).await.unwrap();
    hass.unload_entry(&entry_id).await.unwrap();
}

#[tokio::test]
async fn test_setup_retry_when_cloud_unavailable() {
    let fake = FakeIntuis::start().await;
    fake.fail_homestatus(true);
    let hass = hass(&fake);
    let entry_id = hass.add_entry(entry(EntryOptions::default())).unwrap();

    let err = hass.setup_entry(&entry_id).await.err().unwrap();
    assert!(matches!(err, SetupError::NotReady(_)));

    let entry = hass.entry(&entry_id).unwrap();
    assert_eq!(entry.state, EntryState::SetupRetry);
    assert!(entry.reason.unwrap().contains("Intuis API error"));
    assert!(hass.entities(&entry_id).is_empty());

    fake.fail_homestatus(false);
    hass.setup_entry(&entry_id).await.unwrap();
    assert_eq!(hass.entry(&entry_id).unwrap().state, EntryState::Loaded);
    hass.unload_entry(&entry_id).await.unwrap();
}

#[tokio::test]
async fn test_invalid_lifecycle_calls() {
    let fake = FakeIntuis::start().await;
    let hass = hass(&fake);
    let entry_id = hass.add_entry(entry(EntryOptions::default())).unwrap();

    // Not loaded yet
    let err = hass.unload_entry(&entry_id).await.unwrap_err();
    assert!(matches!(err, SetupError::InvalidTransition(_)));

    hass.setup_entry(&entry_id).await.unwrap();
    let err = hass.setup_entry(&entry_id).await.err().unwrap();
    assert!(matches!(err, SetupError::InvalidTransition(_)));

    assert!(matches!(
        hass.setup_entry("missing").await.err().unwrap(),
        SetupError::NotFound(_)
    ));
    assert!(matches!(
        hass.add_entry(entry(EntryOptions::default())).unwrap_err(),
        SetupError::AlreadyConfigured(_)
    ));

    let removed = hass.remove_entry(&entry_id).await.unwrap();
    assert_eq!(removed.state, EntryState::NotLoaded);
    assert!(hass.entry(&entry_id).is_none());
}

#[tokio::test]
async fn test_entry_options_drive_coordinator() {
    let fake = FakeIntuis::start().await;
    let hass = hass(&fake);
    let entry_id = hass
        .add_entry(entry(EntryOptions {
            update_interval: 3600,
            measure_scale: "1week".into(),
        }))
        .unwrap();

    hass.setup_entry(&entry_id).await.unwrap();

    let form = &fake.requests_to(GETHOMEMEASURE_PATH)[0].form;
    assert_eq!(form["scale"], "1week");
    hass.unload_entry(&entry_id).await.unwrap();
}
