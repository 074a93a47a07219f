//! In-process fake of the Intuis cloud
//!
//! An axum server on `127.0.0.1:0` implementing the endpoints the client
//! talks to, with knobs for failure injection and a log of every request.
//! Room and schedule commands are applied to the stored payloads so a
//! follow-up poll observes them.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::client::{
    GETCONFIGS_PATH, GETHOMEMEASURE_PATH, HOMESDATA_PATH, HOMESTATUS_PATH,
    SETROOMTHERMPOINT_PATH, SETSTATE_PATH, SWITCHHOMESCHEDULE_PATH, TOKEN_PATH,
};
use crate::config::{ClientConfig, Credentials};

pub const FAKE_USERNAME: &str = "user@example.com";
pub const FAKE_PASSWORD: &str = "secret";
pub const FAKE_CLIENT_ID: &str = "fake-client";
pub const FAKE_CLIENT_SECRET: &str = "fake-secret";

/// One request received by the fake
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub form: HashMap<String, String>,
    pub json: Option<Value>,
}

struct Inner {
    homesdata: Value,
    homestatus: Value,
    measures: Value,
    configs: Value,
    expires_in: Option<i64>,
    token_failures: u32,
    reject_refresh: bool,
    fail_energy: bool,
    fail_getconfigs: bool,
    fail_homestatus: bool,
    issued: u32,
    access_tokens: HashSet<String>,
    refresh_tokens: HashSet<String>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<Inner>>;

/// Running fake server; stopped on drop
pub struct FakeIntuis {
    addr: SocketAddr,
    inner: Shared,
    server: JoinHandle<()>,
}

impl FakeIntuis {
    /// Start a fake serving the sample home
    pub async fn start() -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            homesdata: sample_homesdata(),
            homestatus: sample_homestatus(),
            measures: sample_measures(),
            configs: sample_configs(),
            expires_in: Some(10800),
            token_failures: 0,
            reject_refresh: false,
            fail_energy: false,
            fail_getconfigs: false,
            fail_homestatus: false,
            issued: 0,
            access_tokens: HashSet::new(),
            refresh_tokens: HashSet::new(),
            requests: Vec::new(),
        }));

        let app = Router::new().fallback(handle).with_state(inner.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake Intuis server");
        let addr = listener.local_addr().expect("fake server address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            inner,
            server,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this fake, with millisecond backoff
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(FAKE_CLIENT_ID, FAKE_CLIENT_SECRET)
            .with_base_url(self.base_url())
            .with_retry_backoff(Duration::from_millis(5))
    }

    /// Credentials the fake accepts
    pub fn credentials(&self) -> Credentials {
        Credentials::new(FAKE_USERNAME, FAKE_PASSWORD)
    }

    pub fn set_homesdata(&self, value: Value) {
        self.lock().homesdata = value;
    }

    pub fn set_homestatus(&self, value: Value) {
        self.lock().homestatus = value;
    }

    pub fn set_measures(&self, value: Value) {
        self.lock().measures = value;
    }

    pub fn set_configs(&self, value: Value) {
        self.lock().configs = value;
    }

    /// `expires_in` of issued tokens; `None` omits the field
    pub fn set_expires_in(&self, expires_in: Option<i64>) {
        self.lock().expires_in = expires_in;
    }

    /// Answer the next `count` token requests with 503
    pub fn fail_token_requests(&self, count: u32) {
        self.lock().token_failures = count;
    }

    pub fn reject_refresh(&self, reject: bool) {
        self.lock().reject_refresh = reject;
    }

    /// Reject `gethomemeasure` calls asking for `type=energy`
    pub fn fail_energy_measure(&self, fail: bool) {
        self.lock().fail_energy = fail;
    }

    pub fn fail_getconfigs(&self, fail: bool) {
        self.lock().fail_getconfigs = fail;
    }

    pub fn fail_homestatus(&self, fail: bool) {
        self.lock().fail_homestatus = fail;
    }

    /// Invalidate every issued access token
    pub fn revoke_access_tokens(&self) {
        self.lock().access_tokens.clear();
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// `grant_type` of every token request, in order
    pub fn token_grants(&self) -> Vec<String> {
        self.requests_to(TOKEN_PATH)
            .into_iter()
            .filter_map(|r| r.form.get("grant_type").cloned())
            .collect()
    }

    pub fn homestatus(&self) -> Value {
        self.lock().homestatus.clone()
    }

    pub fn homesdata(&self) -> Value {
        self.lock().homesdata.clone()
    }
}

impl Drop for FakeIntuis {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn json_response(status: StatusCode, body: Value) -> Response {
    (
        status,
        [("content-type", "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn ok(body: Value) -> Response {
    json_response(StatusCode::OK, body)
}

fn invalid_grant() -> Response {
    json_response(StatusCode::BAD_REQUEST, json!({"error": "invalid_grant"}))
}

async fn handle(
    State(inner): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let is_json = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);

    let form: HashMap<String, String> = if is_json {
        HashMap::new()
    } else {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(&body)
            .unwrap_or_default()
            .into_iter()
            .collect()
    };
    let json_body = if is_json {
        serde_json::from_slice(&body).ok()
    } else {
        None
    };

    let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.requests.push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        authorization: authorization.clone(),
        form: form.clone(),
        json: json_body.clone(),
    });

    if path == TOKEN_PATH {
        return token(&mut inner, &form);
    }

    let authorized = authorization
        .as_deref()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| inner.access_tokens.contains(t))
        .unwrap_or(false);
    if !authorized {
        return json_response(
            StatusCode::UNAUTHORIZED,
            json!({"error": {"code": 2, "message": "Invalid access token"}}),
        );
    }

    match path.as_str() {
        HOMESDATA_PATH => ok(inner.homesdata.clone()),
        HOMESTATUS_PATH => {
            if inner.fail_homestatus {
                return json_response(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"}));
            }
            ok(inner.homestatus.clone())
        }
        GETCONFIGS_PATH => {
            if inner.fail_getconfigs {
                return json_response(StatusCode::NOT_FOUND, json!({"error": "unknown"}));
            }
            ok(inner.configs.clone())
        }
        GETHOMEMEASURE_PATH => {
            if inner.fail_energy && form.get("type").map(String::as_str) == Some("energy") {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    json!({"error": {"code": 21, "message": "Invalid type"}}),
                );
            }
            ok(inner.measures.clone())
        }
        SETROOMTHERMPOINT_PATH => {
            let temp = form.get("temp").and_then(|t| t.parse::<f64>().ok());
            apply_room_command(
                &mut inner.homestatus,
                form.get("room_id").map(String::as_str).unwrap_or_default(),
                form.get("mode").map(String::as_str).unwrap_or_default(),
                temp,
            );
            ok(json!({"status": "ok"}))
        }
        SETSTATE_PATH => {
            let rooms = json_body
                .as_ref()
                .and_then(|b| b.pointer("/home/rooms"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for room in rooms {
                apply_room_command(
                    &mut inner.homestatus,
                    room.get("id").and_then(Value::as_str).unwrap_or_default(),
                    room.get("therm_setpoint_mode")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                    room.get("therm_setpoint_temperature").and_then(Value::as_f64),
                );
            }
            ok(json!({"status": "ok"}))
        }
        SWITCHHOMESCHEDULE_PATH => {
            let schedule_id = form.get("schedule_id").cloned().unwrap_or_default();
            select_schedule(&mut inner.homesdata, &schedule_id);
            ok(json!({"status": "ok"}))
        }
        _ => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
    }
}

fn token(inner: &mut Inner, form: &HashMap<String, String>) -> Response {
    if inner.token_failures > 0 {
        inner.token_failures -= 1;
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": "temporarily_unavailable"}),
        );
    }
    if form.get("client_id").map(String::as_str) != Some(FAKE_CLIENT_ID)
        || form.get("client_secret").map(String::as_str) != Some(FAKE_CLIENT_SECRET)
    {
        return json_response(StatusCode::BAD_REQUEST, json!({"error": "invalid_client"}));
    }

    match form.get("grant_type").map(String::as_str) {
        Some("password") => {
            if form.get("username").map(String::as_str) != Some(FAKE_USERNAME)
                || form.get("password").map(String::as_str) != Some(FAKE_PASSWORD)
            {
                return invalid_grant();
            }
        }
        Some("refresh_token") => {
            let known = form
                .get("refresh_token")
                .map(|t| inner.refresh_tokens.contains(t))
                .unwrap_or(false);
            if inner.reject_refresh || !known {
                return invalid_grant();
            }
        }
        _ => return json_response(StatusCode::BAD_REQUEST, json!({"error": "unsupported_grant_type"})),
    }

    inner.issued += 1;
    let access = format!("access-{}", inner.issued);
    let refresh = format!("refresh-{}", inner.issued);
    inner.access_tokens.insert(access.clone());
    inner.refresh_tokens.insert(refresh.clone());

    let mut body = json!({
        "access_token": access,
        "refresh_token": refresh,
        "scope": ["read_muller", "write_muller"],
    });
    if let Some(expires_in) = inner.expires_in {
        body["expires_in"] = json!(expires_in);
        body["expire_in"] = json!(expires_in);
    }
    ok(body)
}

fn apply_room_command(status: &mut Value, room_id: &str, mode: &str, temp: Option<f64>) {
    let Some(rooms) = status
        .pointer_mut("/body/home/rooms")
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    for room in rooms.iter_mut() {
        if room.get("id").and_then(Value::as_str) == Some(room_id) {
            room["therm_setpoint_mode"] = json!(mode);
            if let Some(temp) = temp {
                room["therm_setpoint_temperature"] = json!(temp);
            }
        }
    }
}

fn select_schedule(value: &mut Value, schedule_id: &str) {
    match value {
        Value::Object(obj) => {
            for (key, child) in obj.iter_mut() {
                if key == "therm_schedules" || key == "schedules" {
                    if let Value::Array(schedules) = child {
                        for schedule in schedules.iter_mut() {
                            let selected =
                                schedule.get("id").and_then(Value::as_str) == Some(schedule_id);
                            schedule["selected"] = json!(selected);
                        }
                    }
                } else {
                    select_schedule(child, schedule_id);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                select_schedule(item, schedule_id);
            }
        }
        _ => {}
    }
}

/// `/api/homesdata` for a home with two rooms and two schedules
pub fn sample_homesdata() -> Value {
    json!({
        "status": "ok",
        "time_server": 1700000000,
        "body": {
            "user": {"id": "user-1", "email": FAKE_USERNAME, "language": "fr-FR"},
            "homes": [{
                "id": "home-1",
                "name": "Maison",
                "timezone": "Europe/Paris",
                "city": "Lyon",
                "therm_mode": "schedule",
                "rooms": [
                    {"id": "r1", "name": "Salon", "type": "livingroom", "module_ids": ["m2"]},
                    {"id": "r2", "name": "Chambre", "type": "bedroom", "module_ids": ["m3"]}
                ],
                "modules": [
                    {"id": "m1", "type": "NMG", "name": "Passerelle"},
                    {"id": "m2", "type": "NMR", "name": "Radiateur Salon", "room_id": "r1"},
                    {"id": "m3", "type": "NMR", "name": "Radiateur Chambre", "room_id": "r2"}
                ],
                "therm_schedules": [
                    {"id": "s1", "name": "Semaine", "selected": true},
                    {"id": "s2", "name": "Vacances"}
                ]
            }]
        }
    })
}

/// `/syncapi/v1/homestatus`; `r2` has no setpoint so it falls back to configs
pub fn sample_homestatus() -> Value {
    json!({
        "status": "ok",
        "body": {
            "home": {
                "id": "home-1",
                "rooms": [
                    {
                        "id": "r1",
                        "therm_measured_temperature": 19.5,
                        "therm_setpoint_temperature": 20.0,
                        "therm_setpoint_mode": "home",
                        "heating_power_request": 40,
                        "open_window": false,
                        "presence": true
                    },
                    {
                        "id": "r2",
                        "therm_measured_temperature": 17.0,
                        "therm_setpoint_mode": "away",
                        "heating_power_request": 0
                    }
                ]
            }
        }
    })
}

/// `/api/gethomemeasure` with a daily energy series
pub fn sample_measures() -> Value {
    json!({
        "status": "ok",
        "body": {
            "measures": [
                {"beg_time": 1700000000, "step_time": 86400, "value": [12.5, 11.0]}
            ]
        }
    })
}

/// `/syncapi/v1/getconfigs` with the selected schedule's room temperatures
pub fn sample_configs() -> Value {
    json!({
        "status": "ok",
        "body": {
            "home": {
                "id": "home-1",
                "therm_schedules": [
                    {"id": "s2", "name": "Vacances", "zones": []},
                    {
                        "id": "s1",
                        "name": "Semaine",
                        "selected": true,
                        "zones": [
                            {"id": 0, "name": "Confort", "rooms_temp": [
                                {"room_id": "r1", "temp": 20},
                                {"room_id": "r2", "temp": 16.5}
                            ]}
                        ]
                    }
                ]
            }
        }
    })
}
