//! Low-level HTTP client
//!
//! Wraps every vendor endpoint the integration uses. Each authenticated call
//! first makes sure a bearer token is available, logging in or refreshing as
//! needed. Bodies are parsed as JSON whatever the declared content type,
//! because the vendor is not consistent about it.

use std::fmt;

use chrono::Utc;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

use crate::auth::TokenState;
use crate::config::{ClientConfig, Credentials};
use crate::error::{ApiResult, IntuisApiError};

pub const TOKEN_PATH: &str = "/oauth2/token";
pub const HOMESDATA_PATH: &str = "/api/homesdata";
pub const HOMESTATUS_PATH: &str = "/syncapi/v1/homestatus";
pub const GETCONFIGS_PATH: &str = "/syncapi/v1/getconfigs";
pub const GETHOMEMEASURE_PATH: &str = "/api/gethomemeasure";
pub const SETROOMTHERMPOINT_PATH: &str = "/api/setroomthermpoint";
pub const SETSTATE_PATH: &str = "/syncapi/v1/setstate";
pub const SWITCHHOMESCHEDULE_PATH: &str = "/api/switchhomeschedule";

/// Thermostat setpoint mode of a room, as understood by the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    Manual,
    Home,
    Away,
    /// Frost protection ("hors gel")
    Hg,
    Off,
}

impl RoomMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomMode::Manual => "manual",
            RoomMode::Home => "home",
            RoomMode::Away => "away",
            RoomMode::Hg => "hg",
            RoomMode::Off => "off",
        }
    }

    /// Parse a vendor mode string, ignoring case
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "manual" => Some(RoomMode::Manual),
            "home" => Some(RoomMode::Home),
            "away" => Some(RoomMode::Away),
            "hg" => Some(RoomMode::Hg),
            "off" => Some(RoomMode::Off),
            _ => None,
        }
    }
}

impl fmt::Display for RoomMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a `gethomemeasure` call
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureQuery {
    /// Aggregation scale, e.g. `1day`
    pub scale: String,
    pub offset: u32,
    pub limit: u32,
    /// Measure type, e.g. `energy`; omitted from the request when `None`
    pub kind: Option<String>,
}

impl MeasureQuery {
    pub fn new(scale: impl Into<String>) -> Self {
        Self {
            scale: scale.into(),
            offset: 0,
            limit: 30,
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn without_kind(mut self) -> Self {
        self.kind = None;
        self
    }
}

/// Request payload
enum Body<'a> {
    Empty,
    Form(&'a [(&'a str, String)]),
    Json(&'a Value),
}

/// HTTP client holding the OAuth session
pub struct IntuisHttpClient {
    http: reqwest::Client,
    config: ClientConfig,
    credentials: Credentials,
    auth: Mutex<TokenState>,
}

impl IntuisHttpClient {
    pub fn new(config: ClientConfig, credentials: Credentials) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| IntuisApiError::Transport {
                method: "INIT".into(),
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self::with_http_client(http, config, credentials))
    }

    /// Reuse an existing `reqwest::Client` (shared connection pool)
    pub fn with_http_client(
        http: reqwest::Client,
        config: ClientConfig,
        credentials: Credentials,
    ) -> Self {
        Self {
            http,
            config,
            credentials,
            auth: Mutex::new(TokenState::default()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Copy of the current token state
    pub async fn token_state(&self) -> TokenState {
        self.auth.lock().await.clone()
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Body<'_>,
        bearer: Option<&str>,
    ) -> ApiResult<Value> {
        let url = self.config.url(path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(bearer) = bearer {
            request = request.header(reqwest::header::AUTHORIZATION, bearer);
        }
        request = match body {
            Body::Empty => request,
            Body::Form(fields) => request.form(fields),
            Body::Json(value) => request.json(value),
        };

        debug!(method = %method, url = %url, "Sending request");
        let transport = |source| IntuisApiError::Transport {
            method: method.to_string(),
            url: url.clone(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if status.as_u16() >= 400 {
            return Err(IntuisApiError::Http {
                method: method.to_string(),
                url,
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
                body: if text.is_empty() {
                    "<no body>".to_string()
                } else {
                    text
                },
            });
        }

        serde_json::from_str(&text).map_err(|source| IntuisApiError::InvalidJson {
            url,
            body: text,
            source,
        })
    }

    async fn post_token(&self, form: &[(&str, String)]) -> ApiResult<Value> {
        self.request_json(Method::POST, TOKEN_PATH, Body::Form(form), None)
            .await
    }

    /// Make sure a valid access token is held; returns the bearer header value
    ///
    /// Refreshes when a refresh token exists and falls back to a full login if
    /// that fails.
    pub async fn ensure_token(&self) -> ApiResult<String> {
        let mut auth = self.auth.lock().await;
        if auth.is_valid(Utc::now(), self.config.refresh_margin) {
            if let Some(bearer) = auth.bearer() {
                return Ok(bearer);
            }
        }

        if auth.refresh_token.is_some() {
            match self.refresh_locked(&mut auth).await {
                Ok(_) => return bearer_of(&auth),
                Err(e) => warn!("Token refresh failed, fallback to login: {}", e),
            }
        }

        self.login_locked(&mut auth).await?;
        bearer_of(&auth)
    }

    /// Password-grant login, retried with linear backoff
    pub async fn login(&self) -> ApiResult<Value> {
        let mut auth = self.auth.lock().await;
        self.login_locked(&mut auth).await
    }

    /// Exchange the stored refresh token for a new access token
    pub async fn refresh(&self) -> ApiResult<Value> {
        let mut auth = self.auth.lock().await;
        self.refresh_locked(&mut auth).await
    }

    #[instrument(skip(self, auth), fields(username = %self.credentials.username))]
    async fn login_locked(&self, auth: &mut TokenState) -> ApiResult<Value> {
        let form = [
            ("client_id", self.config.client_id.clone()),
            ("user_prefix", self.config.user_prefix.clone()),
            ("client_secret", self.config.client_secret.clone()),
            ("grant_type", "password".to_string()),
            ("scope", self.config.scope.clone()),
            ("password", self.credentials.password.clone()),
            ("username", self.credentials.username.clone()),
        ];

        let attempts = self.config.login_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.post_token(&form).await {
                Ok(data) => {
                    auth.store(&data, Utc::now(), self.config.default_token_lifetime);
                    debug!(expires_in = ?data.get("expires_in"), "Logged in");
                    return Ok(data);
                }
                Err(e) => {
                    error!("Auth transient error, retry {}/{}: {}", attempt, attempts, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    }
                }
            }
        }

        auth.clear();
        Err(IntuisApiError::LoginFailed(Box::new(
            last_error.unwrap_or(IntuisApiError::NoRefreshToken),
        )))
    }

    async fn refresh_locked(&self, auth: &mut TokenState) -> ApiResult<Value> {
        let refresh_token = auth
            .refresh_token
            .clone()
            .ok_or(IntuisApiError::NoRefreshToken)?;
        let form = [
            ("client_id", self.config.client_id.clone()),
            ("user_prefix", self.config.user_prefix.clone()),
            ("client_secret", self.config.client_secret.clone()),
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
        ];
        let data = self.post_token(&form).await?;
        auth.store(&data, Utc::now(), self.config.default_token_lifetime);
        debug!(expires_in = ?data.get("expires_in"), "Refreshed token");
        Ok(data)
    }

    async fn authed(&self, method: Method, path: &str, body: Body<'_>) -> ApiResult<Value> {
        let bearer = self.ensure_token().await?;
        self.request_json(method, path, body, Some(&bearer)).await
    }

    /// `GET /api/homesdata`
    ///
    /// Tolerates a JSON document delivered inside a JSON string.
    pub async fn get_homesdata(&self) -> ApiResult<Value> {
        let raw = self.authed(Method::GET, HOMESDATA_PATH, Body::Empty).await?;

        let raw = match raw {
            Value::String(text) => serde_json::from_str(&text).map_err(|_| {
                error!(
                    "homesdata: received a non-JSON string (len={}): {:?}",
                    text.len(),
                    truncate(&text, 200)
                );
                IntuisApiError::schema(HOMESDATA_PATH, "response is not JSON")
            })?,
            other => other,
        };

        if !(raw.is_object() || raw.is_array()) {
            error!(
                "homesdata: unexpected type - sample={:?}",
                truncate(&raw.to_string(), 300)
            );
            return Err(IntuisApiError::schema(
                HOMESDATA_PATH,
                "expected an object or an array",
            ));
        }
        Ok(raw)
    }

    /// `POST /syncapi/v1/homestatus`
    pub async fn post_homestatus(&self, home_id: &str) -> ApiResult<Value> {
        let form = [("home_id", home_id.to_string())];
        self.authed(Method::POST, HOMESTATUS_PATH, Body::Form(&form))
            .await
    }

    /// `POST /syncapi/v1/getconfigs`; needs no home id
    pub async fn post_getconfigs(&self) -> ApiResult<Value> {
        self.authed(Method::POST, GETCONFIGS_PATH, Body::Form(&[]))
            .await
    }

    /// `POST /api/gethomemeasure`
    pub async fn post_gethomemeasure(&self, home_id: &str, query: &MeasureQuery) -> ApiResult<Value> {
        let mut form = vec![
            ("home_id", home_id.to_string()),
            ("scale", query.scale.clone()),
            ("offset", query.offset.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(kind) = &query.kind {
            form.push(("type", kind.clone()));
        }
        self.authed(Method::POST, GETHOMEMEASURE_PATH, Body::Form(&form))
            .await
    }

    /// `POST /api/setroomthermpoint` (form encoded, Netatmo style)
    pub async fn post_setroomthermpoint(
        &self,
        home_id: &str,
        room_id: &str,
        mode: RoomMode,
        temp: Option<f64>,
        endtime: Option<i64>,
    ) -> ApiResult<Value> {
        let mut form = vec![
            ("home_id", home_id.to_string()),
            ("room_id", room_id.to_string()),
            ("mode", mode.to_string()),
        ];
        if let Some(temp) = temp {
            form.push(("temp", format_float(temp)));
        }
        if let Some(endtime) = endtime {
            form.push(("endtime", endtime.to_string()));
        }
        self.authed(Method::POST, SETROOMTHERMPOINT_PATH, Body::Form(&form))
            .await
    }

    /// `POST /syncapi/v1/setstate` with a single room
    pub async fn post_setstate_rooms(
        &self,
        home_id: &str,
        room_id: &str,
        mode: RoomMode,
        temp: Option<f64>,
        endtime: Option<i64>,
    ) -> ApiResult<Value> {
        let mut room = json!({
            "id": room_id,
            "therm_setpoint_mode": mode.as_str(),
        });
        if let Some(temp) = temp {
            room["therm_setpoint_temperature"] = json!(temp);
        }
        if let Some(endtime) = endtime {
            room["therm_setpoint_end_time"] = json!(endtime);
        }
        let body = json!({"home": {"id": home_id, "rooms": [room]}});

        self.authed(Method::POST, SETSTATE_PATH, Body::Json(&body))
            .await
    }

    /// `POST /api/switchhomeschedule`
    pub async fn post_switchhomeschedule(&self, home_id: &str, schedule_id: &str) -> ApiResult<Value> {
        let form = [
            ("home_id", home_id.to_string()),
            ("schedule_id", schedule_id.to_string()),
        ];
        self.authed(Method::POST, SWITCHHOMESCHEDULE_PATH, Body::Form(&form))
            .await
    }
}

fn bearer_of(auth: &TokenState) -> ApiResult<String> {
    auth.bearer().ok_or_else(|| {
        IntuisApiError::schema(TOKEN_PATH, "token response without access_token")
    })
}

/// Decimal rendering used for form fields: `19` becomes `19.0`
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// First `max` characters of `text`
pub(crate) fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
