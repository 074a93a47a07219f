//! High-level API used by the integration
//!
//! Adds the cached home object on top of [`IntuisHttpClient`] so callers can
//! work with a home id without re-fetching `/api/homesdata` on every poll.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::client::{truncate, IntuisHttpClient, MeasureQuery, RoomMode, HOMESDATA_PATH};
use crate::config::{ClientConfig, Credentials};
use crate::discovery::{extract_home, home_id_of};
use crate::error::{ApiResult, IntuisApiError};

/// Optional parameters of [`IntuisApi::set_room_mode`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomModeOptions {
    pub temp: Option<f64>,
    /// Unix timestamp at which the override ends
    pub endtime: Option<i64>,
    /// Use `/syncapi/v1/setstate` (JSON) rather than `/api/setroomthermpoint`
    pub use_setstate: bool,
}

impl Default for RoomModeOptions {
    fn default() -> Self {
        Self {
            temp: None,
            endtime: None,
            use_setstate: true,
        }
    }
}

/// Intuis cloud API facade
pub struct IntuisApi {
    client: IntuisHttpClient,
    home_cache: RwLock<Option<Value>>,
}

impl IntuisApi {
    pub fn new(config: ClientConfig, credentials: Credentials) -> ApiResult<Self> {
        Ok(Self::from_client(IntuisHttpClient::new(config, credentials)?))
    }

    pub fn from_client(client: IntuisHttpClient) -> Self {
        Self {
            client,
            home_cache: RwLock::new(None),
        }
    }

    pub fn client(&self) -> &IntuisHttpClient {
        &self.client
    }

    /// Make sure a token is available, logging in or refreshing only if needed
    pub async fn authenticate(&self) -> ApiResult<()> {
        self.client.ensure_token().await.map(|_| ())
    }

    /// Force a password login
    pub async fn login(&self) -> ApiResult<Value> {
        self.client.login().await
    }

    /// The home object, normalised so that `id` holds the string id
    pub async fn get_home(&self) -> ApiResult<Value> {
        if let Some(cached) = self.home_cache.read().await.as_ref() {
            if cached_id(cached).is_some() {
                return Ok(cached.clone());
            }
        }

        let payload = self.client.get_homesdata().await?;
        let home = extract_home(&payload)?;
        if !home.is_object() {
            return Err(IntuisApiError::schema(HOMESDATA_PATH, "home object not found"));
        }

        let Some(home_id) = home_id_of(home) else {
            error!(
                "homesdata without a detectable 'id'. Sample: {}",
                truncate(&payload.to_string(), 800)
            );
            return Err(IntuisApiError::schema(HOMESDATA_PATH, "key 'id' not found"));
        };

        let mut normalized = home.clone();
        normalized["id"] = Value::String(home_id.clone());
        info!(home_id = %home_id, "Discovered home");

        *self.home_cache.write().await = Some(normalized.clone());
        Ok(normalized)
    }

    /// The home id, from the cache when possible
    pub async fn get_home_id(&self) -> ApiResult<String> {
        if let Some(id) = self.home_cache.read().await.as_ref().and_then(home_id_of) {
            return Ok(id);
        }
        let home = self.get_home().await?;
        home_id_of(&home)
            .ok_or_else(|| IntuisApiError::schema(HOMESDATA_PATH, "home_id not found"))
    }

    /// Forget the cached home so the next call re-fetches `/api/homesdata`
    pub async fn invalidate_home(&self) {
        debug!("Invalidating cached home");
        *self.home_cache.write().await = None;
    }

    async fn resolve_home_id(&self, home_id: Option<&str>) -> ApiResult<String> {
        match home_id {
            Some(id) => Ok(id.to_string()),
            None => self.get_home_id().await,
        }
    }

    pub async fn homestatus(&self, home_id: Option<&str>) -> ApiResult<Value> {
        let home_id = self.resolve_home_id(home_id).await?;
        self.client.post_homestatus(&home_id).await
    }

    pub async fn getconfigs(&self) -> ApiResult<Value> {
        self.client.post_getconfigs().await
    }

    pub async fn gethomemeasure(
        &self,
        home_id: Option<&str>,
        query: &MeasureQuery,
    ) -> ApiResult<Value> {
        let home_id = self.resolve_home_id(home_id).await?;
        self.client.post_gethomemeasure(&home_id, query).await
    }

    /// Put a room in manual mode at `temp`, optionally for `duration` only
    pub async fn set_room_setpoint(
        &self,
        home_id: &str,
        room_id: &str,
        temp: f64,
        duration: Option<Duration>,
    ) -> ApiResult<Value> {
        let endtime = duration
            .filter(|d| !d.is_zero())
            .map(|d| Utc::now().timestamp() + d.as_secs() as i64);
        self.client
            .post_setroomthermpoint(home_id, room_id, RoomMode::Manual, Some(temp), endtime)
            .await
    }

    /// Change the mode of a room
    pub async fn set_room_mode(
        &self,
        home_id: &str,
        room_id: &str,
        mode: RoomMode,
        options: RoomModeOptions,
    ) -> ApiResult<Value> {
        debug!(home_id, room_id, mode = %mode, "Setting room mode");
        if options.use_setstate {
            self.client
                .post_setstate_rooms(home_id, room_id, mode, options.temp, options.endtime)
                .await
        } else {
            self.client
                .post_setroomthermpoint(home_id, room_id, mode, options.temp, options.endtime)
                .await
        }
    }

    /// Activate another weekly schedule for the home
    pub async fn switch_home_schedule(&self, home_id: &str, schedule_id: &str) -> ApiResult<Value> {
        let result = self
            .client
            .post_switchhomeschedule(home_id, schedule_id)
            .await?;
        self.invalidate_home().await;
        Ok(result)
    }
}

fn cached_id(home: &Value) -> Option<&str> {
    home.get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}
