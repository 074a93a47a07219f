//! Polling coordinator
//!
//! One coordinator per config entry fetches everything the entities need in
//! a single pass (home, status, energy measures, schedule configs) and
//! publishes it as an immutable snapshot. Entities only ever read the latest
//! snapshot; commands ask for an immediate refresh afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use intuis_api::discovery::home_id_of;
use intuis_api::{IntuisApi, IntuisApiError, MeasureQuery};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::models::RoomDevice;
use crate::payload;

/// Capacity of the update channel
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// A refresh failed; previous data is kept
#[derive(Debug, Error)]
#[error("Intuis API error: {0}")]
pub struct UpdateFailed(#[from] pub IntuisApiError);

/// The first refresh of an entry failed; setup should be retried later
#[derive(Debug, Error)]
#[error("config entry not ready: {0}")]
pub struct ConfigEntryNotReady(#[source] pub UpdateFailed);

/// Everything fetched in one poll
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorData {
    pub home_id: String,
    /// Normalised home object from `/api/homesdata`
    pub home: Value,
    /// Raw `/syncapi/v1/homestatus` payload
    pub status: Value,
    /// Raw `/api/gethomemeasure` payload
    pub measures: Value,
    /// Raw `/syncapi/v1/getconfigs` payload, when the endpoint answered
    pub configs: Option<Value>,
}

impl CoordinatorData {
    /// Room records of the home
    pub fn room_records(&self) -> &[Value] {
        self.home
            .get("rooms")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn module_count(&self) -> usize {
        self.home
            .get("modules")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Typed views of every room with an id
    pub fn rooms(&self) -> Vec<RoomDevice> {
        self.room_records()
            .iter()
            .filter_map(|record| RoomDevice::from_record(self, record))
            .collect()
    }

    /// Setpoint from the live status, else from the active schedule
    pub fn room_setpoint(&self, room_id: &str) -> Option<f64> {
        payload::room_number(&self.status, room_id, "therm_setpoint_temperature").or_else(|| {
            self.configs
                .as_ref()
                .and_then(|c| payload::room_setpoint_from_configs(c, room_id))
        })
    }

    /// Measured temperature from the live status, else from the home record
    pub fn room_measured(&self, room_id: &str) -> Option<f64> {
        payload::room_number(&self.status, room_id, "therm_measured_temperature").or_else(|| {
            payload::room_number(&self.home, room_id, "therm_measured_temperature")
        })
    }
}

/// Fetches and distributes [`CoordinatorData`]
pub struct Coordinator {
    name: String,
    api: Arc<IntuisApi>,
    measure_scale: String,
    data: RwLock<Option<Arc<CoordinatorData>>>,
    last_update_success: AtomicBool,
    updates: broadcast::Sender<Arc<CoordinatorData>>,
    refresh_lock: tokio::sync::Mutex<()>,
    shutdown: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(name: impl Into<String>, api: Arc<IntuisApi>, measure_scale: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            api,
            measure_scale: measure_scale.into(),
            data: RwLock::new(None),
            last_update_success: AtomicBool::new(false),
            updates,
            refresh_lock: tokio::sync::Mutex::new(()),
            shutdown: Notify::new(),
            task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn api(&self) -> &Arc<IntuisApi> {
        &self.api
    }

    /// Latest successful snapshot
    pub fn data(&self) -> Option<Arc<CoordinatorData>> {
        self.data.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether the most recent refresh succeeded
    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    /// Receive every new snapshot
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CoordinatorData>> {
        self.updates.subscribe()
    }

    async fn fetch(&self) -> Result<CoordinatorData, IntuisApiError> {
        // Only hits /oauth2/token when needed
        self.api.authenticate().await?;

        let home = self.api.get_home().await?;
        let home_id = match home_id_of(&home) {
            Some(id) => id,
            None => self.api.get_home_id().await?,
        };
        let status = self.api.homestatus(Some(&home_id)).await?;

        let query = MeasureQuery::new(self.measure_scale.clone()).with_kind("energy");
        let measures = match self.api.gethomemeasure(Some(&home_id), &query).await {
            Ok(measures) => measures,
            Err(e) => {
                debug!("gethomemeasure with type=energy failed ({}), retrying without type", e);
                self.api
                    .gethomemeasure(Some(&home_id), &query.without_kind())
                    .await?
            }
        };

        let configs = match self.api.getconfigs().await {
            Ok(configs) => Some(configs),
            Err(e) => {
                debug!("getconfigs failed ({}), schedule setpoints unavailable", e);
                None
            }
        };

        Ok(CoordinatorData {
            home_id,
            home,
            status,
            measures,
            configs,
        })
    }

    /// Fetch a new snapshot and publish it
    #[instrument(skip(self), fields(coordinator = %self.name))]
    pub async fn refresh(&self) -> Result<Arc<CoordinatorData>, UpdateFailed> {
        let _guard = self.refresh_lock.lock().await;

        match self.fetch().await {
            Ok(data) => {
                let data = Arc::new(data);
                *self.data.write().unwrap_or_else(|e| e.into_inner()) = Some(data.clone());
                if !self.last_update_success.swap(true, Ordering::SeqCst) {
                    info!("Fetching {} data recovered", self.name);
                }
                debug!(home_id = %data.home_id, "Published new snapshot");
                // No receivers is fine
                let _ = self.updates.send(data.clone());
                Ok(data)
            }
            Err(e) => {
                if self.last_update_success.swap(false, Ordering::SeqCst) {
                    warn!("Error fetching {} data: {}", self.name, e);
                } else {
                    debug!("Error fetching {} data: {}", self.name, e);
                }
                Err(UpdateFailed(e))
            }
        }
    }

    /// Refresh during entry setup
    pub async fn first_refresh(&self) -> Result<Arc<CoordinatorData>, ConfigEntryNotReady> {
        self.refresh().await.map_err(ConfigEntryNotReady)
    }

    /// Refresh now, logging instead of returning errors
    pub async fn request_refresh(&self) {
        if let Err(e) = self.refresh().await {
            debug!("Requested refresh failed: {}", e);
        }
    }

    /// Start polling every `interval` until [`Coordinator::shutdown`]
    ///
    /// The first tick waits a full interval: setup already did the first
    /// refresh.
    pub fn spawn(self: &Arc<Self>, interval: Duration) {
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = coordinator.refresh().await;
                    }
                    _ = coordinator.shutdown.notified() => {
                        debug!("Polling for {} stopped", coordinator.name);
                        break;
                    }
                }
            }
        });

        let previous = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(
            interval_secs = interval.as_secs(),
            "Started polling for {}", self.name
        );
    }

    /// Whether the polling task is running
    pub fn is_polling(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the polling task and wait for it to end
    pub async fn shutdown(&self) {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            self.shutdown.notify_one();
            let _ = handle.await;
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().ok().and_then(Option::take) {
            handle.abort();
        }
    }
}
