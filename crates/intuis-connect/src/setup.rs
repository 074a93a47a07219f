//! Integration instance: config entries and their loaded runtimes

use std::sync::Arc;

use dashmap::DashMap;
use intuis_api::{ClientConfig, Credentials, IntuisApi, IntuisApiError};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::binary_sensor::{self, RoomBinarySensor};
use crate::climate::{self, RoomClimate};
use crate::config_flow::{ConfigFlow, FlowResult};
use crate::coordinator::{ConfigEntryNotReady, Coordinator};
use crate::entity::{Entity, EntityState};
use crate::entry::{ConfigEntry, EntryState, InvalidTransition};
use crate::select::{self, ScheduleSelect};
use crate::sensor::{self, IntuisSensor};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("config entry not found: {0}")]
    NotFound(String),

    #[error("an entry for {0} is already configured")]
    AlreadyConfigured(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    NotReady(#[from] ConfigEntryNotReady),

    #[error(transparent)]
    Api(#[from] IntuisApiError),
}

pub type SetupResult<T> = Result<T, SetupError>;

/// Everything a loaded entry owns
pub struct EntryRuntime {
    pub api: Arc<IntuisApi>,
    pub coordinator: Arc<Coordinator>,
    pub climates: Vec<Arc<RoomClimate>>,
    pub sensors: Vec<Arc<IntuisSensor>>,
    pub binary_sensors: Vec<Arc<RoomBinarySensor>>,
    pub selects: Vec<Arc<ScheduleSelect>>,
}

impl EntryRuntime {
    /// All entities, climate first
    pub fn entities(&self) -> Vec<Arc<dyn Entity>> {
        let mut entities: Vec<Arc<dyn Entity>> = Vec::new();
        entities.extend(self.climates.iter().map(|e| e.clone() as Arc<dyn Entity>));
        entities.extend(self.sensors.iter().map(|e| e.clone() as Arc<dyn Entity>));
        entities.extend(self.binary_sensors.iter().map(|e| e.clone() as Arc<dyn Entity>));
        entities.extend(self.selects.iter().map(|e| e.clone() as Arc<dyn Entity>));
        entities
    }

    pub fn find(&self, unique_id: &str) -> Option<Arc<dyn Entity>> {
        self.entities().into_iter().find(|e| e.unique_id() == unique_id)
    }

    pub fn states(&self) -> Vec<EntityState> {
        self.entities().iter().map(|e| e.snapshot()).collect()
    }
}

/// The integration: entries keyed by entry id, runtimes of loaded entries
pub struct IntuisConnect {
    client_config: ClientConfig,
    entries: DashMap<String, ConfigEntry>,
    runtimes: DashMap<String, Arc<EntryRuntime>>,
}

impl IntuisConnect {
    pub fn new(client_config: ClientConfig) -> Self {
        Self {
            client_config,
            entries: DashMap::new(),
            runtimes: DashMap::new(),
        }
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    pub fn config_flow(&self) -> ConfigFlow<'_> {
        ConfigFlow::new(self)
    }

    /// Whether an entry with this unique id exists
    pub fn is_configured(&self, unique_id: &str) -> bool {
        self.entries.iter().any(|e| e.unique_id == unique_id)
    }

    pub fn add_entry(&self, entry: ConfigEntry) -> SetupResult<String> {
        if self.is_configured(&entry.unique_id) {
            return Err(SetupError::AlreadyConfigured(entry.unique_id));
        }
        let entry_id = entry.entry_id.clone();
        info!(entry_id = %entry_id, title = %entry.title, "Added config entry");
        self.entries.insert(entry_id.clone(), entry);
        Ok(entry_id)
    }

    /// Store the entry created by a finished flow
    pub fn create_entry(&self, result: FlowResult) -> SetupResult<Option<String>> {
        match result {
            FlowResult::CreateEntry {
                title,
                unique_id,
                data,
                options,
            } => self
                .add_entry(ConfigEntry::new(title, unique_id, data, options))
                .map(Some),
            _ => Ok(None),
        }
    }

    pub fn entry(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|e| e.clone())
    }

    pub fn runtime(&self, entry_id: &str) -> Option<Arc<EntryRuntime>> {
        self.runtimes.get(entry_id).map(|r| r.clone())
    }

    /// Entities of a loaded entry
    pub fn entities(&self, entry_id: &str) -> Vec<Arc<dyn Entity>> {
        self.runtime(entry_id)
            .map(|r| r.entities())
            .unwrap_or_default()
    }

    fn transition(&self, entry_id: &str, to: EntryState, reason: Option<String>) -> SetupResult<()> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| SetupError::NotFound(entry_id.to_string()))?;
        entry.transition(to)?;
        entry.reason = reason;
        Ok(())
    }

    /// Load an entry: first refresh, entities of every platform, polling
    #[instrument(skip(self))]
    pub async fn setup_entry(&self, entry_id: &str) -> SetupResult<Arc<EntryRuntime>> {
        let entry = self
            .entry(entry_id)
            .ok_or_else(|| SetupError::NotFound(entry_id.to_string()))?;
        self.transition(entry_id, EntryState::SetupInProgress, None)?;

        let api = match IntuisApi::new(
            self.client_config.clone(),
            Credentials::new(&entry.data.username, &entry.data.password),
        ) {
            Ok(api) => Arc::new(api),
            Err(e) => {
                self.transition(entry_id, EntryState::SetupError, Some(e.to_string()))?;
                return Err(e.into());
            }
        };

        let coordinator = Arc::new(Coordinator::new(
            entry.title.clone(),
            api.clone(),
            entry.options.measure_scale.clone(),
        ));
        let data = match coordinator.first_refresh().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Setup of {} not ready: {}", entry.title, e);
                self.transition(entry_id, EntryState::SetupRetry, Some(e.to_string()))?;
                return Err(e.into());
            }
        };

        let runtime = Arc::new(EntryRuntime {
            climates: climate::setup_entities(&coordinator, &data),
            sensors: sensor::setup_entities(&coordinator, &data),
            binary_sensors: binary_sensor::setup_entities(&coordinator, &data),
            selects: select::setup_entities(&coordinator, &data),
            api,
            coordinator: coordinator.clone(),
        });

        coordinator.spawn(entry.options.update_interval());
        self.runtimes.insert(entry_id.to_string(), runtime.clone());
        self.transition(entry_id, EntryState::Loaded, None)?;

        info!(
            home_id = %data.home_id,
            entities = runtime.entities().len(),
            "Set up {}", entry.title
        );
        Ok(runtime)
    }

    /// Stop polling and drop the runtime of an entry
    #[instrument(skip(self))]
    pub async fn unload_entry(&self, entry_id: &str) -> SetupResult<()> {
        self.transition(entry_id, EntryState::UnloadInProgress, None)?;
        if let Some((_, runtime)) = self.runtimes.remove(entry_id) {
            runtime.coordinator.shutdown().await;
        }
        self.transition(entry_id, EntryState::NotLoaded, None)?;
        info!("Unloaded config entry");
        Ok(())
    }

    /// Unload (when needed) and forget an entry
    pub async fn remove_entry(&self, entry_id: &str) -> SetupResult<ConfigEntry> {
        let state = self
            .entry(entry_id)
            .ok_or_else(|| SetupError::NotFound(entry_id.to_string()))?
            .state;
        if state.can_transition_to(EntryState::UnloadInProgress) {
            self.unload_entry(entry_id).await?;
        }
        self.entries
            .remove(entry_id)
            .map(|(_, entry)| entry)
            .ok_or_else(|| SetupError::NotFound(entry_id.to_string()))
    }
}
