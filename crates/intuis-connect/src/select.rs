//! Select platform: the active weekly schedule

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::coordinator::{Coordinator, CoordinatorData};
use crate::device::DeviceInfo;
use crate::entity::{Entity, EntityError, Platform, SelectEntity};
use crate::models::Schedule;

pub struct ScheduleSelect {
    coordinator: Arc<Coordinator>,
    home_id: String,
    unique_id: String,
    device: DeviceInfo,
}

impl ScheduleSelect {
    pub const NAME: &'static str = "Intuis Active Schedule";

    pub fn new(coordinator: Arc<Coordinator>, home_id: &str) -> Self {
        Self {
            coordinator,
            home_id: home_id.to_string(),
            unique_id: format!("intuis_{}_schedule", home_id),
            device: DeviceInfo::gateway(home_id),
        }
    }

    /// Schedules of the home in the latest snapshot
    pub fn schedules(&self) -> Vec<Schedule> {
        self.coordinator
            .data()
            .map(|data| Schedule::list(&data.home))
            .unwrap_or_default()
    }
}

impl Entity for ScheduleSelect {
    fn platform(&self) -> Platform {
        Platform::Select
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    fn state(&self) -> Option<String> {
        self.current_option()
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("options".into(), json!(self.options()));
        attrs
    }

    fn as_select(&self) -> Option<&dyn SelectEntity> {
        Some(self)
    }
}

#[async_trait]
impl SelectEntity for ScheduleSelect {
    fn options(&self) -> Vec<String> {
        self.schedules().into_iter().map(|s| s.name).collect()
    }

    fn current_option(&self) -> Option<String> {
        self.schedules()
            .into_iter()
            .find(|s| s.selected)
            .map(|s| s.name)
    }

    async fn select_option(&self, option: &str) -> Result<(), EntityError> {
        let schedule = self
            .schedules()
            .into_iter()
            .find(|s| s.name == option)
            .ok_or_else(|| EntityError::UnknownOption(option.to_string()))?;

        info!(schedule_id = %schedule.id, name = %schedule.name, "Switching schedule");
        self.coordinator
            .api()
            .switch_home_schedule(&self.home_id, &schedule.id)
            .await?;
        self.coordinator.request_refresh().await;
        Ok(())
    }
}

/// The schedule selector of the home
pub fn setup_entities(coordinator: &Arc<Coordinator>, data: &CoordinatorData) -> Vec<Arc<ScheduleSelect>> {
    vec![Arc::new(ScheduleSelect::new(coordinator.clone(), &data.home_id))]
}
