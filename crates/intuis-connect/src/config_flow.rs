//! User config flow: email and password, validated against the cloud

use std::collections::BTreeMap;

use intuis_api::{Credentials, IntuisApi, IntuisApiError};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::entry::{EntryData, EntryOptions};
use crate::setup::IntuisConnect;

pub const STEP_USER: &str = "user";

/// Form fields of the user step
#[derive(Clone, Serialize, Deserialize)]
pub struct UserInput {
    pub email: String,
    pub password: String,
}

impl UserInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for UserInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInput")
            .field("email", &self.email)
            .field("password", &"**REDACTED**")
            .finish()
    }
}

/// Outcome of a flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    ShowForm {
        step_id: String,
        errors: BTreeMap<String, String>,
    },
    CreateEntry {
        title: String,
        unique_id: String,
        data: EntryData,
        options: EntryOptions,
    },
    Abort {
        reason: String,
    },
}

impl FlowResult {
    fn form(errors: BTreeMap<String, String>) -> Self {
        FlowResult::ShowForm {
            step_id: STEP_USER.to_string(),
            errors,
        }
    }
}

/// Form error key for a failed validation
pub fn error_key(err: &IntuisApiError) -> &'static str {
    if err.is_auth_error() {
        "invalid_auth"
    } else {
        "cannot_connect"
    }
}

/// Config flow bound to an integration instance
pub struct ConfigFlow<'a> {
    hass: &'a IntuisConnect,
}

impl<'a> ConfigFlow<'a> {
    pub const VERSION: u32 = 1;

    pub fn new(hass: &'a IntuisConnect) -> Self {
        Self { hass }
    }

    /// Handle the user step; `None` shows the empty form
    pub async fn step_user(&self, input: Option<UserInput>) -> FlowResult {
        let Some(input) = input else {
            return FlowResult::form(BTreeMap::new());
        };

        let email = input.email.trim().to_string();
        let unique_id = email.to_lowercase();
        if self.hass.is_configured(&unique_id) {
            return FlowResult::Abort {
                reason: "already_configured".to_string(),
            };
        }

        if let Err(e) = self.validate(&email, &input.password).await {
            error!("Login failed: {}", e);
            let mut errors = BTreeMap::new();
            errors.insert("base".to_string(), error_key(&e).to_string());
            return FlowResult::form(errors);
        }

        info!(unique_id = %unique_id, "Credentials validated");
        FlowResult::CreateEntry {
            title: format!("Intuis ({})", email),
            unique_id,
            data: EntryData {
                username: email,
                password: input.password,
            },
            options: EntryOptions::default(),
        }
    }

    async fn validate(&self, email: &str, password: &str) -> Result<(), IntuisApiError> {
        let api = IntuisApi::new(
            self.hass.client_config().clone(),
            Credentials::new(email, password),
        )?;
        api.authenticate().await?;
        api.get_home_id().await?;
        Ok(())
    }
}
