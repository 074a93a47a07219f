//! Intuis Connect runner
//!
//! Runs the integration outside Home Assistant: validates the account
//! through the config flow, loads the entry and logs every entity state
//! after each poll.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use intuis_connect::{
    ConfigEntry, EntryRuntime, FlowResult, IntegrationConfig, IntuisConnect, SetupError,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const CONFIG_ENV: &str = "INTUIS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "intuis.yaml";

/// 5s, 10s, 20s, 40s, then 80s between setup attempts
fn retry_delay(tries: u32) -> Duration {
    Duration::from_secs(u64::from(2_u32.pow(tries.min(4)) * 5))
}

fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Run the user step and store the resulting entry
async fn configure(hass: &IntuisConnect, config: &IntegrationConfig) -> Result<String> {
    match hass.config_flow().step_user(Some(config.user_input())).await {
        FlowResult::CreateEntry {
            title,
            unique_id,
            data,
            ..
        } => {
            let entry = ConfigEntry::new(title, unique_id, data, config.options.clone());
            Ok(hass.add_entry(entry)?)
        }
        FlowResult::ShowForm { errors, .. } => {
            let reason = errors.get("base").map(String::as_str).unwrap_or("unknown");
            bail!("account validation failed: {}", reason)
        }
        FlowResult::Abort { reason } => bail!("config flow aborted: {}", reason),
    }
}

/// Set up the entry, retrying while the cloud is not ready
async fn setup_with_retry(hass: &IntuisConnect, entry_id: &str) -> Result<Arc<EntryRuntime>> {
    let mut tries = 0;
    loop {
        match hass.setup_entry(entry_id).await {
            Ok(runtime) => return Ok(runtime),
            Err(SetupError::NotReady(e)) => {
                let delay = retry_delay(tries);
                tries += 1;
                warn!("{}; retrying in {}s", e, delay.as_secs());
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = tokio::signal::ctrl_c() => bail!("interrupted during setup"),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn log_states(runtime: &EntryRuntime) {
    for state in runtime.states() {
        info!(
            platform = %state.platform,
            unique_id = %state.unique_id,
            state = %state.state,
            "{}", state.name
        );
        debug!(
            unique_id = %state.unique_id,
            attributes = %serde_json::Value::Object(state.attributes),
            "attributes"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let path = config_path();
    let config = IntegrationConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path))?;
    info!(username = %config.username, "Starting Intuis Connect");

    let hass = IntuisConnect::new(config.client.clone());
    let entry_id = configure(&hass, &config).await?;
    let runtime = setup_with_retry(&hass, &entry_id).await?;
    log_states(&runtime);

    let mut updates = runtime.coordinator.subscribe();
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(_) => log_states(&runtime),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Missed updates"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    hass.unload_entry(&entry_id).await?;
    Ok(())
}
