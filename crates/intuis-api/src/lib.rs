//! Muller/Intuis cloud API client
//!
//! This crate talks to the vendor cloud behind Muller "Intuitiv" heating
//! controllers:
//!
//! - [`IntuisHttpClient`] - OAuth2 password / refresh-token session and one
//!   method per endpoint
//! - [`discovery`] - locating the home object in whatever shape
//!   `/api/homesdata` returns
//! - [`IntuisApi`] - facade with a cached home, used by the integration
//!
//! # Example
//!
//! ```ignore
//! use intuis_api::{ClientConfig, Credentials, IntuisApi};
//!
//! let api = IntuisApi::new(
//!     ClientConfig::new(client_id, client_secret),
//!     Credentials::new("me@example.com", "password"),
//! )?;
//! let home_id = api.get_home_id().await?;
//! let status = api.homestatus(Some(&home_id)).await?;
//! ```

mod api;
mod auth;
mod client;
mod config;
pub mod discovery;
mod error;

#[cfg(feature = "testing")]
pub mod testing;

pub use api::{IntuisApi, RoomModeOptions};
pub use auth::TokenState;
pub use client::{IntuisHttpClient, MeasureQuery, RoomMode};
pub use config::{
    ClientConfig, Credentials, DEFAULT_BASE_URL, DEFAULT_SCOPE, DEFAULT_USER_PREFIX,
};
pub use error::{ApiResult, IntuisApiError};

/// Endpoint paths, relative to the base URL
pub mod paths {
    pub use crate::client::{
        GETCONFIGS_PATH, GETHOMEMEASURE_PATH, HOMESDATA_PATH, HOMESTATUS_PATH,
        SETROOMTHERMPOINT_PATH, SETSTATE_PATH, SWITCHHOMESCHEDULE_PATH, TOKEN_PATH,
    };
}
