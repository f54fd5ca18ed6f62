//! Core library for hrms-client.
//!
//! An authenticated request layer for the HRMS REST API: every request
//! carries the stored bearer credential, an expired credential is refreshed
//! once per expiry episode no matter how many requests are in flight, and a
//! failed refresh clears the session and notifies subscribers.
//!
//! ```no_run
//! use hrms_client_core::{ApiClient, Config, SessionEvent};
//! use hrms_client_core::models::Employee;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?.apply_env()?;
//! let client = ApiClient::from_config(&config)?;
//!
//! let mut events = client.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let SessionEvent::Expired { .. } = event {
//!             // Send the user back to the login screen
//!         }
//!     }
//! });
//!
//! let employees = client.get::<Vec<Employee>>("/employees").await?;
//! println!("{} employees", employees.data.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{
    ApiClient, ApiError, ErrorEnvelope, RequestConfig, RequestDescriptor, ResponseEnvelope,
};
pub use auth::{CredentialStore, Credentials, SessionEvent};
pub use config::Config;
