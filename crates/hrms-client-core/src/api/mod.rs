//! REST API client module for the HRMS backend.
//!
//! This module provides the `ApiClient` facade used by the presentation
//! layer. Every request carries the stored bearer credential; an expired
//! credential is refreshed once per expiry episode and the request replayed.

pub mod client;
pub mod error;
pub mod executor;
pub mod request;

pub use client::ApiClient;
pub use error::{ApiError, ErrorEnvelope};
pub use executor::RequestExecutor;
pub use request::{Execution, RawResponse, RequestConfig, RequestDescriptor, ResponseEnvelope};
