//! Single HTTP call against the API, with the bearer credential attached.
//!
//! This is the only place that talks to the network. It never retries:
//! a 401 is reported as [`Execution::Unauthorized`] and left to the caller.

use std::sync::Arc;

use anyhow::Result;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::request::{Execution, RawResponse, RequestDescriptor};
use super::ApiError;
use crate::auth::{CredentialStore, Credentials};
use crate::config::Config;

pub struct RequestExecutor {
    client: Client,
    base_url: String,
    store: Arc<CredentialStore>,
}

impl RequestExecutor {
    pub fn new(config: &Config, store: Arc<CredentialStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store,
        })
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send the request with whatever credential the store currently holds.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Execution, ApiError> {
        let credentials = self.store.get();
        self.execute_as(descriptor, credentials.as_ref()).await
    }

    /// Send the request with an explicit credential, or none at all.
    pub async fn execute_as(
        &self,
        descriptor: &RequestDescriptor,
        credentials: Option<&Credentials>,
    ) -> Result<Execution, ApiError> {
        let url = self.url(&descriptor.path);
        let headers = Self::request_headers(descriptor, credentials)?;

        let mut builder = self
            .client
            .request(descriptor.method.clone(), &url)
            .headers(headers);
        if !descriptor.query.is_empty() {
            builder = builder.query(&descriptor.query);
        }
        if let Some(ref body) = descriptor.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = descriptor.timeout {
            builder = builder.timeout(timeout);
        }

        debug!(
            method = %descriptor.method,
            url = %url,
            authenticated = credentials.is_some(),
            "Sending request"
        );

        let response = builder.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Request failed before a response arrived");
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            let data = ApiError::body_data(&body);
            debug!(url = %url, "Credential rejected with 401");
            return Ok(Execution::Unauthorized {
                sent_token: credentials.map(|c| c.access_token.clone()),
                message: ApiError::message_for(status, data.as_ref()),
                data,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(url = %url, status = status.as_u16(), "Request returned error status");
            return Err(ApiError::from_status(status, &body));
        }

        let bytes = response.bytes().await?;
        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(Execution::Completed(RawResponse {
            data,
            status,
            message: status.canonical_reason().unwrap_or_default().to_string(),
        }))
    }

    /// Defaults, then the caller's headers, then the bearer credential.
    fn request_headers(
        descriptor: &RequestDescriptor,
        credentials: Option<&Credentials>,
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.extend(descriptor.headers.clone());

        if let Some(credentials) = credentials {
            let mut value =
                HeaderValue::from_str(&format!("Bearer {}", credentials.access_token))
                    .map_err(|_| {
                        ApiError::Protocol("Access token is not a valid header value".to_string())
                    })?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }
}
