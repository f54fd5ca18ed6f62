//! Request and response value types shared by the executor and the facade.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;

/// One logical API call. Immutable once built; a retry sends it verbatim
/// with only the bearer header changed.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    /// Overrides the client-wide request timeout
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            query: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::Protocol(format!("Failed to serialize request body: {}", e)))?;
        Ok(self.body(value))
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn queries<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Merge per-call options. Headers replace same-named ones, query pairs
    /// are appended, and a config timeout wins over the descriptor's.
    pub fn with_config(mut self, config: &RequestConfig) -> Self {
        self.headers.extend(config.headers.clone());
        self.query.extend(config.query.iter().cloned());
        if config.timeout.is_some() {
            self.timeout = config.timeout;
        }
        self
    }
}

/// Optional extras for one call made through the typed client methods.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful response before the payload is decoded into a caller type.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub data: Value,
    pub status: StatusCode,
    pub message: String,
}

impl RawResponse {
    pub fn decode<T: DeserializeOwned>(self) -> Result<ResponseEnvelope<T>, ApiError> {
        let data = serde_json::from_value(self.data).map_err(|e| {
            ApiError::Protocol(format!(
                "Failed to parse response body (status {}): {}",
                self.status.as_u16(),
                e
            ))
        })?;
        Ok(ResponseEnvelope {
            data,
            status: self.status.as_u16(),
            message: self.message,
        })
    }
}

/// Success result returned to callers of the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ResponseEnvelope<T> {
    pub data: T,
    pub status: u16,
    pub message: String,
}

/// What a single executor call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Completed(RawResponse),
    /// The server rejected the bearer credential. `sent_token` is the access
    /// token the request carried, if any.
    Unauthorized {
        sent_token: Option<String>,
        message: String,
        data: Option<Value>,
    },
}
