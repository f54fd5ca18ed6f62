//! API client for communicating with the HRMS REST API.
//!
//! This module provides the `ApiClient` struct: typed get/post/put/patch/delete
//! calls that hide credential expiry from the caller. A 401 triggers one
//! shared refresh and one replay of the original request; if the refresh
//! itself fails the caller gets [`ApiError::AuthExpired`] and subscribers
//! receive [`SessionEvent::Expired`].

use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::executor::RequestExecutor;
use super::request::{Execution, RawResponse, RequestConfig, RequestDescriptor, ResponseEnvelope};
use super::ApiError;
use crate::auth::{
    CredentialStore, Credentials, HttpTokenRefresher, RefreshCoordinator, SessionEvent,
    SessionEvents, TokenRefresher,
};
use crate::config::Config;
use crate::models::{PaginatedResponse, QueryParams};

/// Clone is cheap - the executor and refresh state are shared.
#[derive(Clone)]
pub struct ApiClient {
    executor: Arc<RequestExecutor>,
    refresh: RefreshCoordinator,
}

impl ApiClient {
    /// Create a client over an existing credential store.
    pub fn new(config: &Config, store: Arc<CredentialStore>) -> Result<Self> {
        let executor = Arc::new(RequestExecutor::new(config, store)?);
        let refresher = Arc::new(HttpTokenRefresher::new(Arc::clone(&executor)));
        Ok(Self::assemble(config, executor, refresher))
    }

    /// Create a client whose refresh call is made by `refresher`.
    pub fn with_refresher(
        config: &Config,
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Result<Self> {
        let executor = Arc::new(RequestExecutor::new(config, store)?);
        Ok(Self::assemble(config, executor, refresher))
    }

    /// Create a client and restore the persisted session the config points at.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(config.credential_store()?);
        Self::new(config, store)
    }

    fn assemble(
        config: &Config,
        executor: Arc<RequestExecutor>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let refresh = RefreshCoordinator::new(
            Arc::clone(executor.store()),
            refresher,
            SessionEvents::new(),
            config.refresh_timeout(),
        );
        Self { executor, refresh }
    }

    // ===== Session =====

    /// Store the credential pair obtained at login.
    pub fn login(&self, credentials: Credentials) {
        self.executor.store().set(credentials);
    }

    pub fn logout(&self) {
        self.executor.store().clear();
    }

    pub fn is_authenticated(&self) -> bool {
        self.executor.store().is_authenticated()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.executor.store().get()
    }

    /// Receive `Refreshed` / `Expired` notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.refresh.events().subscribe()
    }

    /// Number of refresh calls made so far
    pub fn refresh_count(&self) -> u64 {
        self.refresh.refresh_count()
    }

    pub fn base_url(&self) -> &str {
        self.executor.base_url()
    }

    // ===== Requests =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ResponseEnvelope<T>, ApiError> {
        self.get_with(path, &RequestConfig::default()).await
    }

    /// `get` with per-call headers, query parameters, or timeout.
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        config: &RequestConfig,
    ) -> Result<ResponseEnvelope<T>, ApiError> {
        self.request(RequestDescriptor::get(path).with_config(config))
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ResponseEnvelope<T>, ApiError> {
        self.post_with(path, body, &RequestConfig::default()).await
    }

    pub async fn post_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        config: &RequestConfig,
    ) -> Result<ResponseEnvelope<T>, ApiError> {
        self.request(RequestDescriptor::post(path).json(body)?.with_config(config))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ResponseEnvelope<T>, ApiError> {
        self.put_with(path, body, &RequestConfig::default()).await
    }

    pub async fn put_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        config: &RequestConfig,
    ) -> Result<ResponseEnvelope<T>, ApiError> {
        self.request(RequestDescriptor::put(path).json(body)?.with_config(config))
            .await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ResponseEnvelope<T>, ApiError> {
        self.patch_with(path, body, &RequestConfig::default()).await
    }

    pub async fn patch_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        config: &RequestConfig,
    ) -> Result<ResponseEnvelope<T>, ApiError> {
        self.request(RequestDescriptor::patch(path).json(body)?.with_config(config))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ResponseEnvelope<T>, ApiError> {
        self.delete_with(path, &RequestConfig::default()).await
    }

    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        path: &str,
        config: &RequestConfig,
    ) -> Result<ResponseEnvelope<T>, ApiError> {
        self.request(RequestDescriptor::delete(path).with_config(config))
            .await
    }

    /// Fetch one page of a list endpoint.
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> Result<ResponseEnvelope<PaginatedResponse<T>>, ApiError> {
        self.request(RequestDescriptor::get(path).queries(params.to_query()))
            .await
    }

    /// Send an arbitrary request and decode its payload into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<ResponseEnvelope<T>, ApiError> {
        self.send(&descriptor).await?.decode()
    }

    /// Execute, and on 401 refresh once and replay once.
    async fn send(&self, descriptor: &RequestDescriptor) -> Result<RawResponse, ApiError> {
        let sent_token = match self.executor.execute(descriptor).await? {
            Execution::Completed(raw) => return Ok(raw),
            Execution::Unauthorized { sent_token, .. } => sent_token,
        };

        debug!(path = %descriptor.path, "Access token rejected, ensuring a fresh credential");
        let credentials = self.refresh.ensure_fresh(sent_token.as_deref()).await?;

        match self.executor.execute_as(descriptor, Some(&credentials)).await? {
            Execution::Completed(raw) => Ok(raw),
            Execution::Unauthorized { message, data, .. } => {
                warn!(path = %descriptor.path, "Request rejected again after refresh");
                Err(ApiError::Unauthorized { message, data })
            }
        }
    }
}
