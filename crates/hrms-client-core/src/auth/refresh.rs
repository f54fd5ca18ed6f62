//! Single-flight access token refresh.
//!
//! When a request comes back 401, its caller asks [`RefreshCoordinator`] for
//! a fresh credential. The first caller of an expiry episode starts exactly
//! one refresh call on a spawned task; everyone arriving while it runs awaits
//! the same shared outcome. The task updates or clears the credential store
//! before the outcome resolves, so no waiter can retry with a stale token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::credentials::{CredentialStore, Credentials};
use super::events::{SessionEvent, SessionEvents};
use crate::api::error::TRANSPORT_FAILURE_STATUS;
use crate::api::{ApiError, Execution, RequestDescriptor, RequestExecutor};

/// Path of the refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "/auth/refresh";

const NOT_AUTHENTICATED_MESSAGE: &str = "Not authenticated (no stored credentials)";
const REFRESH_TIMEOUT_MESSAGE: &str = "Token refresh timed out";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Body returned by the refresh endpoint. The refresh token is only present
/// when the server rotates it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Performs the refresh call itself.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError>;
}

/// `POST <base>/auth/refresh {refreshToken}` through the request executor,
/// sent without a bearer header.
pub struct HttpTokenRefresher {
    executor: Arc<RequestExecutor>,
}

impl HttpTokenRefresher {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let descriptor = RequestDescriptor::post(REFRESH_PATH).json(&RefreshRequest { refresh_token })?;

        let raw = match self.executor.execute_as(&descriptor, None).await? {
            Execution::Completed(raw) => raw,
            Execution::Unauthorized { message, data, .. } => {
                return Err(ApiError::Http {
                    status: 401,
                    message,
                    data,
                })
            }
        };

        let response: RefreshResponse = serde_json::from_value(raw.data)
            .map_err(|e| ApiError::Protocol(format!("Malformed refresh response: {}", e)))?;
        if response.access_token.is_empty() {
            return Err(ApiError::Protocol(
                "Malformed refresh response: empty accessToken".to_string(),
            ));
        }
        Ok(response)
    }
}

type RefreshOutcome = Shared<BoxFuture<'static, Result<Credentials, ApiError>>>;

enum RefreshState {
    Idle,
    InFlight { episode: u64, outcome: RefreshOutcome },
}

struct Inner {
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    events: SessionEvents,
    timeout: Duration,
    state: Mutex<RefreshState>,
    episodes: AtomicU64,
}

/// Owns the refresh state machine: `Idle -> InFlight -> Idle`.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        events: SessionEvents,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                refresher,
                events,
                timeout,
                state: Mutex::new(RefreshState::Idle),
                episodes: AtomicU64::new(0),
            }),
        }
    }

    /// Return credentials newer than `stale_token`, refreshing if needed.
    ///
    /// `stale_token` is the access token the rejected request carried. If the
    /// store already holds a different one, an earlier episode has refreshed
    /// it and no new refresh is started.
    ///
    /// # Errors
    /// Returns [`ApiError::AuthExpired`] when there is nothing to refresh or
    /// the refresh failed. In both cases the store is empty afterwards.
    pub async fn ensure_fresh(&self, stale_token: Option<&str>) -> Result<Credentials, ApiError> {
        let outcome = {
            let mut state = self.inner.lock_state();
            let joined = match &*state {
                RefreshState::InFlight { episode, outcome } => Some((*episode, outcome.clone())),
                RefreshState::Idle => None,
            };

            match joined {
                Some((episode, outcome)) => {
                    debug!(episode, "Joining in-flight token refresh");
                    outcome
                }
                None => {
                    let credentials = match self.inner.store.get() {
                        Some(credentials) => credentials,
                        None => {
                            debug!("No credentials to refresh");
                            return Err(ApiError::AuthExpired {
                                status: 401,
                                message: NOT_AUTHENTICATED_MESSAGE.to_string(),
                                data: None,
                            });
                        }
                    };

                    if stale_token != Some(credentials.access_token.as_str()) {
                        debug!("Stored credential is newer than the rejected one");
                        return Ok(credentials);
                    }

                    let episode = self.inner.episodes.fetch_add(1, Ordering::SeqCst) + 1;
                    let outcome = Inner::spawn_refresh(
                        Arc::clone(&self.inner),
                        episode,
                        credentials.refresh_token,
                    );
                    *state = RefreshState::InFlight {
                        episode,
                        outcome: outcome.clone(),
                    };
                    outcome
                }
            }
        };

        outcome.await
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(&*self.inner.lock_state(), RefreshState::InFlight { .. })
    }

    /// Number of refresh calls started since creation
    pub fn refresh_count(&self) -> u64 {
        self.inner.episodes.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &SessionEvents {
        &self.inner.events
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the refresh on its own task so that dropping any waiter,
    /// including the one that triggered it, never cancels it.
    fn spawn_refresh(inner: Arc<Inner>, episode: u64, refresh_token: String) -> RefreshOutcome {
        let task = tokio::spawn({
            let inner = Arc::clone(&inner);
            async move { inner.run_refresh(episode, refresh_token).await }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(episode, error = %e, "Token refresh task aborted");
                    let result = Err(ApiError::AuthExpired {
                        status: TRANSPORT_FAILURE_STATUS,
                        message: format!("Token refresh task aborted: {}", e),
                        data: None,
                    });
                    inner.finish(episode, &result).await;
                    result
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn run_refresh(&self, episode: u64, refresh_token: String) -> Result<Credentials, ApiError> {
        info!(episode, "Refreshing access token");

        let result = match tokio::time::timeout(self.timeout, self.refresher.refresh(&refresh_token)).await
        {
            Ok(Ok(response)) => Ok(Credentials {
                access_token: response.access_token,
                refresh_token: response.refresh_token.unwrap_or(refresh_token),
            }),
            Ok(Err(e)) => Err(e.into_auth_expired()),
            Err(_) => Err(ApiError::AuthExpired {
                status: TRANSPORT_FAILURE_STATUS,
                message: REFRESH_TIMEOUT_MESSAGE.to_string(),
                data: None,
            }),
        };

        self.finish(episode, &result).await;
        result
    }

    /// Apply the outcome to the store, notify, and return to `Idle`.
    async fn finish(&self, episode: u64, result: &Result<Credentials, ApiError>) {
        // Backend writes hit the keychain or disk
        let store = Arc::clone(&self.store);
        let update = result.as_ref().ok().cloned();
        let applied = tokio::task::spawn_blocking(move || match update {
            Some(credentials) => store.set(credentials),
            None => store.clear(),
        })
        .await;
        if let Err(e) = applied {
            error!(episode, error = %e, "Credential store update did not complete");
        }

        match result {
            Ok(_) => {
                info!(episode, "Access token refreshed");
                self.events.publish(SessionEvent::Refreshed);
            }
            Err(e) => {
                warn!(episode, status = e.status(), error = %e, "Token refresh failed, session expired");
                self.events.publish(SessionEvent::Expired {
                    message: e.message(),
                });
            }
        }

        let mut state = self.lock_state();
        if matches!(&*state, RefreshState::InFlight { episode: current, .. } if *current == episode) {
            *state = RefreshState::Idle;
        }
    }
}
