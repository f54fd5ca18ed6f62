//! Authentication module for managing credentials and session refresh.
//!
//! This module provides:
//! - `CredentialStore`: The current access/refresh pair, persisted through a
//!   `CredentialBackend` (OS keychain, session file, or memory)
//! - `RefreshCoordinator`: Single-flight refresh of an expired access token
//! - `SessionEvents`: Notifications for the presentation layer when a
//!   session is refreshed or has expired

pub mod credentials;
pub mod events;
pub mod keychain;
pub mod refresh;
pub mod session;

pub use credentials::{CredentialBackend, CredentialStore, Credentials, MemoryBackend};
pub use events::{SessionEvent, SessionEvents};
pub use keychain::KeyringBackend;
pub use refresh::{HttpTokenRefresher, RefreshCoordinator, RefreshResponse, TokenRefresher};
pub use session::{SessionData, SessionFileBackend};
