//! # Credential Store
//!
//! The persistent user table and the cache-aside layer in front of it.
//!
//! ## Components
//! - **UserRecord**: `{username, salt, verifier}`, the minimal schema the
//!   authentication path needs. Salt and verifier are hex strings.
//! - **UserStore**: the persistence seam; [`FileUserStore`] is the bundled
//!   bincode-on-disk implementation.
//! - **CredentialCache**: in-memory cache with sliding expiration and a flat
//!   snapshot file rewritten on every mutation.

pub mod cache;
pub mod file_store;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use cache::CredentialCache;
pub use file_store::FileUserStore;

/// One stored user. Immutable once created except by explicit removal; the
/// verifier never leaves the server side after signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// Hex-encoded signup salt.
    pub salt: String,
    /// Hex-encoded SRP verifier, stored in place of the password.
    pub verifier: String,
}

/// Persistence seam for the credential cache.
///
/// Implementations are shared across connections; calls may run concurrently
/// and are additionally gated by the cache's semaphore.
pub trait UserStore: Send + Sync {
    /// Fetch a user by name. `Ok(None)` is the expected "not found" outcome,
    /// not an error.
    fn get(&self, username: &str) -> BoxFuture<'_, Result<Option<UserRecord>>>;

    /// Insert a user if absent. Returns `false` when the name already existed
    /// (the stored record is left untouched).
    fn insert(&self, user: UserRecord) -> BoxFuture<'_, Result<bool>>;

    /// Remove a user. Returns `false` when the name was not present.
    fn remove(&self, username: &str) -> BoxFuture<'_, Result<bool>>;
}
