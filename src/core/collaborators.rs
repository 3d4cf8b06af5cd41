// src/core/collaborators.rs

//! Trait boundary for the configuration-store (CIB) collaborator named in
//! §1's out-of-scope list: an opaque transactional store exposing
//! asynchronous query, update, delete, and change-notification operations
//! (§6.3). Production binaries wire this to the real network-backed client;
//! tests wire it to an in-memory fake.

use async_trait::async_trait;

use crate::core::errors::ConfigStoreError;

/// Consumed as an opaque transactional store exposing asynchronous query,
/// update, and delete operations, per §6.3.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Issues an update of `name` under `(section, host, set)` to `value`,
    /// committing on behalf of `user` if given.
    async fn update(
        &self,
        section: &str,
        host: &str,
        set: &str,
        name: &str,
        value: &str,
        user: Option<&str>,
    ) -> Result<(), ConfigStoreError>;

    /// Issues a delete of `name` under `(section, host, set)`.
    async fn delete(
        &self,
        section: &str,
        host: &str,
        set: &str,
        name: &str,
        user: Option<&str>,
    ) -> Result<(), ConfigStoreError>;

    /// Issues a bulk delete of every attribute name matching `regex` under
    /// `(section, host)`, used by `clear_failure` (§4.1).
    async fn delete_matching(
        &self,
        section: &str,
        host: &str,
        regex: &str,
        user: Option<&str>,
    ) -> Result<(), ConfigStoreError>;

    /// Translates a `clear_failure` request targeting a remote (non-cluster)
    /// node into a configuration-store xpath delete, per §4.1.
    async fn delete_xpath(&self, xpath: &str) -> Result<(), ConfigStoreError>;
}
