//! Clients for the two external collaborators the shard treats as opaque
//! (`spec.md` §1): the **user / auth store** (bearer token -> manager
//! identity) and the **target catalog** (target -> owner, plus the shard
//! list a target records itself into). Both are out of scope to implement;
//! this module only specifies the interface the shard consumes, following
//! the trait-object-plus-thin-wrapper shape of `control::services::builds_root`
//! so a real HTTP-backed collaborator and an in-memory fake share one seam.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

mod http;
mod memory;

pub use http::{HttpTargetCatalog, HttpUserDirectory};
pub use memory::{InMemoryTargetCatalog, InMemoryUserDirectory};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("collaborator request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Resolves a manager's bearer token to their user id. The shard calls this
/// read-only (`spec.md` §1, "User / auth store").
#[async_trait]
trait UserDirectoryService: std::fmt::Debug + Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Option<String>, DirectoryError>;
}

#[derive(Debug, Clone)]
pub struct UserDirectory(Arc<dyn UserDirectoryService>);

impl UserDirectory {
    fn new(inner: Arc<dyn UserDirectoryService>) -> Self {
        UserDirectory(inner)
    }

    pub fn http(base_url: reqwest::Url) -> Self {
        UserDirectory::new(Arc::new(HttpUserDirectory::new(base_url)))
    }

    pub fn in_memory(tokens: HashMap<String, String>) -> Self {
        UserDirectory::new(Arc::new(InMemoryUserDirectory::new(tokens)))
    }

    /// `None` if the token is unknown -- the caller maps that to a 401
    /// (`spec.md` §4.4, manager auth).
    pub async fn authenticate(&self, token: &str) -> Result<Option<String>, DirectoryError> {
        self.0.authenticate(token).await
    }
}

/// Reads target ownership and records this shard in a target's shard list.
/// The target catalog is the system of record; the shard only reads and
/// appends (`spec.md` §1, "Target catalog").
#[async_trait]
trait TargetCatalogService: std::fmt::Debug + Send + Sync {
    async fn owner(&self, target_id: &str) -> Result<Option<String>, DirectoryError>;
    async fn register_shard(&self, target_id: &str, shard_name: &str) -> Result<(), DirectoryError>;
}

#[derive(Debug, Clone)]
pub struct TargetCatalog(Arc<dyn TargetCatalogService>);

impl TargetCatalog {
    fn new(inner: Arc<dyn TargetCatalogService>) -> Self {
        TargetCatalog(inner)
    }

    pub fn http(base_url: reqwest::Url) -> Self {
        TargetCatalog::new(Arc::new(HttpTargetCatalog::new(base_url)))
    }

    pub fn in_memory() -> Self {
        TargetCatalog::new(Arc::new(InMemoryTargetCatalog::default()))
    }

    /// Wraps a caller-held `Arc<InMemoryTargetCatalog>` instead of creating
    /// a fresh one, so tests can seed owners through the same instance the
    /// shard reads from.
    pub fn in_memory_shared(inner: Arc<InMemoryTargetCatalog>) -> Self {
        TargetCatalog::new(inner)
    }

    pub async fn owner(&self, target_id: &str) -> Result<Option<String>, DirectoryError> {
        self.0.owner(target_id).await
    }

    pub async fn register_shard(&self, target_id: &str, shard_name: &str) -> Result<(), DirectoryError> {
        self.0.register_shard(target_id, shard_name).await
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(REQUEST_TIMEOUT)
        .build()
        .expect("reqwest client config is static and valid")
}
