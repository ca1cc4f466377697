//! In-memory fakes for the external collaborators, used by integration
//! tests and local/dev runs without the real router or target catalog
//! deployed, mirroring `control::services::builds_root`'s `local.rs`
//! file-backed stand-in for cloud storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{DirectoryError, TargetCatalogService, UserDirectoryService};

#[derive(Debug)]
pub struct InMemoryUserDirectory {
    tokens: HashMap<String, String>,
}

impl InMemoryUserDirectory {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        InMemoryUserDirectory { tokens }
    }
}

#[async_trait]
impl UserDirectoryService for InMemoryUserDirectory {
    async fn authenticate(&self, token: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.tokens.get(token).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTargetCatalog {
    owners: Mutex<HashMap<String, String>>,
    shards: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryTargetCatalog {
    pub fn with_owners(owners: HashMap<String, String>) -> Self {
        InMemoryTargetCatalog {
            owners: Mutex::new(owners),
            shards: Mutex::new(HashMap::new()),
        }
    }

    /// Test/dev seeding helper: declares `target_id`'s owner without going
    /// through `register_shard`.
    pub fn set_owner(&self, target_id: &str, owner: &str) {
        self.owners.lock().expect("lock poisoned").insert(target_id.to_owned(), owner.to_owned());
    }
}

#[async_trait]
impl TargetCatalogService for InMemoryTargetCatalog {
    async fn owner(&self, target_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.owners.lock().expect("lock poisoned").get(target_id).cloned())
    }

    async fn register_shard(&self, target_id: &str, shard_name: &str) -> Result<(), DirectoryError> {
        let mut shards = self.shards.lock().expect("lock poisoned");
        let entry = shards.entry(target_id.to_owned()).or_default();
        if !entry.iter().any(|s| s == shard_name) {
            entry.push(shard_name.to_owned());
        }
        Ok(())
    }
}
