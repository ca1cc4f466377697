//! HTTP-backed collaborator clients, the production implementation of the
//! traits in [`super`]. Grounded on `control::services::builds_root`'s GCS
//! backend: a thin struct holding a pre-built `reqwest::Client` and a base
//! URL, with one method call per remote operation.

use async_trait::async_trait;
use serde::Deserialize;

use super::{http_client, DirectoryError, TargetCatalogService, UserDirectoryService};

#[derive(Debug)]
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpUserDirectory {
    pub fn new(base_url: reqwest::Url) -> Self {
        HttpUserDirectory {
            client: http_client(),
            base_url,
        }
    }
}

#[derive(Deserialize)]
struct AuthenticateReply {
    user_id: Option<String>,
}

#[async_trait]
impl UserDirectoryService for HttpUserDirectory {
    async fn authenticate(&self, token: &str) -> Result<Option<String>, DirectoryError> {
        let url = self
            .base_url
            .join("managers/authenticate")
            .expect("relative path is a valid URL join");
        let reply: AuthenticateReply = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .json()
            .await?;
        Ok(reply.user_id)
    }
}

#[derive(Debug)]
pub struct HttpTargetCatalog {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpTargetCatalog {
    pub fn new(base_url: reqwest::Url) -> Self {
        HttpTargetCatalog {
            client: http_client(),
            base_url,
        }
    }
}

#[derive(Deserialize)]
struct TargetReply {
    owner: Option<String>,
}

#[async_trait]
impl TargetCatalogService for HttpTargetCatalog {
    async fn owner(&self, target_id: &str) -> Result<Option<String>, DirectoryError> {
        let url = self
            .base_url
            .join(&format!("targets/{target_id}"))
            .expect("target id does not contain URL-breaking characters");
        let reply: TargetReply = self.client.get(url).send().await?.json().await?;
        Ok(reply.owner)
    }

    async fn register_shard(&self, target_id: &str, shard_name: &str) -> Result<(), DirectoryError> {
        let url = self
            .base_url
            .join(&format!("targets/{target_id}/shards"))
            .expect("target id does not contain URL-breaking characters");
        self.client
            .post(url)
            .json(&serde_json::json!({ "shard": shard_name }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
