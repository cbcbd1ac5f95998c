//! Clients for the relationship, group and session domains consumed by sync.
//!
//! Each domain answers `GET {base}/internal/v1/users/{user_id}/{section}` with
//! `{"items": [...]}`; `?since=<unix ms>` restricts the answer to entities
//! updated strictly after that instant.

use crate::error::{AppError, AppResult};
use crate::models::{FriendSummary, GroupSummary, SessionSummary};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait RelationshipDomain: Send + Sync {
    async fn friends(&self, user_id: Uuid, since: Option<i64>) -> AppResult<Vec<FriendSummary>>;
}

#[async_trait]
pub trait GroupDomain: Send + Sync {
    async fn groups(&self, user_id: Uuid, since: Option<i64>) -> AppResult<Vec<GroupSummary>>;
}

#[async_trait]
pub trait SessionDomain: Send + Sync {
    async fn sessions(&self, user_id: Uuid, since: Option<i64>) -> AppResult<Vec<SessionSummary>>;
}

#[derive(Deserialize)]
struct ItemsEnvelope<T> {
    items: Vec<T>,
}

/// HTTP client for one domain service
#[derive(Clone)]
pub struct HttpDomainClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpDomainClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client error: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        user_id: Uuid,
        section: &str,
        since: Option<i64>,
    ) -> AppResult<Vec<T>> {
        let url = format!("{}/internal/v1/users/{}/{}", self.base_url, user_id, section);

        let mut request = self.http_client.get(&url);
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "{url} answered {}",
                response.status()
            )));
        }

        let body: ItemsEnvelope<T> = response.json().await?;
        Ok(body.items)
    }
}

#[async_trait]
impl RelationshipDomain for HttpDomainClient {
    async fn friends(&self, user_id: Uuid, since: Option<i64>) -> AppResult<Vec<FriendSummary>> {
        self.fetch(user_id, "friends", since).await
    }
}

#[async_trait]
impl GroupDomain for HttpDomainClient {
    async fn groups(&self, user_id: Uuid, since: Option<i64>) -> AppResult<Vec<GroupSummary>> {
        self.fetch(user_id, "groups", since).await
    }
}

#[async_trait]
impl SessionDomain for HttpDomainClient {
    async fn sessions(&self, user_id: Uuid, since: Option<i64>) -> AppResult<Vec<SessionSummary>> {
        self.fetch(user_id, "sessions", since).await
    }
}
