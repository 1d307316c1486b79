//! The narrow upstream contracts consumed by the reconciler.
//!
//! The reconciler never talks HTTP directly: it asks an [`EventSource`] for
//! fresh feed entries and a [`RemoteRefs`] for authoritative branch heads.
//! [`GitHubUpstream`] implements both over the cached API client; tests
//! substitute canned implementations.

use async_trait::async_trait;
use sea_orm::DatabaseConnection;

use super::client::GitHubClient;
use super::error::GitHubError;
use super::types::RawEvent;

/// Source of upstream activity events, newest-first.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch feed entries until one with id ≤ `last_id` is reached (that
    /// boundary entry is included, so ingestion can tell an overlapping
    /// window from a gap) or the feed's retention window is exhausted.
    async fn fetch_newer_than(&self, last_id: i64) -> Result<Vec<RawEvent>, GitHubError>;
}

/// Authoritative branch-head lookup per repository.
#[async_trait]
pub trait RemoteRefs: Send + Sync {
    /// Current head hash of `repo`'s `branch`.
    ///
    /// Returns [`GitHubError::NotFound`] when the branch does not exist;
    /// callers treat that as "unreachable this pass".
    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String, GitHubError>;
}

/// GitHub-backed implementation of both upstream contracts.
pub struct GitHubUpstream<'a> {
    client: &'a GitHubClient,
    db: &'a DatabaseConnection,
    org: String,
}

impl<'a> GitHubUpstream<'a> {
    pub fn new(client: &'a GitHubClient, db: &'a DatabaseConnection, org: impl Into<String>) -> Self {
        Self {
            client,
            db,
            org: org.into(),
        }
    }
}

#[async_trait]
impl EventSource for GitHubUpstream<'_> {
    async fn fetch_newer_than(&self, last_id: i64) -> Result<Vec<RawEvent>, GitHubError> {
        let route = format!("/orgs/{}/events", self.org);
        let mut pager = self.client.paginate::<RawEvent>(self.db, &route);

        let mut batch = Vec::new();
        while let Some(event) = pager.try_next().await? {
            let seen = event.id <= last_id;
            batch.push(event);
            if seen {
                break;
            }
        }

        Ok(batch)
    }
}

#[async_trait]
impl RemoteRefs for GitHubUpstream<'_> {
    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String, GitHubError> {
        self.client.branch_head(self.db, repo, branch).await
    }
}
