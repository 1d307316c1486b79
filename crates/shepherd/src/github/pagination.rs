//! Lazy pagination over `Link: rel="next"` chains.
//!
//! The feed is consumed strictly newest-first and callers usually stop as
//! soon as they reach an event they have already seen, so pages are fetched
//! on demand rather than eagerly walking the whole listing.

use std::collections::VecDeque;

use sea_orm::DatabaseConnection;
use serde::de::DeserializeOwned;

use super::client::GitHubClient;
use super::error::GitHubError;

/// A lazily-fetched paginated sequence of `T`.
///
/// Each page goes through the conditional-fetch cache; the next page URL is
/// whatever the previous response's Link header said.
pub struct Paginated<'a, T> {
    client: &'a GitHubClient,
    db: &'a DatabaseConnection,
    next_url: Option<String>,
    buffer: VecDeque<T>,
}

impl<'a, T: DeserializeOwned> Paginated<'a, T> {
    pub(crate) fn new(client: &'a GitHubClient, db: &'a DatabaseConnection, url: String) -> Self {
        Self {
            client,
            db,
            next_url: Some(url),
            buffer: VecDeque::new(),
        }
    }

    /// Yield the next item, fetching further pages as needed.
    ///
    /// Returns `Ok(None)` once the listing is exhausted.
    pub async fn try_next(&mut self) -> Result<Option<T>, GitHubError> {
        while self.buffer.is_empty() {
            let Some(url) = self.next_url.take() else {
                return Ok(None);
            };

            let page = self.client.get_cached(self.db, &url).await?;
            let items: Vec<T> =
                serde_json::from_str(&page.body).map_err(|e| GitHubError::Decode {
                    url,
                    message: e.to_string(),
                })?;

            self.next_url = page.next_url;
            self.buffer.extend(items);
        }

        Ok(self.buffer.pop_front())
    }
}
