//! GitHub API client with conditional-fetch caching.

use backon::Retryable;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, IF_NONE_MATCH};
use sea_orm::DatabaseConnection;
use serde::de::DeserializeOwned;

use super::error::GitHubError;
use super::pagination::Paginated;
use super::types::GitRef;
use crate::api_cache;
use crate::retry::default_backoff;

const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Extract ETag from response headers.
///
/// Returns the ETag value if present, handling both strong and weak ETags.
pub fn extract_etag(headers: &HeaderMap) -> Option<String> {
    headers
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Parse the Link header and return the absolute URL of the next page.
///
/// GitHub Link headers look like:
/// `<https://api.github.com/organizations/123/events?page=2>; rel="next", <...?page=10>; rel="last"`
pub fn parse_next_link(link_header: &str) -> Option<String> {
    for part in link_header.split(',') {
        let mut url = None;
        let mut rel = None;

        for segment in part.trim().split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if rel == Some("next")
            && let Some(url) = url
        {
            return Some(url.to_string());
        }
    }

    None
}

/// A fetched (or revalidated) page of an API response.
#[derive(Debug, Clone)]
pub struct CachedPage {
    /// The response body, fresh or replayed from the cache on 304.
    pub body: String,
    /// Absolute URL of the next page, if the listing continues.
    pub next_url: Option<String>,
}

/// GitHub API client.
///
/// Every GET goes through the response cache: a stored ETag is sent as
/// `If-None-Match`, a 304 reuses the cached body, and a 200 with a new
/// validator replaces the cached entry. Redirect statuses are surfaced as
/// errors rather than followed.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    token: Option<String>,
    base_url: String,
}

impl GitHubClient {
    /// Create a client, optionally authenticated with a personal token.
    pub fn new(token: Option<&str>) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GitHubError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            token: token.map(String::from),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Override the API base URL. Intended for tests against a local stub.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Resolve a route against the base URL. Absolute URLs (as found in
    /// pagination links) pass through unchanged.
    pub(crate) fn absolute(&self, route: &str) -> String {
        if route.starts_with("http://") || route.starts_with("https://") {
            route.to_string()
        } else {
            format!("{}{}", self.base_url, route)
        }
    }

    /// Conditionally GET a URL, revalidating against the response cache.
    ///
    /// - 200: body returned and, when the response carries an ETag, stored
    ///   together with the next-page link.
    /// - 304: the cached body and link are replayed.
    /// - 301/302/307: surfaced as `UnsupportedRedirect`.
    /// - anything else: `Fetch {status, body}`.
    pub async fn get_cached(
        &self,
        db: &DatabaseConnection,
        route: &str,
    ) -> Result<CachedPage, GitHubError> {
        let url = self.absolute(route);
        let cached = api_cache::get(db, &url).await?;
        let cached_etag = cached.as_ref().map(|c| c.etag.clone());

        let response = (|| async {
            let mut request = self
                .http
                .get(&url)
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", "shepherd");

            if let Some(token) = &self.token {
                request = request.header("Authorization", format!("Bearer {token}"));
            }
            if let Some(etag) = &cached_etag {
                request = request.header(IF_NONE_MATCH, etag);
            }

            request.send().await
        })
        .retry(default_backoff())
        .when(|e: &reqwest::Error| e.is_connect() || e.is_timeout())
        .await
        .map_err(|e| GitHubError::Network(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let etag = extract_etag(response.headers());
                let next_url = response
                    .headers()
                    .get("link")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_next_link);

                let body = response
                    .text()
                    .await
                    .map_err(|e| GitHubError::Network(e.to_string()))?;

                tracing::debug!(%url, "fetched");
                if let Some(etag) = etag {
                    api_cache::upsert(db, &url, &etag, &body, next_url.as_deref()).await?;
                }

                Ok(CachedPage { body, next_url })
            }
            StatusCode::NOT_MODIFIED => {
                tracing::debug!(%url, "cached");
                let cached = cached.ok_or_else(|| {
                    GitHubError::internal(format!("304 for {url} without a cached body"))
                })?;
                Ok(CachedPage {
                    body: cached.body,
                    next_url: cached.next_url,
                })
            }
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::TEMPORARY_REDIRECT => {
                Err(GitHubError::UnsupportedRedirect {
                    status: status.as_u16(),
                })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(GitHubError::Fetch {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// GET a URL and decode the (possibly cached) body as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        db: &DatabaseConnection,
        route: &str,
    ) -> Result<T, GitHubError> {
        let url = self.absolute(route);
        let page = self.get_cached(db, &url).await?;
        serde_json::from_str(&page.body).map_err(|e| GitHubError::Decode {
            url,
            message: e.to_string(),
        })
    }

    /// Walk a paginated listing lazily, one page at a time.
    pub fn paginate<'a, T: DeserializeOwned>(
        &'a self,
        db: &'a DatabaseConnection,
        route: &str,
    ) -> Paginated<'a, T> {
        Paginated::new(self, db, self.absolute(route))
    }

    /// Look up the current head hash of a repository branch.
    ///
    /// A missing branch (404) comes back as [`GitHubError::NotFound`], which
    /// callers treat as "unreachable this pass" rather than fatal.
    pub async fn branch_head(
        &self,
        db: &DatabaseConnection,
        repo: &str,
        branch: &str,
    ) -> Result<String, GitHubError> {
        let route = format!("/repos/{repo}/git/refs/heads/{branch}");
        match self.get_json::<GitRef>(db, &route).await {
            Ok(git_ref) => Ok(git_ref.object.sha),
            Err(GitHubError::Fetch { status: 404, .. }) => {
                Err(GitHubError::not_found(format!("{repo}@{branch}")))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_next_link_full() {
        // Real GitHub Link header format
        let header = r#"<https://api.github.com/organizations/5430905/events?page=2>; rel="next", <https://api.github.com/organizations/5430905/events?page=10>; rel="last""#;

        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/organizations/5430905/events?page=2")
        );
    }

    #[test]
    fn test_parse_next_link_only_last() {
        let header = r#"<https://api.github.com/organizations/123/events?page=10>; rel="last""#;
        assert_eq!(parse_next_link(header), None);
    }

    #[test]
    fn test_parse_next_link_empty() {
        assert_eq!(parse_next_link(""), None);
    }

    #[test]
    fn test_parse_next_link_unquoted_rel() {
        let header = "<https://api.github.com/a?page=2>; rel=next";
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/a?page=2")
        );
    }

    #[test]
    fn test_absolute_passes_through_full_urls() {
        let client = GitHubClient::new(None).expect("client");
        assert_eq!(
            client.absolute("https://api.github.com/orgs/boostorg/events?page=2"),
            "https://api.github.com/orgs/boostorg/events?page=2"
        );
        assert_eq!(
            client.absolute("/orgs/boostorg/events"),
            "https://api.github.com/orgs/boostorg/events"
        );
    }

    #[test]
    fn test_with_base_url() {
        let client = GitHubClient::new(None)
            .expect("client")
            .with_base_url("http://127.0.0.1:8080");
        assert_eq!(client.absolute("/x"), "http://127.0.0.1:8080/x");
    }
}
