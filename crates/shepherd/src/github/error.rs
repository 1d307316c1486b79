use thiserror::Error;

use crate::api_cache::CacheError;

/// Errors that can occur when talking to the upstream API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The upstream returned a non-success status. Aborts the pass.
    #[error("upstream returned {status}: {body}")]
    Fetch { status: u16, body: String },

    /// Resource missing (e.g. a branch ref). Recoverable per submodule.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Redirect statuses are not followed; a relocated endpoint needs a
    /// configuration change, not a silent rewrite.
    #[error("unsupported redirect status {status}")]
    UnsupportedRedirect { status: u16 },

    /// Network or connection error after retries.
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not decode as the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Response cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Unexpected/internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GitHubError {
    /// Create a not found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
