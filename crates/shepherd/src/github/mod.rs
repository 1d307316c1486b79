//! GitHub API access: conditional fetching, pagination and feed types.
//!
//! Everything here goes through the API response cache (ETag revalidation)
//! so that repeated polls of an unchanged feed page cost a 304 instead of a
//! full download.
//!
//! # Module Structure
//!
//! - [`client`] - HTTP client: conditional GET, JSON decoding, ref lookup
//! - [`pagination`] - lazy page-walker over `Link: rel="next"` chains
//! - [`types`] - raw feed and ref payloads as delivered by the API
//! - [`upstream`] - the narrow traits the reconciler consumes, plus their
//!   GitHub-backed implementation

pub mod client;
mod error;
pub mod pagination;
pub mod types;
mod upstream;

pub use client::{CachedPage, GitHubClient, extract_etag, parse_next_link};
pub use error::GitHubError;
pub use pagination::Paginated;
pub use types::{GitRef, OrgRepo, PushPayload, RawEvent, RepoRef};
pub use upstream::{EventSource, GitHubUpstream, RemoteRefs};
