//! Submodule reconciliation.
//!
//! Turns the stream of "push happened" notifications into a correct,
//! idempotent series of superproject commits. Per-event updates chain from
//! the hash the superproject currently records; anything that does not chain
//! is recorded as ignored rather than applied, and a gap in the event feed
//! triggers a full resynchronization against the submodule remotes.
//!
//! # Module Structure
//!
//! - [`submodule`] - per-submodule hash slots and the event transition rules
//! - [`superproject`] - the pass driver: queue replay, full resync, commits
//! - [`message`] - generated commit message forms

pub mod message;
pub mod submodule;
pub mod superproject;

pub use submodule::{EventAction, Submodule, remote_identifier};
pub use superproject::{PassContext, PassReport, SuperProject};

use sea_orm::DbErr;
use thiserror::Error;

use crate::events::EventError;
use crate::github::GitHubError;
use crate::gitops::GitError;

/// Errors that abort a superproject's reconciliation pass.
///
/// Per-event and per-submodule conditions (ignored events, unreachable
/// branches) are handled locally and never surface here; what does surface
/// leaves previously committed state untouched.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Event log or cursor failure.
    #[error(transparent)]
    Events(#[from] EventError),

    /// Upstream fetch failure.
    #[error(transparent)]
    Fetch(#[from] GitHubError),

    /// Local git failure.
    #[error(transparent)]
    Git(#[from] GitError),

    /// A submodule ended up with both a pending and a staged hash. The
    /// chained rules cannot produce this; it is a defect signal, surfaced
    /// loudly rather than auto-resolved.
    #[error("update for {name} does not match the event queue")]
    Conflict { name: String },

    /// The push failed outright mid-pass.
    #[error("push failed: {detail}")]
    PushFailed { detail: String },

    /// Push kept being rejected through the bounded checkout-rebuild cycle.
    #[error("failed to push to {module}")]
    PushRetriesExhausted { module: String },

    /// Invariant violation in the pass driver itself.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
