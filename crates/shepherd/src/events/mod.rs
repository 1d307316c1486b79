//! The durable activity-event log and its per-consumer cursors.
//!
//! Ingestion is decoupled from consumption: the log records what the
//! upstream feed delivered (deduplicated, with gap detection independent of
//! any consumer), while each named [`EventQueue`] tracks how far one
//! consumer has read and whether the log still retains everything since its
//! last checkpoint.
//!
//! # Module Structure
//!
//! - [`log`] - [`EventLog`]: ingestion, gap detection, range reads
//! - [`queue`] - [`EventQueue`]: named cursors with continuity checks

pub mod log;
pub mod queue;

pub use log::{EventLog, IngestOutcome, MalformedPayload};
pub use queue::EventQueue;

use sea_orm::DbErr;
use thiserror::Error;

use crate::github::GitHubError;

/// Errors from event log and cursor operations.
#[derive(Debug, Error)]
pub enum EventError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Upstream fetch failure while downloading events.
    #[error(transparent)]
    Fetch(#[from] GitHubError),
}

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, EventError>;
