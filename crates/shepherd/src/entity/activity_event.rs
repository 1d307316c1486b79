//! ActivityEvent entity - one row per upstream activity event worth keeping.
//!
//! Events are stored keyed by the upstream-assigned id, which is globally
//! ordered and monotonically increasing. Only pushes and branch creations
//! survive ingestion; every other event kind is discarded before it reaches
//! this table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of activity event retained in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum EventKind {
    /// A push to a branch, carrying before/after commit hashes.
    #[sea_orm(string_value = "push")]
    Push,
    /// A branch (or tag) creation. Tags don't carry a branch name, so the
    /// branch column is always absent for this kind.
    #[sea_orm(string_value = "branch_create")]
    BranchCreate,
}

/// ActivityEvent model - immutable once stored, except for the
/// `sequence_start` flag set during ingestion when a new contiguous run
/// begins.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activity_event")]
pub struct Model {
    /// Upstream-assigned event id. Unique and globally ordered.
    #[sea_orm(primary_key, auto_increment = false)]
    pub source_id: i64,

    /// Event kind (push or branch-create).
    pub kind: EventKind,

    /// Full repository identifier, e.g. `boostorg/align`.
    pub repo: String,

    /// Branch name parsed from the push ref. Absent for branch-create
    /// events.
    pub branch: Option<String>,

    /// Commit hash the push moved the branch away from.
    pub before_hash: Option<String>,

    /// Commit hash the push moved the branch to.
    pub after_hash: Option<String>,

    /// Raw upstream payload, kept for inspection and reporting.
    pub payload: Json,

    /// Upstream creation timestamp.
    pub created_at: DateTimeWithTimeZone,

    /// When this row was written locally.
    pub ingested_at: DateTimeWithTimeZone,

    /// Marks the earliest event of a contiguous run known to this log.
    pub sequence_start: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
