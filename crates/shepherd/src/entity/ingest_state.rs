//! IngestState entity - the overall state of the upstream event feed.
//!
//! A single row tracks the bounds of the contiguous run of events currently
//! held: every event with id in `(start_id, last_id]` is present in the log
//! with no holes. Ingestion advances `last_id` in the same transaction as
//! the rows it inserts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Name of the well-known feed state row.
pub const FEED_STATE: &str = "github-feed";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ingest_state")]
pub struct Model {
    /// Feed identifier. A single process tracks one feed.
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,

    /// Lower bound of the oldest contiguous run currently held.
    /// Zero means no run boundary has been recorded yet.
    pub start_id: i64,

    /// Highest source id ever ingested.
    pub last_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
