//! QueueCursor entity - a named read pointer over the event log.
//!
//! Each downstream consumer owns one cursor, created on first use and
//! advanced only by that consumer. Continuity against the log's retained
//! window is judged by comparing `read_position` with the feed state's
//! `start_id`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::activity_event::EventKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "queue_cursor")]
pub struct Model {
    /// Consumer name, e.g. the tracked submodule branch, or `mirror`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,

    /// Optional kind filter applied when reading events.
    pub kind_filter: Option<EventKind>,

    /// Last source id this consumer has fully processed.
    pub read_position: i64,

    /// When the cursor last moved.
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
