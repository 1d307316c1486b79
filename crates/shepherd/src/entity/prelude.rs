//! Common re-exports for convenient entity usage.

pub use super::activity_event::{
    ActiveModel as ActivityEventActiveModel, Column as ActivityEventColumn,
    Entity as ActivityEvent, EventKind, Model as ActivityEventModel,
};
pub use super::api_cache::{
    ActiveModel as ApiCacheActiveModel, Column as ApiCacheColumn, Entity as ApiCache,
    Model as ApiCacheModel,
};
pub use super::ingest_state::{
    ActiveModel as IngestStateActiveModel, Column as IngestStateColumn, Entity as IngestState,
    FEED_STATE, Model as IngestStateModel,
};
pub use super::mirror_entry::{
    ActiveModel as MirrorEntryActiveModel, Column as MirrorEntryColumn, Entity as MirrorEntry,
    Model as MirrorEntryModel,
};
pub use super::queue_cursor::{
    ActiveModel as QueueCursorActiveModel, Column as QueueCursorColumn, Entity as QueueCursor,
    Model as QueueCursorModel,
};
