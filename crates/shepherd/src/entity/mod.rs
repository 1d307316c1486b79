//! SeaORM entity definitions for the shepherd database schema.

pub mod activity_event;
pub mod api_cache;
pub mod ingest_state;
pub mod mirror_entry;
pub mod prelude;
pub mod queue_cursor;
