//! Named read cursors over the event log.
//!
//! Each consumer owns one cursor, created on first use. The cursor snapshots
//! the log bounds when opened; [`EventQueue::download_more_events`] re-reads
//! them after ingesting, so a consumer can narrow the window between
//! evaluating the feed and acting on it.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use super::Result;
use super::log::{EventLog, IngestOutcome};
use crate::entity::activity_event::{self, EventKind};
use crate::entity::queue_cursor;
use crate::github::EventSource;

/// A named, optionally kind-filtered read pointer over the event log.
pub struct EventQueue<'a> {
    log: &'a EventLog,
    name: String,
    kind_filter: Option<EventKind>,
    read_position: i64,
    start_id: i64,
    last_id: i64,
}

impl<'a> EventQueue<'a> {
    /// Open the named cursor, creating it at position zero on first use.
    pub async fn open(
        log: &'a EventLog,
        name: &str,
        kind_filter: Option<EventKind>,
    ) -> Result<EventQueue<'a>> {
        let existing = queue_cursor::Entity::find_by_id(name)
            .one(log.connection())
            .await?;

        let read_position = match existing {
            Some(cursor) => cursor.read_position,
            None => {
                queue_cursor::ActiveModel {
                    name: Set(name.to_string()),
                    kind_filter: Set(kind_filter),
                    read_position: Set(0),
                    updated_at: Set(Utc::now().fixed_offset()),
                }
                .insert(log.connection())
                .await?;
                0
            }
        };

        let state = log.state().await?;

        Ok(Self {
            log,
            name: name.to_string(),
            kind_filter,
            read_position,
            start_id: state.start_id,
            last_id: state.last_id,
        })
    }

    /// The consumer name this cursor belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last source id this consumer has fully processed.
    pub fn read_position(&self) -> i64 {
        self.read_position
    }

    /// Highest source id visible to this cursor.
    pub fn last_id(&self) -> i64 {
        self.last_id
    }

    /// True iff no events were lost to the feed's bounded retention between
    /// this cursor's last checkpoint and what the log now holds. When this
    /// is false the consumer must resynchronize from ground truth.
    pub fn continued_from_last_run(&self) -> bool {
        self.start_id != 0 && self.read_position >= self.start_id
    }

    /// Events in `(since ?? read_position, last_id]`, ascending, filtered by
    /// this cursor's kind. Does not advance the cursor.
    pub async fn events(&self, since: Option<i64>) -> Result<Vec<activity_event::Model>> {
        let since = since.unwrap_or(self.read_position);
        self.log
            .events_in(since, self.last_id, self.kind_filter)
            .await
    }

    /// Advance the cursor monotonically; a position at or below the current
    /// one is a no-op.
    pub async fn mark_read_up_to(&mut self, source_id: i64) -> Result<()> {
        if source_id <= self.read_position {
            return Ok(());
        }

        queue_cursor::ActiveModel {
            name: Set(self.name.clone()),
            read_position: Set(source_id),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(self.log.connection())
        .await?;

        self.read_position = source_id;
        Ok(())
    }

    /// Mark everything currently in the log as read. Used after a full
    /// resynchronization.
    pub async fn mark_all_read(&mut self) -> Result<()> {
        self.mark_read_up_to(self.last_id).await
    }

    /// Ingest fresh events from the live feed, then refresh this cursor's
    /// view of the log bounds.
    pub async fn download_more_events(
        &mut self,
        source: &dyn EventSource,
    ) -> Result<IngestOutcome> {
        let outcome = self.log.download(source).await?;

        let state = self.log.state().await?;
        self.start_id = state.start_id;
        self.last_id = state.last_id;

        Ok(outcome)
    }
}

#[cfg(all(test, feature = "migrate"))]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::github::{RawEvent, RepoRef};

    fn push_event(id: i64, repo: &str) -> RawEvent {
        RawEvent {
            id,
            kind: "PushEvent".to_string(),
            repo: RepoRef {
                name: repo.to_string(),
            },
            payload: serde_json::json!({
                "ref": "refs/heads/develop",
                "before": format!("h{}", id - 1),
                "head": format!("h{id}"),
            }),
            created_at: Utc::now(),
        }
    }

    async fn test_log() -> EventLog {
        let db = crate::db::connect_and_migrate("sqlite::memory:")
            .await
            .expect("migrated in-memory db");
        EventLog::new(db)
    }

    #[tokio::test]
    async fn fresh_cursor_lacks_continuity_until_marked() {
        let log = test_log().await;
        log.ingest(vec![push_event(10, "boostorg/align")])
            .await
            .expect("ingest");

        let mut queue = EventQueue::open(&log, "develop", Some(EventKind::Push))
            .await
            .expect("open");
        assert!(!queue.continued_from_last_run());

        queue.mark_all_read().await.expect("mark");
        assert_eq!(queue.read_position(), 10);

        let queue = EventQueue::open(&log, "develop", Some(EventKind::Push))
            .await
            .expect("reopen");
        assert!(queue.continued_from_last_run());
    }

    #[tokio::test]
    async fn cursor_predating_a_gap_loses_continuity() {
        let log = test_log().await;
        log.ingest(vec![push_event(10, "boostorg/align")])
            .await
            .expect("ingest");

        let mut queue = EventQueue::open(&log, "develop", None).await.expect("open");
        queue.mark_all_read().await.expect("mark");

        // A later batch that does not connect moves start_id past the cursor.
        log.ingest(vec![push_event(50, "boostorg/align")])
            .await
            .expect("ingest gap");

        let queue = EventQueue::open(&log, "develop", None).await.expect("open");
        assert!(!queue.continued_from_last_run());
    }

    #[tokio::test]
    async fn events_does_not_advance_and_mark_is_monotonic() {
        let log = test_log().await;
        log.ingest(vec![
            push_event(12, "boostorg/core"),
            push_event(11, "boostorg/align"),
        ])
        .await
        .expect("ingest");

        let mut queue = EventQueue::open(&log, "develop", Some(EventKind::Push))
            .await
            .expect("open");

        let events = queue.events(None).await.expect("events");
        assert_eq!(
            events.iter().map(|e| e.source_id).collect::<Vec<_>>(),
            vec![11, 12]
        );
        assert_eq!(queue.read_position(), 0);

        queue.mark_read_up_to(11).await.expect("mark");
        let events = queue.events(None).await.expect("events");
        assert_eq!(
            events.iter().map(|e| e.source_id).collect::<Vec<_>>(),
            vec![12]
        );

        // Regressions are ignored.
        queue.mark_read_up_to(5).await.expect("mark");
        assert_eq!(queue.read_position(), 11);
    }

    #[tokio::test]
    async fn independent_cursors_do_not_interfere() {
        let log = test_log().await;
        log.ingest(vec![push_event(11, "boostorg/align")])
            .await
            .expect("ingest");

        let mut develop = EventQueue::open(&log, "develop", None).await.expect("open");
        let mirror = EventQueue::open(&log, "mirror", None).await.expect("open");

        develop.mark_all_read().await.expect("mark");

        let mirror_reopened = EventQueue::open(&log, "mirror", None).await.expect("open");
        assert_eq!(mirror.read_position(), 0);
        assert_eq!(mirror_reopened.read_position(), 0);
        assert!(!mirror_reopened.continued_from_last_run());
    }
}
