//! The durable, deduplicated log of upstream activity events.
//!
//! The upstream feed only retains a bounded recent window. If polling falls
//! behind, events are permanently lost from the feed, so ingestion tracks
//! the contiguity of what it has stored: every event id in
//! `(start_id, last_id]` is present with no holes, and a batch that does not
//! connect to `last_id` records a new run boundary. Consumers whose cursor
//! predates the boundary know they must resynchronize from ground truth
//! instead of trusting an incomplete delta.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use thiserror::Error;

use super::Result;
use crate::entity::activity_event::{self, EventKind};
use crate::entity::ingest_state::{self, FEED_STATE};
use crate::github::{EventSource, PushPayload, RawEvent};

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Events persisted by this call.
    pub stored: usize,
    /// Events discarded (uninteresting kinds or malformed payloads).
    pub dropped: usize,
    /// New high-water mark, if any new event was seen.
    pub new_last_id: Option<i64>,
    /// Whether this batch failed to connect to the previous `last_id`,
    /// starting a new contiguous run.
    pub gap: bool,
}

/// A single event's payload did not have the expected shape. The event is
/// dropped; ingestion continues.
#[derive(Debug, Error)]
#[error("malformed payload for {kind} event {id}: {reason}")]
pub struct MalformedPayload {
    pub id: i64,
    pub kind: String,
    pub reason: String,
}

/// What ingestion decided to do with a raw feed entry.
#[cfg_attr(test, derive(Debug))]
enum Classified {
    Push {
        branch: String,
        before: String,
        head: String,
    },
    BranchCreate,
    Skip,
}

/// Classify a raw feed entry, extracting the branch from a push ref.
fn classify(raw: &RawEvent) -> std::result::Result<Classified, MalformedPayload> {
    match raw.kind.as_str() {
        "PushEvent" => {
            let payload: PushPayload =
                serde_json::from_value(raw.payload.clone()).map_err(|e| MalformedPayload {
                    id: raw.id,
                    kind: raw.kind.clone(),
                    reason: e.to_string(),
                })?;

            let branch = payload
                .git_ref
                .strip_prefix("refs/heads/")
                .ok_or_else(|| MalformedPayload {
                    id: raw.id,
                    kind: raw.kind.clone(),
                    reason: format!("unexpected ref `{}`", payload.git_ref),
                })?;

            Ok(Classified::Push {
                branch: branch.to_string(),
                before: payload.before,
                head: payload.head,
            })
        }
        // Tags don't have a branch, so nothing further is parsed here.
        "CreateEvent" => Ok(Classified::BranchCreate),
        _ => Ok(Classified::Skip),
    }
}

/// Handle to the event log.
///
/// All state lives in the database; the handle is cheap to clone and carries
/// no implicit process-wide state, so tests construct isolated instances.
#[derive(Clone)]
pub struct EventLog {
    db: DatabaseConnection,
}

impl EventLog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Current feed state, creating the well-known row on first use.
    pub async fn state(&self) -> Result<ingest_state::Model> {
        Ok(load_state(&self.db).await?)
    }

    /// Fetch fresh events from `source` and ingest them.
    pub async fn download(&self, source: &dyn EventSource) -> Result<IngestOutcome> {
        let state = self.state().await?;
        let batch = source.fetch_newer_than(state.last_id).await?;
        self.ingest(batch).await
    }

    /// Ingest a batch of raw feed entries, assumed ordered newest-first.
    ///
    /// Idempotent: entries at or below the current `last_id` terminate the
    /// scan, and re-inserting an already-stored id is a no-op. All rows and
    /// the `last_id` advance commit in a single transaction, so a crash can
    /// never leave the high-water mark ahead of the stored events.
    pub async fn ingest(&self, batch: Vec<RawEvent>) -> Result<IngestOutcome> {
        let txn = self.db.begin().await?;

        let state = load_state(&txn).await?;
        let mut outcome = IngestOutcome::default();
        let mut new_last_id: Option<i64> = None;
        let mut oldest_new: Option<i64> = None;
        let mut oldest_stored: Option<i64> = None;
        let mut saw_known = false;

        for raw in &batch {
            if raw.id <= state.last_id {
                // Everything older is already in the log.
                saw_known = true;
                break;
            }

            if new_last_id.is_none() {
                new_last_id = Some(raw.id);
            }
            oldest_new = Some(raw.id);

            match classify(raw) {
                Ok(Classified::Skip) => outcome.dropped += 1,
                Err(err) => {
                    tracing::debug!(%err, "dropping malformed event");
                    outcome.dropped += 1;
                }
                Ok(classified) => {
                    if store_event(&txn, raw, classified).await? {
                        outcome.stored += 1;
                        oldest_stored = Some(raw.id);
                    }
                }
            }
        }

        if let Some(new_last) = new_last_id {
            let oldest = oldest_new.unwrap_or(new_last);

            // The run is contiguous when the batch overlapped an id we
            // already hold, or its oldest entry is the immediate successor
            // of the high-water mark. Anything else is a gap: the feed's
            // retention window no longer reaches back to what we have.
            let contiguous = saw_known || (state.start_id != 0 && oldest == state.last_id + 1);
            if !contiguous {
                outcome.gap = true;
                if let Some(id) = oldest_stored {
                    mark_sequence_start(&txn, id).await?;
                }
            }

            let mut update: ingest_state::ActiveModel = state.into();
            if !contiguous {
                update.start_id = Set(oldest);
            }
            update.last_id = Set(new_last);
            update.update(&txn).await?;

            outcome.new_last_id = Some(new_last);
        }

        txn.commit().await?;

        if outcome.gap {
            tracing::warn!(
                new_last_id = ?outcome.new_last_id,
                "event feed did not connect to the stored log; recorded a gap"
            );
        }

        Ok(outcome)
    }

    /// Events with id in `(since, until]`, ascending, optionally filtered by
    /// kind.
    pub async fn events_in(
        &self,
        since: i64,
        until: i64,
        kind: Option<EventKind>,
    ) -> Result<Vec<activity_event::Model>> {
        let mut query = activity_event::Entity::find()
            .filter(activity_event::Column::SourceId.gt(since))
            .filter(activity_event::Column::SourceId.lte(until))
            .order_by_asc(activity_event::Column::SourceId);

        if let Some(kind) = kind {
            query = query.filter(activity_event::Column::Kind.eq(kind));
        }

        Ok(query.all(&self.db).await?)
    }

    /// Every stored event, ascending. For inspection tooling.
    pub async fn all_events(&self) -> Result<Vec<activity_event::Model>> {
        Ok(activity_event::Entity::find()
            .order_by_asc(activity_event::Column::SourceId)
            .all(&self.db)
            .await?)
    }
}

/// Load the feed state row, creating it on first use.
async fn load_state<C: ConnectionTrait>(conn: &C) -> std::result::Result<ingest_state::Model, DbErr> {
    if let Some(state) = ingest_state::Entity::find_by_id(FEED_STATE).one(conn).await? {
        return Ok(state);
    }

    ingest_state::ActiveModel {
        name: Set(FEED_STATE.to_string()),
        start_id: Set(0),
        last_id: Set(0),
    }
    .insert(conn)
    .await
}

/// Persist one classified event. Returns false when the id already exists.
async fn store_event<C: ConnectionTrait>(
    conn: &C,
    raw: &RawEvent,
    classified: Classified,
) -> std::result::Result<bool, DbErr> {
    if activity_event::Entity::find_by_id(raw.id)
        .one(conn)
        .await?
        .is_some()
    {
        return Ok(false);
    }

    let (kind, branch, before_hash, after_hash) = match classified {
        Classified::Push {
            branch,
            before,
            head,
        } => (EventKind::Push, Some(branch), Some(before), Some(head)),
        Classified::BranchCreate => (EventKind::BranchCreate, None, None, None),
        Classified::Skip => return Ok(false),
    };

    activity_event::ActiveModel {
        source_id: Set(raw.id),
        kind: Set(kind),
        repo: Set(raw.repo.name.clone()),
        branch: Set(branch),
        before_hash: Set(before_hash),
        after_hash: Set(after_hash),
        payload: Set(raw.payload.clone()),
        created_at: Set(raw.created_at.fixed_offset()),
        ingested_at: Set(Utc::now().fixed_offset()),
        sequence_start: Set(false),
    }
    .insert(conn)
    .await?;

    Ok(true)
}

/// Flag the given event as the start of a new contiguous run.
async fn mark_sequence_start<C: ConnectionTrait>(
    conn: &C,
    source_id: i64,
) -> std::result::Result<(), DbErr> {
    if let Some(event) = activity_event::Entity::find_by_id(source_id)
        .one(conn)
        .await?
    {
        let mut update: activity_event::ActiveModel = event.into();
        update.sequence_start = Set(true);
        update.update(conn).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::RepoRef;

    fn push_event(id: i64, repo: &str, branch: &str, before: &str, head: &str) -> RawEvent {
        RawEvent {
            id,
            kind: "PushEvent".to_string(),
            repo: RepoRef {
                name: repo.to_string(),
            },
            payload: serde_json::json!({
                "ref": format!("refs/heads/{branch}"),
                "before": before,
                "head": head,
            }),
            created_at: Utc::now(),
        }
    }

    fn other_event(id: i64, kind: &str) -> RawEvent {
        RawEvent {
            id,
            kind: kind.to_string(),
            repo: RepoRef {
                name: "boostorg/misc".to_string(),
            },
            payload: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_classify_push_extracts_branch() {
        let event = push_event(1, "boostorg/align", "develop", "a", "b");
        match classify(&event) {
            Ok(Classified::Push {
                branch,
                before,
                head,
            }) => {
                assert_eq!(branch, "develop");
                assert_eq!(before, "a");
                assert_eq!(head, "b");
            }
            _ => panic!("expected a push classification"),
        }
    }

    #[test]
    fn test_classify_rejects_non_branch_ref() {
        let mut event = push_event(1, "boostorg/align", "develop", "a", "b");
        event.payload = serde_json::json!({
            "ref": "refs/tags/v1.0.0",
            "before": "a",
            "head": "b",
        });

        let err = classify(&event).expect_err("tag push should be malformed");
        assert!(err.to_string().contains("refs/tags/v1.0.0"));
    }

    #[test]
    fn test_classify_skips_uninteresting_kinds() {
        let event = other_event(1, "IssueCommentEvent");
        assert!(matches!(classify(&event), Ok(Classified::Skip)));
    }

    #[test]
    fn test_classify_create_event_has_no_branch() {
        let event = other_event(1, "CreateEvent");
        assert!(matches!(classify(&event), Ok(Classified::BranchCreate)));
    }

    #[cfg(feature = "migrate")]
    mod db {
        use sea_orm::EntityTrait;

        use super::*;

        async fn test_log() -> EventLog {
            let db = crate::db::connect_and_migrate("sqlite::memory:")
                .await
                .expect("migrated in-memory db");
            EventLog::new(db)
        }

        #[tokio::test]
        async fn first_ingest_records_a_gap_and_sequence_start() {
            let log = test_log().await;

            // Newest-first, as the feed delivers.
            let outcome = log
                .ingest(vec![
                    push_event(12, "boostorg/align", "develop", "b", "c"),
                    push_event(11, "boostorg/align", "develop", "a", "b"),
                ])
                .await
                .expect("ingest");

            assert_eq!(outcome.stored, 2);
            assert!(outcome.gap);
            assert_eq!(outcome.new_last_id, Some(12));

            let state = log.state().await.expect("state");
            assert_eq!(state.start_id, 11);
            assert_eq!(state.last_id, 12);

            let events = log.all_events().await.expect("events");
            assert_eq!(events.len(), 2);
            assert!(events[0].sequence_start);
            assert!(!events[1].sequence_start);
        }

        #[tokio::test]
        async fn reingesting_the_same_batch_is_idempotent() {
            let log = test_log().await;
            let batch = vec![
                push_event(12, "boostorg/align", "develop", "b", "c"),
                push_event(11, "boostorg/align", "develop", "a", "b"),
            ];

            log.ingest(batch.clone()).await.expect("first ingest");
            let state_before = log.state().await.expect("state");

            let outcome = log.ingest(batch).await.expect("second ingest");
            assert_eq!(outcome.stored, 0);
            assert_eq!(outcome.new_last_id, None);
            assert!(!outcome.gap);

            let state_after = log.state().await.expect("state");
            assert_eq!(state_before, state_after);
            assert_eq!(log.all_events().await.expect("events").len(), 2);
        }

        #[tokio::test]
        async fn overlapping_batch_extends_the_run() {
            let log = test_log().await;
            log.ingest(vec![push_event(11, "boostorg/align", "develop", "a", "b")])
                .await
                .expect("seed");

            // Newer events plus the already-seen boundary entry.
            let outcome = log
                .ingest(vec![
                    push_event(15, "boostorg/align", "develop", "c", "d"),
                    push_event(13, "boostorg/align", "develop", "b", "c"),
                    push_event(11, "boostorg/align", "develop", "a", "b"),
                ])
                .await
                .expect("ingest");

            assert_eq!(outcome.stored, 2);
            assert!(!outcome.gap);

            let state = log.state().await.expect("state");
            assert_eq!(state.start_id, 11);
            assert_eq!(state.last_id, 15);
        }

        #[tokio::test]
        async fn adjacent_batch_extends_the_run_without_overlap() {
            let log = test_log().await;
            log.ingest(vec![push_event(11, "boostorg/align", "develop", "a", "b")])
                .await
                .expect("seed");

            let outcome = log
                .ingest(vec![push_event(12, "boostorg/align", "develop", "b", "c")])
                .await
                .expect("ingest");

            assert!(!outcome.gap);
            let state = log.state().await.expect("state");
            assert_eq!(state.start_id, 11);
            assert_eq!(state.last_id, 12);
        }

        #[tokio::test]
        async fn disconnected_batch_records_a_new_run() {
            let log = test_log().await;
            log.ingest(vec![push_event(11, "boostorg/align", "develop", "a", "b")])
                .await
                .expect("seed");

            // The feed window no longer reaches back to id 11.
            let outcome = log
                .ingest(vec![
                    push_event(40, "boostorg/align", "develop", "x", "y"),
                    push_event(30, "boostorg/align", "develop", "w", "x"),
                ])
                .await
                .expect("ingest");

            assert!(outcome.gap);

            let state = log.state().await.expect("state");
            assert_eq!(state.start_id, 30);
            assert_eq!(state.last_id, 40);

            let flagged = crate::entity::activity_event::Entity::find_by_id(30)
                .one(log.connection())
                .await
                .expect("query")
                .expect("event 30 exists");
            assert!(flagged.sequence_start);
        }

        #[tokio::test]
        async fn uninteresting_and_malformed_events_are_dropped_not_stored() {
            let log = test_log().await;

            let mut bad_push = push_event(21, "boostorg/align", "develop", "a", "b");
            bad_push.payload = serde_json::json!({"ref": "refs/tags/v1"});

            let outcome = log
                .ingest(vec![
                    other_event(23, "WatchEvent"),
                    other_event(22, "CreateEvent"),
                    bad_push,
                ])
                .await
                .expect("ingest");

            assert_eq!(outcome.stored, 1);
            assert_eq!(outcome.dropped, 2);
            assert_eq!(outcome.new_last_id, Some(23));

            let events = log.all_events().await.expect("events");
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind, EventKind::BranchCreate);
            assert_eq!(events[0].branch, None);
        }

        #[tokio::test]
        async fn events_in_filters_by_range_and_kind() {
            let log = test_log().await;
            log.ingest(vec![
                other_event(14, "CreateEvent"),
                push_event(13, "boostorg/align", "develop", "b", "c"),
                push_event(12, "boostorg/core", "develop", "a", "b"),
                push_event(11, "boostorg/align", "develop", "a", "b"),
            ])
            .await
            .expect("ingest");

            let pushes = log
                .events_in(11, 14, Some(EventKind::Push))
                .await
                .expect("query");
            assert_eq!(
                pushes.iter().map(|e| e.source_id).collect::<Vec<_>>(),
                vec![12, 13]
            );

            let all = log.events_in(0, 14, None).await.expect("query");
            assert_eq!(all.len(), 4);
        }
    }
}
