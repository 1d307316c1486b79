//! Per-submodule reconciliation state.
//!
//! Each submodule carries three hash slots:
//!
//! - `current_hash` - what the superproject tree records, as of the last
//!   successful commit or checkout;
//! - `pending_hash` - a forecasted upstream head not yet proven reachable by
//!   an applied event (from a direct remote lookup, or from an event whose
//!   own confirmation has not arrived);
//! - `updated_hash` - a value staged for the next commit, cleared when the
//!   commit lands.
//!
//! Submodules are rebuilt fresh every pass from the superproject tree plus
//! `.gitmodules`, then discarded.

use super::{ReconcileError, Result};

/// What the state machine decided about one push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// The superproject already records the event's head; nothing to do.
    AlreadyApplied,
    /// The event chained from the outstanding forecast and moved it along.
    ForecastAdvanced,
    /// The event does not chain from any known state; recorded, not applied.
    Ignored,
    /// The event chains cleanly from the current hash; `updated_hash` is
    /// staged and the caller must commit before the next event.
    Apply,
}

/// One submodule of the superproject, reconstructed each pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    /// Name declared in `.gitmodules`, e.g. `libs/align`.
    pub declared_name: String,
    /// Relative path within the superproject tree.
    pub path: String,
    /// Upstream repository identifier, e.g. `boostorg/align`.
    pub remote: String,
    /// Hash recorded in the superproject tree.
    pub current_hash: Option<String>,
    /// Forecasted upstream head, not yet applied.
    pub pending_hash: Option<String>,
    /// Hash staged for the next commit.
    pub updated_hash: Option<String>,
    /// Source ids of events observed but not applicable, kept for
    /// reporting only.
    pub ignored_events: Vec<i64>,
}

impl Submodule {
    pub fn new(
        declared_name: impl Into<String>,
        path: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            declared_name: declared_name.into(),
            path: path.into(),
            remote: remote.into(),
            current_hash: None,
            pending_hash: None,
            updated_hash: None,
            ignored_events: Vec::new(),
        }
    }

    /// Apply one push event `(before, head)` to the hash slots.
    ///
    /// Events arrive in upstream order; once an event shows the superproject
    /// has caught up, earlier ignored events are forgiven (self-healing).
    pub fn observe_push(&mut self, event_id: i64, before: &str, head: &str) -> EventAction {
        // Already reflected, along with anything previously ignored.
        if self.current_hash.as_deref() == Some(head) {
            self.ignored_events.clear();
            return EventAction::AlreadyApplied;
        }

        // Chains from the forecast: the expected head moves along.
        if self.pending_hash.as_deref() == Some(before) {
            self.ignored_events.clear();
            self.pending_hash = Some(head.to_string());
            return EventAction::ForecastAdvanced;
        }

        // Does not chain from the known state; applying it could diverge
        // from the actual commit graph. Record and skip.
        if self.current_hash.as_deref() != Some(before) {
            self.ignored_events.push(event_id);
            return EventAction::Ignored;
        }

        // Clean case: the event continues exactly from the recorded hash.
        if self.pending_hash.as_deref() == Some(head) {
            // Caught up with the forecast.
            self.pending_hash = None;
        }
        self.updated_hash = Some(head.to_string());
        EventAction::Apply
    }

    /// Replay rule for events that arrived mid-resync: only advance the
    /// forecast, never stage commits directly.
    pub fn observe_resync_push(&mut self, before: &str, head: &str) {
        let expected = self
            .pending_hash
            .as_deref()
            .or(self.current_hash.as_deref());
        if expected == Some(before) {
            self.pending_hash = Some(head.to_string());
        }
    }

    /// Promote a still-set forecast into the staged slot.
    ///
    /// Both slots being occupied means the event replay staged something the
    /// remote lookup disagrees with - a defect to surface, not resolve.
    pub fn promote_pending(&mut self) -> Result<()> {
        if let Some(pending) = self.pending_hash.take() {
            if self.updated_hash.is_some() {
                return Err(ReconcileError::Conflict {
                    name: self.declared_name.clone(),
                });
            }
            self.updated_hash = Some(pending);
        }
        Ok(())
    }
}

/// Derive the upstream repository identifier from a submodule's configured
/// URL. Relative URLs and absolute URLs under the organization both resolve;
/// anything else excludes the submodule from reconciliation.
pub fn remote_identifier(url: &str, org: &str) -> Option<String> {
    let https_prefix = format!("https://github.com/{org}/");
    let http_prefix = format!("http://github.com/{org}/");

    let rest = url
        .strip_prefix("../")
        .or_else(|| url.strip_prefix(&https_prefix))
        .or_else(|| url.strip_prefix(&http_prefix))?;

    let name = rest.strip_suffix(".git").unwrap_or(rest);
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return None;
    }

    Some(format!("{org}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submodule(current: &str) -> Submodule {
        let mut sub = Submodule::new("libs/align", "libs/align", "boostorg/align");
        sub.current_hash = Some(current.to_string());
        sub
    }

    #[test]
    fn test_already_applied_clears_ignored() {
        let mut sub = submodule("B");
        sub.ignored_events = vec![7];

        let action = sub.observe_push(10, "A", "B");
        assert_eq!(action, EventAction::AlreadyApplied);
        assert!(sub.ignored_events.is_empty());
        assert_eq!(sub.current_hash.as_deref(), Some("B"));
        assert_eq!(sub.updated_hash, None);
    }

    #[test]
    fn test_forecast_advances() {
        let mut sub = submodule("A");
        sub.pending_hash = Some("B".to_string());

        let action = sub.observe_push(10, "B", "C");
        assert_eq!(action, EventAction::ForecastAdvanced);
        assert_eq!(sub.pending_hash.as_deref(), Some("C"));
        assert_eq!(sub.updated_hash, None);
    }

    #[test]
    fn test_out_of_order_event_is_ignored() {
        let mut sub = submodule("A");

        let action = sub.observe_push(10, "Z", "B");
        assert_eq!(action, EventAction::Ignored);
        assert_eq!(sub.ignored_events, vec![10]);
        assert_eq!(sub.current_hash.as_deref(), Some("A"));
        assert_eq!(sub.pending_hash, None);
        assert_eq!(sub.updated_hash, None);
    }

    #[test]
    fn test_clean_apply_stages_update() {
        let mut sub = submodule("A");

        let action = sub.observe_push(10, "A", "B");
        assert_eq!(action, EventAction::Apply);
        assert_eq!(sub.updated_hash.as_deref(), Some("B"));
    }

    #[test]
    fn test_clean_apply_consumes_matching_forecast() {
        let mut sub = submodule("A");
        sub.pending_hash = Some("B".to_string());

        // The push that the forecast anticipated finally shows up.
        let action = sub.observe_push(10, "A", "B");
        assert_eq!(action, EventAction::Apply);
        assert_eq!(sub.pending_hash, None);
        assert_eq!(sub.updated_hash.as_deref(), Some("B"));
    }

    #[test]
    fn test_resync_replay_only_moves_forecast() {
        let mut sub = submodule("A");
        sub.observe_resync_push("A", "B");
        assert_eq!(sub.pending_hash.as_deref(), Some("B"));
        assert_eq!(sub.updated_hash, None);

        sub.observe_resync_push("B", "C");
        assert_eq!(sub.pending_hash.as_deref(), Some("C"));

        // Does not chain; forecast untouched.
        sub.observe_resync_push("X", "Y");
        assert_eq!(sub.pending_hash.as_deref(), Some("C"));
    }

    #[test]
    fn test_promote_pending() {
        let mut sub = submodule("A");
        sub.pending_hash = Some("B".to_string());

        sub.promote_pending().expect("promote");
        assert_eq!(sub.pending_hash, None);
        assert_eq!(sub.updated_hash.as_deref(), Some("B"));

        // No forecast is a no-op.
        let mut sub = submodule("A");
        sub.promote_pending().expect("promote");
        assert_eq!(sub.updated_hash, None);
    }

    #[test]
    fn test_promote_pending_conflict() {
        let mut sub = submodule("A");
        sub.pending_hash = Some("B".to_string());
        sub.updated_hash = Some("C".to_string());

        let err = sub.promote_pending().expect_err("conflict");
        assert!(matches!(err, ReconcileError::Conflict { .. }));
    }

    #[test]
    fn test_remote_identifier_relative() {
        assert_eq!(
            remote_identifier("../align.git", "boostorg").as_deref(),
            Some("boostorg/align")
        );
        assert_eq!(
            remote_identifier("../align", "boostorg").as_deref(),
            Some("boostorg/align")
        );
    }

    #[test]
    fn test_remote_identifier_absolute() {
        assert_eq!(
            remote_identifier("https://github.com/boostorg/align.git", "boostorg").as_deref(),
            Some("boostorg/align")
        );
    }

    #[test]
    fn test_remote_identifier_foreign_urls_excluded() {
        assert_eq!(
            remote_identifier("https://github.com/someone-else/align.git", "boostorg"),
            None
        );
        assert_eq!(remote_identifier("git@example.com:align.git", "boostorg"), None);
        assert_eq!(remote_identifier("../nested/align.git", "boostorg"), None);
    }
}
