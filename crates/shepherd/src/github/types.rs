//! Raw upstream payload shapes, as delivered by the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, de};

/// A single entry from the org activity feed.
///
/// The feed delivers entries newest-first. Event ids are serialized as
/// strings by the API but are monotonically increasing integers.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    /// Upstream-assigned id, globally ordered.
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: i64,

    /// Event kind as named by the API, e.g. `PushEvent`, `CreateEvent`.
    #[serde(rename = "type")]
    pub kind: String,

    /// The repository the event happened in.
    pub repo: RepoRef,

    /// Kind-specific payload; parsed further at ingestion.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Upstream creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Repository reference embedded in a feed entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoRef {
    /// Full identifier, e.g. `boostorg/align`.
    pub name: String,
}

/// Payload of a push event, as far as ingestion cares.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    /// The full ref that was pushed, e.g. `refs/heads/develop`.
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Commit hash the branch pointed at before the push.
    pub before: String,

    /// Commit hash the branch points at after the push.
    pub head: String,
}

/// Response of a single git ref lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    pub object: GitRefObject,
}

/// The object a git ref points at.
#[derive(Debug, Clone, Deserialize)]
pub struct GitRefObject {
    pub sha: String,
}

/// Entry of the org repository listing, used by the mirror.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgRepo {
    pub name: String,
    pub clone_url: String,
}

/// Event ids arrive as JSON strings; older tooling has also seen plain
/// numbers, so accept both.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl de::Visitor<'_> for IdVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("an event id as a string or integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            v.parse().map_err(E::custom)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_decodes_string_id() {
        let event: RawEvent = serde_json::from_value(serde_json::json!({
            "id": "31225164183",
            "type": "PushEvent",
            "repo": {"name": "boostorg/align"},
            "payload": {
                "ref": "refs/heads/develop",
                "before": "aaa",
                "head": "bbb"
            },
            "created_at": "2026-03-01T12:00:00Z"
        }))
        .expect("feed entry should decode");

        assert_eq!(event.id, 31_225_164_183);
        assert_eq!(event.kind, "PushEvent");
        assert_eq!(event.repo.name, "boostorg/align");

        let payload: PushPayload =
            serde_json::from_value(event.payload).expect("push payload should decode");
        assert_eq!(payload.git_ref, "refs/heads/develop");
        assert_eq!(payload.before, "aaa");
        assert_eq!(payload.head, "bbb");
    }

    #[test]
    fn test_raw_event_decodes_numeric_id() {
        let event: RawEvent = serde_json::from_value(serde_json::json!({
            "id": 42,
            "type": "CreateEvent",
            "repo": {"name": "boostorg/new"},
            "created_at": "2026-03-01T12:00:00Z"
        }))
        .expect("feed entry should decode");

        assert_eq!(event.id, 42);
        assert!(event.payload.is_null());
    }

    #[test]
    fn test_git_ref_decodes() {
        let git_ref: GitRef = serde_json::from_value(serde_json::json!({
            "ref": "refs/heads/develop",
            "object": {"sha": "abc123", "type": "commit"}
        }))
        .expect("ref should decode");

        assert_eq!(git_ref.object.sha, "abc123");
    }
}
