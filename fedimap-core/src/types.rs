use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Crawl outcomes ─────────────────────────────────────────────────

/// Why a single crawl attempt did not produce data.
///
/// Each kind is recorded verbatim as the instance's status; none of them
/// aborts a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureKind {
    /// Non-success HTTP status, or a body of the wrong shape, or an
    /// instance that answered with neither metadata nor peers.
    InvalidResponse,
    /// Fewer users than the personal-instance threshold and not allow-listed.
    PersonalInstance,
    /// Connect, DNS, or timeout fault at the transport level.
    NetworkFailure,
    /// Body could not be parsed as JSON at all.
    MalformedPayload,
}

impl FailureKind {
    pub const ALL: [Self; 4] = [
        Self::InvalidResponse,
        Self::PersonalInstance,
        Self::NetworkFailure,
        Self::MalformedPayload,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidResponse => "InvalidResponse",
            Self::PersonalInstance => "PersonalInstance",
            Self::NetworkFailure => "NetworkFailure",
            Self::MalformedPayload => "MalformedPayload",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified fetch failure: the kind that gets stored, plus detail for logs.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidResponse, detail)
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::NetworkFailure, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedPayload, detail)
    }
}

/// Stored crawl status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrawlStatus {
    Success,
    Failed(FailureKind),
}

impl CrawlStatus {
    pub const SUCCESS: &'static str = "success";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => Self::SUCCESS,
            Self::Failed(kind) => kind.as_str(),
        }
    }
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::SUCCESS {
            return Ok(Self::Success);
        }
        FailureKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .map(Self::Failed)
            .ok_or_else(|| format!("unknown crawl status: {s}"))
    }
}

// ── Remote data ────────────────────────────────────────────────────

/// One post from an instance's local public timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

/// A mentioned account: `user@domain` for remote accounts, `user` for local ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub acct: String,
}

/// Some servers emit numeric post ids; cursors are opaque strings either way.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Validated, storable instance metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub description: Option<String>,
    pub version: Option<String>,
    pub domain_count: Option<i32>,
    pub status_count: Option<i32>,
    pub user_count: Option<i32>,
}

/// Everything fetched from one instance during a successful crawl attempt.
#[derive(Debug, Clone)]
pub struct FetchedInstance {
    pub name: String,
    pub metadata: InstanceMetadata,
    /// Lowercased, de-duplicated, self and nulls removed.
    pub peers: Vec<String>,
    /// Every post the pagination loop retrieved, inside the window or not.
    pub posts: Vec<Post>,
    /// Start of the trailing mention window used while paginating.
    pub window_start: DateTime<Utc>,
}

/// Tagged result of one fetch: data, or the classified reason there is none.
pub type FetchResult = std::result::Result<FetchedInstance, FetchFailure>;

/// Per-target mention tallies for one source instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionSummary {
    pub mentions: HashMap<String, u64>,
    /// Denominator for the mention ratio: all posts inspected, not only
    /// those inside the window.
    pub posts_inspected: u64,
}

// ── Stored rows ────────────────────────────────────────────────────

/// A federated server, keyed by its lowercase domain name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub metadata: InstanceMetadata,
    /// `None` until the first crawl attempt.
    pub status: Option<CrawlStatus>,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Directed edge: `source` listed `target` among its peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRelationship {
    pub source: String,
    pub target: String,
    pub mention_count: u64,
    pub statuses_seen: u64,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Symmetric weighted edge derived from one or two relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub last_updated: DateTime<Utc>,
}

/// What a worker hands the persistence gateway after one instance.
#[derive(Debug, Clone)]
pub enum CrawlOutcome {
    Success {
        metadata: InstanceMetadata,
        peers: Vec<String>,
        summary: MentionSummary,
    },
    Failed(FailureKind),
}

impl CrawlOutcome {
    pub fn status(&self) -> CrawlStatus {
        match self {
            Self::Success { .. } => CrawlStatus::Success,
            Self::Failed(kind) => CrawlStatus::Failed(*kind),
        }
    }
}

/// One crawl attempt as the store writes it, in a single transaction.
#[derive(Debug, Clone)]
pub struct CrawlRecord {
    pub instance: String,
    pub crawled_at: DateTime<Utc>,
    pub outcome: CrawlOutcome,
    /// Peers not yet present in the store; placeholders are created first.
    pub new_instances: Vec<String>,
}

/// Row counts touched by one [`CrawlRecord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStats {
    pub instances_created: u64,
    pub relationships_created: u64,
    pub relationships_updated: u64,
}

/// Which instances seed a pass.
#[derive(Debug, Clone, Default)]
pub struct TargetSelection {
    /// Only instances last updated at or before this moment; `None` selects all.
    pub stale_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Summary statistics about the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_instances: u64,
    pub never_crawled: u64,
    pub instances_by_status: HashMap<String, u64>,
    pub total_relationships: u64,
    pub relationships_with_mentions: u64,
    pub total_edges: u64,
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_status_roundtrips_through_strings() {
        let all = [
            CrawlStatus::Success,
            CrawlStatus::Failed(FailureKind::InvalidResponse),
            CrawlStatus::Failed(FailureKind::PersonalInstance),
            CrawlStatus::Failed(FailureKind::NetworkFailure),
            CrawlStatus::Failed(FailureKind::MalformedPayload),
        ];
        for status in all {
            assert_eq!(status.as_str().parse::<CrawlStatus>().unwrap(), status);
        }
        assert_eq!(CrawlStatus::Success.as_str(), "success");
        assert!("Timeout".parse::<CrawlStatus>().is_err());
    }

    #[test]
    fn post_accepts_numeric_id() {
        let post: Post = serde_json::from_str(
            r#"{"id": 1234, "created_at": "2024-05-01T10:00:00.000Z", "mentions": []}"#,
        )
        .unwrap();
        assert_eq!(post.id, "1234");
    }

    #[test]
    fn post_without_mentions_field_defaults_empty() {
        let post: Post =
            serde_json::from_str(r#"{"id": "9", "created_at": "2024-05-01T10:00:00Z"}"#).unwrap();
        assert!(post.mentions.is_empty());
    }

    #[test]
    fn post_missing_created_at_is_rejected() {
        let err = serde_json::from_str::<Post>(r#"{"id": "9", "mentions": []}"#);
        assert!(err.is_err());
    }

    #[test]
    fn fetch_failure_display_includes_kind() {
        let failure = FetchFailure::network("connection refused");
        assert_eq!(failure.to_string(), "NetworkFailure: connection refused");
    }
}
