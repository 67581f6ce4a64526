//! Pull request (review request) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a pull request. `Merged` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum PullRequestStatus {
    Open,
    Merged,
}

impl PullRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
        }
    }
}

impl std::fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pull request with its reviewers in assignment order.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequest {
    /// Internal row id.
    #[serde(skip)]
    pub id: i64,

    /// Stable external identifier.
    pub pull_request_id: String,

    pub pull_request_name: String,

    /// External id of the author.
    pub author_id: String,

    pub status: PullRequestStatus,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Present exactly when `status` is `Merged`.
    #[serde(rename = "mergedAt", skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,

    /// External ids of the current reviewers.
    pub assigned_reviewers: Vec<String>,
}

/// Compact listing entry used for per-reviewer queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct PullRequestShort {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: PullRequestStatus,
}

/// Convert a stored Unix timestamp (seconds) into a UTC datetime.
pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: PullRequestStatus, merged_at: Option<i64>) -> PullRequest {
        PullRequest {
            id: 1,
            pull_request_id: "pr-1".into(),
            pull_request_name: "Add search".into(),
            author_id: "u1".into(),
            status,
            created_at: from_unix(1_700_000_000),
            merged_at: merged_at.map(from_unix),
            assigned_reviewers: vec!["u2".into(), "u3".into()],
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PullRequestStatus::Open.to_string(), "OPEN");
        assert_eq!(PullRequestStatus::Merged.to_string(), "MERGED");
    }

    #[test]
    fn test_open_request_omits_merged_at() {
        let json = serde_json::to_value(sample(PullRequestStatus::Open, None)).unwrap();
        assert_eq!(json["status"], "OPEN");
        assert!(json.get("mergedAt").is_none());
        assert!(json.get("id").is_none());
        assert_eq!(json["createdAt"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_merged_request_carries_merged_at() {
        let pr = sample(PullRequestStatus::Merged, Some(1_700_000_100));
        assert_eq!(pr.status, PullRequestStatus::Merged);
        let json = serde_json::to_value(pr).unwrap();
        assert_eq!(json["mergedAt"], "2023-11-14T22:15:00Z");
    }
}
