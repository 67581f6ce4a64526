//! Assignment statistics rows.

use serde::Serialize;
use sqlx::FromRow;

/// All-time number of review assignments a user has received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserAssignmentStat {
    pub user_id: String,
    pub assignment_count: i64,
}

/// Number of distinct reviewers a pull request has ever had.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct PullRequestReviewerStat {
    pub pr_id: String,
    pub reviewer_count: i64,
}
