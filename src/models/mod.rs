//! Data models for the application.
//!
//! These are the plain records the engine hands back to callers. Models that
//! map directly onto a query result derive `FromRow`.

pub mod pull_request;
pub mod stats;
pub mod team;
pub mod user;

// Re-exports for convenient access
pub use pull_request::{PullRequest, PullRequestShort, PullRequestStatus};
pub use stats::{PullRequestReviewerStat, UserAssignmentStat};
pub use team::{NewTeam, Team, TeamMember};
pub use user::User;
