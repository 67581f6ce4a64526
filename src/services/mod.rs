//! Business logic services.
//!
//! - [`registry`]: teams, members and their active flag
//! - [`ledger`]: reviewer assignments and assignment history
//! - [`selector`]: balanced and random reviewer selection
//! - [`lifecycle`]: pull request creation, merge and reassignment
//! - [`stats`]: assignment statistics
//!
//! [`AssignmentEngine`] composes them behind one handle that owns the pool,
//! the random generator used for reassignment and the storage timeout.

pub mod ledger;
pub mod lifecycle;
pub mod registry;
pub mod selector;
pub mod stats;

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{
    NewTeam, PullRequest, PullRequestReviewerStat, PullRequestShort, Team, User,
    UserAssignmentStat,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Default upper bound on a single engine operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Current Unix timestamp in seconds.
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Entry point for every reviewer assignment operation.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and may run
/// concurrently.
pub struct AssignmentEngine {
    pool: DbPool,
    rng: Mutex<StdRng>,
    operation_timeout: Duration,
}

impl AssignmentEngine {
    /// Create an engine with an entropy-seeded random generator.
    pub fn new(pool: DbPool) -> Self {
        Self::with_rng(pool, StdRng::from_entropy())
    }

    /// Create an engine with a caller-supplied generator, e.g. a seeded one.
    pub fn with_rng(pool: DbPool, rng: StdRng) -> Self {
        Self {
            pool,
            rng: Mutex::new(rng),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Override the per-operation timeout.
    pub fn with_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Run an operation under the engine timeout.
    ///
    /// On timeout the future is dropped, which rolls back any open
    /// transaction, and the caller gets `Unavailable`.
    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(elapsed) => {
                log::error!(
                    "[engine] {} timed out after {:?}",
                    operation,
                    self.operation_timeout
                );
                Err(AppError::from(elapsed))
            }
        }
    }

    pub async fn create_team(&self, team: &NewTeam) -> Result<Team, AppError> {
        self.bounded("create_team", registry::create_team(&self.pool, team))
            .await
    }

    pub async fn get_team(&self, team_name: &str) -> Result<Team, AppError> {
        self.bounded("get_team", registry::get_team(&self.pool, team_name))
            .await
    }

    /// Toggle a member's active flag; deactivation releases their open reviews.
    pub async fn set_user_active(&self, user_id: &str, is_active: bool) -> Result<User, AppError> {
        self.bounded(
            "set_user_active",
            registry::set_active(&self.pool, user_id, is_active),
        )
        .await
    }

    pub async fn user_reviews(&self, user_id: &str) -> Result<Vec<PullRequestShort>, AppError> {
        self.bounded("user_reviews", registry::user_reviews(&self.pool, user_id))
            .await
    }

    pub async fn create_pull_request(
        &self,
        pull_request_id: &str,
        title: &str,
        author_id: &str,
    ) -> Result<PullRequest, AppError> {
        self.bounded(
            "create_pull_request",
            lifecycle::create(&self.pool, pull_request_id, title, author_id),
        )
        .await
    }

    pub async fn get_pull_request(&self, pull_request_id: &str) -> Result<PullRequest, AppError> {
        self.bounded(
            "get_pull_request",
            lifecycle::get(&self.pool, pull_request_id),
        )
        .await
    }

    pub async fn merge_pull_request(&self, pull_request_id: &str) -> Result<PullRequest, AppError> {
        self.bounded(
            "merge_pull_request",
            lifecycle::merge(&self.pool, pull_request_id),
        )
        .await
    }

    /// Returns the updated pull request and the replacement reviewer's id.
    pub async fn reassign_reviewer(
        &self,
        pull_request_id: &str,
        old_user_id: &str,
    ) -> Result<(PullRequest, String), AppError> {
        self.bounded(
            "reassign_reviewer",
            lifecycle::reassign(&self.pool, &self.rng, pull_request_id, old_user_id),
        )
        .await
    }

    pub async fn user_stats(&self) -> Result<Vec<UserAssignmentStat>, AppError> {
        self.bounded("user_stats", stats::user_stats(&self.pool)).await
    }

    pub async fn pull_request_stats(&self) -> Result<Vec<PullRequestReviewerStat>, AppError> {
        self.bounded("pull_request_stats", stats::pull_request_stats(&self.pool))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{initialize, PoolSettings};
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_bounded_maps_timeout_to_unavailable() {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db"), PoolSettings::default())
            .await
            .unwrap();
        let engine = AssignmentEngine::with_rng(pool, StdRng::seed_from_u64(0))
            .with_timeout(Duration::from_millis(10));

        let err = engine
            .bounded("sleepy", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
