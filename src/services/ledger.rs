//! Assignment ledger.
//!
//! Sole writer of reviewer assignments. An assignment row is the live
//! membership of a reviewer in a pull request's reviewer set; the row id
//! gives assignment order. Removed assignments are deleted, so the open
//! assignment count used for load balancing only sees current reviews.
//!
//! A separate history table records every assignment ever made. Writing to
//! it is non-critical: [`note_history`] logs failures and never returns them.

use crate::db::pool::DbPool;
use crate::error::{AppError, ConflictReason};
use crate::models::{PullRequestStatus, User};
use crate::services::now;
use sqlx::SqliteExecutor;

/// Assign a reviewer. Assigning the same pair twice is a no-op.
///
/// Returns `true` if a new assignment was recorded.
pub async fn record_assignment<'e, E>(
    executor: E,
    pull_request_id: i64,
    user_id: i64,
) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO pr_reviewers (pull_request_id, user_id, assigned_at)
        VALUES (?, ?, ?)
        ON CONFLICT (pull_request_id, user_id) DO NOTHING
        "#,
    )
    .bind(pull_request_id)
    .bind(user_id)
    .bind(now())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Unassign a reviewer. Removing a missing assignment is a no-op.
///
/// Returns `true` if an assignment was removed.
pub async fn remove_assignment<'e, E>(
    executor: E,
    pull_request_id: i64,
    user_id: i64,
) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM pr_reviewers WHERE pull_request_id = ? AND user_id = ?")
        .bind(pull_request_id)
        .bind(user_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Current reviewers of a pull request in assignment order.
pub async fn current_reviewers<'e, E>(
    executor: E,
    pull_request_id: i64,
) -> Result<Vec<User>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let reviewers = sqlx::query_as::<_, User>(
        r#"
        SELECT u.id, u.user_id, u.username, u.team_id, t.team_name, u.is_active
        FROM pr_reviewers rev
        INNER JOIN users u ON rev.user_id = u.id
        LEFT JOIN teams t ON u.team_id = t.id
        WHERE rev.pull_request_id = ?
        ORDER BY rev.id
        "#,
    )
    .bind(pull_request_id)
    .fetch_all(executor)
    .await?;

    Ok(reviewers)
}

/// External ids of the current reviewers in assignment order.
pub async fn current_reviewer_ids<'e, E>(
    executor: E,
    pull_request_id: i64,
) -> Result<Vec<String>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let ids = sqlx::query_scalar(
        r#"
        SELECT u.user_id
        FROM pr_reviewers rev
        INNER JOIN users u ON rev.user_id = u.id
        WHERE rev.pull_request_id = ?
        ORDER BY rev.id
        "#,
    )
    .bind(pull_request_id)
    .fetch_all(executor)
    .await?;

    Ok(ids)
}

/// Check whether a user is a current reviewer of a pull request.
pub async fn is_assigned<'e, E>(
    executor: E,
    pull_request_id: i64,
    user_id: i64,
) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT 1 FROM pr_reviewers WHERE pull_request_id = ? AND user_id = ?")
        .bind(pull_request_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

    Ok(row.is_some())
}

/// Number of open pull requests the user currently reviews.
pub async fn open_assignment_count<'e, E>(executor: E, user_id: i64) -> Result<i64, AppError>
where
    E: SqliteExecutor<'e>,
{
    let count = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT pr.id)
        FROM pr_reviewers rev
        INNER JOIN pull_requests pr ON rev.pull_request_id = pr.id
        WHERE rev.user_id = ? AND pr.status = 'OPEN'
        "#,
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

/// Assign a set of reviewers all-or-nothing.
///
/// Fails with `Conflict(Merged)` if the pull request is no longer open, and
/// with `Conflict(StaleWrite)` if a reviewer was deactivated after being
/// selected. Either way nothing is recorded.
pub async fn record_batch(
    pool: &DbPool,
    pull_request_id: i64,
    user_ids: &[i64],
) -> Result<(), AppError> {
    if user_ids.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    // Write first so the transaction holds the write lock before the status check
    for user_id in user_ids {
        record_assignment(&mut *tx, pull_request_id, *user_id).await?;
    }

    ensure_open(&mut *tx, pull_request_id).await?;
    for user_id in user_ids {
        ensure_active(&mut *tx, *user_id).await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Replace one reviewer with another.
///
/// Removal and insertion share a transaction, so a concurrent reader never
/// sees the reviewer set grow. Removal is guarded on the pull request still
/// being open; if it no longer is, or the old reviewer was removed in the
/// meantime, the swap fails with `Conflict`. A replacement deactivated since
/// it was selected fails the swap with `Conflict(StaleWrite)`.
pub async fn swap_reviewer(
    pool: &DbPool,
    pull_request_id: i64,
    old_user_id: i64,
    new_user_id: i64,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query(
        r#"
        DELETE FROM pr_reviewers
        WHERE pull_request_id = ? AND user_id = ?
          AND EXISTS (SELECT 1 FROM pull_requests WHERE id = ? AND status = 'OPEN')
        "#,
    )
    .bind(pull_request_id)
    .bind(old_user_id)
    .bind(pull_request_id)
    .execute(&mut *tx)
    .await?;

    if removed.rows_affected() == 0 {
        ensure_open(&mut *tx, pull_request_id).await?;
        return Err(AppError::conflict(ConflictReason::NotAssigned));
    }

    ensure_active(&mut *tx, new_user_id).await?;

    if !record_assignment(&mut *tx, pull_request_id, new_user_id).await? {
        // Someone else assigned the replacement first
        return Err(AppError::conflict(ConflictReason::StaleWrite));
    }

    tx.commit().await?;

    Ok(())
}

/// Remove a user from the reviewer set of every open pull request.
///
/// Returns the number of assignments removed.
pub async fn remove_from_open_requests<'e, E>(executor: E, user_id: i64) -> Result<u64, AppError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        DELETE FROM pr_reviewers
        WHERE user_id = ?
          AND pull_request_id IN (SELECT id FROM pull_requests WHERE status = 'OPEN')
        "#,
    )
    .bind(user_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Record an assignment in the history table.
///
/// Non-critical: a failure is logged and swallowed, never propagated to the
/// operation that triggered it.
pub async fn note_history(pool: &DbPool, user_id: i64, pull_request_id: i64) {
    let result = sqlx::query(
        r#"
        INSERT INTO assignment_stats (user_id, pr_id, assigned_at)
        VALUES (?, ?, ?)
        ON CONFLICT (user_id, pr_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(pull_request_id)
    .bind(now())
    .execute(pool)
    .await;

    if let Err(e) = result {
        log::warn!(
            "[ledger] Failed to record assignment history for user {} on pull request {}: {}",
            user_id,
            pull_request_id,
            e
        );
    }
}

/// Fail with the appropriate error unless the pull request exists and is open.
async fn ensure_open<'e, E>(executor: E, pull_request_id: i64) -> Result<(), AppError>
where
    E: SqliteExecutor<'e>,
{
    let status: Option<PullRequestStatus> =
        sqlx::query_scalar("SELECT status FROM pull_requests WHERE id = ?")
            .bind(pull_request_id)
            .fetch_optional(executor)
            .await?;

    match status {
        Some(PullRequestStatus::Open) => Ok(()),
        Some(PullRequestStatus::Merged) => Err(AppError::conflict(ConflictReason::Merged)),
        None => Err(AppError::not_found_with_id(
            "pull request",
            pull_request_id.to_string(),
        )),
    }
}

/// Fail with `Conflict(StaleWrite)` unless the user is still active.
///
/// Called after the transaction's first write, so the flag read here cannot
/// change before commit.
async fn ensure_active<'e, E>(executor: E, user_id: i64) -> Result<(), AppError>
where
    E: SqliteExecutor<'e>,
{
    let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

    if active != Some(true) {
        log::warn!("[ledger] Reviewer {} is no longer active", user_id);
        return Err(AppError::conflict(ConflictReason::StaleWrite));
    }
    Ok(())
}
