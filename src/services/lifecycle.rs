//! Pull request lifecycle.
//!
//! Sole writer of pull request status. States are `OPEN` and `MERGED`;
//! `MERGED` is terminal and freezes the reviewer set.
//!
//! Creation persists the pull request before choosing reviewers. If nobody
//! is eligible the caller gets `NoCandidate` but the pull request stays
//! stored, open and without reviewers.

use crate::db::pool::DbPool;
use crate::error::{AppError, ConflictReason};
use crate::models::pull_request::from_unix;
use crate::models::{PullRequest, PullRequestStatus};
use crate::services::{ledger, now, registry, selector};
use rand::rngs::StdRng;
use sqlx::{FromRow, SqliteExecutor};
use std::sync::Mutex;

/// Number of reviewers requested for a new pull request.
pub const REVIEWERS_PER_REQUEST: usize = 2;

/// How many times creation selects reviewers again after a selected
/// reviewer is deactivated before the assignment is written.
const ASSIGN_ATTEMPTS: usize = 3;

/// A stored pull request joined with its author.
#[derive(Debug, Clone, FromRow)]
struct PullRequestRow {
    id: i64,
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
    author_internal_id: i64,
    status: PullRequestStatus,
    created_at: i64,
    merged_at: Option<i64>,
}

impl PullRequestRow {
    fn into_pull_request(self, assigned_reviewers: Vec<String>) -> PullRequest {
        PullRequest {
            id: self.id,
            pull_request_id: self.pull_request_id,
            pull_request_name: self.pull_request_name,
            author_id: self.author_id,
            status: self.status,
            created_at: from_unix(self.created_at),
            merged_at: self.merged_at.map(from_unix),
            assigned_reviewers,
        }
    }
}

async fn find_request<'e, E>(
    executor: E,
    pull_request_id: &str,
) -> Result<Option<PullRequestRow>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, PullRequestRow>(
        r#"
        SELECT pr.id, pr.pull_request_id, pr.pull_request_name,
               u.user_id AS author_id, pr.author_id AS author_internal_id,
               pr.status, pr.created_at, pr.merged_at
        FROM pull_requests pr
        INNER JOIN users u ON pr.author_id = u.id
        WHERE pr.pull_request_id = ?
        "#,
    )
    .bind(pull_request_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

async fn insert_request(
    pool: &DbPool,
    pull_request_id: &str,
    title: &str,
    author_id: i64,
    created_at: i64,
) -> Result<i64, AppError> {
    sqlx::query_scalar(
        r#"
        INSERT INTO pull_requests (pull_request_id, pull_request_name, author_id, status, created_at)
        VALUES (?, ?, ?, 'OPEN', ?)
        RETURNING id
        "#,
    )
    .bind(pull_request_id)
    .bind(title)
    .bind(author_id)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::pull_request_exists(pull_request_id)
        }
        other => AppError::from(other),
    })
}

/// Conditionally move a pull request to a new status.
///
/// Only applies if the stored status still equals `expected`; returns
/// whether the row was updated.
async fn update_status<'e, E>(
    executor: E,
    id: i64,
    status: PullRequestStatus,
    merged_at: Option<i64>,
    expected: PullRequestStatus,
) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE pull_requests SET status = ?, merged_at = ? WHERE id = ? AND status = ?",
    )
    .bind(status)
    .bind(merged_at)
    .bind(id)
    .bind(expected)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Fetch a pull request with its current reviewers.
pub async fn get(pool: &DbPool, pull_request_id: &str) -> Result<PullRequest, AppError> {
    let row = find_request(pool, pull_request_id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("pull request", pull_request_id))?;

    let reviewers = ledger::current_reviewer_ids(pool, row.id).await?;
    Ok(row.into_pull_request(reviewers))
}

/// Create an open pull request and assign up to two reviewers from the
/// author's team by balanced selection.
pub async fn create(
    pool: &DbPool,
    pull_request_id: &str,
    title: &str,
    author_id: &str,
) -> Result<PullRequest, AppError> {
    if find_request(pool, pull_request_id).await?.is_some() {
        return Err(AppError::pull_request_exists(pull_request_id));
    }

    let author = registry::find_user(pool, author_id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("author", author_id))?;

    let Some(team_id) = author.team_id else {
        return Err(AppError::not_found_with_id("author team", author_id));
    };

    if !author.is_active {
        return Err(AppError::not_found_with_id("active author", author_id));
    }

    let created_at = now();
    let id = insert_request(pool, pull_request_id, title, author.id, created_at).await?;

    let mut attempt = 1;
    let reviewers = loop {
        let reviewers = match selector::select_balanced(
            pool,
            team_id,
            &[author.id],
            REVIEWERS_PER_REQUEST,
        )
        .await
        {
            Ok(reviewers) => reviewers,
            Err(AppError::NoCandidate) => {
                log::warn!(
                    "[lifecycle] No reviewers available for {} in team {:?}; pull request left without reviewers",
                    pull_request_id,
                    author.team_name
                );
                return Err(AppError::NoCandidate);
            }
            Err(e) => return Err(e),
        };

        let reviewer_ids: Vec<i64> = reviewers.iter().map(|r| r.id).collect();
        match ledger::record_batch(pool, id, &reviewer_ids).await {
            Ok(()) => break reviewers,
            // A selected reviewer was deactivated in the meantime; select again
            Err(AppError::Conflict {
                reason: ConflictReason::StaleWrite,
            }) if attempt < ASSIGN_ATTEMPTS => {
                log::info!(
                    "[lifecycle] Reviewer selection for {} went stale, retrying",
                    pull_request_id
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    };

    for reviewer in &reviewers {
        ledger::note_history(pool, reviewer.id, id).await;
    }

    let assigned_reviewers: Vec<String> = reviewers.into_iter().map(|r| r.user_id).collect();

    log::info!(
        "[lifecycle] Pull request {} created with reviewers {:?}",
        pull_request_id,
        assigned_reviewers
    );

    Ok(PullRequest {
        id,
        pull_request_id: pull_request_id.to_string(),
        pull_request_name: title.to_string(),
        author_id: author.user_id,
        status: PullRequestStatus::Open,
        created_at: from_unix(created_at),
        merged_at: None,
        assigned_reviewers,
    })
}

/// Merge a pull request. Merging an already merged pull request returns it
/// unchanged.
pub async fn merge(pool: &DbPool, pull_request_id: &str) -> Result<PullRequest, AppError> {
    let row = find_request(pool, pull_request_id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("pull request", pull_request_id))?;

    if row.status == PullRequestStatus::Merged {
        log::info!("[lifecycle] Pull request {} already merged", pull_request_id);
        let reviewers = ledger::current_reviewer_ids(pool, row.id).await?;
        return Ok(row.into_pull_request(reviewers));
    }

    let merged_at = now();
    let updated = update_status(
        pool,
        row.id,
        PullRequestStatus::Merged,
        Some(merged_at),
        PullRequestStatus::Open,
    )
    .await?;

    if !updated {
        // Lost a race; a concurrent merge still leaves us idempotent
        let current = get(pool, pull_request_id).await?;
        if current.status == PullRequestStatus::Merged {
            return Ok(current);
        }
        return Err(AppError::conflict(ConflictReason::StaleWrite));
    }

    let reviewers = ledger::current_reviewer_ids(pool, row.id).await?;
    let mut pr = row.into_pull_request(reviewers);
    pr.status = PullRequestStatus::Merged;
    pr.merged_at = Some(from_unix(merged_at));

    log::info!("[lifecycle] Pull request {} merged", pull_request_id);

    Ok(pr)
}

/// Replace one reviewer of an open pull request with a random eligible
/// member of the author's team.
///
/// The replacement is never the author, the old reviewer or anyone else
/// already reviewing. Returns the updated pull request and the replacement's
/// external id.
///
/// Reading the other current reviewers for the exclusion set is
/// best-effort: on failure it is logged and only the author and the old
/// reviewer are excluded. Picking someone already assigned then fails the
/// swap with `Conflict(StaleWrite)`, as does picking someone deactivated
/// after selection.
pub async fn reassign(
    pool: &DbPool,
    rng: &Mutex<StdRng>,
    pull_request_id: &str,
    old_user_id: &str,
) -> Result<(PullRequest, String), AppError> {
    let row = find_request(pool, pull_request_id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("pull request", pull_request_id))?;

    if row.status == PullRequestStatus::Merged {
        return Err(AppError::conflict(ConflictReason::Merged));
    }

    let old_reviewer = registry::find_user(pool, old_user_id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("user", old_user_id))?;

    if !ledger::is_assigned(pool, row.id, old_reviewer.id).await? {
        return Err(AppError::conflict(ConflictReason::NotAssigned));
    }

    let author = registry::find_user_by_id(pool, row.author_internal_id)
        .await?
        .ok_or_else(|| AppError::internal(format!("author of {} is missing", pull_request_id)))?;

    let Some(team_id) = author.team_id else {
        return Err(AppError::not_found_with_id("author team", author.user_id));
    };

    let mut exclude = vec![author.id, old_reviewer.id];
    match ledger::current_reviewers(pool, row.id).await {
        Ok(reviewers) => exclude.extend(reviewers.into_iter().map(|r| r.id)),
        Err(e) => {
            log::warn!(
                "[lifecycle] Failed to read reviewers of {}, excluding only author and {}: {}",
                pull_request_id,
                old_user_id,
                e
            );
        }
    }

    let replacement = selector::select_random(pool, team_id, &exclude, 1, rng)
        .await?
        .into_iter()
        .next()
        .ok_or(AppError::NoCandidate)?;

    ledger::swap_reviewer(pool, row.id, old_reviewer.id, replacement.id).await?;
    ledger::note_history(pool, replacement.id, row.id).await;

    let reviewers = ledger::current_reviewer_ids(pool, row.id).await?;
    let pr = row.into_pull_request(reviewers);

    log::info!(
        "[lifecycle] Pull request {}: reviewer {} replaced by {}",
        pull_request_id,
        old_user_id,
        replacement.user_id
    );

    Ok((pr, replacement.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{initialize, PoolSettings};
    use crate::models::{NewTeam, TeamMember};
    use rand::SeedableRng;
    use tempfile::{tempdir, TempDir};

    async fn setup(members: &[(&str, &str, bool)]) -> (TempDir, DbPool) {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db"), PoolSettings::default())
            .await
            .unwrap();
        registry::create_team(
            &pool,
            &NewTeam {
                team_name: "backend".into(),
                members: members
                    .iter()
                    .map(|(id, name, active)| TeamMember {
                        user_id: id.to_string(),
                        username: name.to_string(),
                        is_active: *active,
                    })
                    .collect(),
            },
        )
        .await
        .unwrap();
        (dir, pool)
    }

    fn rng() -> Mutex<StdRng> {
        Mutex::new(StdRng::seed_from_u64(3))
    }

    #[tokio::test]
    async fn test_create_assigns_two_reviewers() {
        let (_dir, pool) =
            setup(&[("u1", "Alice", true), ("u2", "Bob", true), ("u3", "Carol", true)]).await;

        let pr = create(&pool, "pr-1", "T", "u1").await.unwrap();
        assert_eq!(pr.status, PullRequestStatus::Open);
        assert_eq!(pr.assigned_reviewers, vec!["u2", "u3"]);
        assert!(pr.merged_at.is_none());
    }

    #[tokio::test]
    async fn test_create_with_single_candidate() {
        let (_dir, pool) = setup(&[("u1", "Alice", true), ("u2", "Bob", true)]).await;

        let pr = create(&pool, "pr-1", "T", "u1").await.unwrap();
        assert_eq!(pr.assigned_reviewers, vec!["u2"]);
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let (_dir, pool) = setup(&[("u1", "Alice", true), ("u2", "Bob", true)]).await;

        create(&pool, "pr-1", "T", "u1").await.unwrap();
        let err = create(&pool, "pr-1", "T", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_and_inactive_authors() {
        let (_dir, pool) = setup(&[("u1", "Alice", false), ("u2", "Bob", true)]).await;

        let err = create(&pool, "pr-1", "T", "ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        let err = create(&pool, "pr-1", "T", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        // Neither attempt persisted anything
        assert!(find_request(&pool, "pr-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_candidate_leaves_request_persisted() {
        let (_dir, pool) = setup(&[("u1", "Alice", true), ("u2", "Bob", false)]).await;

        let err = create(&pool, "pr-1", "T", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::NoCandidate));

        let pr = get(&pool, "pr-1").await.unwrap();
        assert_eq!(pr.status, PullRequestStatus::Open);
        assert!(pr.assigned_reviewers.is_empty());
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let (_dir, pool) = setup(&[("u1", "Alice", true), ("u2", "Bob", true)]).await;
        create(&pool, "pr-1", "T", "u1").await.unwrap();

        let first = merge(&pool, "pr-1").await.unwrap();
        assert_eq!(first.status, PullRequestStatus::Merged);
        assert!(first.merged_at.is_some());

        let second = merge(&pool, "pr-1").await.unwrap();
        assert_eq!(second.status, PullRequestStatus::Merged);
        assert_eq!(second.merged_at, first.merged_at);
        assert_eq!(second.assigned_reviewers, first.assigned_reviewers);
    }

    #[tokio::test]
    async fn test_merge_unknown() {
        let (_dir, pool) = setup(&[("u1", "Alice", true)]).await;
        let err = merge(&pool, "nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reassign_picks_outsider() {
        let (_dir, pool) = setup(&[
            ("u1", "Alice", true),
            ("u2", "Bob", true),
            ("u3", "Carol", true),
            ("u4", "Dave", true),
        ])
        .await;
        let pr = create(&pool, "pr-1", "T", "u1").await.unwrap();
        assert_eq!(pr.assigned_reviewers, vec!["u2", "u3"]);

        let (pr, replacement) = reassign(&pool, &rng(), "pr-1", "u2").await.unwrap();
        assert_eq!(replacement, "u4");
        assert_eq!(pr.assigned_reviewers, vec!["u3", "u4"]);
    }

    #[tokio::test]
    async fn test_reassign_without_spare_member() {
        let (_dir, pool) =
            setup(&[("u1", "Alice", true), ("u2", "Bob", true), ("u3", "Carol", true)]).await;
        create(&pool, "pr-1", "T", "u1").await.unwrap();

        let err = reassign(&pool, &rng(), "pr-1", "u2").await.unwrap_err();
        assert!(matches!(err, AppError::NoCandidate));

        // Nothing changed
        let pr = get(&pool, "pr-1").await.unwrap();
        assert_eq!(pr.assigned_reviewers, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_reassign_after_merge_conflicts() {
        let (_dir, pool) =
            setup(&[("u1", "Alice", true), ("u2", "Bob", true), ("u3", "Carol", true)]).await;
        create(&pool, "pr-1", "T", "u1").await.unwrap();
        merge(&pool, "pr-1").await.unwrap();

        let err = reassign(&pool, &rng(), "pr-1", "u2").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict {
                reason: ConflictReason::Merged
            }
        ));
    }

    #[tokio::test]
    async fn test_reassign_author_is_not_assigned() {
        let (_dir, pool) =
            setup(&[("u1", "Alice", true), ("u2", "Bob", true), ("u3", "Carol", true)]).await;
        create(&pool, "pr-1", "T", "u1").await.unwrap();

        let err = reassign(&pool, &rng(), "pr-1", "u1").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict {
                reason: ConflictReason::NotAssigned
            }
        ));
    }
}
