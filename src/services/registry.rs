//! Team and user registry.
//!
//! Sole writer of team membership and of each member's active flag. Members
//! are upserted by external id, so re-declaring a member in another team's
//! payload moves them there.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{NewTeam, PullRequestShort, Team, TeamMember, User};
use crate::services::{ledger, now};
use sqlx::SqliteExecutor;

const USER_SELECT: &str = r#"
    SELECT u.id, u.user_id, u.username, u.team_id, t.team_name, u.is_active
    FROM users u
    LEFT JOIN teams t ON u.team_id = t.id
"#;

/// Create a team and upsert its members in one transaction.
///
/// Fails with `AlreadyExists` if the team name is taken. Members declared
/// inactive here are released from their open reviews, the same as an
/// explicit deactivation.
pub async fn create_team(pool: &DbPool, team: &NewTeam) -> Result<Team, AppError> {
    let mut tx = pool.begin().await?;

    // The insert must be the first statement: a transaction that reads
    // before writing cannot wait for the write lock and fails as busy.
    let team_id: i64 = sqlx::query_scalar("INSERT INTO teams (team_name) VALUES (?) RETURNING id")
        .bind(&team.team_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::team_exists(&team.team_name)
            }
            other => AppError::from(other),
        })?;

    for member in &team.members {
        let user_id = upsert_member(&mut *tx, member, team_id).await?;
        if !member.is_active {
            let released = ledger::remove_from_open_requests(&mut *tx, user_id).await?;
            if released > 0 {
                log::info!(
                    "[registry] Released inactive member {} from {} open pull request(s)",
                    member.user_id,
                    released
                );
            }
        }
    }

    tx.commit().await?;

    log::info!(
        "[registry] Team {} created with {} member(s)",
        team.team_name,
        team.members.len()
    );

    get_team(pool, &team.team_name).await
}

/// Get a team with its members ordered by display name.
pub async fn get_team(pool: &DbPool, team_name: &str) -> Result<Team, AppError> {
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT id, team_name FROM teams WHERE team_name = ?")
            .bind(team_name)
            .fetch_optional(pool)
            .await?;

    let Some((id, team_name)) = row else {
        return Err(AppError::not_found_with_id("team", team_name));
    };

    let members = sqlx::query_as::<_, TeamMember>(
        r#"
        SELECT user_id, username, is_active
        FROM users
        WHERE team_id = ?
        ORDER BY username, user_id
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Team {
        id,
        team_name,
        members,
    })
}

/// Insert or overwrite a member, returning its internal id.
pub async fn upsert_member<'e, E>(
    executor: E,
    member: &TeamMember,
    team_id: i64,
) -> Result<i64, AppError>
where
    E: SqliteExecutor<'e>,
{
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO users (user_id, username, team_id, is_active, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (user_id) DO UPDATE SET
            username = excluded.username,
            team_id = excluded.team_id,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(&member.user_id)
    .bind(&member.username)
    .bind(team_id)
    .bind(member.is_active)
    .bind(now())
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Resolve a user by external id.
pub async fn find_user<'e, E>(executor: E, user_id: &str) -> Result<Option<User>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.user_id = ?"))
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

    Ok(user)
}

/// Resolve a user by internal id.
pub async fn find_user_by_id<'e, E>(executor: E, id: i64) -> Result<Option<User>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(user)
}

/// Active members of a team minus `exclude` (internal ids), ordered by
/// display name. This is the base order reviewer selection starts from.
pub async fn list_active_members<'e, E>(
    executor: E,
    team_id: i64,
    exclude: &[i64],
) -> Result<Vec<User>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let users = sqlx::query_as::<_, User>(&format!(
        "{USER_SELECT} WHERE u.team_id = ? AND u.is_active = 1 ORDER BY u.username, u.user_id"
    ))
    .bind(team_id)
    .fetch_all(executor)
    .await?;

    Ok(users
        .into_iter()
        .filter(|u| !exclude.contains(&u.id))
        .collect())
}

/// Set a member's active flag.
///
/// Deactivation also removes the member from the reviewer set of every open
/// pull request, in the same transaction. Merged pull requests keep their
/// reviewers. No replacement reviewer is chosen.
pub async fn set_active(pool: &DbPool, user_id: &str, is_active: bool) -> Result<User, AppError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE user_id = ?")
        .bind(is_active)
        .bind(now())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found_with_id("user", user_id));
    }

    let user = find_user(&mut *tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("user", user_id))?;

    if !is_active {
        let released = ledger::remove_from_open_requests(&mut *tx, user.id).await?;
        if released > 0 {
            log::info!(
                "[registry] Removed inactive reviewer {} from {} open pull request(s)",
                user_id,
                released
            );
        }
    }

    tx.commit().await?;

    log::info!(
        "[registry] User {} active status set to {}",
        user_id,
        is_active
    );

    Ok(user)
}

/// Pull requests on which the user is currently a reviewer, newest first.
///
/// Unknown users simply have no reviews.
pub async fn user_reviews(pool: &DbPool, user_id: &str) -> Result<Vec<PullRequestShort>, AppError> {
    let reviews = sqlx::query_as::<_, PullRequestShort>(
        r#"
        SELECT pr.pull_request_id, pr.pull_request_name, a.user_id AS author_id, pr.status
        FROM pull_requests pr
        INNER JOIN pr_reviewers rev ON pr.id = rev.pull_request_id
        INNER JOIN users reviewer ON rev.user_id = reviewer.id
        INNER JOIN users a ON pr.author_id = a.id
        WHERE reviewer.user_id = ?
        ORDER BY pr.created_at DESC, pr.id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(reviews)
}
