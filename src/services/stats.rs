//! Assignment statistics, read from the history table.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{PullRequestReviewerStat, UserAssignmentStat};

/// All-time assignment count per user, busiest first.
pub async fn user_stats(pool: &DbPool) -> Result<Vec<UserAssignmentStat>, AppError> {
    let stats = sqlx::query_as::<_, UserAssignmentStat>(
        r#"
        SELECT u.user_id, COUNT(*) AS assignment_count
        FROM assignment_stats s
        INNER JOIN users u ON s.user_id = u.id
        GROUP BY u.user_id
        ORDER BY assignment_count DESC, u.user_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(stats)
}

/// Number of distinct reviewers each pull request has ever had, highest first.
pub async fn pull_request_stats(pool: &DbPool) -> Result<Vec<PullRequestReviewerStat>, AppError> {
    let stats = sqlx::query_as::<_, PullRequestReviewerStat>(
        r#"
        SELECT pr.pull_request_id AS pr_id, COUNT(*) AS reviewer_count
        FROM assignment_stats s
        INNER JOIN pull_requests pr ON s.pr_id = pr.id
        GROUP BY pr.pull_request_id
        ORDER BY reviewer_count DESC, pr.pull_request_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{initialize, PoolSettings};
    use crate::models::{NewTeam, TeamMember};
    use crate::services::{ledger, lifecycle, registry};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_empty_history_has_no_rows() {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db"), PoolSettings::default())
            .await
            .unwrap();

        assert!(user_stats(&pool).await.unwrap().is_empty());
        assert!(pull_request_stats(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_survives_reviewer_removal() {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db"), PoolSettings::default())
            .await
            .unwrap();
        registry::create_team(
            &pool,
            &NewTeam {
                team_name: "backend".into(),
                members: ["u1", "u2", "u3"]
                    .iter()
                    .map(|id| TeamMember {
                        user_id: id.to_string(),
                        username: id.to_string(),
                        is_active: true,
                    })
                    .collect(),
            },
        )
        .await
        .unwrap();
        let pr = lifecycle::create(&pool, "pr-1", "T", "u1").await.unwrap();

        let u2 = registry::find_user(&pool, "u2").await.unwrap().unwrap();
        ledger::remove_assignment(&pool, pr.id, u2.id).await.unwrap();

        let by_user = user_stats(&pool).await.unwrap();
        assert_eq!(
            by_user,
            vec![
                UserAssignmentStat {
                    user_id: "u2".into(),
                    assignment_count: 1
                },
                UserAssignmentStat {
                    user_id: "u3".into(),
                    assignment_count: 1
                },
            ]
        );

        let by_pr = pull_request_stats(&pool).await.unwrap();
        assert_eq!(
            by_pr,
            vec![PullRequestReviewerStat {
                pr_id: "pr-1".into(),
                reviewer_count: 2
            }]
        );
    }
}
