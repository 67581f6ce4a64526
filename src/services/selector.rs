//! Reviewer selection.
//!
//! Two strategies over the eligible pool (active team members not in the
//! exclusion set, in display-name order):
//!
//! - **Balanced**: rank by current open-assignment count, ties kept in base
//!   order, take the first `count`. Used when a pull request is created.
//! - **Random**: uniform shuffle, take the first `count`. Used for
//!   reassignment.
//!
//! When the pool has at most `count` members it is returned whole. An empty
//! pool is reported as `NoCandidate`.
//!
//! Load counts are read one candidate at a time, not as one snapshot.
//! Concurrent creations can therefore rank on stale counts and pick the same
//! lightly loaded reviewer; balance is exact only under serialized access.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::User;
use crate::services::{ledger, registry};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Mutex;

/// An eligible reviewer together with their current load.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub user: User,
    pub open_assignments: i64,
}

/// Rank candidates by ascending load and take the first `count`.
///
/// The sort is stable, so equally loaded candidates keep their input order.
pub fn rank_balanced(mut candidates: Vec<Candidate>, count: usize) -> Vec<User> {
    candidates.sort_by_key(|c| c.open_assignments);
    candidates
        .into_iter()
        .take(count)
        .map(|c| c.user)
        .collect()
}

/// Shuffle the pool uniformly and take the first `count`.
pub fn pick_random<R: Rng + ?Sized>(mut pool: Vec<User>, count: usize, rng: &mut R) -> Vec<User> {
    if pool.len() <= count {
        return pool;
    }
    pool.shuffle(rng);
    pool.truncate(count);
    pool
}

/// Load-aware selection over a team.
pub async fn select_balanced(
    pool: &DbPool,
    team_id: i64,
    exclude: &[i64],
    count: usize,
) -> Result<Vec<User>, AppError> {
    let eligible = registry::list_active_members(pool, team_id, exclude).await?;

    if eligible.is_empty() {
        return Err(AppError::NoCandidate);
    }
    if eligible.len() <= count {
        return Ok(eligible);
    }

    let mut candidates = Vec::with_capacity(eligible.len());
    for user in eligible {
        // A failed read only weakens the heuristic; treat the candidate as idle
        let open_assignments = match ledger::open_assignment_count(pool, user.id).await {
            Ok(n) => n,
            Err(e) => {
                log::warn!(
                    "[selector] Failed to read assignment count for {}: {}",
                    user.user_id,
                    e
                );
                0
            }
        };
        candidates.push(Candidate {
            user,
            open_assignments,
        });
    }

    Ok(rank_balanced(candidates, count))
}

/// Uniformly random selection over a team.
pub async fn select_random(
    pool: &DbPool,
    team_id: i64,
    exclude: &[i64],
    count: usize,
    rng: &Mutex<StdRng>,
) -> Result<Vec<User>, AppError> {
    let eligible = registry::list_active_members(pool, team_id, exclude).await?;

    if eligible.is_empty() {
        return Err(AppError::NoCandidate);
    }

    let mut rng = rng
        .lock()
        .map_err(|_| AppError::internal("random generator lock poisoned"))?;

    Ok(pick_random(eligible, count, &mut *rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn user(id: i64, name: &str) -> User {
        User {
            id,
            user_id: format!("u{}", id),
            username: name.into(),
            team_id: Some(1),
            team_name: Some("backend".into()),
            is_active: true,
        }
    }

    fn candidate(id: i64, name: &str, load: i64) -> Candidate {
        Candidate {
            user: user(id, name),
            open_assignments: load,
        }
    }

    fn ids(users: &[User]) -> Vec<i64> {
        users.iter().map(|u| u.id).collect()
    }

    #[test]
    fn test_balanced_prefers_least_loaded() {
        let picked = rank_balanced(
            vec![
                candidate(1, "Alice", 3),
                candidate(2, "Bob", 0),
                candidate(3, "Carol", 1),
                candidate(4, "Dave", 5),
            ],
            2,
        );
        assert_eq!(ids(&picked), vec![2, 3]);
    }

    #[test]
    fn test_balanced_ties_keep_name_order() {
        let picked = rank_balanced(
            vec![
                candidate(7, "Alice", 1),
                candidate(3, "Bob", 1),
                candidate(5, "Carol", 1),
            ],
            2,
        );
        assert_eq!(ids(&picked), vec![7, 3]);
    }

    #[test]
    fn test_random_returns_small_pool_whole() {
        let mut rng = StdRng::seed_from_u64(1);
        let pool = vec![user(1, "Alice"), user(2, "Bob")];
        let picked = pick_random(pool, 2, &mut rng);
        assert_eq!(ids(&picked), vec![1, 2]);
    }

    #[test]
    fn test_random_is_deterministic_for_a_seed() {
        let pool: Vec<User> = (1..=6).map(|i| user(i, "x")).collect();

        let a = pick_random(pool.clone(), 2, &mut StdRng::seed_from_u64(42));
        let b = pick_random(pool.clone(), 2, &mut StdRng::seed_from_u64(42));
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.len(), 2);
        assert_ne!(a[0].id, a[1].id);
    }

    #[test]
    fn test_random_reaches_every_candidate() {
        let pool: Vec<User> = (1..=4).map(|i| user(i, "x")).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(pick_random(pool.clone(), 1, &mut rng)[0].id);
        }
        assert_eq!(seen.len(), 4);
    }
}
