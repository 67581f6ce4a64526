//! User (team member) model.

use serde::Serialize;
use sqlx::FromRow;

/// A registered user, resolved together with its team name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    /// Internal row id.
    #[serde(skip)]
    pub id: i64,

    /// Stable external identifier.
    pub user_id: String,

    /// Display name.
    pub username: String,

    /// Internal id of the owning team, if any.
    #[serde(skip)]
    pub team_id: Option<i64>,

    /// Name of the owning team, if any.
    pub team_name: Option<String>,

    pub is_active: bool,
}
