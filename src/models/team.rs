//! Team model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A member as declared in a team payload and as listed in a team snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TeamMember {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub is_active: bool,
}

/// Input for creating a team.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTeam {
    pub team_name: String,
    pub members: Vec<TeamMember>,
}

/// A team with its members ordered by display name.
#[derive(Debug, Clone, Serialize)]
pub struct Team {
    /// Internal row id.
    #[serde(skip)]
    pub id: i64,

    pub team_name: String,

    pub members: Vec<TeamMember>,
}

impl Team {
    /// Look up a member by external id.
    #[cfg(test)]
    pub fn member(&self, user_id: &str) -> Option<&TeamMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }
}
