//! Application error types.
//!
//! Every engine operation returns either a plain data record or an
//! [`AppError`]. Errors are serializable so the HTTP layer can hand them to
//! callers unchanged, and each one maps to a stable [`ErrorCode`] so callers
//! never need to parse the message.

use serde::Serialize;
use thiserror::Error;

/// Coarse failure kinds callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    Conflict,
    NoCandidate,
    InvalidInput,
    Unavailable,
    Internal,
}

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TeamExists,
    PrExists,
    PrMerged,
    NotAssigned,
    StaleWrite,
    NoCandidate,
    NotFound,
    BadRequest,
    Unavailable,
    InternalError,
}

impl ErrorCode {
    /// The code as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TeamExists => "TEAM_EXISTS",
            Self::PrExists => "PR_EXISTS",
            Self::PrMerged => "PR_MERGED",
            Self::NotAssigned => "NOT_ASSIGNED",
            Self::StaleWrite => "STALE_WRITE",
            Self::NoCandidate => "NO_CANDIDATE",
            Self::NotFound => "NOT_FOUND",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unavailable => "UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of entity a duplicate id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingEntity {
    Team,
    PullRequest,
}

impl std::fmt::Display for ExistingEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Team => write!(f, "team"),
            Self::PullRequest => write!(f, "pull request"),
        }
    }
}

/// Why a state-dependent operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// The pull request is merged and its reviewer set is frozen.
    Merged,
    /// The user is not a current reviewer of the pull request.
    NotAssigned,
    /// The precondition checked earlier no longer held at write time.
    StaleWrite,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merged => write!(f, "cannot modify merged pull request"),
            Self::NotAssigned => write!(f, "user is not assigned as reviewer"),
            Self::StaleWrite => write!(f, "pull request changed concurrently"),
        }
    }
}

/// Application-level errors returned by every engine operation.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// A team or pull request with this id already exists.
    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: ExistingEntity, id: String },

    /// Requested resource not found.
    #[error("{resource} not found")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// The operation is not allowed in the current state.
    #[error("{reason}")]
    Conflict { reason: ConflictReason },

    /// Reviewer selection found nobody eligible.
    #[error("no active candidates available for assignment")]
    NoCandidate,

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// Storage did not answer in time or is shutting down.
    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create an already-exists error for a team.
    pub fn team_exists(team_name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: ExistingEntity::Team,
            id: team_name.into(),
        }
    }

    /// Create an already-exists error for a pull request.
    pub fn pull_request_exists(pull_request_id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: ExistingEntity::PullRequest,
            id: pull_request_id.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create a conflict error.
    pub fn conflict(reason: ConflictReason) -> Self {
        Self::Conflict { reason }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a database error with operation context.
    pub fn database_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NoCandidate => ErrorKind::NoCandidate,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Database { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// The stable wire code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyExists {
                kind: ExistingEntity::Team,
                ..
            } => ErrorCode::TeamExists,
            Self::AlreadyExists {
                kind: ExistingEntity::PullRequest,
                ..
            } => ErrorCode::PrExists,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Conflict { reason } => match reason {
                ConflictReason::Merged => ErrorCode::PrMerged,
                ConflictReason::NotAssigned => ErrorCode::NotAssigned,
                ConflictReason::StaleWrite => ErrorCode::StaleWrite,
            },
            Self::NoCandidate => ErrorCode::NoCandidate,
            Self::InvalidInput { .. } => ErrorCode::BadRequest,
            Self::Unavailable { .. } => ErrorCode::Unavailable,
            Self::Database { .. } | Self::Internal { .. } => ErrorCode::InternalError,
        }
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("row"),
            sqlx::Error::PoolTimedOut => Self::unavailable("timed out waiting for a connection"),
            sqlx::Error::PoolClosed => Self::unavailable("connection pool is closed"),
            other => Self::database(other.to_string()),
        }
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        match err {
            crate::db::DbError::Sqlite(e) => Self::from(e),
            other => Self::database_with_op(other.to_string(), "initialize"),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::unavailable("storage operation timed out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = AppError::database("connection failed");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"Database\""));
        assert!(json.contains("connection failed"));
    }

    #[test]
    fn test_not_found_with_id() {
        let err = AppError::not_found_with_id("pull request", "pr-1");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"resource\":\"pull request\""));
        assert!(json.contains("\"id\":\"pr-1\""));
        assert_eq!(err.to_string(), "pull request not found");
    }

    #[test]
    fn test_optional_fields_not_serialized() {
        let err = AppError::database("error");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("operation"));
    }

    #[test]
    fn test_codes_are_derived_from_structure() {
        assert_eq!(AppError::team_exists("backend").code(), ErrorCode::TeamExists);
        assert_eq!(AppError::pull_request_exists("pr-1").code(), ErrorCode::PrExists);
        assert_eq!(
            AppError::conflict(ConflictReason::Merged).code(),
            ErrorCode::PrMerged
        );
        assert_eq!(
            AppError::conflict(ConflictReason::NotAssigned).code(),
            ErrorCode::NotAssigned
        );
        assert_eq!(AppError::NoCandidate.code(), ErrorCode::NoCandidate);
        assert_eq!(AppError::invalid_input("x").code(), ErrorCode::BadRequest);
        assert_eq!(AppError::database("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(err.code().as_str(), "UNAVAILABLE");
    }

    #[test]
    fn test_display_impl() {
        assert_eq!(
            AppError::team_exists("backend").to_string(),
            "team 'backend' already exists"
        );
        assert_eq!(
            AppError::conflict(ConflictReason::NotAssigned).to_string(),
            "user is not assigned as reviewer"
        );
    }
}
