//! Reviewer assignment service.
//!
//! Keeps a registry of teams and members, assigns up to two reviewers from
//! the author's team to each new pull request, and exposes merge,
//! reassignment and statistics over a small HTTP API backed by SQLite.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod server;
pub mod services;

pub use error::AppError;
pub use services::AssignmentEngine;
