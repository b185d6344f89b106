//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and oracle calls into use-case level APIs.
//! - Keep CLI/transport layers decoupled from storage details.
//!
//! # Invariants
//! - Every failed operation leaves persisted state untouched.
//! - Oracle-backed operations hold the per-date lock across
//!   read → oracle → commit.

pub mod date_lock;
pub mod diary_service;
pub mod log_service;
pub mod task_service;

use serde::Serialize;

/// Coarse error category shared by every service error.
///
/// Boundaries map this to user-facing messages and status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    NoLogs,
    OracleUnavailable,
    OracleFormat,
    Storage,
}

impl ErrorKind {
    pub(crate) fn from_oracle(err: &crate::oracle::OracleError) -> Self {
        match err {
            crate::oracle::OracleError::Format(_) => Self::OracleFormat,
            crate::oracle::OracleError::NotConfigured
            | crate::oracle::OracleError::Unavailable(_) => Self::OracleUnavailable,
        }
    }
}
