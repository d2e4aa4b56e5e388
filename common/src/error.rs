// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! The error taxonomy shared by every component in this workspace.
//!
//! Each variant corresponds to one of the kinds described in the
//! error-handling design: malformed input never reaches persistence,
//! signature failures are recorded for audit, constraint collisions name
//! the conflicting record, and transient failures are retried internally
//! before ever reaching here.

use thiserror::Error;

/// Errors surfaced across crate boundaries by the core components
/// (receipt store, allocation summary, action queue, allocation manager,
/// management API).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("conflict: {message} (conflicting id: {conflicting_id})")]
    Conflict {
        message: String,
        conflicting_id: String,
    },

    #[error("not found: {0:?}")]
    NotFound(Vec<String>),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("transient error, retry budget exhausted: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Whether the caller may retry the operation that produced this error.
    ///
    /// `Transient` is the only retryable variant; every other variant
    /// reflects a decision already made (bad input, a conflict, a
    /// precondition failure) that retrying cannot change. Kept as an
    /// explicit method (instead of matching inline at call sites) so the
    /// retry policy has a single place to live.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn not_found(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::NotFound(ids.into_iter().map(Into::into).collect())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
