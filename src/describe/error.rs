//! Request-level errors
//!
//! Only problems with the request itself abort a describe call. Failures of
//! individual scopes are folded into the result aggregate instead.

use crate::quota::QuotaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DescribeError {
    #[error("unsupported resource type: {0}")]
    UnknownResourceType(String),

    #[error("explicit scopes cannot be combined with include-disabled scope listing")]
    ConflictingScopeOptions,

    #[error("failed to enumerate scopes: {0:#}")]
    ScopeEnumeration(anyhow::Error),

    #[error("no scopes available to describe")]
    NoScopes,

    /// The batch query could not stay within its quota; nothing further was sent
    #[error("batch query aborted: {0}")]
    Quota(QuotaError),
}

pub type DescribeResult<T> = Result<T, DescribeError>;
