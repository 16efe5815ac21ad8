//! Quota-Aware Batch Executor
//!
//! Runs a query that accepts many subscriptions per call. Subscriptions are
//! split into fixed-size groups; each group is paged through with the
//! server's continuation token. Every response must report the remaining
//! request quota and the time until it resets. When the quota is used up
//! the executor sleeps until the reset before its next request, and a
//! response without those headers stops the run outright.
//!
//! - [`graph`] - Azure Resource Graph implementation of [`BatchQuery`]

pub mod graph;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Header carrying the number of requests left in the current window
pub const REMAINING_QUOTA_HEADER: &str = "x-ms-user-quota-remaining";

/// Header carrying the time until the quota window resets (`hh:mm:ss`)
pub const QUOTA_RESETS_AFTER_HEADER: &str = "x-ms-user-quota-resets-after";

/// Most subscriptions a single query may target
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Error, Debug)]
pub enum QuotaError {
    #[error("response is missing required quota header {0}")]
    MissingHeader(&'static str),

    #[error("invalid value {value:?} for quota header {name}")]
    InvalidHeader { name: &'static str, value: String },

    #[error("batch query cancelled")]
    Cancelled,
}

/// Quota reported by one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub remaining: u64,
    pub resets_after: Duration,
}

impl QuotaState {
    /// Parse both quota headers; either one missing is an error
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, QuotaError> {
        let remaining = header_str(headers, REMAINING_QUOTA_HEADER)?;
        let remaining = remaining
            .trim()
            .parse::<u64>()
            .map_err(|_| QuotaError::InvalidHeader {
                name: REMAINING_QUOTA_HEADER,
                value: remaining.to_string(),
            })?;

        let resets_after = header_str(headers, QUOTA_RESETS_AFTER_HEADER)?;
        let resets_after =
            parse_resets_after(resets_after).ok_or_else(|| QuotaError::InvalidHeader {
                name: QUOTA_RESETS_AFTER_HEADER,
                value: resets_after.to_string(),
            })?;

        Ok(Self {
            remaining,
            resets_after,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, QuotaError> {
    let value = headers.get(name).ok_or(QuotaError::MissingHeader(name))?;
    value.to_str().map_err(|_| QuotaError::InvalidHeader {
        name,
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    })
}

/// Parse `hh:mm:ss` with optional fractional seconds
fn parse_resets_after(value: &str) -> Option<Duration> {
    let mut parts = value.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;

    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
    Duration::from_secs(whole).checked_add(Duration::from_secs_f64(seconds))
}

/// One page of query results
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub rows: Vec<Value>,
    pub skip_token: Option<String>,
    pub headers: HeaderMap,
}

/// A query that targets many subscriptions per call
#[async_trait]
pub trait BatchQuery: Send + Sync {
    async fn query_page(&self, subscriptions: &[String], skip_token: Option<&str>)
        -> Result<QueryPage>;
}

/// A subscription group whose query failed
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub index: usize,
    pub subscriptions: Vec<String>,
    pub message: String,
}

/// Rows of every successful group plus the failed groups
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub rows: Vec<Value>,
    pub failures: Vec<BatchFailure>,
    /// Subscriptions whose group completed
    pub completed: Vec<String>,
}

pub struct BatchExecutor<Q> {
    query: Q,
    batch_size: usize,
}

impl<Q: BatchQuery> BatchExecutor<Q> {
    pub fn new(query: Q) -> Self {
        Self {
            query,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Subscriptions per query (zero is treated as one)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Query every subscription group to completion.
    ///
    /// A failed query drops that group's rows and moves on to the next
    /// group. Missing quota headers or cancellation abort the whole run.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        subscriptions: &[String],
    ) -> Result<BatchOutcome, QuotaError> {
        let mut outcome = BatchOutcome::default();
        let mut pending_wait: Option<Duration> = None;

        for (index, group) in subscriptions.chunks(self.batch_size).enumerate() {
            let mut rows = Vec::new();
            let mut skip_token: Option<String> = None;
            let mut failed = false;

            loop {
                if let Some(wait) = pending_wait.take() {
                    tracing::info!("quota exhausted, waiting {:?} for reset", wait);
                    wait_for_reset(cancel, wait).await?;
                }
                if cancel.is_cancelled() {
                    return Err(QuotaError::Cancelled);
                }

                let page = match self.query.query_page(group, skip_token.as_deref()).await {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::warn!("batch {} ({} subscriptions) failed: {:#}", index, group.len(), e);
                        outcome.failures.push(BatchFailure {
                            index,
                            subscriptions: group.to_vec(),
                            message: format!("{:#}", e),
                        });
                        failed = true;
                        break;
                    }
                };

                let quota = QuotaState::from_headers(&page.headers)?;
                tracing::debug!(
                    "batch {}: {} rows, quota remaining {}, resets after {:?}",
                    index,
                    page.rows.len(),
                    quota.remaining,
                    quota.resets_after
                );
                if quota.is_exhausted() {
                    pending_wait = Some(quota.resets_after);
                }

                rows.extend(page.rows);
                match page.skip_token {
                    Some(token) if !token.is_empty() => skip_token = Some(token),
                    _ => break,
                }
            }

            if !failed {
                outcome.rows.extend(rows);
                outcome.completed.extend(group.iter().cloned());
            }
        }

        Ok(outcome)
    }
}

async fn wait_for_reset(cancel: &CancellationToken, wait: Duration) -> Result<(), QuotaError> {
    tokio::select! {
        _ = tokio::time::sleep(wait) => Ok(()),
        _ = cancel.cancelled() => Err(QuotaError::Cancelled),
    }
}
