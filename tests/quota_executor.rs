//! Tests for the quota-aware batch executor
//!
//! The query is scripted page by page; tokio's paused clock makes quota
//! waits observable without real sleeping.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use describe_engine::quota::{
    BatchExecutor, BatchQuery, QueryPage, QuotaError, QUOTA_RESETS_AFTER_HEADER,
    REMAINING_QUOTA_HEADER,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

enum Step {
    Page {
        rows: usize,
        skip_token: Option<&'static str>,
        remaining: Option<&'static str>,
        resets_after: Option<&'static str>,
    },
    Fail(&'static str),
}

fn page(rows: usize, skip_token: Option<&'static str>, remaining: &'static str) -> Step {
    Step::Page {
        rows,
        skip_token,
        remaining: Some(remaining),
        resets_after: Some("00:00:05"),
    }
}

#[derive(Debug, Clone)]
struct Call {
    subscriptions: Vec<String>,
    skip_token: Option<String>,
    at: Instant,
}

struct ScriptedQuery {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedQuery {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<'a> BatchQuery for &'a ScriptedQuery {
    async fn query_page(&self, subscriptions: &[String], skip_token: Option<&str>) -> Result<QueryPage> {
        self.calls.lock().unwrap().push(Call {
            subscriptions: subscriptions.to_vec(),
            skip_token: skip_token.map(|s| s.to_string()),
            at: Instant::now(),
        });

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no more scripted pages"))?;

        match step {
            Step::Fail(message) => Err(anyhow!(message)),
            Step::Page {
                rows,
                skip_token,
                remaining,
                resets_after,
            } => {
                let mut headers = HeaderMap::new();
                if let Some(remaining) = remaining {
                    headers.insert(REMAINING_QUOTA_HEADER, HeaderValue::from_static(remaining));
                }
                if let Some(resets_after) = resets_after {
                    headers.insert(QUOTA_RESETS_AFTER_HEADER, HeaderValue::from_static(resets_after));
                }
                Ok(QueryPage {
                    rows: (0..rows)
                        .map(|i| json!({"subscriptionId": subscriptions[0], "n": i}))
                        .collect(),
                    skip_token: skip_token.map(|s| s.to_string()),
                    headers,
                })
            }
        }
    }
}

fn subscriptions(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("sub-{}", i)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_pages_until_no_continuation_token() {
    let query = ScriptedQuery::new(vec![
        page(2, Some("page-2"), "10"),
        page(2, Some("page-3"), "9"),
        page(1, None, "8"),
    ]);

    let outcome = BatchExecutor::new(&query)
        .run(&CancellationToken::new(), &subscriptions(3))
        .await
        .unwrap();

    assert_eq!(outcome.rows.len(), 5);
    assert!(outcome.failures.is_empty());

    let calls = query.calls();
    let tokens: Vec<Option<String>> = calls.iter().map(|c| c.skip_token.clone()).collect();
    assert_eq!(tokens, vec![None, Some("page-2".to_string()), Some("page-3".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_sleeps_for_reset_when_quota_exhausted() {
    let query = ScriptedQuery::new(vec![
        page(1, Some("t2"), "2"),
        page(1, Some("t3"), "0"),
        page(1, None, "14"),
    ]);

    let outcome = BatchExecutor::new(&query)
        .run(&CancellationToken::new(), &subscriptions(1))
        .await
        .unwrap();
    assert_eq!(outcome.rows.len(), 3);

    let calls = query.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[1].at - calls[0].at < Duration::from_secs(1));
    assert!(calls[2].at - calls[1].at >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_missing_header_stops_immediately() {
    let query = ScriptedQuery::new(vec![
        page(1, Some("t2"), "5"),
        Step::Page {
            rows: 1,
            skip_token: Some("t3"),
            remaining: Some("4"),
            resets_after: None,
        },
        page(1, None, "3"),
    ]);

    let err = BatchExecutor::new(&query)
        .run(&CancellationToken::new(), &subscriptions(1))
        .await
        .unwrap_err();

    assert!(matches!(err, QuotaError::MissingHeader(QUOTA_RESETS_AFTER_HEADER)));
    assert_eq!(query.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_subscriptions_split_into_batches() {
    let query = ScriptedQuery::new(vec![page(1, None, "9"), page(1, None, "8"), page(1, None, "7")]);

    let outcome = BatchExecutor::new(&query)
        .with_batch_size(2)
        .run(&CancellationToken::new(), &subscriptions(5))
        .await
        .unwrap();

    let sizes: Vec<usize> = query.calls().iter().map(|c| c.subscriptions.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(outcome.completed.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_does_not_stop_others() {
    let query = ScriptedQuery::new(vec![
        page(3, Some("more"), "9"),
        Step::Fail("BadRequest: query too complex"),
        page(2, None, "8"),
    ]);

    let outcome = BatchExecutor::new(&query)
        .with_batch_size(2)
        .run(&CancellationToken::new(), &subscriptions(4))
        .await
        .unwrap();

    // The first batch's partial rows are dropped with the batch
    assert_eq!(outcome.rows.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 0);
    assert_eq!(outcome.failures[0].subscriptions, vec!["sub-0", "sub-1"]);
    assert!(outcome.failures[0].message.contains("query too complex"));
    assert_eq!(outcome.completed, vec!["sub-2", "sub-3"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_quota_wait() {
    let query = ScriptedQuery::new(vec![
        Step::Page {
            rows: 1,
            skip_token: Some("t2"),
            remaining: Some("0"),
            resets_after: Some("00:10:00"),
        },
        page(1, None, "10"),
    ]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = BatchExecutor::new(&query)
        .run(&cancel, &subscriptions(1))
        .await
        .unwrap_err();

    assert!(matches!(err, QuotaError::Cancelled));
    assert_eq!(query.calls().len(), 1);
}
