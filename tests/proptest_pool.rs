//! Property-based tests using proptest
//!
//! These tests verify the worker pool, subscription batching and result
//! aggregation invariants using randomized inputs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use describe_engine::pool::WorkerPool;
use describe_engine::quota::{
    BatchExecutor, BatchQuery, QueryPage, QUOTA_RESETS_AFTER_HEADER, REMAINING_QUOTA_HEADER,
};
use describe_engine::ResultAggregate;
use proptest::prelude::*;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Ok,
    Fail,
    Panic,
}

fn arb_job_kind() -> impl Strategy<Value = JobKind> {
    prop_oneof![
        4 => Just(JobKind::Ok),
        1 => Just(JobKind::Fail),
        1 => Just(JobKind::Panic),
    ]
}

/// Records the subscription groups it is asked about, one page per group
#[derive(Default)]
struct RecordingQuery {
    groups: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl<'a> BatchQuery for &'a RecordingQuery {
    async fn query_page(&self, subscriptions: &[String], _skip_token: Option<&str>) -> Result<QueryPage> {
        self.groups.lock().unwrap().push(subscriptions.to_vec());

        let mut headers = HeaderMap::new();
        headers.insert(REMAINING_QUOTA_HEADER, HeaderValue::from_static("100"));
        headers.insert(QUOTA_RESETS_AFTER_HEADER, HeaderValue::from_static("00:00:01"));

        Ok(QueryPage {
            rows: subscriptions
                .iter()
                .map(|s| json!({"subscriptionId": s}))
                .collect(),
            skip_token: None,
            headers,
        })
    }
}

#[derive(Debug, Clone)]
enum Record {
    Resources(usize),
    Error(usize),
}

fn arb_record() -> impl Strategy<Value = Record> {
    prop_oneof![
        (0..5usize).prop_map(Record::Resources),
        (0..5usize).prop_map(Record::Error),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every submitted job yields exactly one result at its own index
    #[test]
    fn pool_returns_one_result_per_job(
        kinds in prop::collection::vec(arb_job_kind(), 0..40),
        concurrency in 0..8usize,
    ) {
        let results = tokio_test::block_on(async {
            let mut pool = WorkerPool::new(concurrency);
            for (i, kind) in kinds.iter().copied().enumerate() {
                pool.add_job(move || async move {
                    match kind {
                        JobKind::Ok => Ok(i),
                        JobKind::Fail => Err(anyhow!("job {} failed", i)),
                        JobKind::Panic => panic!("job {} panicked", i),
                    }
                });
            }
            pool.run().await
        });

        prop_assert_eq!(results.len(), kinds.len());
        for (i, (result, kind)) in results.iter().zip(&kinds).enumerate() {
            prop_assert_eq!(result.index, i);
            match kind {
                JobKind::Ok => prop_assert_eq!(result.value.as_ref().ok(), Some(&i)),
                _ => prop_assert!(result.value.is_err()),
            }
        }
    }

    /// Groups never exceed the batch size and cover every subscription in order
    #[test]
    fn batches_cover_all_subscriptions(
        count in 0..60usize,
        batch_size in 0..12usize,
    ) {
        let subscriptions: Vec<String> = (0..count).map(|i| format!("sub-{}", i)).collect();
        let query = RecordingQuery::default();

        let outcome = tokio_test::block_on(
            BatchExecutor::new(&query)
                .with_batch_size(batch_size)
                .run(&CancellationToken::new(), &subscriptions),
        )
        .unwrap();

        let groups = query.groups.lock().unwrap().clone();
        let limit = batch_size.max(1);
        prop_assert!(groups.iter().all(|g| !g.is_empty() && g.len() <= limit));
        prop_assert_eq!(groups.concat(), subscriptions.clone());
        prop_assert_eq!(outcome.completed, subscriptions);
        prop_assert_eq!(outcome.rows.len(), count);
    }

    /// A scope is never present in both the resource and error maps
    #[test]
    fn aggregate_keeps_scopes_exclusive(records in prop::collection::vec(arb_record(), 0..30)) {
        let mut aggregate = ResultAggregate::new();
        for record in &records {
            match record {
                Record::Resources(n) => aggregate.record_resources(&format!("scope-{}", n), Vec::new()),
                Record::Error(n) => aggregate.record_error(&format!("scope-{}", n), "boom".to_string()),
            }
        }

        for scope in aggregate.errors_by_scope.keys() {
            prop_assert!(!aggregate.resources_by_scope.contains_key(scope));
        }
        let touched: std::collections::HashSet<String> = records
            .iter()
            .map(|r| match r {
                Record::Resources(n) | Record::Error(n) => format!("scope-{}", n),
            })
            .collect();
        prop_assert_eq!(
            aggregate.resources_by_scope.len() + aggregate.errors_by_scope.len(),
            touched.len()
        );
    }
}
