//! Parallel-regional dispatch

use super::{guarded, Dispatch};
use crate::describe::context::DescribeContext;
use crate::describe::describer::RegionalDescriber;
use crate::describe::resource::{Description, ResultAggregate};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

struct ScopeOutcome {
    scope: String,
    /// Partition and descriptions on success
    outcome: Result<(String, Vec<Description>)>,
}

/// Describe every scope concurrently and collect the outcomes.
///
/// Tasks only report through the channel; the aggregate is written by this
/// function alone, after exactly one message per scope.
pub(crate) async fn describe_parallel(
    dispatch: &Dispatch<'_>,
    describer: &Arc<dyn RegionalDescriber>,
    scopes: &[String],
) -> ResultAggregate {
    let (tx, mut rx) = mpsc::channel::<ScopeOutcome>(scopes.len().max(1));

    for scope in scopes {
        let tx = tx.clone();
        let describer = Arc::clone(describer);
        let resolver = dispatch.resolver.clone();
        let config = dispatch.config.for_region(scope);
        let cancel = dispatch.cancel.clone();
        let account_id = dispatch.account_id.to_string();
        let trigger = dispatch.trigger;
        let scope = scope.clone();

        tokio::spawn(async move {
            tracing::debug!("describing {}", scope);
            let outcome = guarded(async {
                let partition = resolver.partition(&scope);
                let ctx = DescribeContext::new(&account_id, &scope, &partition, trigger);
                let descriptions = describer.describe(&cancel, &ctx, &config).await?;
                Ok::<_, anyhow::Error>((partition, descriptions))
            })
            .await;

            let _ = tx.send(ScopeOutcome { scope, outcome }).await;
        });
    }
    drop(tx);

    let mut aggregate = ResultAggregate::new();
    for _ in 0..scopes.len() {
        let Some(ScopeOutcome { scope, outcome }) = rx.recv().await else {
            break;
        };

        match outcome {
            Ok((partition, descriptions)) => {
                let resources = dispatch.stamp(&scope, &partition, descriptions);
                aggregate.record_resources(&scope, resources);
            }
            Err(e) if dispatch.is_ignorable(&scope, &e) => {
                aggregate.record_resources(&scope, Vec::new());
            }
            Err(e) => dispatch.record_failure(&mut aggregate, &scope, &e),
        }
    }

    // Only reachable if the runtime dropped a task before it reported
    for scope in scopes {
        if !aggregate.resources_by_scope.contains_key(scope)
            && !aggregate.errors_by_scope.contains_key(scope)
        {
            aggregate.record_error(scope, "describe task ended without reporting".to_string());
        }
    }

    aggregate
}
