//! Sequential-merging dispatch

use super::{guarded, Dispatch};
use crate::describe::describer::MergingDescriber;
use crate::describe::error::{DescribeError, DescribeResult};
use crate::describe::resource::ResultAggregate;
use crate::quota::QuotaError;
use std::sync::Arc;

/// Try scopes in order until one call returns the per-scope answer, then merge it.
///
/// Each returned scope is stamped with its own partition. Scope errors in the
/// answer are recorded as failures, as is every requested scope the answer
/// leaves out. If every attempt was ignorable, all scopes are recorded as
/// empty. A [`QuotaError`] stops the loop and fails the request.
pub(crate) async fn describe_merged(
    dispatch: &Dispatch<'_>,
    describer: &Arc<dyn MergingDescriber>,
    scopes: &[String],
) -> DescribeResult<ResultAggregate> {
    let mut aggregate = ResultAggregate::new();
    let mut only_ignorable = true;

    for scope in scopes {
        let attempt = guarded(async {
            let partition = dispatch.resolver.partition(scope);
            let config = dispatch.config.for_region(scope);
            let ctx = dispatch.context(scope, &partition);
            describer.describe(dispatch.cancel, &ctx, &config, scopes).await
        })
        .await;

        let merged = match attempt {
            Ok(merged) => merged,
            Err(e) => {
                let e = match e.downcast::<QuotaError>() {
                    Ok(quota) => {
                        tracing::error!("{} aborted in {}: {}", dispatch.resource_type, scope, quota);
                        return Err(DescribeError::Quota(quota));
                    }
                    Err(e) => e,
                };
                if dispatch.is_ignorable(scope, &e) {
                    continue;
                }
                only_ignorable = false;
                dispatch.record_failure(&mut aggregate, scope, &e);
                continue;
            }
        };

        tracing::debug!(
            "{} answered for {} scopes, {} failed",
            scope,
            merged.resources.len(),
            merged.errors.len()
        );
        for (result_scope, descriptions) in merged.resources {
            let result_partition = dispatch.resolver.partition(&result_scope);
            let resources = dispatch.stamp(&result_scope, &result_partition, descriptions);
            aggregate.record_resources(&result_scope, resources);
        }
        for (result_scope, message) in merged.errors {
            tracing::warn!("{} failed in {}: {}", dispatch.resource_type, result_scope, message);
            aggregate.record_error(&result_scope, message);
        }
        for requested in scopes {
            if !aggregate.resources_by_scope.contains_key(requested)
                && !aggregate.errors_by_scope.contains_key(requested)
            {
                aggregate.record_error(requested, format!("no result returned for {}", requested));
            }
        }
        return Ok(aggregate);
    }

    if only_ignorable {
        for scope in scopes {
            aggregate.record_resources(scope, Vec::new());
        }
    }
    Ok(aggregate)
}
