//! Sequential-global dispatch

use super::{guarded, Dispatch};
use crate::describe::describer::GlobalDescriber;
use crate::describe::resource::{ResultAggregate, GLOBAL_SCOPE};
use std::sync::Arc;

/// Try candidate scopes in order until one succeeds.
///
/// The success is recorded under [`GLOBAL_SCOPE`] and no further candidate
/// is tried. Genuine failures of earlier candidates stay recorded under
/// their own scope. Ignorable failures move on silently; if every candidate
/// was ignorable the global scope is recorded as empty.
pub(crate) async fn describe_first_success(
    dispatch: &Dispatch<'_>,
    describer: &Arc<dyn GlobalDescriber>,
    candidates: &[String],
) -> ResultAggregate {
    let mut aggregate = ResultAggregate::new();
    let mut only_ignorable = true;

    for scope in candidates {
        tracing::debug!("trying {} for global {}", scope, dispatch.resource_type);
        let attempt = guarded(async {
            let partition = dispatch.resolver.partition(scope);
            let config = dispatch.config.for_region(scope);
            let ctx = dispatch.context(scope, &partition);
            let descriptions = describer.describe(dispatch.cancel, &ctx, &config).await?;
            Ok::<_, anyhow::Error>((partition, descriptions))
        })
        .await;

        match attempt {
            Ok((partition, descriptions)) => {
                let resources = dispatch.stamp(GLOBAL_SCOPE, &partition, descriptions);
                aggregate.record_resources(GLOBAL_SCOPE, resources);
                return aggregate;
            }
            Err(e) if dispatch.is_ignorable(scope, &e) => continue,
            Err(e) => {
                only_ignorable = false;
                dispatch.record_failure(&mut aggregate, scope, &e);
            }
        }
    }

    if only_ignorable && !candidates.is_empty() {
        aggregate.record_resources(GLOBAL_SCOPE, Vec::new());
    }
    aggregate
}
