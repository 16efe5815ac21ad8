//! Dispatch Strategies
//!
//! - [`regional`] - one task per scope, all scopes in parallel
//! - [`global`] - scopes tried in order, first success wins
//! - [`merging`] - scopes tried in order, the first success answers for all
//!
//! Every strategy builds a fresh [`DescribeContext`] and a scope-local
//! [`ProviderConfig`] per attempt, runs the Describer inside a panic
//! boundary and stamps identity fields onto whatever comes back.

pub(crate) mod global;
pub(crate) mod merging;
pub(crate) mod regional;

use super::classify::ErrorClassifier;
use super::context::{DescribeContext, TriggerType};
use super::resource::{Description, Resource, ResultAggregate, Stamp};
use crate::pool::panic_message;
use crate::provider::ProviderConfig;
use crate::scope::ScopeResolver;
use anyhow::Result;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A Describer panicked; always a genuine scope failure
#[derive(Error, Debug)]
#[error("describer panicked: {0}")]
pub struct DescriberPanic(pub String);

/// Run a Describer future, turning a panic into a [`DescriberPanic`] error
pub(crate) async fn guarded<T, F>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(DescriberPanic(panic_message(payload.as_ref())).into()),
    }
}

/// Everything a strategy needs besides the Describer and its scopes
pub(crate) struct Dispatch<'a> {
    pub resource_type: &'a str,
    pub account_id: &'a str,
    pub trigger: TriggerType,
    pub config: &'a ProviderConfig,
    pub resolver: &'a ScopeResolver,
    pub classifier: &'a ErrorClassifier,
    pub cancel: &'a CancellationToken,
}

impl Dispatch<'_> {
    fn context(&self, scope: &str, partition: &str) -> DescribeContext {
        DescribeContext::new(self.account_id, scope, partition, self.trigger)
    }

    fn stamp(&self, scope: &str, partition: &str, descriptions: Vec<Description>) -> Vec<Resource> {
        Stamp {
            account_id: self.account_id,
            scope,
            partition,
            resource_type: self.resource_type,
        }
        .apply(descriptions)
    }

    fn is_ignorable(&self, scope: &str, err: &anyhow::Error) -> bool {
        !err.is::<DescriberPanic>() && self.classifier.is_ignorable(self.resource_type, scope, err)
    }

    fn record_failure(&self, aggregate: &mut ResultAggregate, scope: &str, err: &anyhow::Error) {
        tracing::warn!("{} failed in {}: {:#}", self.resource_type, scope, err);
        aggregate.record_error(scope, format!("{:#}", err));
    }
}
