//! Describe engine
//!
//! Turns one "describe resource type X" request into a result aggregate by
//! fanning the registered Describer out over the request's scopes.
//!
//! # Architecture
//!
//! - [`registry`] - resource type to Describer bindings
//! - [`describer`] - the three Describer shapes
//! - [`dispatch`] - one fan-out strategy per Describer shape
//! - [`classify`] - ignorable vs genuine failures
//! - [`resource`] - resource envelope and result aggregate
//!
//! # Example
//!
//! ```ignore
//! let engine = Engine::new(Arc::new(registry), ScopeResolver::default(), Arc::new(ErrorClassifier::builtin()));
//! let request = DescribeRequest::new("AWS::EC2::Instance", "123456789012", config);
//! let aggregate = engine.describe(&CancellationToken::new(), &request).await?;
//! ```

pub mod classify;
pub mod context;
pub mod describer;
mod dispatch;
pub mod error;
pub mod registry;
pub mod resource;

pub use classify::{ApiError, ErrorClassifier};
pub use context::{DescribeContext, TriggerType};
pub use describer::{
    Describer, GlobalDescriber, MergedOutcome, MergingDescriber, RegionalDescriber,
};
pub use dispatch::DescriberPanic;
pub use error::{DescribeError, DescribeResult};
pub use registry::Registry;
pub use resource::{Description, Resource, ResultAggregate, GLOBAL_SCOPE};

use crate::provider::ProviderConfig;
use crate::scope::ScopeResolver;
use dispatch::Dispatch;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// One describe request
#[derive(Debug, Clone)]
pub struct DescribeRequest {
    pub resource_type: String,
    pub account_id: String,
    /// Explicit scopes; empty means "list them"
    pub scopes: Vec<String>,
    /// Also list disabled/opt-in scopes (only without explicit scopes)
    pub include_disabled: bool,
    pub config: ProviderConfig,
    pub trigger: TriggerType,
}

impl DescribeRequest {
    pub fn new(resource_type: &str, account_id: &str, config: ProviderConfig) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            account_id: account_id.to_string(),
            scopes: Vec::new(),
            include_disabled: false,
            config,
            trigger: TriggerType::default(),
        }
    }

    pub fn with_scopes<S: AsRef<str>>(mut self, scopes: &[S]) -> Self {
        self.scopes = scopes.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_disabled_scopes(mut self, include_disabled: bool) -> Self {
        self.include_disabled = include_disabled;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerType) -> Self {
        self.trigger = trigger;
        self
    }
}

/// Fan-out describe engine
#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    resolver: ScopeResolver,
    classifier: Arc<ErrorClassifier>,
}

impl Engine {
    pub fn new(
        registry: Arc<Registry>,
        resolver: ScopeResolver,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        Self {
            registry,
            resolver,
            classifier,
        }
    }

    /// Sorted identifiers of every registered resource type
    pub fn list_supported_resource_types(&self) -> Vec<String> {
        self.registry.list_supported_resource_types()
    }

    /// Describe one resource type across its scopes.
    ///
    /// Fails only for request-level problems, including a batch query that
    /// lost track of its quota; per-scope failures end up in
    /// [`ResultAggregate::errors_by_scope`].
    pub async fn describe(
        &self,
        cancel: &CancellationToken,
        request: &DescribeRequest,
    ) -> DescribeResult<ResultAggregate> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "describe",
            %request_id,
            resource_type = %request.resource_type,
            account = %request.account_id,
        );

        self.describe_inner(cancel, request).instrument(span).await
    }

    async fn describe_inner(
        &self,
        cancel: &CancellationToken,
        request: &DescribeRequest,
    ) -> DescribeResult<ResultAggregate> {
        let Some(describer) = self.registry.get(&request.resource_type) else {
            return Err(DescribeError::UnknownResourceType(
                request.resource_type.clone(),
            ));
        };

        let resolver = self
            .registry
            .scope_resolver(&request.resource_type)
            .unwrap_or(&self.resolver);
        let scopes = resolver
            .resolve(&request.config, &request.scopes, request.include_disabled)
            .await?;

        tracing::debug!(
            "dispatching {} over {} scopes ({}, trigger {})",
            describer.strategy(),
            scopes.len(),
            request.resource_type,
            request.trigger
        );

        let dispatch = Dispatch {
            resource_type: &request.resource_type,
            account_id: &request.account_id,
            trigger: request.trigger,
            config: &request.config,
            resolver,
            classifier: &self.classifier,
            cancel,
        };

        let started = Instant::now();
        let aggregate = match describer {
            Describer::Regional(d) => dispatch::regional::describe_parallel(&dispatch, d, &scopes).await,
            Describer::Global(d) => dispatch::global::describe_first_success(&dispatch, d, &scopes).await,
            Describer::Merging(d) => dispatch::merging::describe_merged(&dispatch, d, &scopes).await?,
        };

        tracing::info!(
            "described {} resources in {} scopes, {} scopes failed, took {:?}",
            aggregate.resource_count(),
            aggregate.resources_by_scope.len(),
            aggregate.errors_by_scope.len(),
            started.elapsed()
        );

        Ok(aggregate)
    }
}
