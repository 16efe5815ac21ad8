//! Describer plugin surface
//!
//! A Describer performs the actual vendor API calls for one resource type.
//! The engine only knows the three shapes below; which one a resource type
//! implements decides its dispatch strategy.

use super::context::DescribeContext;
use super::resource::Description;
use crate::provider::ProviderConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capability that exists independently in every region
#[async_trait]
pub trait RegionalDescriber: Send + Sync {
    async fn describe(
        &self,
        cancel: &CancellationToken,
        ctx: &DescribeContext,
        config: &ProviderConfig,
    ) -> Result<Vec<Description>>;
}

/// One global entity, reachable through any regional endpoint
#[async_trait]
pub trait GlobalDescriber: Send + Sync {
    async fn describe(
        &self,
        cancel: &CancellationToken,
        ctx: &DescribeContext,
        config: &ProviderConfig,
    ) -> Result<Vec<Description>>;
}

/// Answer of a merging call: descriptions per scope plus scopes it could not cover
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedOutcome {
    pub resources: HashMap<String, Vec<Description>>,
    pub errors: HashMap<String, String>,
}

impl MergedOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, scope: &str, message: &str) -> Self {
        self.errors.insert(scope.to_string(), message.to_string());
        self
    }
}

impl From<HashMap<String, Vec<Description>>> for MergedOutcome {
    fn from(resources: HashMap<String, Vec<Description>>) -> Self {
        Self {
            resources,
            errors: HashMap::new(),
        }
    }
}

/// Capability that answers for every scope in a single call.
///
/// A requested scope missing from both maps of the answer is recorded as a
/// failure. Returning a [`crate::quota::QuotaError`] aborts the whole request.
#[async_trait]
pub trait MergingDescriber: Send + Sync {
    async fn describe(
        &self,
        cancel: &CancellationToken,
        ctx: &DescribeContext,
        config: &ProviderConfig,
        all_scopes: &[String],
    ) -> Result<MergedOutcome>;
}

/// A Describer bound to its dispatch strategy
#[derive(Clone)]
pub enum Describer {
    Regional(Arc<dyn RegionalDescriber>),
    Global(Arc<dyn GlobalDescriber>),
    Merging(Arc<dyn MergingDescriber>),
}

impl Describer {
    pub fn strategy(&self) -> &'static str {
        match self {
            Describer::Regional(_) => "parallel-regional",
            Describer::Global(_) => "sequential-global",
            Describer::Merging(_) => "sequential-merging",
        }
    }
}

impl fmt::Debug for Describer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Describer({})", self.strategy())
    }
}
