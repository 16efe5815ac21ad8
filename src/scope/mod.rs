//! Scope Resolution
//!
//! Decides which scopes a describe request fans out over and maps each
//! scope to its partition.
//!
//! The platform side is reached through two narrow traits:
//!
//! - [`ScopeLister`] - enumerates the scopes available to an account
//! - [`PartitionResolver`] - maps a scope to its partition
//!
//! [`RegionCatalog`] implements both from a region table embedded at
//! compile time (`src/resources/regions.json`).
//! [`subscriptions::SubscriptionLister`] lists Azure subscriptions through ARM.

pub mod subscriptions;

use crate::describe::error::{DescribeError, DescribeResult};
use crate::provider::ProviderConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Embedded region table (compiled into the binary)
const REGIONS_FILE: &str = include_str!("../resources/regions.json");

/// Partition used when none is configured
pub const DEFAULT_PARTITION: &str = "aws";

/// Region definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct RegionDef {
    pub name: String,
    pub partition: String,
    /// Opt-in regions are disabled for an account unless explicitly enabled
    #[serde(default)]
    pub opt_in: bool,
}

#[derive(Debug, Deserialize)]
struct RegionTable {
    regions: Vec<RegionDef>,
}

static REGIONS: OnceLock<Vec<RegionDef>> = OnceLock::new();

/// All known regions (loads from embedded JSON on first access)
pub fn get_regions() -> &'static [RegionDef] {
    REGIONS.get_or_init(|| {
        let table: RegionTable = serde_json::from_str(REGIONS_FILE)
            .unwrap_or_else(|e| panic!("Failed to parse embedded region JSON: {}", e));
        table.regions
    })
}

/// Enumerates the scopes a request may fan out over
#[async_trait]
pub trait ScopeLister: Send + Sync {
    async fn list_scopes(&self, config: &ProviderConfig, include_disabled: bool)
        -> Result<Vec<String>>;
}

/// Maps a scope to its partition; `None` when the scope is unknown
pub trait PartitionResolver: Send + Sync {
    fn resolve_partition(&self, scope: &str) -> Option<String>;
}

/// Static region catalog for one partition
#[derive(Debug, Clone)]
pub struct RegionCatalog {
    partition: String,
}

impl RegionCatalog {
    pub fn new(partition: &str) -> Self {
        Self {
            partition: partition.to_string(),
        }
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }
}

impl Default for RegionCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION)
    }
}

#[async_trait]
impl ScopeLister for RegionCatalog {
    async fn list_scopes(
        &self,
        _config: &ProviderConfig,
        include_disabled: bool,
    ) -> Result<Vec<String>> {
        Ok(get_regions()
            .iter()
            .filter(|r| r.partition == self.partition)
            .filter(|r| include_disabled || !r.opt_in)
            .map(|r| r.name.clone())
            .collect())
    }
}

impl PartitionResolver for RegionCatalog {
    fn resolve_partition(&self, scope: &str) -> Option<String> {
        get_regions()
            .iter()
            .find(|r| r.name == scope)
            .map(|r| r.partition.clone())
    }
}

/// Every scope belongs to the same partition
#[derive(Debug, Clone)]
pub struct FixedPartition(String);

impl FixedPartition {
    pub fn new(partition: &str) -> Self {
        Self(partition.to_string())
    }
}

impl PartitionResolver for FixedPartition {
    fn resolve_partition(&self, _scope: &str) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Resolves request scopes and their partitions
#[derive(Clone)]
pub struct ScopeResolver {
    lister: Arc<dyn ScopeLister>,
    partitions: Arc<dyn PartitionResolver>,
}

impl ScopeResolver {
    pub fn new(lister: Arc<dyn ScopeLister>, partitions: Arc<dyn PartitionResolver>) -> Self {
        Self { lister, partitions }
    }

    /// Resolver backed by the embedded region table
    pub fn from_catalog(catalog: RegionCatalog) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            lister: catalog.clone(),
            partitions: catalog,
        }
    }

    /// Scopes for a request.
    ///
    /// Explicit scopes win (de-duplicated, order kept). Otherwise the
    /// lister is asked, optionally including disabled scopes. Asking for
    /// both is rejected before the lister is touched.
    pub async fn resolve(
        &self,
        config: &ProviderConfig,
        explicit: &[String],
        include_disabled: bool,
    ) -> DescribeResult<Vec<String>> {
        if !explicit.is_empty() {
            if include_disabled {
                return Err(DescribeError::ConflictingScopeOptions);
            }
            let mut seen = HashSet::new();
            return Ok(explicit
                .iter()
                .filter(|s| seen.insert(s.as_str()))
                .cloned()
                .collect());
        }

        let scopes = self
            .lister
            .list_scopes(config, include_disabled)
            .await
            .map_err(DescribeError::ScopeEnumeration)?;

        if scopes.is_empty() {
            return Err(DescribeError::NoScopes);
        }

        tracing::debug!("listed {} scopes (include_disabled={})", scopes.len(), include_disabled);
        Ok(scopes)
    }

    /// Partition of `scope`, or an empty string when it cannot be resolved
    pub fn partition(&self, scope: &str) -> String {
        match self.partitions.resolve_partition(scope) {
            Some(partition) => partition,
            None => {
                tracing::debug!("no partition found for scope {}", scope);
                String::new()
            }
        }
    }
}

impl Default for ScopeResolver {
    fn default() -> Self {
        Self::from_catalog(RegionCatalog::default())
    }
}

impl fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeResolver").finish_non_exhaustive()
    }
}
