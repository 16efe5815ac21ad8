//! Resource envelope and result aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Scope label used for resources served by a global capability
pub const GLOBAL_SCOPE: &str = "global";

/// Opaque payload returned by a Describer
pub type Description = Value;

/// A described resource with dispatcher-stamped identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub account_id: String,
    pub scope: String,
    pub partition: String,
    pub resource_type: String,
    pub described_at: DateTime<Utc>,
    pub description: Description,
}

/// Identity the dispatcher stamps onto every description from one scope
#[derive(Debug, Clone)]
pub(crate) struct Stamp<'a> {
    pub account_id: &'a str,
    pub scope: &'a str,
    pub partition: &'a str,
    pub resource_type: &'a str,
}

impl Stamp<'_> {
    pub fn apply(&self, descriptions: Vec<Description>) -> Vec<Resource> {
        let described_at = Utc::now();
        descriptions
            .into_iter()
            .map(|description| Resource {
                account_id: self.account_id.to_string(),
                scope: self.scope.to_string(),
                partition: self.partition.to_string(),
                resource_type: self.resource_type.to_string(),
                described_at,
                description,
            })
            .collect()
    }
}

/// Per-request output: resources and errors keyed by scope.
///
/// A scope is present in at most one of the two maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultAggregate {
    pub resources_by_scope: HashMap<String, Vec<Resource>>,
    pub errors_by_scope: HashMap<String, String>,
}

impl ResultAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the (possibly empty) resources of a scope, clearing any earlier error
    pub fn record_resources(&mut self, scope: &str, resources: Vec<Resource>) {
        self.errors_by_scope.remove(scope);
        self.resources_by_scope.insert(scope.to_string(), resources);
    }

    /// Store a scope failure. Ignored if the scope already succeeded.
    pub fn record_error(&mut self, scope: &str, message: String) {
        if self.resources_by_scope.contains_key(scope) {
            tracing::debug!("keeping earlier success for {}, dropping error: {}", scope, message);
            return;
        }
        self.errors_by_scope.insert(scope.to_string(), message);
    }

    /// Total resources across all scopes
    pub fn resource_count(&self) -> usize {
        self.resources_by_scope.values().map(|r| r.len()).sum()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors_by_scope.is_empty()
    }

    /// Iterate every resource regardless of scope
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources_by_scope.values().flatten()
    }
}
