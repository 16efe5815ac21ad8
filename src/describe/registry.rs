//! Describer Registry
//!
//! Binds resource type identifiers to Describers. Built once at startup,
//! then shared read-only behind an `Arc`.
//!
//! A binding may carry its own [`ScopeResolver`] when the resource type lives
//! on a platform whose scopes differ from the engine default (for example
//! Azure subscriptions instead of AWS regions).

use super::describer::{Describer, GlobalDescriber, MergingDescriber, RegionalDescriber};
use crate::scope::ScopeResolver;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Binding {
    describer: Describer,
    scopes: Option<ScopeResolver>,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    bindings: BTreeMap<String, Binding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `resource_type` to a Describer, replacing any earlier binding
    pub fn register(&mut self, resource_type: &str, describer: Describer) -> &mut Self {
        self.bind(resource_type, describer, None)
    }

    /// Bind `resource_type` to a Describer whose scopes come from `scopes`
    pub fn register_scoped(
        &mut self,
        resource_type: &str,
        describer: Describer,
        scopes: ScopeResolver,
    ) -> &mut Self {
        self.bind(resource_type, describer, Some(scopes))
    }

    fn bind(
        &mut self,
        resource_type: &str,
        describer: Describer,
        scopes: Option<ScopeResolver>,
    ) -> &mut Self {
        let binding = Binding { describer, scopes };
        if let Some(previous) = self.bindings.insert(resource_type.to_string(), binding) {
            tracing::warn!(
                "resource type {} registered twice, replacing {:?}",
                resource_type,
                previous.describer
            );
        }
        self
    }

    pub fn register_regional(
        &mut self,
        resource_type: &str,
        describer: Arc<dyn RegionalDescriber>,
    ) -> &mut Self {
        self.register(resource_type, Describer::Regional(describer))
    }

    pub fn register_global(
        &mut self,
        resource_type: &str,
        describer: Arc<dyn GlobalDescriber>,
    ) -> &mut Self {
        self.register(resource_type, Describer::Global(describer))
    }

    pub fn register_merging(
        &mut self,
        resource_type: &str,
        describer: Arc<dyn MergingDescriber>,
    ) -> &mut Self {
        self.register(resource_type, Describer::Merging(describer))
    }

    pub fn get(&self, resource_type: &str) -> Option<&Describer> {
        self.bindings.get(resource_type).map(|b| &b.describer)
    }

    /// Scope resolver bound to `resource_type`, if it overrides the default
    pub fn scope_resolver(&self, resource_type: &str) -> Option<&ScopeResolver> {
        self.bindings.get(resource_type)?.scopes.as_ref()
    }

    /// Supported resource types, sorted
    pub fn list_supported_resource_types(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
