//! Fan-out describe engine for multi-cloud resource inventory.
//!
//! Given a Describer for a resource type, the [`Engine`] calls it once per
//! applicable scope (region, the synthetic global scope, or a subscription
//! batch), isolates per-scope failures and returns one
//! [`ResultAggregate`] of stamped resources and per-scope errors.
//!
//! # Module Structure
//!
//! - [`describe`] - registry, dispatch strategies, error classification
//! - [`scope`] - scope enumeration and partition lookup
//! - [`pool`] - bounded worker pool
//! - [`quota`] - quota-aware batch query executor and Azure Resource Graph
//! - [`provider`] - per-request provider configuration
//! - [`config`] - user configuration file

pub mod config;
pub mod describe;
pub mod pool;
pub mod provider;
pub mod quota;
pub mod scope;

pub use describe::{
    DescribeContext, DescribeError, DescribeRequest, Describer, Engine, ErrorClassifier,
    Registry, Resource, ResultAggregate, TriggerType,
};
pub use provider::{Credentials, ProviderConfig};
pub use scope::{RegionCatalog, ScopeResolver};
