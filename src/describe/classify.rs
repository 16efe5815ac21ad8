//! Error Classification
//!
//! Decides whether a Describer failure only means "this capability does not
//! exist here" (ignorable, reported as zero resources) or is a genuine
//! failure for the scope.
//!
//! Two tiers are consulted:
//!
//! 1. platform error codes that always mean the endpoint does not know the
//!    operation
//! 2. a curated list of resource types known not to exist in specific
//!    scopes, loaded from `src/resources/scope_exclusions.json`

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use thiserror::Error;

/// Codes meaning "operation not recognized by this endpoint"
pub const UNSUPPORTED_OPERATION_CODES: &[&str] = &[
    "InvalidAction",
    "UnsupportedOperation",
    "UnsupportedOperationException",
    "UnknownOperationException",
    "UnrecognizedClientException",
];

/// Embedded scope exclusion list (compiled into the binary)
const EXCLUSIONS_FILE: &str = include_str!("../resources/scope_exclusions.json");

/// Typed platform error a Describer may return inside its `anyhow::Error`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExclusionDef {
    resource_type: String,
    scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExclusionFile {
    exclusions: Vec<ExclusionDef>,
}

static BUILTIN_EXCLUSIONS: OnceLock<HashMap<String, HashSet<String>>> = OnceLock::new();

fn builtin_exclusions() -> &'static HashMap<String, HashSet<String>> {
    BUILTIN_EXCLUSIONS.get_or_init(|| {
        let file: ExclusionFile = serde_json::from_str(EXCLUSIONS_FILE)
            .unwrap_or_else(|e| panic!("Failed to parse embedded scope exclusion JSON: {}", e));

        let mut map: HashMap<String, HashSet<String>> = HashMap::new();
        for def in file.exclusions {
            map.entry(def.resource_type).or_default().extend(def.scopes);
        }
        map
    })
}

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    codes: HashSet<String>,
    exclusions: HashMap<String, HashSet<String>>,
}

impl ErrorClassifier {
    /// Classifier with the platform codes and no scope exclusions
    pub fn new() -> Self {
        Self {
            codes: UNSUPPORTED_OPERATION_CODES.iter().map(|c| c.to_string()).collect(),
            exclusions: HashMap::new(),
        }
    }

    /// Classifier with the platform codes and the built-in exclusion list
    pub fn builtin() -> Self {
        Self {
            exclusions: builtin_exclusions().clone(),
            ..Self::new()
        }
    }

    /// Mark `resource_type` as non-existent in `scopes`
    pub fn with_exclusion(mut self, resource_type: &str, scopes: &[&str]) -> Self {
        self.exclusions
            .entry(resource_type.to_string())
            .or_default()
            .extend(scopes.iter().map(|s| s.to_string()));
        self
    }

    /// Treat an additional error code as "operation not recognized"
    pub fn with_code(mut self, code: &str) -> Self {
        self.codes.insert(code.to_string());
        self
    }

    pub fn is_excluded(&self, resource_type: &str, scope: &str) -> bool {
        self.exclusions
            .get(resource_type)
            .is_some_and(|scopes| scopes.contains(scope))
    }

    /// Whether `err` from describing `resource_type` in `scope` should count as zero resources
    pub fn is_ignorable(&self, resource_type: &str, scope: &str, err: &anyhow::Error) -> bool {
        if self.is_excluded(resource_type, scope) {
            tracing::debug!("{} is not available in {}, ignoring error", resource_type, scope);
            return true;
        }

        match self.unsupported_code(err) {
            Some(code) => {
                tracing::debug!("{} in {}: ignorable error code {}", resource_type, scope, code);
                true
            }
            None => false,
        }
    }

    /// The "operation not recognized" code carried by `err`, if any
    fn unsupported_code(&self, err: &anyhow::Error) -> Option<String> {
        if let Some(api) = err.chain().find_map(|e| e.downcast_ref::<ApiError>()) {
            return self.codes.contains(&api.code).then(|| api.code.clone());
        }

        // Untyped errors: look for a known code as a whole word in the message
        let rendered = format!("{:#}", err);
        rendered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find(|token| self.codes.contains(*token))
            .map(|token| token.to_string())
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}
