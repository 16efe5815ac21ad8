//! Provider Configuration
//!
//! The base configuration a describe request carries to every Describer:
//! target region, optional endpoint override and opaque credentials.
//! Dispatch never mutates a shared instance; each scope works on its own
//! copy obtained through [`ProviderConfig::for_region`].

use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Opaque credential values handed through to Describers
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials holding a single bearer token
    pub fn bearer(token: &str) -> Self {
        Self::new().with("token", token)
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn token(&self) -> Option<&str> {
        self.get("token")
    }
}

// Security: never print credential values, only which keys are present
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        f.debug_struct("Credentials").field("keys", &keys).finish()
    }
}

/// Provider configuration for one describe request
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub region: Option<String>,
    pub endpoint: Option<Url>,
    pub credentials: Credentials,
}

impl ProviderConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            region: None,
            endpoint: None,
            credentials,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Scope-local copy targeting `region`
    pub fn for_region(&self, region: &str) -> Self {
        let mut local = self.clone();
        local.region = Some(region.to_string());
        local
    }

    /// Region this configuration targets, if any
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_region_leaves_base_untouched() {
        let base = ProviderConfig::new(Credentials::bearer("secret"));
        let local = base.for_region("eu-west-1");

        assert_eq!(local.region(), Some("eu-west-1"));
        assert_eq!(base.region(), None);
        assert_eq!(local.credentials, base.credentials);
    }

    #[test]
    fn test_credentials_debug_hides_values() {
        let creds = Credentials::bearer("super-secret").with("tenant", "t-1");
        let rendered = format!("{:?}", creds);

        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("token"));
        assert!(rendered.contains("tenant"));
    }
}
