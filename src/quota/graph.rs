//! Azure Resource Graph
//!
//! HTTP client for the Resource Graph query API and a merging Describer
//! that answers for many subscriptions with one batched query.

use super::{BatchExecutor, BatchQuery, QueryPage, DEFAULT_BATCH_SIZE};
use crate::describe::classify::ApiError;
use crate::describe::context::DescribeContext;
use crate::describe::describer::{Describer, MergedOutcome, MergingDescriber};
use crate::describe::registry::Registry;
use crate::provider::ProviderConfig;
use crate::scope::subscriptions::SubscriptionLister;
use crate::scope::{FixedPartition, ScopeResolver};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Public Azure management endpoint
pub const RESOURCE_GRAPH_ENDPOINT: &str = "https://management.azure.com";

pub const RESOURCE_GRAPH_API_VERSION: &str = "2021-03-01";

/// Partition stamped on every Azure subscription scope
pub const AZURE_PARTITION: &str = "azure";

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
    let truncated = if truncated.len() < body.len() {
        format!("{}... [truncated, {} bytes total]", truncated, body.len())
    } else {
        truncated
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull `{"error": {"code", "message"}}` out of an error response
fn parse_api_error(body: &str) -> Option<ApiError> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    Some(ApiError::new(
        error.get("code")?.as_str()?,
        error.get("message").and_then(|m| m.as_str()).unwrap_or(""),
    ))
}

/// Error for a non-2xx ARM response, carrying the typed [`ApiError`] when the body has one
pub(crate) fn api_failure(status: StatusCode, body: &str) -> anyhow::Error {
    // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
    tracing::error!("API error: {} - {}", status, sanitize_for_log(body));
    match parse_api_error(body) {
        Some(api) => anyhow::Error::new(api).context(format!("API request failed: {}", status)),
        None => anyhow!("API request failed: {}", status),
    }
}

/// Management endpoint from the provider config, or the public Azure one
pub(crate) fn management_endpoint(config: &ProviderConfig) -> Result<Url> {
    match &config.endpoint {
        Some(endpoint) => Ok(endpoint.clone()),
        None => Url::parse(RESOURCE_GRAPH_ENDPOINT).context("Invalid Resource Graph endpoint"),
    }
}

pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("describe-engine/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Resource Graph client bound to one KQL query
#[derive(Clone)]
pub struct ResourceGraphClient {
    client: Client,
    url: Url,
    token: String,
    query: String,
}

impl ResourceGraphClient {
    /// `endpoint` is the management base URL, e.g. [`RESOURCE_GRAPH_ENDPOINT`]
    pub fn new(endpoint: &Url, token: &str, query: &str) -> Result<Self> {
        let client = http_client()?;

        let mut url = endpoint
            .join("providers/Microsoft.ResourceGraph/resources")
            .context("Invalid Resource Graph endpoint")?;
        url.query_pairs_mut()
            .append_pair("api-version", RESOURCE_GRAPH_API_VERSION);

        Ok(Self {
            client,
            url,
            token: token.to_string(),
            query: query.to_string(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl BatchQuery for ResourceGraphClient {
    async fn query_page(
        &self,
        subscriptions: &[String],
        skip_token: Option<&str>,
    ) -> Result<QueryPage> {
        let mut options = json!({ "resultFormat": "objectArray" });
        if let Some(token) = skip_token {
            options["$skipToken"] = Value::String(token.to_string());
        }
        let body = json!({
            "subscriptions": subscriptions,
            "query": self.query,
            "options": options,
        });

        tracing::debug!("POST {} ({} subscriptions)", self.url, subscriptions.len());

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            return Err(api_failure(status, &text));
        }

        let value: Value = serde_json::from_str(&text).context("Failed to parse response JSON")?;
        let rows = value
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();
        let skip_token = value
            .get("$skipToken")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(QueryPage {
            rows,
            skip_token,
            headers,
        })
    }
}

/// Merging Describer listing one Azure resource type across subscriptions
#[derive(Debug, Clone)]
pub struct ResourceGraphDescriber {
    azure_type: String,
    batch_size: usize,
}

impl ResourceGraphDescriber {
    /// `azure_type` is the ARM type, e.g. `Microsoft.Compute/virtualMachines`
    pub fn new(azure_type: &str) -> Self {
        Self {
            azure_type: azure_type.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// KQL selecting every resource of this type
    pub fn query(&self) -> String {
        format!(
            "Resources | where type =~ '{}'",
            self.azure_type.replace('\'', "\\'")
        )
    }
}

#[async_trait]
impl MergingDescriber for ResourceGraphDescriber {
    async fn describe(
        &self,
        cancel: &CancellationToken,
        ctx: &DescribeContext,
        config: &ProviderConfig,
        all_scopes: &[String],
    ) -> Result<MergedOutcome> {
        let token = config
            .credentials
            .token()
            .context("No access token in provider credentials")?;
        let endpoint = management_endpoint(config)?;

        tracing::debug!(
            "resource graph query for {} over {} subscriptions (via {})",
            self.azure_type,
            all_scopes.len(),
            ctx.scope
        );

        let client = ResourceGraphClient::new(&endpoint, token, &self.query())?;
        let outcome = BatchExecutor::new(client)
            .with_batch_size(self.batch_size)
            .run(cancel, all_scopes)
            .await?;

        let mut merged = MergedOutcome::new();
        for subscription in &outcome.completed {
            merged.resources.insert(subscription.clone(), Vec::new());
        }
        for row in outcome.rows {
            let Some(subscription) = row.get("subscriptionId").and_then(|v| v.as_str()) else {
                tracing::warn!("resource graph row without subscriptionId dropped");
                continue;
            };
            merged
                .resources
                .entry(subscription.to_string())
                .or_default()
                .push(row);
        }

        for failure in outcome.failures {
            tracing::warn!(
                "resource graph batch {} failed for {} subscriptions: {}",
                failure.index,
                failure.subscriptions.len(),
                failure.message
            );
            for subscription in failure.subscriptions {
                merged.errors.insert(subscription, failure.message.clone());
            }
        }

        Ok(merged)
    }
}

/// ARM resource types served through Resource Graph out of the box
pub const RESOURCE_GRAPH_TYPES: &[&str] = &[
    "Microsoft.Compute/virtualMachines",
    "Microsoft.Compute/disks",
    "Microsoft.Network/virtualNetworks",
    "Microsoft.Network/networkSecurityGroups",
    "Microsoft.Storage/storageAccounts",
    "Microsoft.KeyVault/vaults",
    "Microsoft.Sql/servers",
    "Microsoft.Web/sites",
];

/// Scopes of Azure resource types: the caller's subscriptions, all in [`AZURE_PARTITION`]
pub fn subscription_resolver() -> ScopeResolver {
    ScopeResolver::new(
        Arc::new(SubscriptionLister::new()),
        Arc::new(FixedPartition::new(AZURE_PARTITION)),
    )
}

/// Register a [`ResourceGraphDescriber`] for every type in [`RESOURCE_GRAPH_TYPES`]
pub fn register_resource_graph_types(registry: &mut Registry, batch_size: usize) {
    let scopes = subscription_resolver();
    for azure_type in RESOURCE_GRAPH_TYPES {
        let describer = ResourceGraphDescriber::new(azure_type).with_batch_size(batch_size);
        registry.register_scoped(
            azure_type,
            Describer::Merging(Arc::new(describer)),
            scopes.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_types() {
        let mut registry = Registry::new();
        register_resource_graph_types(&mut registry, 50);

        assert_eq!(registry.len(), RESOURCE_GRAPH_TYPES.len());
        assert!(registry.get("Microsoft.Compute/virtualMachines").is_some());
        assert!(registry.scope_resolver("Microsoft.Compute/virtualMachines").is_some());
    }

    #[test]
    fn test_url_includes_api_version() {
        let endpoint = Url::parse("https://management.azure.com").unwrap();
        let client = ResourceGraphClient::new(&endpoint, "t", "Resources").unwrap();

        assert_eq!(
            client.url().as_str(),
            "https://management.azure.com/providers/Microsoft.ResourceGraph/resources?api-version=2021-03-01"
        );
    }

    #[test]
    fn test_query_escapes_quotes() {
        let describer = ResourceGraphDescriber::new("Microsoft.Web/sites'x");
        assert_eq!(describer.query(), "Resources | where type =~ 'Microsoft.Web/sites\\'x'");
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"error":{"code":"AuthorizationFailed","message":"no access"}}"#;
        let api = parse_api_error(body).unwrap();
        assert_eq!(api.code, "AuthorizationFailed");
        assert!(parse_api_error("not json").is_none());
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(500);
        let sanitized = sanitize_for_log(&long);
        assert!(sanitized.contains("[truncated, 500 bytes total]"));
    }
}
