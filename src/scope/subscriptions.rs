//! Azure subscription listing
//!
//! Scopes for Azure resource types are the subscriptions the caller's token
//! can see, read from ARM `GET /subscriptions` and paged through `nextLink`.

use super::ScopeLister;
use crate::provider::ProviderConfig;
use crate::quota::graph::{api_failure, http_client, management_endpoint};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

pub const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionDef {
    subscription_id: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPage {
    #[serde(default)]
    value: Vec<SubscriptionDef>,
    #[serde(default)]
    next_link: Option<String>,
}

/// Lists the subscriptions visible to the bearer token in the provider config.
///
/// Only `Enabled` subscriptions are listed unless disabled ones are requested.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionLister;

impl SubscriptionLister {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScopeLister for SubscriptionLister {
    async fn list_scopes(
        &self,
        config: &ProviderConfig,
        include_disabled: bool,
    ) -> Result<Vec<String>> {
        let token = config
            .credentials
            .token()
            .context("No access token in provider credentials")?;
        let client = http_client()?;

        let mut url = management_endpoint(config)?
            .join("subscriptions")
            .context("Invalid management endpoint")?;
        url.query_pairs_mut()
            .append_pair("api-version", SUBSCRIPTIONS_API_VERSION);

        let mut scopes = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            tracing::debug!("GET {}", url);

            let response = client
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .context("Failed to send request")?;

            let status = response.status();
            let text = response
                .text()
                .await
                .context("Failed to read response body")?;
            if !status.is_success() {
                return Err(api_failure(status, &text));
            }

            let page: SubscriptionPage =
                serde_json::from_str(&text).context("Failed to parse subscription list")?;
            for subscription in page.value {
                if include_disabled || subscription.state.eq_ignore_ascii_case("Enabled") {
                    scopes.push(subscription.subscription_id);
                } else {
                    tracing::debug!(
                        "skipping subscription {} in state {}",
                        subscription.subscription_id,
                        subscription.state
                    );
                }
            }

            next = match page.next_link.filter(|link| !link.is_empty()) {
                Some(link) => Some(Url::parse(&link).context("Invalid nextLink in subscription list")?),
                None => None,
            };
        }

        Ok(scopes)
    }
}
