use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{ResourceInventory, ResourceRecord};
use crate::provider::ProviderClient;

#[derive(Debug, Deserialize)]
struct ResourcePage {
    #[serde(default)]
    items: Vec<ResourceRecord>,
    #[serde(default)]
    next_token: Option<String>,
}

pub struct HttpResourceInventory {
    client: ProviderClient,
}

impl HttpResourceInventory {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceInventory for HttpResourceInventory {
    async fn list_resources(
        &self,
        service_code: &str,
        kind: &str,
    ) -> anyhow::Result<Vec<ResourceRecord>> {
        let path = format!("/v1/services/{service_code}/resources/{kind}");
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(token) = next_token.as_deref() {
                query.push(("next_token", token));
            }
            let page: ResourcePage = self
                .client
                .get_json(&path, &query)
                .await
                .with_context(|| format!("failed to list {service_code} {kind}"))?;

            records.extend(page.items);
            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }

        Ok(records)
    }
}
