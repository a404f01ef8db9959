use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::EventSource;
use crate::events::Event;

/// DeRisk 이벤트 API (`?from_address=&min_block_number=&max_block_number=`)
pub struct DeRiskApiClient {
    client: Client,
    url: String,
}

/// 성공하면 이벤트 배열, 실패하면 `{"error": "..."}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeRiskResponse {
    Events(Vec<Event>),
    Error { error: String },
}

impl DeRiskApiClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl EventSource for DeRiskApiClient {
    async fn get_events(&self, contract_address: &str, from_block: u64, to_block: u64) -> Result<Vec<Event>> {
        let response: DeRiskResponse = self
            .client
            .get(&self.url)
            .query(&[
                ("from_address", contract_address.to_string()),
                ("min_block_number", from_block.to_string()),
                ("max_block_number", to_block.to_string()),
            ])
            .send()
            .await
            .context("DeRisk API request failed")?
            .error_for_status()?
            .json()
            .await
            .context("DeRisk API returned an unexpected payload")?;
        match response {
            DeRiskResponse::Events(events) => {
                debug!("DeRisk {} 블록 {}..={}: 이벤트 {}개", contract_address, from_block, to_block, events.len());
                Ok(events)
            }
            DeRiskResponse::Error { error } => Err(anyhow!("DeRisk API error: {}", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shapes() {
        let raw = r#"[{
            "block_number": 630001,
            "transaction_hash": "0xabc",
            "from_address": "0x04c0a5193d58f74fbace4b74dcf65481e734ed1714121bdc571da345540efa05",
            "key_name": "zklend::market::Market::Deposit",
            "data": ["0x1", "0x2", "0x3"],
            "timestamp": 1700000000
        }]"#;
        match serde_json::from_str::<DeRiskResponse>(raw).unwrap() {
            DeRiskResponse::Events(events) => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].name(), "Deposit");
                assert!(events[0].keys.is_empty());
            }
            DeRiskResponse::Error { .. } => panic!("expected events"),
        }

        let raw = r#"{"error": "timeout"}"#;
        assert!(matches!(
            serde_json::from_str::<DeRiskResponse>(raw).unwrap(),
            DeRiskResponse::Error { .. }
        ));
    }
}
