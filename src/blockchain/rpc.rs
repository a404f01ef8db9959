use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::EventSource;
use crate::events::Event;
use crate::protocols::{event_names, ChainReader};
use crate::types::ProtocolId;
use crate::utils::felt::{add_leading_zeros, get_selector_from_name};

/// starknet_getEvents 한 번에 받는 이벤트 수
const EVENTS_CHUNK_SIZE: u64 = 1_000;

/// 블록 타임스탬프 캐시 상한. 넘으면 조회가 끝난 윈도우 이전 블록을 버린다
const BLOCK_TIMESTAMP_CACHE_LIMIT: usize = 10_000;

/// Starknet JSON-RPC 클라이언트
/// 이벤트 조회(EventSource)와 읽기 전용 컨트랙트 호출(ChainReader)을 담당한다
pub struct StarknetRpcClient {
    client: Client,
    url: String,
    request_id: AtomicU64,
    /// selector -> 이벤트 이름
    event_selectors: HashMap<String, &'static str>,
    /// 블록 번호 -> 타임스탬프
    block_timestamps: DashMap<u64, u64>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct EventsChunk {
    events: Vec<EmittedEvent>,
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmittedEvent {
    from_address: String,
    keys: Vec<String>,
    data: Vec<String>,
    block_number: Option<u64>,
    transaction_hash: String,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: u64,
}

impl StarknetRpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let event_selectors = ProtocolId::ALL
            .into_iter()
            .flat_map(|protocol| event_names(protocol).iter())
            .map(|name| (get_selector_from_name(name), *name))
            .collect();
        info!("🔌 Starknet RPC 클라이언트 초기화: {}", url);
        Ok(Self {
            client,
            url: url.to_string(),
            request_id: AtomicU64::new(1),
            event_selectors,
            block_timestamps: DashMap::new(),
        })
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{} request failed", method))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("{} response is not valid JSON-RPC", method))?;
        if let Some(error) = response.error {
            return Err(anyhow!("{} failed ({}): {}", method, error.code, error.message));
        }
        response.result.ok_or_else(|| anyhow!("{} returned no result", method))
    }

    pub async fn block_number(&self) -> Result<u64> {
        self.request("starknet_blockNumber", json!([])).await
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        if let Some(timestamp) = self.block_timestamps.get(&block_number) {
            return Ok(*timestamp);
        }
        let header: BlockHeader = self
            .request(
                "starknet_getBlockWithTxHashes",
                json!({ "block_id": { "block_number": block_number } }),
            )
            .await?;
        self.block_timestamps.insert(block_number, header.timestamp);
        Ok(header.timestamp)
    }

    /// 상한을 넘으면 `keep_from` 이전 블록 항목을 버린다
    fn prune_block_timestamps(&self, keep_from: u64) {
        if self.block_timestamps.len() > BLOCK_TIMESTAMP_CACHE_LIMIT {
            self.block_timestamps.retain(|block, _| *block >= keep_from);
            debug!("블록 타임스탬프 캐시 정리: {}개 남음", self.block_timestamps.len());
        }
    }

    fn key_name(&self, keys: &[String]) -> String {
        keys.first()
            .map(|selector| {
                let selector = add_leading_zeros(selector);
                self.event_selectors
                    .get(&selector)
                    .map(|name| name.to_string())
                    .unwrap_or(selector)
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSource for StarknetRpcClient {
    async fn get_events(&self, contract_address: &str, from_block: u64, to_block: u64) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let mut continuation_token: Option<String> = None;
        let mut block_counters: HashMap<u64, u64> = HashMap::new();
        loop {
            let mut filter = json!({
                "from_block": { "block_number": from_block },
                "to_block": { "block_number": to_block },
                "address": contract_address,
                "keys": [],
                "chunk_size": EVENTS_CHUNK_SIZE,
            });
            if let Some(token) = &continuation_token {
                filter["continuation_token"] = json!(token);
            }
            let chunk: EventsChunk = self.request("starknet_getEvents", json!({ "filter": filter })).await?;
            for emitted in chunk.events {
                // pending 블록 이벤트는 번호가 없다
                let Some(block_number) = emitted.block_number else {
                    continue;
                };
                let counter = block_counters.entry(block_number).or_insert(0);
                let event_index = *counter;
                *counter += 1;
                events.push(Event {
                    block_number,
                    transaction_hash: emitted.transaction_hash,
                    event_index,
                    key_name: self.key_name(&emitted.keys),
                    from_address: add_leading_zeros(&emitted.from_address),
                    keys: emitted.keys,
                    data: emitted.data,
                    timestamp: self.block_timestamp(block_number).await?,
                });
            }
            match chunk.continuation_token {
                Some(token) if !token.is_empty() => continuation_token = Some(token),
                _ => break,
            }
        }
        self.prune_block_timestamps(to_block);
        debug!("{} 블록 {}..={}: 이벤트 {}개", contract_address, from_block, to_block, events.len());
        Ok(events)
    }
}

#[async_trait]
impl ChainReader for StarknetRpcClient {
    async fn call(&self, contract: &str, function: &str, calldata: &[String]) -> Result<Vec<String>> {
        let params = json!({
            "request": {
                "contract_address": contract,
                "entry_point_selector": get_selector_from_name(function),
                "calldata": calldata,
            },
            "block_id": "latest",
        });
        self.request("starknet_call", params).await
    }
}
