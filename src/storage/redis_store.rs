use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{InterestRateSnapshot, LoanStateRecord, StateStore};
use crate::types::ProtocolId;

/// 보관할 이자 인덱스 스냅샷 수
const INTEREST_RATE_HISTORY: isize = 1_000;

#[derive(Clone)]
pub struct RedisStore {
    client: RedisClient,
    connection: Arc<Mutex<redis::aio::Connection>>,
}

impl RedisStore {
    pub async fn new(redis_url: Option<&str>) -> Result<Self> {
        let url = redis_url.unwrap_or("redis://127.0.0.1:6379");
        let client = RedisClient::open(url)?;
        let conn = client
            .get_async_connection()
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", url))?;
        info!("📦 Redis storage connected: {}", url);
        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(conn)),
        })
    }
}

fn loan_states_key(protocol: ProtocolId) -> String {
    format!("loan_states:{}", protocol.key())
}

fn last_block_key(protocol: ProtocolId) -> String {
    format!("last_block:{}", protocol.key())
}

fn interest_rates_key(protocol: ProtocolId) -> String {
    format!("interest_rates:{}", protocol.key())
}

#[async_trait]
impl StateStore for RedisStore {
    async fn upsert_loan_states(&self, records: Vec<LoanStateRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.lock().await;
        let mut written = 0;
        for record in records {
            let key = loan_states_key(record.protocol);
            let field = record.entity_id.to_string();
            let value = serde_json::to_string(&record)?;
            let existing: Option<String> = conn.hget(&key, &field).await?;
            if existing.as_deref() == Some(value.as_str()) {
                continue;
            }
            let _: () = conn.hset(&key, &field, value).await?;
            written += 1;
        }
        Ok(written)
    }

    async fn load_loan_states(&self, protocol: ProtocolId) -> Result<Vec<LoanStateRecord>> {
        let mut conn = self.connection.lock().await;
        let raw: HashMap<String, String> = conn.hgetall(loan_states_key(protocol)).await?;
        let mut records = Vec::with_capacity(raw.len());
        for (field, value) in raw {
            match serde_json::from_str::<LoanStateRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => warn!("⚠️ {} loan 상태 {} 역직렬화 실패: {}", protocol, field, e),
            }
        }
        records.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(records)
    }

    async fn last_block(&self, protocol: ProtocolId) -> Result<Option<u64>> {
        let mut conn = self.connection.lock().await;
        Ok(conn.get(last_block_key(protocol)).await?)
    }

    async fn set_last_block(&self, protocol: ProtocolId, block: u64) -> Result<()> {
        let mut conn = self.connection.lock().await;
        let _: () = conn.set(last_block_key(protocol), block).await?;
        Ok(())
    }

    async fn save_interest_rates(&self, snapshot: InterestRateSnapshot) -> Result<()> {
        let key = interest_rates_key(snapshot.protocol);
        let value = serde_json::to_string(&snapshot)?;
        let mut conn = self.connection.lock().await;
        let _: () = conn.rpush(&key, value).await?;
        let _: () = conn.ltrim(&key, -INTEREST_RATE_HISTORY, -1).await?;
        Ok(())
    }

    async fn latest_interest_rates(&self, protocol: ProtocolId) -> Result<Option<InterestRateSnapshot>> {
        let mut conn = self.connection.lock().await;
        let raw: Option<String> = conn.lindex(interest_rates_key(protocol), -1).await?;
        match raw {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }
}
