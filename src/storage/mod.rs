pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::ledger::{InterestRateModelPair, LoanDetails, LoanEntity, Portfolio};
use crate::types::{ExtraInfo, LoanEntityId, ProtocolId};

/// (protocol, entity id) 단위로 저장되는 loan 상태
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanStateRecord {
    pub protocol: ProtocolId,
    pub entity_id: LoanEntityId,
    pub user: String,
    pub collateral: Portfolio,
    pub debt: Portfolio,
    /// 재시작 시 엔티티를 그대로 복원하기 위한 프로토콜별 필드
    pub details: LoanDetails,
    pub block: Option<u64>,
    pub timestamp: Option<u64>,
}

impl LoanStateRecord {
    pub fn from_entity(entity_id: &LoanEntityId, entity: &LoanEntity) -> Self {
        Self {
            protocol: entity.protocol,
            entity_id: entity_id.clone(),
            user: entity.user.clone(),
            collateral: entity.collateral.clone(),
            debt: entity.debt.clone(),
            details: entity.details.clone(),
            block: entity.extra_info.block,
            timestamp: entity.extra_info.timestamp,
        }
    }

    pub fn into_entity(self) -> (LoanEntityId, LoanEntity) {
        let entity = LoanEntity {
            protocol: self.protocol,
            user: self.user,
            collateral: self.collateral,
            debt: self.debt,
            extra_info: ExtraInfo {
                block: self.block,
                timestamp: self.timestamp,
            },
            details: self.details,
        };
        (self.entity_id, entity)
    }
}

/// 페이지 처리 직후의 이자 인덱스 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRateSnapshot {
    pub protocol: ProtocolId,
    pub block: u64,
    pub timestamp: u64,
    pub collateral: BTreeMap<String, Decimal>,
    pub debt: BTreeMap<String, Decimal>,
}

impl InterestRateSnapshot {
    pub fn capture(protocol: ProtocolId, block: u64, timestamp: u64, models: &InterestRateModelPair) -> Self {
        Self {
            protocol,
            block,
            timestamp,
            collateral: models.collateral.as_map().clone(),
            debt: models.debt.as_map().clone(),
        }
    }
}

/// Loan 상태 영속화
#[async_trait]
pub trait StateStore: Send + Sync {
    /// 바뀐 레코드만 기록하고 실제로 쓴 개수를 돌려준다
    async fn upsert_loan_states(&self, records: Vec<LoanStateRecord>) -> Result<usize>;

    async fn load_loan_states(&self, protocol: ProtocolId) -> Result<Vec<LoanStateRecord>>;

    /// 다음 리플레이를 시작할 블록
    async fn last_block(&self, protocol: ProtocolId) -> Result<Option<u64>>;

    async fn set_last_block(&self, protocol: ProtocolId, block: u64) -> Result<()>;

    async fn save_interest_rates(&self, snapshot: InterestRateSnapshot) -> Result<()>;

    async fn latest_interest_rates(&self, protocol: ProtocolId) -> Result<Option<InterestRateSnapshot>>;
}

/// 설정된 백엔드 열기
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn StateStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("📦 메모리 저장소 사용");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Redis => Ok(Arc::new(RedisStore::new(Some(&config.redis_url)).await?)),
    }
}
