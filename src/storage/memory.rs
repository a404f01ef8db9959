use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use super::{InterestRateSnapshot, LoanStateRecord, StateStore};
use crate::types::{LoanEntityId, ProtocolId};

/// 프로세스 메모리 저장소
#[derive(Debug, Default)]
pub struct MemoryStore {
    loan_states: DashMap<(ProtocolId, LoanEntityId), LoanStateRecord>,
    last_blocks: DashMap<ProtocolId, u64>,
    interest_rates: DashMap<ProtocolId, Vec<InterestRateSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loan_state_count(&self, protocol: ProtocolId) -> usize {
        self.loan_states.iter().filter(|entry| entry.key().0 == protocol).count()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn upsert_loan_states(&self, records: Vec<LoanStateRecord>) -> Result<usize> {
        let mut written = 0;
        for record in records {
            let key = (record.protocol, record.entity_id.clone());
            if self.loan_states.get(&key).map_or(false, |existing| *existing == record) {
                continue;
            }
            self.loan_states.insert(key, record);
            written += 1;
        }
        Ok(written)
    }

    async fn load_loan_states(&self, protocol: ProtocolId) -> Result<Vec<LoanStateRecord>> {
        let mut records: Vec<LoanStateRecord> = self
            .loan_states
            .iter()
            .filter(|entry| entry.key().0 == protocol)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(records)
    }

    async fn last_block(&self, protocol: ProtocolId) -> Result<Option<u64>> {
        Ok(self.last_blocks.get(&protocol).map(|block| *block))
    }

    async fn set_last_block(&self, protocol: ProtocolId, block: u64) -> Result<()> {
        self.last_blocks.insert(protocol, block);
        Ok(())
    }

    async fn save_interest_rates(&self, snapshot: InterestRateSnapshot) -> Result<()> {
        self.interest_rates.entry(snapshot.protocol).or_default().push(snapshot);
        Ok(())
    }

    async fn latest_interest_rates(&self, protocol: ProtocolId) -> Result<Option<InterestRateSnapshot>> {
        Ok(self
            .interest_rates
            .get(&protocol)
            .and_then(|snapshots| snapshots.last().cloned()))
    }
}
