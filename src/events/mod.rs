use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::protocols::event_priority;
use crate::types::{ProtocolId, StateError, StateResult};
use crate::utils::felt::{add_leading_zeros, felt_to_decimal, felt_to_u64};

/// On-chain event as delivered by the event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub block_number: u64,
    pub transaction_hash: String,
    /// 블록 내 순번
    #[serde(default)]
    pub event_index: u64,
    pub from_address: String,
    /// 이벤트 이름 (컴포넌트 경로 포함 가능)
    pub key_name: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(default)]
    pub timestamp: u64,
}

impl Event {
    /// `a::b::Deposit` -> `Deposit`
    pub fn name(&self) -> &str {
        short_name(&self.key_name)
    }

    pub fn felt(&self, index: usize) -> StateResult<&str> {
        self.data.get(index).map(String::as_str).ok_or_else(|| {
            StateError::malformed(
                self.name(),
                format!("data[{}] missing (len {})", index, self.data.len()),
            )
        })
    }

    pub fn address_at(&self, index: usize) -> StateResult<String> {
        self.felt(index).map(add_leading_zeros)
    }

    pub fn amount_at(&self, index: usize) -> StateResult<Decimal> {
        let felt = self.felt(index)?;
        felt_to_decimal(felt)
            .ok_or_else(|| StateError::malformed(self.name(), format!("data[{}] = {} is not an amount", index, felt)))
    }

    pub fn u64_at(&self, index: usize) -> StateResult<u64> {
        let felt = self.felt(index)?;
        felt_to_u64(felt)
            .ok_or_else(|| StateError::malformed(self.name(), format!("data[{}] = {} is not an integer", index, felt)))
    }

    pub fn key_address_at(&self, index: usize) -> StateResult<String> {
        self.keys.get(index).map(|key| add_leading_zeros(key)).ok_or_else(|| {
            StateError::malformed(
                self.name(),
                format!("keys[{}] missing (len {})", index, self.keys.len()),
            )
        })
    }

    pub fn emitter(&self) -> String {
        add_leading_zeros(&self.from_address)
    }
}

pub fn short_name(key_name: &str) -> &str {
    key_name.rsplit("::").next().unwrap_or(key_name)
}

/// 리플레이 순서로 정렬. Nostra/Hashstack은 트랜잭션 내 이벤트 우선순위를 따른다.
pub fn sort_for_replay(protocol: ProtocolId, events: &mut [Event]) {
    match protocol {
        ProtocolId::ZkLend => {
            events.sort_by_key(|event| (event.block_number, event.event_index));
        }
        _ => {
            events.sort_by(|a, b| {
                (a.block_number, &a.transaction_hash, event_priority(protocol, &a.key_name), a.event_index).cmp(&(
                    b.block_number,
                    &b.transaction_hash,
                    event_priority(protocol, &b.key_name),
                    b.event_index,
                ))
            });
        }
    }
}
