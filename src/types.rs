use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// 토큰 주소(기초 자산) -> USD 가격
pub type Prices = HashMap<String, Decimal>;

/// Supported lending protocols
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolId {
    ZkLend,
    NostraAlpha,
    NostraMainnet,
    HashstackV0,
    HashstackV1,
}

impl ProtocolId {
    pub const ALL: [ProtocolId; 5] = [
        ProtocolId::ZkLend,
        ProtocolId::NostraAlpha,
        ProtocolId::NostraMainnet,
        ProtocolId::HashstackV0,
        ProtocolId::HashstackV1,
    ];

    /// 대시보드에 노출되는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolId::ZkLend => "zkLend",
            ProtocolId::NostraAlpha => "Nostra Alpha",
            ProtocolId::NostraMainnet => "Nostra Mainnet",
            ProtocolId::HashstackV0 => "Hashstack V0",
            ProtocolId::HashstackV1 => "Hashstack V1",
        }
    }

    /// 설정 파일과 저장소 키에 쓰는 식별자
    pub fn key(&self) -> &'static str {
        match self {
            ProtocolId::ZkLend => "zklend",
            ProtocolId::NostraAlpha => "nostra_alpha",
            ProtocolId::NostraMainnet => "nostra_mainnet",
            ProtocolId::HashstackV0 => "hashstack_v0",
            ProtocolId::HashstackV1 => "hashstack_v1",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }

    /// Hashstack 계열은 loan id 단위, 나머지는 지갑 주소 단위
    pub fn is_loan_level(&self) -> bool {
        matches!(self, ProtocolId::HashstackV0 | ProtocolId::HashstackV1)
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProtocolId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s)
            .or_else(|| Self::ALL.into_iter().find(|p| p.as_str() == s))
            .ok_or_else(|| anyhow::anyhow!("Unknown protocol: {}", s))
    }
}

/// Loan entity key: wallet address or Hashstack loan id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoanEntityId {
    User(String),
    Loan(u64),
}

impl std::fmt::Display for LoanEntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanEntityId::User(address) => write!(f, "{}", address),
            LoanEntityId::Loan(id) => write!(f, "{}", id),
        }
    }
}

/// Provenance of the last event that touched an entity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtraInfo {
    pub block: Option<u64>,
    pub timestamp: Option<u64>,
}

/// Health factor. 부채가 0이면 무한대.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthFactor {
    Finite(Decimal),
    Infinite,
}

impl HealthFactor {
    pub fn ratio(numerator: Decimal, denominator: Decimal) -> Self {
        if denominator.is_zero() {
            return HealthFactor::Infinite;
        }
        numerator
            .checked_div(denominator)
            .map(HealthFactor::Finite)
            .unwrap_or(HealthFactor::Infinite)
    }

    pub fn is_below(&self, threshold: Decimal) -> bool {
        match self {
            HealthFactor::Finite(value) => *value < threshold,
            HealthFactor::Infinite => false,
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        match self {
            HealthFactor::Finite(value) => Some(*value),
            HealthFactor::Infinite => None,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, HealthFactor::Infinite)
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            HealthFactor::Finite(value) => value.to_f64().unwrap_or(f64::INFINITY),
            HealthFactor::Infinite => f64::INFINITY,
        }
    }
}

impl PartialOrd for HealthFactor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HealthFactor {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (HealthFactor::Finite(a), HealthFactor::Finite(b)) => a.cmp(b),
            (HealthFactor::Finite(_), HealthFactor::Infinite) => Ordering::Less,
            (HealthFactor::Infinite, HealthFactor::Finite(_)) => Ordering::Greater,
            (HealthFactor::Infinite, HealthFactor::Infinite) => Ordering::Equal,
        }
    }
}

impl std::fmt::Display for HealthFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthFactor::Finite(value) => write!(f, "{}", value.round_dp(4)),
            HealthFactor::Infinite => write!(f, "inf"),
        }
    }
}

/// 상태 재구성 에러
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("Unknown token {address} for {protocol}")]
    UnknownToken { protocol: ProtocolId, address: String },

    #[error("Out-of-order event: block {event_block} < last processed block {last_block}")]
    OutOfOrderEvent { event_block: u64, last_block: u64 },

    #[error("Malformed {event} event: {reason}")]
    MalformedEventData { event: String, reason: String },

    #[error("Upstream fetch failure: {0}")]
    UpstreamFetchFailure(String),

    #[error("Token parameters missing for {protocol}")]
    MissingTokenParameters { protocol: ProtocolId },

    #[error("Inconsistent loan {loan_id}: {reason}")]
    InconsistentLoan { loan_id: String, reason: String },
}

impl StateError {
    pub fn malformed(event: impl Into<String>, reason: impl Into<String>) -> Self {
        StateError::MalformedEventData {
            event: event.into(),
            reason: reason.into(),
        }
    }

    /// 이벤트 하나만 건너뛰고 리플레이를 계속할 수 있는지
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StateError::UnknownToken { .. }
                | StateError::MalformedEventData { .. }
                | StateError::InconsistentLoan { .. }
        )
    }
}

/// Result type alias
pub type StateResult<T> = Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_id_round_trip() {
        for protocol in ProtocolId::ALL {
            assert_eq!(ProtocolId::from_key(protocol.key()), Some(protocol));
            assert_eq!(protocol.as_str().parse::<ProtocolId>().unwrap(), protocol);
        }
        assert!("aave".parse::<ProtocolId>().is_err());
        assert!(ProtocolId::HashstackV1.is_loan_level());
        assert!(!ProtocolId::ZkLend.is_loan_level());
    }

    #[test]
    fn test_health_factor_zero_debt_is_infinite() {
        let hf = HealthFactor::ratio(Decimal::from(100), Decimal::ZERO);
        assert!(hf.is_infinite());
        assert!(!hf.is_below(Decimal::ONE));
        assert_eq!(hf.to_f64(), f64::INFINITY);
    }

    #[test]
    fn test_health_factor_ordering() {
        let low = HealthFactor::ratio(Decimal::from(1), Decimal::from(2));
        let high = HealthFactor::ratio(Decimal::from(3), Decimal::from(2));
        assert!(low < high);
        assert!(high < HealthFactor::Infinite);
        assert_eq!(low.value(), Some(Decimal::new(5, 1)));
        assert!(low.is_below(Decimal::ONE));
    }

    #[test]
    fn test_error_recoverability() {
        let unknown = StateError::UnknownToken {
            protocol: ProtocolId::ZkLend,
            address: "0x1".to_string(),
        };
        assert!(unknown.is_recoverable());
        assert!(StateError::malformed("Deposit", "short").is_recoverable());
        let order = StateError::OutOfOrderEvent { event_block: 1, last_block: 2 };
        assert!(!order.is_recoverable());
        assert!(order.to_string().contains("block 1"));
    }
}
