pub mod hashstack;
pub mod nostra;
pub mod zklend;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::ledger::{RiskModel, TokenParameters, TokenRegistry};
use crate::types::{ProtocolId, StateError, StateResult};
use crate::utils::felt::felt_to_decimal;
use crate::utils::math::pow10;

/// Read-only contract calls (`starknet_call`)
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `function`은 이름. selector 변환은 구현체가 한다.
    async fn call(&self, contract: &str, function: &str, calldata: &[String]) -> anyhow::Result<Vec<String>>;
}

/// 프로토콜별 health factor / 청산 모델
pub fn risk_model(protocol: ProtocolId) -> &'static dyn RiskModel {
    match protocol {
        ProtocolId::ZkLend => &zklend::ZkLendRiskModel,
        ProtocolId::NostraAlpha => &nostra::alpha::NostraAlphaRiskModel,
        ProtocolId::NostraMainnet => &nostra::mainnet::NostraMainnetRiskModel,
        ProtocolId::HashstackV0 => &hashstack::v0::HashstackV0RiskModel,
        ProtocolId::HashstackV1 => &hashstack::v1::HashstackV1RiskModel,
    }
}

/// 같은 트랜잭션 안에서의 처리 순서. 낮을수록 먼저
pub fn event_priority(protocol: ProtocolId, key_name: &str) -> u8 {
    match protocol {
        ProtocolId::ZkLend => 0,
        ProtocolId::NostraAlpha | ProtocolId::NostraMainnet => nostra::event_priority(key_name),
        ProtocolId::HashstackV0 => hashstack::v0::event_priority(key_name),
        ProtocolId::HashstackV1 => hashstack::v1::event_priority(key_name),
    }
}

/// 프로토콜이 처리하는 이벤트의 짧은 이름. RPC selector를 이름으로 되돌릴 때 쓴다
pub fn event_names(protocol: ProtocolId) -> &'static [&'static str] {
    match protocol {
        ProtocolId::ZkLend => &[
            "AccumulatorsSync",
            "Deposit",
            "Withdrawal",
            "CollateralEnabled",
            "CollateralDisabled",
            "Borrowing",
            "Repayment",
            "Liquidation",
        ],
        ProtocolId::NostraAlpha | ProtocolId::NostraMainnet => &["InterestStateUpdated", "Transfer", "Mint", "Burn"],
        ProtocolId::HashstackV0 => &[
            "new_loan",
            "loan_swap",
            "liquidated",
            "loan_withdrawal",
            "loan_repaid",
            "loan_interest_deducted",
            "collateral_added",
            "collateral_withdrawal",
        ],
        ProtocolId::HashstackV1 => &[
            "updated_supply_token_price",
            "updated_debt_token_price",
            "new_loan",
            "loan_transferred",
            "loan_spent",
            "loan_repaid",
            "collateral_added",
        ],
    }
}

/// Contracts whose events drive a protocol's state
pub fn event_addresses(protocol: ProtocolId, registry: &TokenRegistry) -> Vec<String> {
    match protocol {
        ProtocolId::ZkLend => vec![crate::constants::ZKLEND_MARKET.to_string()],
        ProtocolId::NostraAlpha | ProtocolId::NostraMainnet => nostra::event_addresses(protocol, registry),
        ProtocolId::HashstackV0 => vec![crate::constants::HASHSTACK_V0_ADDRESS.to_string()],
        ProtocolId::HashstackV1 => hashstack::v1::event_addresses(registry),
    }
}

/// 리플레이 전에 한 번 실행하는 토큰 파라미터 수집
pub async fn collect_token_parameters(
    protocol: ProtocolId,
    registry: &TokenRegistry,
    reader: &dyn ChainReader,
) -> StateResult<TokenParameters> {
    info!("🔧 {} 토큰 파라미터 수집 시작", protocol);
    let parameters = match protocol {
        ProtocolId::ZkLend => zklend::collect_token_parameters(registry, reader).await,
        ProtocolId::NostraAlpha | ProtocolId::NostraMainnet => {
            nostra::collect_token_parameters(protocol, registry, reader).await
        }
        ProtocolId::HashstackV0 | ProtocolId::HashstackV1 => hashstack::neutral_token_parameters(registry),
    };
    if parameters.is_empty() {
        warn!("⚠️ {} 토큰 파라미터를 하나도 얻지 못했습니다", protocol);
        return Err(StateError::MissingTokenParameters { protocol });
    }
    info!(
        "✅ {} 파라미터 수집 완료: 담보 {}개, 부채 {}개",
        protocol,
        parameters.collateral.len(),
        parameters.debt.len()
    );
    Ok(parameters)
}

/// 응답의 `index` 번째 felt를 10^scale로 나눈 값
pub(crate) fn scaled_felt(response: &[String], index: usize, scale: u32, context: &str) -> anyhow::Result<Decimal> {
    let felt = response
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("{}: response too short ({} < {})", context, response.len(), index + 1))?;
    let value = felt_to_decimal(felt).ok_or_else(|| anyhow::anyhow!("{}: invalid felt {}", context, felt))?;
    Ok(value / pow10(scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_felt() {
        // 0.8e27
        let response = vec!["0x0".to_string(), "0x295be96e640669720000000".to_string()];
        assert_eq!(scaled_felt(&response, 1, 27, "test").unwrap(), Decimal::new(8, 1));
        assert!(scaled_felt(&response, 2, 27, "test").is_err());
    }

    #[test]
    fn test_event_addresses() {
        let registry = TokenRegistry::for_protocol(ProtocolId::NostraAlpha);
        let addresses = event_addresses(ProtocolId::NostraAlpha, &registry);
        assert!(addresses.contains(&crate::constants::NOSTRA_ALPHA_INTEREST_RATE_MODEL.to_string()));
        assert_eq!(addresses.len(), 16);
    }
}
