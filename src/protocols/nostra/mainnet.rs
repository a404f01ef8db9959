use rust_decimal::Decimal;
use tracing::warn;

use super::alpha::nostra_health_factor;
use super::{token_metadata, TARGET_HEALTH_FACTOR};
use crate::constants::{underlying_token, NOSTRA_SCALE_DECIMALS};
use crate::ledger::strategy::{clamp_liquidation, debt_usd_of_underlying};
use crate::ledger::{
    HealthFactorStrategy, LiquidationStrategy, LoanEntity, RegisteredToken, TokenKind, TokenRegistry, TokenSettings,
    ValuationContext,
};
use crate::protocols::{scaled_felt, ChainReader};
use crate::types::HealthFactor;

/// 청산 보너스 0.2
const LIQUIDATION_BONUS: Decimal = Decimal::from_parts(2, 0, 0, false, 1);

/// Nostra Mainnet: HF는 Alpha와 같고, 청산 금액은 목표 HF 1.25 복원 기준
#[derive(Debug, Clone, Copy, Default)]
pub struct NostraMainnetRiskModel;

impl HealthFactorStrategy for NostraMainnetRiskModel {
    fn liquidation_threshold(&self, _entity: &LoanEntity) -> Decimal {
        Decimal::ONE
    }

    fn compute_health_factor(&self, entity: &LoanEntity, _standardized: bool, ctx: &ValuationContext<'_>) -> HealthFactor {
        nostra_health_factor(entity, ctx)
    }
}

impl LiquidationStrategy for NostraMainnetRiskModel {
    fn compute_debt_to_be_liquidated(
        &self,
        entity: &LoanEntity,
        collateral_underlying: &str,
        debt_underlying: &str,
        _health_factor: HealthFactor,
        ctx: &ValuationContext<'_>,
    ) -> Decimal {
        let collateral_settings = entity
            .collateral
            .positive_tokens()
            .filter_map(|token| ctx.parameters.collateral.get(token))
            .find(|settings| settings.underlying_address == collateral_underlying);
        let debt_settings = entity
            .debt
            .positive_tokens()
            .filter_map(|token| ctx.parameters.debt.get(token))
            .find(|settings| settings.underlying_address == debt_underlying);
        let (Some(collateral_settings), Some(debt_settings)) = (collateral_settings, debt_settings) else {
            return Decimal::ZERO;
        };

        let cap = debt_usd_of_underlying(entity, debt_underlying, false, ctx);
        let risk_adjusted_collateral_usd = entity.compute_collateral_usd(true, ctx);
        let risk_adjusted_debt_usd = entity.compute_debt_usd(true, ctx);
        let numerator = risk_adjusted_collateral_usd - risk_adjusted_debt_usd * TARGET_HEALTH_FACTOR;
        let Some(inverse_debt_factor) = Decimal::ONE.checked_div(debt_settings.debt_factor) else {
            return cap;
        };
        let denominator = collateral_settings.collateral_factor * (Decimal::ONE + LIQUIDATION_BONUS)
            - inverse_debt_factor * TARGET_HEALTH_FACTOR;
        if denominator.is_zero() {
            return cap;
        }
        clamp_liquidation(numerator / denominator, cap)
    }
}

/// collateral_data / liquidation_settings / debt_data
pub(crate) async fn token_settings(
    registry: &TokenRegistry,
    token: &RegisteredToken,
    cdp_manager: &str,
    reader: &dyn ChainReader,
) -> anyhow::Result<TokenSettings> {
    let (decimals, underlying) = token_metadata(token, reader).await?;
    let underlying_symbol = underlying_token(&underlying)
        .map(|(symbol, _)| symbol.to_string())
        .unwrap_or_else(|| registry.underlying_symbol(token));
    let settings = TokenSettings::neutral(token, &underlying_symbol)
        .with_decimals(decimals)
        .with_underlying(&underlying_symbol, &underlying);

    match token.kind {
        TokenKind::Collateral { .. } => {
            // 등록되지 않은 담보는 collateral factor 0
            let collateral_factor = match reader.call(cdp_manager, "collateral_data", &[underlying.clone()]).await {
                Ok(response) => scaled_felt(&response, 1, NOSTRA_SCALE_DECIMALS, "collateral_data")?,
                Err(e) => {
                    warn!("⚠️ Nostra Mainnet {} collateral_data 실패, factor 0 사용: {}", token.symbol, e);
                    Decimal::ZERO
                }
            };
            // protocol_fee, _, protocol_fee_recipient
            let liquidation_settings = reader.call(cdp_manager, "liquidation_settings", &[underlying]).await?;
            let protocol_fee = scaled_felt(&liquidation_settings, 0, NOSTRA_SCALE_DECIMALS, "protocol_fee")?;
            Ok(settings
                .with_collateral_factor(collateral_factor)
                .with_liquidator_fees(Decimal::ZERO, Decimal::ZERO, protocol_fee))
        }
        TokenKind::Debt => {
            let debt_data = reader.call(cdp_manager, "debt_data", &[token.address.clone()]).await?;
            let debt_factor = scaled_felt(&debt_data, 2, NOSTRA_SCALE_DECIMALS, "debt_data")?;
            Ok(settings.with_debt_factor(debt_factor))
        }
        TokenKind::Underlying => anyhow::bail!("{} is not a Nostra token", token.symbol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{underlying_address, NOSTRA_MAINNET_CDP_MANAGER};
    use crate::ledger::{InterestRateModelPair, TokenParameters};
    use crate::mocks::ScriptedChainReader;
    use crate::protocols::collect_token_parameters;
    use crate::types::{Prices, ProtocolId};

    #[test]
    fn test_target_health_factor_liquidation() {
        let registry = TokenRegistry::for_protocol(ProtocolId::NostraMainnet);
        let eth = underlying_address("ETH").unwrap();
        let usdc = underlying_address("USDC").unwrap();
        let n_eth = registry.find_wrapped(eth, TokenKind::Collateral { interest_bearing: false }).unwrap();
        let d_usdc = registry.find_wrapped(usdc, TokenKind::Debt).unwrap();

        let mut parameters = TokenParameters::default();
        parameters.collateral.insert(
            n_eth.address.clone(),
            TokenSettings::neutral(n_eth, "ETH").with_collateral_factor(Decimal::new(8, 1)),
        );
        parameters
            .debt
            .insert(d_usdc.address.clone(), TokenSettings::neutral(d_usdc, "USDC"));
        let rates = InterestRateModelPair::default();
        let prices: Prices = [(eth.to_string(), Decimal::from(1000)), (usdc.to_string(), Decimal::ONE)]
            .into_iter()
            .collect();
        let ctx = ValuationContext::new(&parameters, &rates, &prices);

        let mut entity = LoanEntity::new(ProtocolId::NostraMainnet, "0x1");
        entity.collateral.set_value(&n_eth.address, Decimal::from(10u64.pow(18)));
        entity.debt.set_value(&d_usdc.address, Decimal::from(900_000_000u64));

        let hf = entity.compute_health_factor(false, &ctx);
        assert!(entity.is_liquidable(hf));
        // (800 - 900 * 1.25) / (0.8 * 1.2 - 1.25) = -325 / -0.29
        let amount = entity.compute_debt_to_be_liquidated(eth, usdc, hf, &ctx);
        assert_eq!(amount, Decimal::from(900));

        entity.debt.set_value(&d_usdc.address, Decimal::from(820_000_000u64));
        let hf = entity.compute_health_factor(false, &ctx);
        let amount = entity.compute_debt_to_be_liquidated(eth, usdc, hf, &ctx);
        // (800 - 1025) / -0.29 = 775.86
        assert_eq!(amount.round_dp(2), Decimal::new(77586, 2));
    }

    #[tokio::test]
    async fn test_unregistered_collateral_gets_zero_factor() {
        let registry = TokenRegistry::for_protocol(ProtocolId::NostraMainnet);
        let eth = underlying_address("ETH").unwrap();
        let n_eth = registry.find_wrapped(eth, TokenKind::Collateral { interest_bearing: false }).unwrap();
        let d_eth = registry.find_wrapped(eth, TokenKind::Debt).unwrap();
        let reader = ScriptedChainReader::new()
            .with_response(&n_eth.address, "decimals", &[], vec!["0x12".to_string()])
            .with_response(&n_eth.address, "underlyingAsset", &[], vec![eth.to_string()])
            .with_response(NOSTRA_MAINNET_CDP_MANAGER, "liquidation_settings", &[eth], vec!["0x0".to_string()])
            .with_response(&d_eth.address, "decimals", &[], vec!["0x12".to_string()])
            .with_response(&d_eth.address, "underlyingAsset", &[], vec![eth.to_string()])
            .with_response(
                NOSTRA_MAINNET_CDP_MANAGER,
                "debt_data",
                &[d_eth.address.as_str()],
                vec!["0x1".to_string(), "0x0".to_string(), "0xde0b6b3a7640000".to_string()],
            );

        let parameters = collect_token_parameters(ProtocolId::NostraMainnet, &registry, &reader)
            .await
            .unwrap();
        assert_eq!(parameters.collateral.len(), 1);
        assert_eq!(parameters.collateral[&n_eth.address].collateral_factor, Decimal::ZERO);
        assert!(!parameters.collateral[&n_eth.address].is_interest_bearing);
        assert_eq!(parameters.debt[&d_eth.address].debt_factor, Decimal::ONE);
    }
}
