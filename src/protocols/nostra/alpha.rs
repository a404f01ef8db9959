use rust_decimal::Decimal;

use super::{token_metadata, TARGET_HEALTH_FACTOR};
use crate::constants::{underlying_token, NOSTRA_SCALE_DECIMALS};
use crate::ledger::strategy::{clamp_liquidation, debt_usd_of_underlying};
use crate::ledger::{
    HealthFactorStrategy, LiquidationStrategy, LoanEntity, RegisteredToken, TokenKind, TokenRegistry, TokenSettings,
    ValuationContext,
};
use crate::protocols::{scaled_felt, ChainReader};
use crate::types::HealthFactor;

/// Nostra Alpha: HF = risk-adjusted collateral / risk-adjusted debt
#[derive(Debug, Clone, Copy, Default)]
pub struct NostraAlphaRiskModel;

pub(crate) fn nostra_health_factor(entity: &LoanEntity, ctx: &ValuationContext<'_>) -> HealthFactor {
    let risk_adjusted_collateral_usd = entity.compute_collateral_usd(true, ctx);
    let risk_adjusted_debt_usd = entity.compute_debt_usd(true, ctx);
    HealthFactor::ratio(risk_adjusted_collateral_usd, risk_adjusted_debt_usd)
}

impl HealthFactorStrategy for NostraAlphaRiskModel {
    fn liquidation_threshold(&self, _entity: &LoanEntity) -> Decimal {
        Decimal::ONE
    }

    fn compute_health_factor(&self, entity: &LoanEntity, _standardized: bool, ctx: &ValuationContext<'_>) -> HealthFactor {
        nostra_health_factor(entity, ctx)
    }
}

impl LiquidationStrategy for NostraAlphaRiskModel {
    /// 청산자 수수료(USD)가 가장 큰 담보 토큰 기준의 청산 금액
    fn compute_debt_to_be_liquidated(
        &self,
        entity: &LoanEntity,
        collateral_underlying: &str,
        debt_underlying: &str,
        health_factor: HealthFactor,
        ctx: &ValuationContext<'_>,
    ) -> Decimal {
        let Some(health_factor) = health_factor.value() else {
            return Decimal::ZERO;
        };
        let debt_usd = debt_usd_of_underlying(entity, debt_underlying, false, ctx);
        let Some(debt_settings) = entity
            .debt
            .positive_tokens()
            .filter_map(|token| ctx.parameters.debt.get(token))
            .find(|settings| settings.underlying_address == debt_underlying)
        else {
            return Decimal::ZERO;
        };

        let mut best: Option<(Decimal, Decimal)> = None;
        for settings in entity
            .collateral
            .positive_tokens()
            .filter_map(|token| ctx.parameters.collateral.get(token))
            .filter(|settings| settings.underlying_address == collateral_underlying)
        {
            let liquidator_fee = (settings.liquidator_fee_beta * (Decimal::ONE - health_factor))
                .min(settings.liquidator_fee_max);
            let total_fee = liquidator_fee + settings.protocol_fee;
            let denominator = TARGET_HEALTH_FACTOR
                - settings.collateral_factor * debt_settings.debt_factor * (Decimal::ONE + total_fee);
            let percentage = if denominator <= Decimal::ZERO {
                Decimal::ONE
            } else {
                ((TARGET_HEALTH_FACTOR - health_factor) / denominator).min(Decimal::ONE)
            };
            let amount_usd = percentage * debt_usd;
            let candidate = (liquidator_fee * amount_usd, amount_usd);
            if best.map_or(true, |current| candidate > current) {
                best = Some(candidate);
            }
        }
        best.map(|(_, amount_usd)| clamp_liquidation(amount_usd, debt_usd))
            .unwrap_or(Decimal::ZERO)
    }
}

/// getCollateralData / getLiquidationSettings / getDebtData
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
            // id, asset, collateralFactor, _, priceOracle
            let collateral_data = reader.call(cdp_manager, "getCollateralData", &[underlying.clone()]).await?;
            let collateral_factor = scaled_felt(&collateral_data, 2, NOSTRA_SCALE_DECIMALS, "getCollateralData")?;
            let liquidation_settings = reader.call(cdp_manager, "getLiquidationSettings", &[underlying]).await?;
            let beta = scaled_felt(&liquidation_settings, 0, NOSTRA_SCALE_DECIMALS, "liquidatorFeeBeta")?;
            let max = scaled_felt(&liquidation_settings, 3, NOSTRA_SCALE_DECIMALS, "liquidatorFeeMax")?;
            let protocol_fee = scaled_felt(&liquidation_settings, 5, NOSTRA_SCALE_DECIMALS, "protocolFee")?;
            Ok(settings
                .with_collateral_factor(collateral_factor)
                .with_liquidator_fees(beta, max, protocol_fee))
        }
        TokenKind::Debt => {
            // id, debtTier, debtToken, debtFactor, _, priceOracle
            let debt_data = reader.call(cdp_manager, "getDebtData", &[token.address.clone()]).await?;
            let debt_factor = scaled_felt(&debt_data, 3, NOSTRA_SCALE_DECIMALS, "getDebtData")?;
            Ok(settings.with_debt_factor(debt_factor))
        }
        TokenKind::Underlying => anyhow::bail!("{} is not a Nostra token", token.symbol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{underlying_address, NOSTRA_ALPHA_CDP_MANAGER};
    use crate::ledger::{InterestRateModelPair, TokenParameters};
    use crate::mocks::ScriptedChainReader;
    use crate::types::{Prices, ProtocolId};

    fn parameters(registry: &TokenRegistry) -> (TokenParameters, String, String) {
        let eth = underlying_address("ETH").unwrap();
        let usdc = underlying_address("USDC").unwrap();
        let i_eth = registry.find_wrapped(eth, TokenKind::Collateral { interest_bearing: true }).unwrap();
        let d_usdc = registry.find_wrapped(usdc, TokenKind::Debt).unwrap();

        let mut parameters = TokenParameters::default();
        parameters.collateral.insert(
            i_eth.address.clone(),
            TokenSettings::neutral(i_eth, "ETH")
                .with_collateral_factor(Decimal::new(8, 1))
                .with_liquidator_fees(Decimal::ONE, Decimal::new(1, 1), Decimal::new(2, 2)),
        );
        parameters
            .debt
            .insert(d_usdc.address.clone(), TokenSettings::neutral(d_usdc, "USDC"));
        (parameters, i_eth.address.clone(), d_usdc.address.clone())
    }

    #[test]
    fn test_health_factor_and_fee_based_liquidation() {
        let registry = TokenRegistry::for_protocol(ProtocolId::NostraAlpha);
        let (parameters, i_eth, d_usdc) = parameters(&registry);
        let eth = underlying_address("ETH").unwrap();
        let usdc = underlying_address("USDC").unwrap();
        let rates = InterestRateModelPair::default();
        let prices: Prices = [(eth.to_string(), Decimal::from(1000)), (usdc.to_string(), Decimal::ONE)]
            .into_iter()
            .collect();
        let ctx = ValuationContext::new(&parameters, &rates, &prices);

        let mut entity = LoanEntity::new(ProtocolId::NostraAlpha, "0x1");
        entity.collateral.set_value(&i_eth, Decimal::from(10u64.pow(18)));
        entity.debt.set_value(&d_usdc, Decimal::from(1_000_000_000u64));

        // 800 / 1000
        let hf = entity.compute_health_factor(false, &ctx);
        assert_eq!(hf, HealthFactor::Finite(Decimal::new(8, 1)));
        assert!(entity.is_liquidable(hf));

        // fee = min(1 * 0.2, 0.1) = 0.1, total = 0.12
        // pct = (1.25 - 0.8) / (1.25 - 0.8 * 1.12) = 0.45 / 0.354
        // -> >1 이므로 1, 전체 부채 1000 USD
        let amount = entity.compute_debt_to_be_liquidated(eth, usdc, hf, &ctx);
        assert_eq!(amount, Decimal::from(1000));

        // 부채가 적어지면 비율 계산이 적용된다: hf = 800 / 700
        entity.debt.set_value(&d_usdc, Decimal::from(700_000_000u64));
        let hf = entity.compute_health_factor(false, &ctx);
        assert!(!entity.is_liquidable(hf));
    }

    #[test]
    fn test_infinite_health_factor_liquidates_nothing() {
        let registry = TokenRegistry::for_protocol(ProtocolId::NostraAlpha);
        let (parameters, i_eth, _) = parameters(&registry);
        let rates = InterestRateModelPair::default();
        let prices = Prices::new();
        let ctx = ValuationContext::new(&parameters, &rates, &prices);
        let mut entity = LoanEntity::new(ProtocolId::NostraAlpha, "0x1");
        entity.collateral.set_value(&i_eth, Decimal::ONE);
        let eth = underlying_address("ETH").unwrap();
        let usdc = underlying_address("USDC").unwrap();
        assert_eq!(
            entity.compute_debt_to_be_liquidated(eth, usdc, HealthFactor::Infinite, &ctx),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn test_collect_collateral_settings() {
        let registry = TokenRegistry::for_protocol(ProtocolId::NostraAlpha);
        let eth = underlying_address("ETH").unwrap();
        let i_eth = registry.find_wrapped(eth, TokenKind::Collateral { interest_bearing: true }).unwrap();
        let one = "0xde0b6b3a7640000".to_string();
        let reader = ScriptedChainReader::new()
            .with_response(&i_eth.address, "decimals", &[], vec!["0x12".to_string()])
            .with_response(&i_eth.address, "underlyingAsset", &[], vec![eth.to_string()])
            .with_response(
                NOSTRA_ALPHA_CDP_MANAGER,
                "getCollateralData",
                &[eth],
                vec!["0x1".to_string(), eth.to_string(), "0xb1a2bc2ec500000".to_string()],
            )
            .with_response(
                NOSTRA_ALPHA_CDP_MANAGER,
                "getLiquidationSettings",
                &[eth],
                vec![one.clone(), "0x0".into(), "0x0".into(), one.clone(), "0x0".into(), "0x0".into()],
            );

        let settings = token_settings(&registry, i_eth, NOSTRA_ALPHA_CDP_MANAGER, &reader).await.unwrap();
        // 0.8
        assert_eq!(settings.collateral_factor, Decimal::new(8, 1));
        assert_eq!(settings.liquidator_fee_beta, Decimal::ONE);
        assert_eq!(settings.liquidator_fee_max, Decimal::ONE);
        assert_eq!(settings.protocol_fee, Decimal::ZERO);
        assert!(settings.is_interest_bearing);
        assert_eq!(settings.underlying_symbol, "ETH");
    }
}
