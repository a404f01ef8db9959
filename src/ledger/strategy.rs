use rust_decimal::Decimal;

use super::loan_entity::{LoanEntity, ValuationContext};
use crate::types::HealthFactor;

/// 프로토콜별 health factor 계산
pub trait HealthFactorStrategy: Send + Sync {
    /// 이 값 미만이면 청산 가능
    fn liquidation_threshold(&self, entity: &LoanEntity) -> Decimal;

    fn compute_health_factor(
        &self,
        entity: &LoanEntity,
        standardized: bool,
        ctx: &ValuationContext<'_>,
    ) -> HealthFactor;

    fn is_liquidable(&self, entity: &LoanEntity, health_factor: HealthFactor) -> bool {
        health_factor.is_below(self.liquidation_threshold(entity))
    }
}

/// 청산자가 상환할 수 있는 부채(USD) 추정
pub trait LiquidationStrategy: Send + Sync {
    fn compute_debt_to_be_liquidated(
        &self,
        entity: &LoanEntity,
        collateral_underlying: &str,
        debt_underlying: &str,
        health_factor: HealthFactor,
        ctx: &ValuationContext<'_>,
    ) -> Decimal;
}

pub trait RiskModel: HealthFactorStrategy + LiquidationStrategy {}

impl<T: HealthFactorStrategy + LiquidationStrategy> RiskModel for T {}

/// USD value of the entity's debt in tokens whose underlying is `debt_underlying`
pub fn debt_usd_of_underlying(
    entity: &LoanEntity,
    debt_underlying: &str,
    risk_adjusted: bool,
    ctx: &ValuationContext<'_>,
) -> Decimal {
    entity
        .debt
        .iter()
        .filter(|(token, _)| {
            ctx.parameters
                .debt
                .get(*token)
                .map(|settings| settings.underlying_address == debt_underlying)
                .unwrap_or(false)
        })
        .filter_map(|(token, amount)| ctx.debt_value(token, *amount, risk_adjusted))
        .sum()
}

/// 음수는 0, 상한 초과는 상한으로
pub fn clamp_liquidation(amount: Decimal, cap: Decimal) -> Decimal {
    amount.max(Decimal::ZERO).min(cap)
}
