use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::ProtocolState;
use crate::types::{HealthFactor, Prices, ProtocolId};

/// 담보 가격 한 지점의 청산 가능 부채
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidablePoint {
    pub collateral_price: Decimal,
    pub liquidable_debt: Decimal,
    /// 직전 가격 지점과의 차이
    pub liquidable_debt_at_interval: Decimal,
}

/// 엔티티별 loan 통계와 health ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanStatRecord {
    pub protocol: ProtocolId,
    pub entity_id: String,
    pub user: String,
    pub collateral_usd: Decimal,
    pub risk_adjusted_collateral_usd: Decimal,
    pub debt_usd: Decimal,
    pub health_factor: HealthFactor,
    pub standardized_health_factor: HealthFactor,
    pub liquidable: bool,
    pub collateral: String,
    pub debt: String,
}

/// 한 프로토콜 상태에 대한 읽기 전용 위험 집계
pub struct RiskAggregator<'a> {
    state: &'a ProtocolState,
}

impl<'a> RiskAggregator<'a> {
    pub fn new(state: &'a ProtocolState) -> Self {
        Self { state }
    }

    /// 담보 가격 하나만 바꾼 가격표로 청산 가능한 부채(USD) 합계
    pub fn compute_liquidable_debt_at_price(
        &self,
        prices: &Prices,
        collateral_underlying: &str,
        collateral_price: Decimal,
        debt_underlying: &str,
    ) -> Decimal {
        let mut changed_prices = prices.clone();
        changed_prices.insert(collateral_underlying.to_string(), collateral_price);
        let ctx = self.state.valuation_context(&changed_prices);

        self.state
            .loan_entities
            .values()
            .filter(|entity| {
                entity
                    .collateral_underlyings(&self.state.token_parameters)
                    .contains(collateral_underlying)
            })
            .filter(|entity| {
                entity
                    .debt_underlyings(&self.state.token_parameters)
                    .contains(debt_underlying)
            })
            .filter_map(|entity| {
                let health_factor = entity.compute_health_factor(false, &ctx);
                if !entity.is_liquidable(health_factor) {
                    return None;
                }
                Some(entity.compute_debt_to_be_liquidated(collateral_underlying, debt_underlying, health_factor, &ctx))
            })
            .sum()
    }

    /// 가격 지점별 청산 깊이. 지점들은 병렬로 계산한다
    pub fn liquidable_debt_curve(
        &self,
        prices: &Prices,
        collateral_underlying: &str,
        debt_underlying: &str,
        price_points: &[Decimal],
    ) -> Vec<LiquidablePoint> {
        let amounts: Vec<Decimal> = price_points
            .par_iter()
            .map(|price| self.compute_liquidable_debt_at_price(prices, collateral_underlying, *price, debt_underlying))
            .collect();
        debug!(
            "{} 청산 곡선 {}개 지점 계산",
            self.state.protocol,
            amounts.len()
        );

        let mut previous: Option<Decimal> = None;
        price_points
            .iter()
            .zip(amounts)
            .map(|(price, liquidable_debt)| {
                let interval = previous.map(|p| (liquidable_debt - p).abs()).unwrap_or(Decimal::ZERO);
                previous = Some(liquidable_debt);
                LiquidablePoint {
                    collateral_price: *price,
                    liquidable_debt,
                    liquidable_debt_at_interval: interval,
                }
            })
            .collect()
    }

    /// 담보나 부채가 있는 엔티티마다 한 줄
    pub fn loan_stats(&self, prices: &Prices) -> Vec<LoanStatRecord> {
        let ctx = self.state.valuation_context(prices);
        self.state
            .loan_entities
            .iter()
            .filter(|(_, entity)| entity.has_collateral() || entity.has_debt())
            .map(|(id, entity)| {
                let health_factor = entity.compute_health_factor(false, &ctx);
                LoanStatRecord {
                    protocol: self.state.protocol,
                    entity_id: id.to_string(),
                    user: entity.user.clone(),
                    collateral_usd: entity.compute_collateral_usd(false, &ctx),
                    risk_adjusted_collateral_usd: entity.compute_collateral_usd(true, &ctx),
                    debt_usd: entity.compute_debt_usd(false, &ctx),
                    health_factor,
                    standardized_health_factor: entity.compute_health_factor(true, &ctx),
                    liquidable: entity.is_liquidable(health_factor),
                    collateral: entity.get_collateral_str(&ctx),
                    debt: entity.get_debt_str(&ctx),
                }
            })
            .collect()
    }
}

/// 현재 가격의 (1 + upper_fraction)배까지 `points`개 등간격 가격
pub fn collateral_price_range(current_price: Decimal, points: usize, upper_fraction: Decimal) -> Vec<Decimal> {
    if points == 0 || current_price <= Decimal::ZERO {
        return Vec::new();
    }
    let upper = current_price * (Decimal::ONE + upper_fraction);
    let step = upper / Decimal::from(points as u64);
    (1..=points as u64).map(|i| step * Decimal::from(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::underlying_address;
    use crate::ledger::{LoanEntity, TokenParameters, TokenSettings};
    use crate::types::LoanEntityId;

    const ETH_UNIT: u64 = 1_000_000_000_000_000_000;

    fn zklend_state() -> ProtocolState {
        let eth = underlying_address("ETH").unwrap();
        let usdc = underlying_address("USDC").unwrap();
        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        let mut parameters = TokenParameters::default();
        for (symbol, address) in [("ETH", eth), ("USDC", usdc)] {
            let settings = TokenSettings::neutral(state.registry.get(address).unwrap(), symbol)
                .with_collateral_factor(Decimal::new(8, 1))
                .with_liquidation_bonus(Decimal::new(1, 1));
            parameters.collateral.insert(address.to_string(), settings.clone());
            parameters.debt.insert(address.to_string(), settings);
        }
        state.install_token_parameters(parameters);

        // 1 ETH 담보에 각각 500, 1000, 1400 USDC 부채
        for (i, debt) in [500u64, 1_000, 1_400].into_iter().enumerate() {
            let user = format!("0x{:064x}", i + 1);
            let mut entity = LoanEntity::new(ProtocolId::ZkLend, user.as_str());
            entity.collateral.set_value(eth, Decimal::from(ETH_UNIT));
            entity.debt.set_value(usdc, Decimal::from(debt * 1_000_000));
            state.loan_entities.insert(LoanEntityId::User(user), entity);
        }
        // 부채 없는 사용자는 곡선에 기여하지 않는다
        let mut idle = LoanEntity::new(ProtocolId::ZkLend, "0x9");
        idle.collateral.set_value(eth, Decimal::from(ETH_UNIT));
        state.loan_entities.insert(LoanEntityId::User("0x9".to_string()), idle);
        state
    }

    fn prices() -> Prices {
        [
            (underlying_address("ETH").unwrap().to_string(), Decimal::from(2_000)),
            (underlying_address("USDC").unwrap().to_string(), Decimal::ONE),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_liquidable_debt_grows_as_collateral_price_falls() {
        let state = zklend_state();
        let aggregator = RiskAggregator::new(&state);
        let eth = underlying_address("ETH").unwrap();
        let usdc = underlying_address("USDC").unwrap();

        let points: Vec<Decimal> = (1..=24).map(|i| Decimal::from(i * 100)).collect();
        let curve = aggregator.liquidable_debt_curve(&prices(), eth, usdc, &points);
        assert_eq!(curve.len(), points.len());
        for pair in curve.windows(2) {
            assert!(pair[0].liquidable_debt >= pair[1].liquidable_debt);
        }
        // 2000에서는 아무도 청산 대상이 아니다
        assert_eq!(curve[19].liquidable_debt, Decimal::ZERO);
        assert!(curve[0].liquidable_debt > Decimal::ZERO);
        assert!(curve.iter().skip(1).any(|p| p.liquidable_debt_at_interval > Decimal::ZERO));
    }

    #[test]
    fn test_entities_without_matching_tokens_are_excluded() {
        let state = zklend_state();
        let aggregator = RiskAggregator::new(&state);
        let eth = underlying_address("ETH").unwrap();
        let usdc = underlying_address("USDC").unwrap();
        // USDC 담보를 가진 엔티티가 없다
        assert_eq!(
            aggregator.compute_liquidable_debt_at_price(&prices(), usdc, Decimal::new(1, 2), eth),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_loan_stats_mark_liquidable_entities() {
        let state = zklend_state();
        let aggregator = RiskAggregator::new(&state);
        let mut prices = prices();
        prices.insert(underlying_address("ETH").unwrap().to_string(), Decimal::from(1_500));

        let stats = aggregator.loan_stats(&prices);
        assert_eq!(stats.len(), 4);
        let liquidable: Vec<_> = stats.iter().filter(|record| record.liquidable).collect();
        // rac = 1200: 1400 USDC 부채만 청산 대상
        assert_eq!(liquidable.len(), 1);
        assert_eq!(liquidable[0].debt_usd, Decimal::from(1_400));
        let idle = stats.iter().find(|record| record.user == "0x9").unwrap();
        assert!(idle.health_factor.is_infinite());
        assert_eq!(idle.collateral_usd, Decimal::from(1_500));
    }

    #[test]
    fn test_price_range() {
        let range = collateral_price_range(Decimal::from(2_000), 4, Decimal::new(2, 1));
        assert_eq!(
            range,
            vec![Decimal::from(600), Decimal::from(1_200), Decimal::from(1_800), Decimal::from(2_400)]
        );
        assert!(collateral_price_range(Decimal::ZERO, 4, Decimal::new(2, 1)).is_empty());
    }
}
