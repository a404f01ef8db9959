use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::interest_rate::InterestRateModelPair;
use super::portfolio::Portfolio;
use super::token_registry::{TokenParameters, TokenSettings};
use crate::protocols::risk_model;
use crate::types::{ExtraInfo, HealthFactor, Prices, ProtocolId};
use crate::utils::math::{pow10, safe_div};

/// 평가에 필요한 읽기 전용 스냅샷
#[derive(Debug, Clone, Copy)]
pub struct ValuationContext<'a> {
    pub parameters: &'a TokenParameters,
    pub interest_rates: &'a InterestRateModelPair,
    pub prices: &'a Prices,
}

impl<'a> ValuationContext<'a> {
    pub fn new(
        parameters: &'a TokenParameters,
        interest_rates: &'a InterestRateModelPair,
        prices: &'a Prices,
    ) -> Self {
        Self { parameters, interest_rates, prices }
    }

    pub fn with_prices(&self, prices: &'a Prices) -> Self {
        Self { prices, ..*self }
    }

    /// Price of a token's underlying asset
    pub fn price_of(&self, settings: &TokenSettings) -> Option<Decimal> {
        self.prices.get(&settings.underlying_address).copied()
    }

    /// 담보 한 줄의 USD 가치. 파라미터나 가격이 없으면 None
    pub fn collateral_value(&self, token: &str, amount: Decimal, risk_adjusted: bool) -> Option<Decimal> {
        let settings = self.parameters.collateral.get(token)?;
        let price = self.price_of(settings)?;
        let index = self.interest_rates.collateral.safe_index(token);
        let factor = if risk_adjusted { settings.collateral_factor } else { Decimal::ONE };
        let units = safe_div(amount, pow10(settings.decimals))?;
        Some(units * factor * index * price)
    }

    /// 부채 한 줄의 USD 가치. risk-adjusted면 debt factor로 나눈다.
    pub fn debt_value(&self, token: &str, amount: Decimal, risk_adjusted: bool) -> Option<Decimal> {
        let settings = self.parameters.debt.get(token)?;
        let price = self.price_of(settings)?;
        let index = self.interest_rates.debt.safe_index(token);
        let units = safe_div(amount, pow10(settings.decimals))?;
        let value = units * index * price;
        if risk_adjusted {
            safe_div(value, settings.debt_factor)
        } else {
            Some(value)
        }
    }
}

/// Protocol-specific entity fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoanDetails {
    ZkLend {
        deposit: Portfolio,
        collateral_enabled: BTreeMap<String, bool>,
    },
    Nostra {
        interest_bearing_collateral: Portfolio,
        non_interest_bearing_collateral: Portfolio,
    },
    Hashstack {
        original_collateral: Portfolio,
        borrowed_collateral: Portfolio,
        debt_category: Option<u8>,
    },
}

impl LoanDetails {
    pub fn for_protocol(protocol: ProtocolId) -> Self {
        match protocol {
            ProtocolId::ZkLend => LoanDetails::ZkLend {
                deposit: Portfolio::new(),
                collateral_enabled: BTreeMap::new(),
            },
            ProtocolId::NostraAlpha | ProtocolId::NostraMainnet => LoanDetails::Nostra {
                interest_bearing_collateral: Portfolio::new(),
                non_interest_bearing_collateral: Portfolio::new(),
            },
            ProtocolId::HashstackV0 | ProtocolId::HashstackV1 => LoanDetails::Hashstack {
                original_collateral: Portfolio::new(),
                borrowed_collateral: Portfolio::new(),
                debt_category: None,
            },
        }
    }
}

/// 한 사용자(또는 Hashstack loan)의 담보/부채 원장
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanEntity {
    pub protocol: ProtocolId,
    /// 지갑 주소. Hashstack에서는 loan 소유자
    pub user: String,
    pub collateral: Portfolio,
    pub debt: Portfolio,
    pub extra_info: ExtraInfo,
    pub details: LoanDetails,
}

impl LoanEntity {
    pub fn new(protocol: ProtocolId, user: impl Into<String>) -> Self {
        Self {
            protocol,
            user: user.into(),
            collateral: Portfolio::new(),
            debt: Portfolio::new(),
            extra_info: ExtraInfo::default(),
            details: LoanDetails::for_protocol(protocol),
        }
    }

    /// 분할 담보의 합으로 `collateral`을 다시 계산
    pub fn recompute_collateral(&mut self) {
        match &self.details {
            LoanDetails::Nostra {
                interest_bearing_collateral,
                non_interest_bearing_collateral,
            } => {
                self.collateral = interest_bearing_collateral + non_interest_bearing_collateral;
            }
            LoanDetails::Hashstack {
                original_collateral,
                borrowed_collateral,
                ..
            } => {
                self.collateral = original_collateral + borrowed_collateral;
            }
            LoanDetails::ZkLend { .. } => {}
        }
    }

    pub fn debt_category(&self) -> Option<u8> {
        match &self.details {
            LoanDetails::Hashstack { debt_category, .. } => *debt_category,
            _ => None,
        }
    }

    pub fn compute_collateral_usd(&self, risk_adjusted: bool, ctx: &ValuationContext<'_>) -> Decimal {
        self.collateral
            .iter()
            .filter_map(|(token, amount)| ctx.collateral_value(token, *amount, risk_adjusted))
            .sum()
    }

    pub fn compute_debt_usd(&self, risk_adjusted: bool, ctx: &ValuationContext<'_>) -> Decimal {
        self.debt
            .iter()
            .filter_map(|(token, amount)| ctx.debt_value(token, *amount, risk_adjusted))
            .sum()
    }

    pub fn compute_health_factor(&self, standardized: bool, ctx: &ValuationContext<'_>) -> HealthFactor {
        risk_model(self.protocol).compute_health_factor(self, standardized, ctx)
    }

    pub fn compute_debt_to_be_liquidated(
        &self,
        collateral_underlying: &str,
        debt_underlying: &str,
        health_factor: HealthFactor,
        ctx: &ValuationContext<'_>,
    ) -> Decimal {
        risk_model(self.protocol).compute_debt_to_be_liquidated(
            self,
            collateral_underlying,
            debt_underlying,
            health_factor,
            ctx,
        )
    }

    pub fn is_liquidable(&self, health_factor: HealthFactor) -> bool {
        risk_model(self.protocol).is_liquidable(self, health_factor)
    }

    pub fn has_collateral(&self) -> bool {
        self.collateral.has_positive()
    }

    pub fn has_debt(&self) -> bool {
        self.debt.has_positive()
    }

    /// 양수 잔고가 있는 담보 토큰의 기초 자산 주소
    pub fn collateral_underlyings(&self, parameters: &TokenParameters) -> BTreeSet<String> {
        self.collateral
            .positive_tokens()
            .filter_map(|token| parameters.collateral.get(token))
            .map(|settings| settings.underlying_address.clone())
            .collect()
    }

    pub fn debt_underlyings(&self, parameters: &TokenParameters) -> BTreeSet<String> {
        self.debt
            .positive_tokens()
            .filter_map(|token| parameters.debt.get(token))
            .map(|settings| settings.underlying_address.clone())
            .collect()
    }

    /// 예: `ETH: 1.5, USDC: 200`
    pub fn get_collateral_str(&self, ctx: &ValuationContext<'_>) -> String {
        describe(&self.collateral, |token| {
            let settings = ctx.parameters.collateral.get(token)?;
            Some((
                settings.underlying_symbol.clone(),
                settings.decimals,
                ctx.interest_rates.collateral.safe_index(token),
            ))
        })
    }

    pub fn get_debt_str(&self, ctx: &ValuationContext<'_>) -> String {
        describe(&self.debt, |token| {
            let settings = ctx.parameters.debt.get(token)?;
            Some((
                settings.underlying_symbol.clone(),
                settings.decimals,
                ctx.interest_rates.debt.safe_index(token),
            ))
        })
    }
}

/// (symbol, decimals, index) 조회 결과로 잔고 문자열 생성
fn describe<F>(portfolio: &Portfolio, lookup: F) -> String
where
    F: Fn(&str) -> Option<(String, u32, Decimal)>,
{
    portfolio
        .positive_tokens()
        .filter_map(|token| {
            let (symbol, decimals, index) = lookup(token)?;
            let units = safe_div(portfolio.get(token), pow10(decimals))? * index;
            Some(format!("{}: {}", symbol, units.round_dp(4).normalize()))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
