use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

use super::aggregator::{LoanStatRecord, RiskAggregator};
use crate::constants::{HASHSTACK_V0_ADDRESS, ZKLEND_MARKET};
use crate::ledger::{InterestRateModels, Portfolio, TokenKind, TokenSettings};
use crate::protocols::{scaled_felt, ChainReader};
use crate::state::ProtocolState;
use crate::types::{Prices, ProtocolId};
use crate::utils::math::{pow10, safe_div};

/// 대시보드 상단 요약
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralStats {
    pub protocol: ProtocolId,
    pub active_users: usize,
    pub active_loans: usize,
    pub active_borrowers: usize,
    pub total_debt_usd: Decimal,
    pub total_risk_adjusted_collateral_usd: Decimal,
    pub total_collateral_usd: Decimal,
}

/// 프로토콜 하나의 통계 묶음. 토큰별 맵의 키는 기초 자산 심볼
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub general: GeneralStats,
    pub collateral: BTreeMap<String, Decimal>,
    pub debt: BTreeMap<String, Decimal>,
    pub supply: BTreeMap<String, Decimal>,
    pub utilization: BTreeMap<String, Decimal>,
    pub total_utilization: Decimal,
}

/// 공급량 조회 한 건
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyCall {
    pub symbol: String,
    pub underlying_address: String,
    pub contract: String,
    pub function: &'static str,
    pub calldata: Vec<String>,
    pub decimals: u32,
    /// 응답에 곱할 인덱스 (Hashstack V1 r-token 지분 -> 기초 자산)
    pub index: Decimal,
}

pub fn general_stats(state: &ProtocolState, loan_stats: &[LoanStatRecord]) -> GeneralStats {
    let active: Vec<_> = state
        .loan_entities
        .values()
        .filter(|entity| entity.has_collateral() || entity.has_debt())
        .collect();
    let active_loans = active.len();
    // Hashstack은 loan 단위라 사용자 수를 따로 센다
    let active_users = if state.protocol.is_loan_level() {
        active.iter().map(|entity| entity.user.as_str()).collect::<BTreeSet<_>>().len()
    } else {
        active_loans
    };
    let active_borrowers = if state.protocol.is_loan_level() {
        active
            .iter()
            .filter(|entity| entity.has_debt())
            .map(|entity| entity.user.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    } else {
        active.iter().filter(|entity| entity.has_debt()).count()
    };

    GeneralStats {
        protocol: state.protocol,
        active_users,
        active_loans,
        active_borrowers,
        total_debt_usd: loan_stats.iter().map(|record| record.debt_usd).sum(),
        total_risk_adjusted_collateral_usd: loan_stats.iter().map(|record| record.risk_adjusted_collateral_usd).sum(),
        total_collateral_usd: loan_stats.iter().map(|record| record.collateral_usd).sum(),
    }
}

/// 기초 자산별 담보 합계 (토큰 단위, 인덱스 반영)
pub fn collateral_stats(state: &ProtocolState) -> BTreeMap<String, Decimal> {
    token_totals(
        state.loan_entities.values().map(|entity| &entity.collateral),
        &state.token_parameters.collateral,
        &state.interest_rate_models.collateral,
    )
}

pub fn debt_stats(state: &ProtocolState) -> BTreeMap<String, Decimal> {
    token_totals(
        state.loan_entities.values().map(|entity| &entity.debt),
        &state.token_parameters.debt,
        &state.interest_rate_models.debt,
    )
}

fn token_totals<'a, I>(
    portfolios: I,
    settings: &HashMap<String, TokenSettings>,
    models: &InterestRateModels,
) -> BTreeMap<String, Decimal>
where
    I: Iterator<Item = &'a Portfolio>,
{
    let mut raw: BTreeMap<&str, Decimal> = BTreeMap::new();
    for portfolio in portfolios {
        for (token, amount) in portfolio.iter() {
            *raw.entry(token.as_str()).or_default() += *amount;
        }
    }

    let mut totals = BTreeMap::new();
    for (token, amount) in raw {
        let Some(token_settings) = settings.get(token) else {
            continue;
        };
        let Some(units) = safe_div(amount, pow10(token_settings.decimals)) else {
            continue;
        };
        *totals.entry(token_settings.underlying_symbol.clone()).or_insert(Decimal::ZERO) +=
            units * models.safe_index(token);
    }
    totals
}

/// 프로토콜별 공급량 조회 목록
pub fn supply_calls(state: &ProtocolState) -> Vec<SupplyCall> {
    let registry = &state.registry;
    let mut calls = Vec::new();
    match state.protocol {
        // zToken 총공급
        ProtocolId::ZkLend => {
            for settings in state.token_parameters.collateral.values() {
                calls.push(SupplyCall {
                    symbol: settings.underlying_symbol.clone(),
                    underlying_address: settings.underlying_address.clone(),
                    contract: settings.address.clone(),
                    function: "felt_total_supply",
                    calldata: Vec::new(),
                    decimals: settings.decimals,
                    index: Decimal::ONE,
                });
            }
        }
        ProtocolId::NostraAlpha | ProtocolId::NostraMainnet => {
            for settings in state.token_parameters.collateral.values() {
                calls.push(SupplyCall {
                    symbol: settings.underlying_symbol.clone(),
                    underlying_address: settings.underlying_address.clone(),
                    contract: settings.address.clone(),
                    function: "totalSupply",
                    calldata: Vec::new(),
                    decimals: settings.decimals,
                    index: Decimal::ONE,
                });
            }
        }
        // 컨트랙트가 보유한 기초 자산 잔고
        ProtocolId::HashstackV0 => {
            for token in registry.tokens_of_kind(TokenKind::Underlying) {
                if !state.token_parameters.collateral.contains_key(&token.address) {
                    continue;
                }
                calls.push(SupplyCall {
                    symbol: token.symbol.clone(),
                    underlying_address: token.address.clone(),
                    contract: token.address.clone(),
                    function: "balanceOf",
                    calldata: vec![HASHSTACK_V0_ADDRESS.to_string()],
                    decimals: token.decimals,
                    index: Decimal::ONE,
                });
            }
        }
        ProtocolId::HashstackV1 => {
            for token in registry.tokens_of_kind(TokenKind::Collateral { interest_bearing: true }) {
                calls.push(SupplyCall {
                    symbol: registry.underlying_symbol(token),
                    underlying_address: token.underlying_address.clone(),
                    contract: token.address.clone(),
                    function: "totalSupply",
                    calldata: Vec::new(),
                    decimals: token.decimals,
                    index: state.interest_rate_models.collateral.safe_index(&token.underlying_address),
                });
            }
        }
    }
    calls.sort_by(|a, b| (&a.symbol, &a.contract).cmp(&(&b.symbol, &b.contract)));
    calls
}

/// 조회 실패한 토큰은 경고 후 빠진다
pub async fn supply_stats(state: &ProtocolState, reader: &dyn ChainReader) -> BTreeMap<String, Decimal> {
    let mut supplies = BTreeMap::new();
    for call in supply_calls(state) {
        let response = match reader.call(&call.contract, call.function, &call.calldata).await {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ {} {} 공급량 조회 실패: {}", state.protocol, call.symbol, e);
                continue;
            }
        };
        match scaled_felt(&response, 0, call.decimals, call.function) {
            Ok(amount) => {
                *supplies.entry(call.symbol.clone()).or_insert(Decimal::ZERO) += amount * call.index;
            }
            Err(e) => warn!("⚠️ {} {} 공급량 응답 오류: {}", state.protocol, call.symbol, e),
        }
    }
    supplies
}

/// debt / (supply + debt). 분모가 0이면 0
pub fn utilization(debt: Decimal, supply: Decimal) -> Decimal {
    safe_div(debt, supply + debt).unwrap_or(Decimal::ZERO)
}

/// USD 기준 전체 사용률
fn total_utilization(
    state: &ProtocolState,
    supply: &BTreeMap<String, Decimal>,
    debt: &BTreeMap<String, Decimal>,
    prices: &Prices,
) -> Decimal {
    let price_of_symbol: HashMap<&str, Decimal> = state
        .token_parameters
        .collateral
        .values()
        .chain(state.token_parameters.debt.values())
        .filter_map(|settings| {
            prices
                .get(&settings.underlying_address)
                .map(|price| (settings.underlying_symbol.as_str(), *price))
        })
        .collect();
    let usd = |amounts: &BTreeMap<String, Decimal>| -> Decimal {
        amounts
            .iter()
            .filter_map(|(symbol, amount)| price_of_symbol.get(symbol.as_str()).map(|price| *amount * *price))
            .sum()
    };
    utilization(usd(debt), usd(supply))
}

pub async fn compute_protocol_stats(state: &ProtocolState, prices: &Prices, reader: &dyn ChainReader) -> ProtocolStats {
    let loan_stats = RiskAggregator::new(state).loan_stats(prices);
    let general = general_stats(state, &loan_stats);
    let collateral = collateral_stats(state);
    let debt = debt_stats(state);
    let supply = supply_stats(state, reader).await;

    let symbols: BTreeSet<&String> = supply.keys().chain(debt.keys()).collect();
    let utilization_by_token = symbols
        .into_iter()
        .map(|symbol| {
            let value = utilization(
                debt.get(symbol).copied().unwrap_or_default(),
                supply.get(symbol).copied().unwrap_or_default(),
            );
            (symbol.clone(), value.round_dp(4))
        })
        .collect();
    let total_utilization = total_utilization(state, &supply, &debt, prices).round_dp(4);

    info!(
        "📊 {} 통계: 활성 사용자 {}, 활성 loan {}, 차입자 {}, 총 부채 ${}",
        state.protocol,
        general.active_users,
        general.active_loans,
        general.active_borrowers,
        general.total_debt_usd.round_dp(2)
    );

    ProtocolStats {
        general,
        collateral,
        debt,
        supply,
        utilization: utilization_by_token,
        total_utilization,
    }
}
