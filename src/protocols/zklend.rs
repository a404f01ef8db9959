//! zkLend: 사용자 단위 원장. 예치금(deposit) 중 collateral_enabled 토큰만 담보로 잡힌다.
//! 잔고는 모두 raw 금액(face / 누적 인덱스)으로 보관한다.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{scaled_felt, ChainReader};
use crate::constants::{ZKLEND_MARKET, ZKLEND_SCALE_DECIMALS};
use crate::events::Event;
use crate::ledger::strategy::{clamp_liquidation, debt_usd_of_underlying};
use crate::ledger::{
    HealthFactorStrategy, LiquidationStrategy, LoanDetails, LoanEntity, Portfolio, TokenKind, TokenParameters,
    TokenRegistry, TokenSettings, ValuationContext,
};
use crate::state::{EntityRole, ProtocolState};
use crate::types::{HealthFactor, LoanEntityId, StateError, StateResult};
use crate::utils::felt::felt_to_u64;
use crate::utils::math::pow10;

/// Decoded market event
#[derive(Debug, Clone, PartialEq)]
pub enum ZkLendEvent {
    AccumulatorsSync { token: String, lending_index: Decimal, debt_index: Decimal },
    Deposit { user: String, token: String, face_amount: Decimal },
    Withdrawal { user: String, token: String, face_amount: Decimal },
    CollateralEnabled { user: String, token: String },
    CollateralDisabled { user: String, token: String },
    Borrowing { user: String, token: String, raw_amount: Decimal },
    Repayment { beneficiary: String, token: String, raw_amount: Decimal },
    Liquidation {
        user: String,
        debt_token: String,
        debt_raw_amount: Decimal,
        collateral_token: String,
        collateral_amount: Decimal,
    },
}

impl ZkLendEvent {
    /// 모르는 이벤트 이름이면 `None`. 토큰은 레지스트리로 검증한다.
    pub fn decode(event: &Event, registry: &TokenRegistry) -> StateResult<Option<Self>> {
        let token = |index: usize| -> StateResult<String> {
            let address = event.address_at(index)?;
            registry.get(&address)?;
            Ok(address)
        };
        let decoded = match event.name() {
            // data: token, lending_accumulator, debt_accumulator
            "AccumulatorsSync" => {
                let scale = pow10(ZKLEND_SCALE_DECIMALS);
                ZkLendEvent::AccumulatorsSync {
                    token: token(0)?,
                    lending_index: event.amount_at(1)? / scale,
                    debt_index: event.amount_at(2)? / scale,
                }
            }
            // data: user, token, face_amount
            "Deposit" => ZkLendEvent::Deposit {
                user: event.address_at(0)?,
                token: token(1)?,
                face_amount: event.amount_at(2)?,
            },
            "Withdrawal" => ZkLendEvent::Withdrawal {
                user: event.address_at(0)?,
                token: token(1)?,
                face_amount: event.amount_at(2)?,
            },
            "CollateralEnabled" => ZkLendEvent::CollateralEnabled {
                user: event.address_at(0)?,
                token: token(1)?,
            },
            "CollateralDisabled" => ZkLendEvent::CollateralDisabled {
                user: event.address_at(0)?,
                token: token(1)?,
            },
            // data: user, token, raw_amount, face_amount
            "Borrowing" => ZkLendEvent::Borrowing {
                user: event.address_at(0)?,
                token: token(1)?,
                raw_amount: event.amount_at(2)?,
            },
            // data: repayer, beneficiary, token, raw_amount, face_amount
            "Repayment" => ZkLendEvent::Repayment {
                beneficiary: event.address_at(1)?,
                token: token(2)?,
                raw_amount: event.amount_at(3)?,
            },
            // data: liquidator, user, debt_token, debt_raw_amount, debt_face_amount, collateral_token, collateral_amount
            "Liquidation" => ZkLendEvent::Liquidation {
                user: event.address_at(1)?,
                debt_token: token(2)?,
                debt_raw_amount: event.amount_at(3)?,
                collateral_token: token(5)?,
                collateral_amount: event.amount_at(6)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

pub fn apply_event(state: &mut ProtocolState, event: &Event) -> StateResult<bool> {
    let Some(decoded) = ZkLendEvent::decode(event, &state.registry)? else {
        return Ok(false);
    };

    match decoded {
        ZkLendEvent::AccumulatorsSync { token, lending_index, debt_index } => {
            state.interest_rate_models.collateral.update(&token, lending_index);
            state.interest_rate_models.debt.update(&token, debt_index);
        }
        ZkLendEvent::Deposit { user, token, face_amount } => {
            let raw_amount = state.interest_rate_models.collateral.to_raw(&token, face_amount);
            let entity = state.entity_for_event(LoanEntityId::User(user.clone()), &user, EntityRole::Opening, event);
            let (collateral, deposit, enabled) = zklend_parts(entity)?;
            deposit.increase_value(&token, raw_amount)?;
            if enabled.get(&token).copied().unwrap_or(false) {
                collateral.increase_value(&token, raw_amount)?;
            }
        }
        ZkLendEvent::Withdrawal { user, token, face_amount } => {
            let raw_amount = state.interest_rate_models.collateral.to_raw(&token, face_amount);
            let entity = state.entity_for_event(LoanEntityId::User(user.clone()), &user, EntityRole::Continuing, event);
            let (collateral, deposit, enabled) = zklend_parts(entity)?;
            deposit.increase_value(&token, -raw_amount)?;
            if enabled.get(&token).copied().unwrap_or(false) {
                collateral.increase_value(&token, -raw_amount)?;
            }
        }
        ZkLendEvent::CollateralEnabled { user, token } => {
            let entity = state.entity_for_event(LoanEntityId::User(user.clone()), &user, EntityRole::Continuing, event);
            let (collateral, deposit, enabled) = zklend_parts(entity)?;
            enabled.insert(token.clone(), true);
            collateral.set_value(&token, deposit.get(&token));
        }
        ZkLendEvent::CollateralDisabled { user, token } => {
            let entity = state.entity_for_event(LoanEntityId::User(user.clone()), &user, EntityRole::Continuing, event);
            let (collateral, _, enabled) = zklend_parts(entity)?;
            enabled.insert(token.clone(), false);
            collateral.set_value(&token, Decimal::ZERO);
        }
        ZkLendEvent::Borrowing { user, token, raw_amount } => {
            let entity = state.entity_for_event(LoanEntityId::User(user.clone()), &user, EntityRole::Continuing, event);
            entity.debt.increase_value(&token, raw_amount)?;
        }
        ZkLendEvent::Repayment { beneficiary, token, raw_amount } => {
            let entity = state.entity_for_event(
                LoanEntityId::User(beneficiary.clone()),
                &beneficiary,
                EntityRole::Continuing,
                event,
            );
            entity.debt.increase_value(&token, -raw_amount)?;
        }
        ZkLendEvent::Liquidation {
            user,
            debt_token,
            debt_raw_amount,
            collateral_token,
            collateral_amount,
        } => {
            let collateral_raw_amount = state
                .interest_rate_models
                .collateral
                .to_raw(&collateral_token, collateral_amount);
            let entity = state.entity_for_event(LoanEntityId::User(user.clone()), &user, EntityRole::Continuing, event);
            entity.debt.increase_value(&debt_token, -debt_raw_amount)?;
            let (collateral, deposit, enabled) = zklend_parts(entity)?;
            deposit.increase_value(&collateral_token, -collateral_raw_amount)?;
            if enabled.get(&collateral_token).copied().unwrap_or(false) {
                collateral.increase_value(&collateral_token, -collateral_raw_amount)?;
            }
        }
    }
    Ok(true)
}

type ZkLendParts<'a> = (&'a mut Portfolio, &'a mut Portfolio, &'a mut BTreeMap<String, bool>);

/// (collateral, deposit, collateral_enabled)
fn zklend_parts(entity: &mut LoanEntity) -> StateResult<ZkLendParts<'_>> {
    let LoanEntity { collateral, details, user, .. } = entity;
    match details {
        LoanDetails::ZkLend { deposit, collateral_enabled } => Ok((collateral, deposit, collateral_enabled)),
        _ => Err(StateError::InconsistentLoan {
            loan_id: user.clone(),
            reason: "entity is not a zkLend entity".to_string(),
        }),
    }
}

/// zkLend: HF = risk-adjusted collateral / debt, 0 < HF < 1이면 청산 가능
#[derive(Debug, Clone, Copy, Default)]
pub struct ZkLendRiskModel;

impl HealthFactorStrategy for ZkLendRiskModel {
    fn liquidation_threshold(&self, _entity: &LoanEntity) -> Decimal {
        Decimal::ONE
    }

    fn compute_health_factor(&self, entity: &LoanEntity, _standardized: bool, ctx: &ValuationContext<'_>) -> HealthFactor {
        let risk_adjusted_collateral_usd = entity.compute_collateral_usd(true, ctx);
        let debt_usd = entity.compute_debt_usd(false, ctx);
        HealthFactor::ratio(risk_adjusted_collateral_usd, debt_usd)
    }

    fn is_liquidable(&self, entity: &LoanEntity, health_factor: HealthFactor) -> bool {
        match health_factor.value() {
            Some(value) => value > Decimal::ZERO && value < self.liquidation_threshold(entity),
            None => false,
        }
    }
}

impl LiquidationStrategy for ZkLendRiskModel {
    fn compute_debt_to_be_liquidated(
        &self,
        entity: &LoanEntity,
        collateral_underlying: &str,
        debt_underlying: &str,
        _health_factor: HealthFactor,
        ctx: &ValuationContext<'_>,
    ) -> Decimal {
        let Some(settings) = ctx
            .parameters
            .collateral
            .values()
            .find(|settings| settings.underlying_address == collateral_underlying)
        else {
            return Decimal::ZERO;
        };
        let cap = debt_usd_of_underlying(entity, debt_underlying, false, ctx);
        let numerator = entity.compute_debt_usd(false, ctx) - entity.compute_collateral_usd(true, ctx);
        let denominator = Decimal::ONE - settings.collateral_factor * (Decimal::ONE + settings.liquidation_bonus);
        if denominator <= Decimal::ZERO {
            return cap;
        }
        clamp_liquidation(numerator / denominator, cap)
    }
}

/// `get_reserve_data` 응답에서 담보/부채 파라미터 수집
pub async fn collect_token_parameters(registry: &TokenRegistry, reader: &dyn ChainReader) -> TokenParameters {
    let mut parameters = TokenParameters::default();
    for token in registry.tokens_of_kind(TokenKind::Underlying) {
        // enabled, decimals, z_token, interest_rate_model, collateral_factor, borrow_factor, reserve_factor,
        // last_update_timestamp, lending_accumulator, debt_accumulator, lending_rate, borrowing_rate,
        // raw_total_debt, flash_loan_fee, liquidation_bonus, debt_limit
        let reserve = match reader
            .call(ZKLEND_MARKET, "get_reserve_data", &[token.address.clone()])
            .await
        {
            Ok(reserve) => reserve,
            Err(e) => {
                warn!("⚠️ zkLend reserve 조회 실패 ({}): {}", token.symbol, e);
                continue;
            }
        };
        match reserve_settings(token.symbol.as_str(), &token.address, &reserve) {
            Ok(settings) => {
                debug!("zkLend {} 파라미터: {:?}", token.symbol, settings);
                parameters.collateral.insert(token.address.clone(), settings.clone());
                parameters.debt.insert(token.address.clone(), settings);
            }
            Err(e) => warn!("⚠️ zkLend reserve 파싱 실패 ({}): {}", token.symbol, e),
        }
    }
    parameters
}

fn reserve_settings(symbol: &str, address: &str, reserve: &[String]) -> anyhow::Result<TokenSettings> {
    let decimals = reserve
        .get(1)
        .and_then(|felt| felt_to_u64(felt))
        .ok_or_else(|| anyhow::anyhow!("decimals missing"))?;
    let z_token = reserve.get(2).cloned().unwrap_or_default();
    let collateral_factor = scaled_felt(reserve, 4, ZKLEND_SCALE_DECIMALS, "collateral_factor")?;
    let borrow_factor = scaled_felt(reserve, 5, ZKLEND_SCALE_DECIMALS, "borrow_factor")?;
    let liquidation_bonus = scaled_felt(reserve, 14, ZKLEND_SCALE_DECIMALS, "liquidation_bonus")?;

    Ok(TokenSettings {
        symbol: format!("z{}", symbol),
        address: crate::utils::add_leading_zeros(&z_token),
        decimals: decimals as u32,
        underlying_symbol: symbol.to_string(),
        underlying_address: address.to_string(),
        collateral_factor,
        debt_factor: borrow_factor,
        liquidation_bonus,
        is_interest_bearing: true,
        liquidator_fee_beta: Decimal::ZERO,
        liquidator_fee_max: Decimal::ZERO,
        protocol_fee: Decimal::ZERO,
    })
}
