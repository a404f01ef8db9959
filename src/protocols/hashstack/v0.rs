use rust_decimal::Decimal;

use super::{
    check_owner, ensure, hashstack_health_factor, open_loan, rewrite_loan, single, token_at, LoanRewrite,
};
use crate::events::Event;
use crate::ledger::strategy::debt_usd_of_underlying;
use crate::ledger::{HealthFactorStrategy, LiquidationStrategy, LoanEntity, Portfolio, ValuationContext};
use crate::state::ProtocolState;
use crate::types::{HealthFactor, LoanEntityId, StateError, StateResult};

/// 같은 트랜잭션 안의 처리 순서. loan_repaid는 다른 loan 변경 이후
pub fn event_priority(key_name: &str) -> u8 {
    match crate::events::short_name(key_name) {
        "new_loan" => 0,
        "loan_swap" => 1,
        "liquidated" => 2,
        "loan_withdrawal" => 3,
        "loan_repaid" => 4,
        "loan_interest_deducted" => 5,
        "collateral_added" => 6,
        "collateral_withdrawal" => 7,
        _ => u8::MAX,
    }
}

/// debt category 1/2/3 -> 1.06/1.05/1.04
pub fn liquidation_threshold_for(debt_category: Option<u8>) -> Decimal {
    match debt_category {
        Some(1) => Decimal::new(106, 2),
        Some(2) => Decimal::new(105, 2),
        _ => Decimal::new(104, 2),
    }
}

fn debt_category_at(event: &Event, index: usize) -> StateResult<u8> {
    let value = event.u64_at(index)?;
    u8::try_from(value)
        .map_err(|_| StateError::malformed(event.name(), format!("debt category {} out of range", value)))
}

/// loan_record 앞부분: id, owner, market, commitment, amount, _, current_market, current_amount, _,
/// is_loan_withdrawn, debt_category, state, l3_integration, created_at
struct LoanRecord {
    loan_id: u64,
    owner: String,
    market: String,
    amount: Decimal,
    current_market: String,
    current_amount: Decimal,
    debt_category: u8,
}

impl LoanRecord {
    fn read(state: &ProtocolState, event: &Event, offset: usize) -> StateResult<Self> {
        Ok(Self {
            loan_id: event.u64_at(offset)?,
            owner: event.address_at(offset + 1)?,
            market: token_at(state, event, offset + 2)?,
            amount: event.amount_at(offset + 4)?,
            current_market: token_at(state, event, offset + 6)?,
            current_amount: event.amount_at(offset + 7)?,
            debt_category: debt_category_at(event, offset + 10)?,
        })
    }
}

/// collateral_record: market, amount, _, current_amount, ...
fn collateral_record(state: &ProtocolState, event: &Event) -> StateResult<Portfolio> {
    Ok(single(&token_at(state, event, 0)?, event.amount_at(3)?))
}

/// new_loan의 원래 담보. 초기 loan 일부는 loan record가 한 칸 짧아서
/// 14번째 felt가 등록된 토큰이 아니면 (13, 16) 위치를 쓴다
fn original_collateral(state: &ProtocolState, event: &Event) -> StateResult<Portfolio> {
    match token_at(state, event, 14) {
        Ok(token) => Ok(single(&token, event.amount_at(17)?)),
        Err(StateError::UnknownToken { .. }) => Ok(single(&token_at(state, event, 13)?, event.amount_at(16)?)),
        Err(e) => Err(e),
    }
}

pub fn apply_event(state: &mut ProtocolState, event: &Event) -> StateResult<bool> {
    match event.name() {
        "new_loan" => {
            let record = LoanRecord::read(state, event, 0)?;
            let original = original_collateral(state, event)?;
            open_loan(
                state,
                record.loan_id,
                &record.owner,
                LoanRewrite {
                    original_collateral: Some(original),
                    borrowed_collateral: Some(single(&record.current_market, record.current_amount)),
                    debt: Some(single(&record.market, record.amount)),
                    debt_category: Some(record.debt_category),
                },
                event,
            )?;
        }
        "collateral_added" | "collateral_withdrawal" => {
            let loan_id = event.u64_at(9)?;
            let original = collateral_record(state, event)?;
            rewrite_loan(
                state,
                loan_id,
                None,
                LoanRewrite {
                    original_collateral: Some(original),
                    ..Default::default()
                },
                event,
            )?;
        }
        "loan_interest_deducted" => {
            let loan_id = event.u64_at(11)?;
            let original = collateral_record(state, event)?;
            rewrite_loan(
                state,
                loan_id,
                None,
                LoanRewrite {
                    original_collateral: Some(original),
                    ..Default::default()
                },
                event,
            )?;
        }
        "loan_withdrawal" => {
            let record = LoanRecord::read(state, event, 0)?;
            check_owner(state, record.loan_id, &record.owner)?;
            rewrite_loan(
                state,
                record.loan_id,
                Some(&record.owner),
                LoanRewrite {
                    borrowed_collateral: Some(single(&record.current_market, record.current_amount)),
                    debt: Some(single(&record.market, record.amount)),
                    debt_category: Some(record.debt_category),
                    ..Default::default()
                },
                event,
            )?;
        }
        "loan_repaid" | "liquidated" => {
            let record = LoanRecord::read(state, event, 0)?;
            check_owner(state, record.loan_id, &record.owner)?;
            ensure(
                record.current_amount.is_zero(),
                record.loan_id,
                format!("{} left borrowed collateral {}", event.name(), record.current_amount),
            )?;
            // 청산되면 original collateral도 사라진 것으로 본다
            let original_collateral = (event.name() == "liquidated").then(Portfolio::new);
            rewrite_loan(
                state,
                record.loan_id,
                Some(&record.owner),
                LoanRewrite {
                    original_collateral,
                    borrowed_collateral: Some(single(&record.current_market, Decimal::ZERO)),
                    debt: Some(single(&record.market, Decimal::ZERO)),
                    debt_category: Some(record.debt_category),
                },
                event,
            )?;
        }
        "loan_swap" => {
            let old = LoanRecord::read(state, event, 0)?;
            let new = LoanRecord::read(state, event, 14)?;
            check_owner(state, old.loan_id, &old.owner)?;
            ensure(new.loan_id == old.loan_id, old.loan_id, format!("swap moved loan to {}", new.loan_id))?;
            ensure(new.owner == old.owner, old.loan_id, "swap changed the owner")?;
            let new_debt = single(&new.market, new.amount);
            if let Some(existing) = state.entity(&LoanEntityId::Loan(old.loan_id)) {
                ensure(existing.debt == new_debt, old.loan_id, "swap changed the debt")?;
            }
            rewrite_loan(
                state,
                new.loan_id,
                Some(&new.owner),
                LoanRewrite {
                    borrowed_collateral: Some(single(&new.current_market, new.current_amount)),
                    debt: Some(new_debt),
                    debt_category: Some(new.debt_category),
                    ..Default::default()
                },
                event,
            )?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Hashstack V0: HF = collateral / debt, 임계값은 debt category에 따른다
#[derive(Debug, Clone, Copy, Default)]
pub struct HashstackV0RiskModel;

impl HealthFactorStrategy for HashstackV0RiskModel {
    fn liquidation_threshold(&self, entity: &LoanEntity) -> Decimal {
        liquidation_threshold_for(entity.debt_category())
    }

    fn compute_health_factor(&self, entity: &LoanEntity, standardized: bool, ctx: &ValuationContext<'_>) -> HealthFactor {
        hashstack_health_factor(entity, standardized, self.liquidation_threshold(entity), ctx)
    }
}

impl LiquidationStrategy for HashstackV0RiskModel {
    /// loan 전체 부채가 청산된다
    fn compute_debt_to_be_liquidated(
        &self,
        entity: &LoanEntity,
        _collateral_underlying: &str,
        debt_underlying: &str,
        _health_factor: HealthFactor,
        ctx: &ValuationContext<'_>,
    ) -> Decimal {
        debt_usd_of_underlying(entity, debt_underlying, false, ctx)
    }
}
