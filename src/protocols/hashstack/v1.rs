use rust_decimal::Decimal;

use super::{check_owner, ensure, hashstack_health_factor, open_loan, rewrite_loan, single, LoanRewrite};
use crate::events::{short_name, Event};
use crate::ledger::strategy::debt_usd_of_underlying;
use crate::ledger::{
    HealthFactorStrategy, LiquidationStrategy, LoanEntity, TokenKind, TokenRegistry, ValuationContext,
};
use crate::state::ProtocolState;
use crate::types::{HealthFactor, LoanEntityId, StateResult};

/// 1.04
pub const LIQUIDATION_THRESHOLD: Decimal = Decimal::from_parts(104, 0, 0, false, 2);

/// 가격(인덱스) 이벤트가 먼저, loan 이벤트는 그 다음
pub fn event_priority(key_name: &str) -> u8 {
    match short_name(key_name) {
        "updated_supply_token_price" | "updated_debt_token_price" => 0,
        "new_loan" => 1,
        "loan_transferred" => 2,
        "loan_spent" => 3,
        "loan_repaid" => 4,
        "collateral_added" => 5,
        _ => u8::MAX,
    }
}

/// rToken과 dToken 컨트랙트
pub fn event_addresses(registry: &TokenRegistry) -> Vec<String> {
    let mut addresses: Vec<String> = registry
        .tokens()
        .filter(|token| matches!(token.kind, TokenKind::Collateral { .. } | TokenKind::Debt))
        .map(|token| token.address.clone())
        .collect();
    addresses.sort();
    addresses
}

/// r/d 토큰 주소는 기초 자산 주소로 정규화한다. 풀 토큰은 그대로
fn canonical_token_at(state: &ProtocolState, event: &Event, index: usize) -> StateResult<String> {
    let address = event.address_at(index)?;
    Ok(state.registry.get(&address)?.underlying_address.clone())
}

/// loan 앞부분: id, borrower, market, amount, _, current_market, current_amount
struct LoanRecord {
    loan_id: u64,
    owner: String,
    market: String,
    amount: Decimal,
    current_market: String,
    current_amount: Decimal,
}

impl LoanRecord {
    fn read(state: &ProtocolState, event: &Event, offset: usize) -> StateResult<Self> {
        Ok(Self {
            loan_id: event.u64_at(offset)?,
            owner: event.address_at(offset + 1)?,
            market: canonical_token_at(state, event, offset + 2)?,
            amount: event.amount_at(offset + 3)?,
            current_market: canonical_token_at(state, event, offset + 5)?,
            current_amount: event.amount_at(offset + 6)?,
        })
    }
}

pub fn apply_event(state: &mut ProtocolState, event: &Event) -> StateResult<bool> {
    match event.name() {
        "updated_supply_token_price" => {
            let underlying = canonical_token_at(state, event, 1)?;
            let total_supply = event.amount_at(2)?;
            let total_assets = event.amount_at(4)?;
            let index = total_assets.checked_div(total_supply).unwrap_or(Decimal::ZERO);
            state.interest_rate_models.collateral.update(&underlying, index);
        }
        "updated_debt_token_price" => {
            let underlying = canonical_token_at(state, event, 1)?;
            let total_supply = event.amount_at(2)?;
            let total_debt = event.amount_at(4)?;
            let index = if total_supply.is_zero() || total_debt.is_zero() {
                Decimal::ZERO
            } else {
                total_debt / total_supply
            };
            state.interest_rate_models.debt.update(&underlying, index);
        }
        "new_loan" => {
            let record = LoanRecord::read(state, event, 0)?;
            let collateral_loan_id = event.u64_at(12)?;
            ensure(
                collateral_loan_id == record.loan_id,
                record.loan_id,
                format!("collateral belongs to loan {}", collateral_loan_id),
            )?;
            let original = single(&canonical_token_at(state, event, 13)?, event.amount_at(14)?);
            open_loan(
                state,
                record.loan_id,
                &record.owner,
                LoanRewrite {
                    original_collateral: Some(original),
                    borrowed_collateral: Some(single(&record.current_market, record.current_amount)),
                    debt: Some(single(&record.market, record.amount)),
                    debt_category: None,
                },
                event,
            )?;
        }
        "collateral_added" => {
            let loan_id = event.u64_at(0)?;
            let original = single(&canonical_token_at(state, event, 1)?, event.amount_at(2)?);
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
        "loan_spent" => {
            let old = LoanRecord::read(state, event, 0)?;
            let new = LoanRecord::read(state, event, 12)?;
            check_owner(state, old.loan_id, &old.owner)?;
            ensure(new.loan_id == old.loan_id, old.loan_id, format!("spend moved loan to {}", new.loan_id))?;
            ensure(new.owner == old.owner, old.loan_id, "spend changed the owner")?;
            let new_debt = single(&new.market, new.amount);
            if let Some(existing) = state.entity(&LoanEntityId::Loan(old.loan_id)) {
                ensure(existing.debt == new_debt, old.loan_id, "spend changed the debt")?;
            }
            rewrite_loan(
                state,
                new.loan_id,
                Some(&new.owner),
                LoanRewrite {
                    borrowed_collateral: Some(single(&new.current_market, new.current_amount)),
                    debt: Some(new_debt),
                    ..Default::default()
                },
                event,
            )?;
        }
        "loan_transferred" => {
            let loan_id = event.u64_at(0)?;
            let sender = event.address_at(1)?;
            let receiver = event.address_at(2)?;
            check_owner(state, loan_id, &sender)?;
            rewrite_loan(state, loan_id, Some(&sender), LoanRewrite::default(), event)?;
            if let Some(entity) = state.loan_entities.get_mut(&LoanEntityId::Loan(loan_id)) {
                entity.user = receiver;
            }
        }
        "loan_repaid" => {
            let old = LoanRecord::read(state, event, 0)?;
            let new = LoanRecord::read(state, event, 12)?;
            check_owner(state, old.loan_id, &old.owner)?;
            ensure(new.loan_id == old.loan_id, old.loan_id, format!("repay moved loan to {}", new.loan_id))?;
            ensure(new.owner == old.owner, old.loan_id, "repay changed the owner")?;
            let collateral_loan_id = event.u64_at(24)?;
            ensure(
                collateral_loan_id == old.loan_id,
                old.loan_id,
                format!("collateral belongs to loan {}", collateral_loan_id),
            )?;
            let original_token = canonical_token_at(state, event, 25)?;
            let original_amount = event.amount_at(26)?;
            ensure(
                new.amount.is_zero() && new.current_amount.is_zero() && original_amount.is_zero(),
                old.loan_id,
                "repaid loan still holds balances",
            )?;
            rewrite_loan(
                state,
                new.loan_id,
                Some(&new.owner),
                LoanRewrite {
                    original_collateral: Some(single(&original_token, Decimal::ZERO)),
                    borrowed_collateral: Some(single(&new.current_market, Decimal::ZERO)),
                    debt: Some(single(&new.market, Decimal::ZERO)),
                    debt_category: None,
                },
                event,
            )?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Hashstack V1: HF = collateral / debt, 임계값 1.04
#[derive(Debug, Clone, Copy, Default)]
pub struct HashstackV1RiskModel;

impl HealthFactorStrategy for HashstackV1RiskModel {
    fn liquidation_threshold(&self, _entity: &LoanEntity) -> Decimal {
        LIQUIDATION_THRESHOLD
    }

    fn compute_health_factor(&self, entity: &LoanEntity, standardized: bool, ctx: &ValuationContext<'_>) -> HealthFactor {
        hashstack_health_factor(entity, standardized, LIQUIDATION_THRESHOLD, ctx)
    }
}

impl LiquidationStrategy for HashstackV1RiskModel {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::underlying_address;
    use crate::mocks::events::{hashstack_event, hashstack_v1_loan_record};
    use crate::protocols::hashstack::neutral_token_parameters;
    use crate::state::EventOutcome;
    use crate::types::{Prices, ProtocolId, StateError};

    const ALICE: &str = "0x0000000000000000000000000000000000000000000000000000000000000a11";
    const BOB: &str = "0x0000000000000000000000000000000000000000000000000000000000000b0b";

    fn wrapped(state: &ProtocolState, symbol: &str, kind: TokenKind) -> String {
        let underlying = underlying_address(symbol).unwrap();
        state.registry.find_wrapped(underlying, kind).unwrap().address.clone()
    }

    fn new_loan(state: &ProtocolState, block: u64, loan_id: u64) -> Event {
        let d_usdc = wrapped(state, "USDC", TokenKind::Debt);
        let r_eth = wrapped(state, "ETH", TokenKind::Collateral { interest_bearing: true });
        let usdc = underlying_address("USDC").unwrap();
        let mut data = hashstack_v1_loan_record(loan_id, ALICE, &d_usdc, 1_000_000_000, usdc, 1_000_000_000);
        data.extend([format!("0x{:x}", loan_id), r_eth, "0xde0b6b3a7640000".to_string()]);
        hashstack_event(block, "new_loan", data)
    }

    #[test]
    fn test_new_loan_keys_by_underlying() {
        let mut state = ProtocolState::for_protocol(ProtocolId::HashstackV1);
        let event = new_loan(&state, 1, 3);
        state.process_event(&event).unwrap();

        let entity = state.entity(&LoanEntityId::Loan(3)).unwrap();
        let eth = underlying_address("ETH").unwrap();
        let usdc = underlying_address("USDC").unwrap();
        assert_eq!(entity.debt.get(usdc), Decimal::from(1_000_000_000u64));
        assert_eq!(entity.collateral.get(eth), Decimal::from(10u64.pow(18)));
        assert_eq!(entity.collateral.get(usdc), Decimal::from(1_000_000_000u64));
        assert_eq!(entity.debt_category(), None);
    }

    #[test]
    fn test_token_price_events_update_indices() {
        let mut state = ProtocolState::for_protocol(ProtocolId::HashstackV1);
        let r_eth = wrapped(&state, "ETH", TokenKind::Collateral { interest_bearing: true });
        let d_eth = wrapped(&state, "ETH", TokenKind::Debt);
        let eth = underlying_address("ETH").unwrap();

        let supply = hashstack_event(1, "updated_supply_token_price", vec![r_eth.clone(), eth.to_string(), "0x64".into(), "0x0".into(), "0x6e".into()]);
        state.process_event(&supply).unwrap();
        assert_eq!(state.interest_rate_models.collateral.get(eth), Decimal::new(11, 1));

        let debt = hashstack_event(2, "updated_debt_token_price", vec![d_eth.clone(), eth.to_string(), "0x0".into(), "0x0".into(), "0x10".into()]);
        state.process_event(&debt).unwrap();
        assert_eq!(state.interest_rate_models.debt.get(eth), Decimal::ZERO);
        assert_eq!(state.interest_rate_models.debt.safe_index(eth), Decimal::ONE);
    }

    #[test]
    fn test_transfer_moves_ownership() {
        let mut state = ProtocolState::for_protocol(ProtocolId::HashstackV1);
        let event = new_loan(&state, 1, 3);
        state.process_event(&event).unwrap();

        let transfer = hashstack_event(2, "loan_transferred", vec!["0x3".into(), ALICE.into(), BOB.into()]);
        assert_eq!(state.process_event(&transfer).unwrap(), EventOutcome::Applied);
        assert_eq!(state.entity(&LoanEntityId::Loan(3)).unwrap().user, BOB);

        // 이전 소유자의 재전송은 불일치
        let stale = hashstack_event(3, "loan_transferred", vec!["0x3".into(), ALICE.into(), ALICE.into()]);
        let outcome = state.process_event(&stale).unwrap();
        assert!(matches!(outcome, EventOutcome::Skipped(StateError::InconsistentLoan { .. })));
        assert_eq!(state.entity(&LoanEntityId::Loan(3)).unwrap().user, BOB);
    }

    #[test]
    fn test_repay_clears_loan_and_health_factor_is_infinite() {
        let mut state = ProtocolState::for_protocol(ProtocolId::HashstackV1);
        state.install_token_parameters(neutral_token_parameters(&state.registry));
        let event = new_loan(&state, 1, 3);
        state.process_event(&event).unwrap();

        let eth = underlying_address("ETH").unwrap();
        let usdc = underlying_address("USDC").unwrap();
        let prices: Prices = [(eth.to_string(), Decimal::from(1000)), (usdc.to_string(), Decimal::ONE)]
            .into_iter()
            .collect();
        {
            let ctx = state.valuation_context(&prices);
            let entity = state.entity(&LoanEntityId::Loan(3)).unwrap();
            // (1000 + 1000) / 1000
            assert_eq!(entity.compute_health_factor(false, &ctx), HealthFactor::Finite(Decimal::from(2)));
            assert_eq!(
                entity.compute_debt_to_be_liquidated(eth, usdc, HealthFactor::Finite(Decimal::ONE), &ctx),
                Decimal::from(1000)
            );
        }

        let d_usdc = wrapped(&state, "USDC", TokenKind::Debt);
        let r_eth = wrapped(&state, "ETH", TokenKind::Collateral { interest_bearing: true });
        let mut data = hashstack_v1_loan_record(3, ALICE, &d_usdc, 1_000_000_000, usdc, 1_000_000_000);
        data.extend(hashstack_v1_loan_record(3, ALICE, &d_usdc, 0, usdc, 0));
        data.extend(["0x3".to_string(), r_eth, "0x0".to_string()]);
        state.process_event(&hashstack_event(2, "loan_repaid", data)).unwrap();

        let ctx = state.valuation_context(&prices);
        let entity = state.entity(&LoanEntityId::Loan(3)).unwrap();
        assert!(!entity.has_debt());
        assert!(!entity.has_collateral());
        assert!(entity.compute_health_factor(false, &ctx).is_infinite());
    }

    #[test]
    fn test_new_loan_with_foreign_collateral_is_skipped() {
        let mut state = ProtocolState::for_protocol(ProtocolId::HashstackV1);
        let mut event = new_loan(&state, 1, 3);
        event.data[12] = "0x4".to_string();
        let outcome = state.process_event(&event).unwrap();
        assert!(matches!(outcome, EventOutcome::Skipped(StateError::InconsistentLoan { .. })));
        assert!(state.loan_entities.is_empty());
    }

    #[test]
    fn test_event_addresses_are_r_and_d_tokens() {
        let registry = TokenRegistry::for_protocol(ProtocolId::HashstackV1);
        let addresses = event_addresses(&registry);
        assert_eq!(addresses.len(), 10);
        assert!(!addresses.contains(&underlying_address("ETH").unwrap().to_string()));
    }
}
