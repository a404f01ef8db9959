//! Hashstack: loan id 단위 원장.
//!
//! 이벤트가 항상 loan의 최종 상태를 담고 있으므로 잔고는 더하지 않고 다시 쓴다.
//! 담보는 사용자가 넣은 original과 레버리지로 빌린 borrowed의 합이다.

pub mod v0;
pub mod v1;

use rust_decimal::Decimal;

use crate::events::Event;
use crate::ledger::{LoanDetails, LoanEntity, Portfolio, TokenKind, TokenParameters, TokenRegistry, TokenSettings};
use crate::state::{EntityRole, ProtocolState};
use crate::types::{HealthFactor, LoanEntityId, StateError, StateResult};
use crate::ledger::ValuationContext;

/// Hashstack은 factor를 쓰지 않는다. 모든 토큰에 중립 파라미터
pub fn neutral_token_parameters(registry: &TokenRegistry) -> TokenParameters {
    let mut parameters = TokenParameters::default();
    for token in registry.tokens() {
        let settings = TokenSettings::neutral(token, &registry.underlying_symbol(token));
        match token.kind {
            TokenKind::Underlying => {
                parameters.collateral.insert(token.address.clone(), settings.clone());
                parameters.debt.insert(token.address.clone(), settings);
            }
            TokenKind::Collateral { .. } => {
                parameters.collateral.insert(token.address.clone(), settings);
            }
            TokenKind::Debt => {
                parameters.debt.insert(token.address.clone(), settings);
            }
        }
    }
    parameters
}

/// 한 이벤트가 다시 쓰는 필드. `None`은 유지
#[derive(Debug, Default)]
pub(crate) struct LoanRewrite {
    pub original_collateral: Option<Portfolio>,
    pub borrowed_collateral: Option<Portfolio>,
    pub debt: Option<Portfolio>,
    pub debt_category: Option<u8>,
}

impl LoanRewrite {
    pub fn apply(self, entity: &mut LoanEntity) -> StateResult<()> {
        let LoanEntity { debt, details, user, .. } = entity;
        let LoanDetails::Hashstack {
            original_collateral,
            borrowed_collateral,
            debt_category,
        } = details
        else {
            return Err(StateError::InconsistentLoan {
                loan_id: user.clone(),
                reason: "entity is not a Hashstack entity".to_string(),
            });
        };
        if let Some(portfolio) = self.original_collateral {
            *original_collateral = portfolio;
        }
        if let Some(portfolio) = self.borrowed_collateral {
            *borrowed_collateral = portfolio;
        }
        if let Some(portfolio) = self.debt {
            *debt = portfolio;
        }
        if self.debt_category.is_some() {
            *debt_category = self.debt_category;
        }
        entity.recompute_collateral();
        Ok(())
    }
}

/// 토큰 하나짜리 포트폴리오
pub(crate) fn single(token: &str, amount: Decimal) -> Portfolio {
    Portfolio::from_amounts([(token, amount)])
}

/// 레지스트리에 있는 토큰 주소
pub(crate) fn token_at(state: &ProtocolState, event: &Event, index: usize) -> StateResult<String> {
    let address = event.address_at(index)?;
    state.registry.get(&address)?;
    Ok(address)
}

/// 기존 loan의 소유자가 이벤트의 사용자와 같은지. 변경 전에 검사한다.
pub(crate) fn check_owner(state: &ProtocolState, loan_id: u64, user: &str) -> StateResult<()> {
    match state.entity(&LoanEntityId::Loan(loan_id)) {
        Some(entity) if entity.user != user => Err(StateError::InconsistentLoan {
            loan_id: loan_id.to_string(),
            reason: format!("owner {} does not match event user {}", entity.user, user),
        }),
        _ => Ok(()),
    }
}

pub(crate) fn ensure(condition: bool, loan_id: u64, reason: impl Into<String>) -> StateResult<()> {
    if condition {
        Ok(())
    } else {
        Err(StateError::InconsistentLoan {
            loan_id: loan_id.to_string(),
            reason: reason.into(),
        })
    }
}

/// 기존 loan에 rewrite 적용. 처음 보는 loan이면 만든다.
pub(crate) fn rewrite_loan(
    state: &mut ProtocolState,
    loan_id: u64,
    user: Option<&str>,
    rewrite: LoanRewrite,
    event: &Event,
) -> StateResult<()> {
    let id = LoanEntityId::Loan(loan_id);
    let owner = user
        .map(str::to_string)
        .or_else(|| state.entity(&id).map(|entity| entity.user.clone()))
        .unwrap_or_default();
    let entity = state.entity_for_event(id, &owner, EntityRole::Continuing, event);
    rewrite.apply(entity)
}

/// 새 loan으로 교체
pub(crate) fn open_loan(
    state: &mut ProtocolState,
    loan_id: u64,
    user: &str,
    rewrite: LoanRewrite,
    event: &Event,
) -> StateResult<()> {
    let mut entity = LoanEntity::new(state.protocol, user);
    rewrite.apply(&mut entity)?;
    state.replace_entity(LoanEntityId::Loan(loan_id), entity, event);
    Ok(())
}

/// collateral / debt (factor 없음). standardized면 분모에 청산 임계값을 곱한다.
pub(crate) fn hashstack_health_factor(
    entity: &LoanEntity,
    standardized: bool,
    threshold: Decimal,
    ctx: &ValuationContext<'_>,
) -> HealthFactor {
    let collateral_usd = entity.compute_collateral_usd(false, ctx);
    let debt_usd = entity.compute_debt_usd(false, ctx);
    let denominator = if standardized { debt_usd * threshold } else { debt_usd };
    HealthFactor::ratio(collateral_usd, denominator)
}
