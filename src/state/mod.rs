pub mod diagnostics;

pub use diagnostics::ReplayDiagnostics;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::events::Event;
use crate::ledger::{InterestRateModelPair, LoanEntity, TokenParameters, TokenRegistry, ValuationContext};
use crate::protocols::{hashstack, nostra, zklend};
use crate::types::{ExtraInfo, LoanEntityId, Prices, ProtocolId, StateError, StateResult};

/// ProtocolState 수명 주기
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePhase {
    /// 토큰 파라미터 수집 전
    Uninitialized,
    Ready,
    Replaying,
}

/// process_event 결과
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Applied,
    /// 이 상태와 무관한 이벤트 (zero address transfer 등)
    Ignored,
    /// 복구 가능한 에러로 건너뜀
    Skipped(StateError),
}

/// 엔티티를 여는 이벤트인지, 기존 엔티티를 전제하는 이벤트인지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRole {
    Opening,
    Continuing,
}

/// 한 프로토콜의 전체 loan entity 상태
#[derive(Debug, Clone)]
pub struct ProtocolState {
    pub protocol: ProtocolId,
    pub registry: Arc<TokenRegistry>,
    pub loan_entities: BTreeMap<LoanEntityId, LoanEntity>,
    pub interest_rate_models: InterestRateModelPair,
    pub token_parameters: TokenParameters,
    pub last_block_number: u64,
    pub diagnostics: ReplayDiagnostics,
    phase: StatePhase,
    dirty: BTreeSet<LoanEntityId>,
}

impl ProtocolState {
    pub fn new(protocol: ProtocolId, registry: Arc<TokenRegistry>) -> Self {
        Self {
            protocol,
            registry,
            loan_entities: BTreeMap::new(),
            interest_rate_models: InterestRateModelPair::default(),
            token_parameters: TokenParameters::default(),
            last_block_number: 0,
            diagnostics: ReplayDiagnostics::default(),
            phase: StatePhase::Uninitialized,
            dirty: BTreeSet::new(),
        }
    }

    /// 기본 레지스트리로 생성
    pub fn for_protocol(protocol: ProtocolId) -> Self {
        Self::new(protocol, Arc::new(TokenRegistry::for_protocol(protocol)))
    }

    pub fn phase(&self) -> StatePhase {
        self.phase
    }

    pub fn install_token_parameters(&mut self, parameters: TokenParameters) {
        self.token_parameters = parameters;
        if self.phase == StatePhase::Uninitialized {
            self.phase = StatePhase::Ready;
        }
    }

    /// Valuation needs collected token parameters
    pub fn ensure_ready(&self) -> StateResult<()> {
        if self.phase == StatePhase::Uninitialized || self.token_parameters.is_empty() {
            return Err(StateError::MissingTokenParameters { protocol: self.protocol });
        }
        Ok(())
    }

    /// 체크포인트에서 복원한 엔티티로 초기화
    pub fn seed<I>(&mut self, entities: I, last_block_number: u64)
    where
        I: IntoIterator<Item = (LoanEntityId, LoanEntity)>,
    {
        self.loan_entities.extend(entities);
        self.last_block_number = self.last_block_number.max(last_block_number);
    }

    /// Apply one event. 순서 위반은 상태를 건드리지 않고 에러로 반환한다.
    pub fn process_event(&mut self, event: &Event) -> StateResult<EventOutcome> {
        if event.block_number < self.last_block_number {
            error!(
                "❌ {} 이벤트 순서 위반: block {} < {} (tx {})",
                self.protocol, event.block_number, self.last_block_number, event.transaction_hash
            );
            return Err(StateError::OutOfOrderEvent {
                event_block: event.block_number,
                last_block: self.last_block_number,
            });
        }
        self.last_block_number = event.block_number;
        if self.phase != StatePhase::Replaying {
            self.phase = StatePhase::Replaying;
        }

        let result = match self.protocol {
            ProtocolId::ZkLend => zklend::apply_event(self, event),
            ProtocolId::NostraAlpha | ProtocolId::NostraMainnet => nostra::apply_event(self, event),
            ProtocolId::HashstackV0 => hashstack::v0::apply_event(self, event),
            ProtocolId::HashstackV1 => hashstack::v1::apply_event(self, event),
        };

        match result {
            Ok(true) => {
                self.diagnostics.events_applied += 1;
                Ok(EventOutcome::Applied)
            }
            Ok(false) => {
                self.diagnostics.events_ignored += 1;
                debug!("{} 이벤트 무시: {} (tx {})", self.protocol, event.key_name, event.transaction_hash);
                Ok(EventOutcome::Ignored)
            }
            Err(err) if err.is_recoverable() => {
                self.record_skipped(&err, event);
                Ok(EventOutcome::Skipped(err))
            }
            Err(err) => Err(err),
        }
    }

    fn record_skipped(&mut self, err: &StateError, event: &Event) {
        self.diagnostics.events_skipped += 1;
        match err {
            StateError::UnknownToken { protocol, address } => {
                self.diagnostics.unknown_token_events += 1;
                if self.diagnostics.first_unknown_token(*protocol, address) {
                    warn!("⚠️ {} 미등록 토큰 {} (block {}), 이벤트를 건너뜁니다", protocol, address, event.block_number);
                }
            }
            StateError::MalformedEventData { .. } => {
                self.diagnostics.malformed_events += 1;
                warn!("⚠️ {} 잘못된 이벤트 데이터 (tx {}): {}", self.protocol, event.transaction_hash, err);
            }
            StateError::InconsistentLoan { .. } => {
                self.diagnostics.inconsistent_loans += 1;
                warn!("⚠️ {} loan 불일치 (tx {}): {}", self.protocol, event.transaction_hash, err);
            }
            _ => {}
        }
    }

    /// 없으면 새 엔티티를 만든다
    pub fn get_or_create(&mut self, id: LoanEntityId, user: &str) -> &mut LoanEntity {
        let protocol = self.protocol;
        self.loan_entities
            .entry(id)
            .or_insert_with(|| LoanEntity::new(protocol, user))
    }

    /// 이벤트가 건드리는 엔티티. provenance 기록과 dirty 표시를 함께 한다.
    pub fn entity_for_event(
        &mut self,
        id: LoanEntityId,
        user: &str,
        role: EntityRole,
        event: &Event,
    ) -> &mut LoanEntity {
        if role == EntityRole::Continuing && !self.loan_entities.contains_key(&id) {
            self.diagnostics.suspicious_first_events += 1;
            warn!(
                "⚠️ {} SuspiciousFirstEvent: {} 가 {} 의 첫 이벤트입니다 (block {})",
                self.protocol,
                event.name(),
                id,
                event.block_number
            );
        }
        self.dirty.insert(id.clone());
        let entity = self.get_or_create(id, user);
        entity.extra_info = ExtraInfo {
            block: Some(event.block_number),
            timestamp: Some(event.timestamp),
        };
        entity
    }

    /// Hashstack new_loan처럼 엔티티 전체를 새로 쓰는 경우
    pub fn replace_entity(&mut self, id: LoanEntityId, mut entity: LoanEntity, event: &Event) {
        entity.extra_info = ExtraInfo {
            block: Some(event.block_number),
            timestamp: Some(event.timestamp),
        };
        self.dirty.insert(id.clone());
        self.loan_entities.insert(id, entity);
    }

    pub fn entity(&self, id: &LoanEntityId) -> Option<&LoanEntity> {
        self.loan_entities.get(id)
    }

    /// 마지막 호출 이후 변경된 엔티티 id
    pub fn take_dirty(&mut self) -> BTreeSet<LoanEntityId> {
        std::mem::take(&mut self.dirty)
    }

    pub fn valuation_context<'a>(&'a self, prices: &'a Prices) -> ValuationContext<'a> {
        ValuationContext::new(&self.token_parameters, &self.interest_rate_models, prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::underlying_address;
    use crate::mocks::events::zklend_event;
    use rust_decimal::Decimal;

    const USER: &str = "0x0000000000000000000000000000000000000000000000000000000000000abc";

    #[test]
    fn test_out_of_order_event_is_rejected_without_mutation() {
        let eth = underlying_address("ETH").unwrap();
        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        state
            .process_event(&zklend_event(10, "Deposit", &[USER, eth, "0xde0b6b3a7640000"]))
            .unwrap();
        let before = state.loan_entities.clone();

        let late = zklend_event(9, "Deposit", &[USER, eth, "0xde0b6b3a7640000"]);
        let err = state.process_event(&late).unwrap_err();
        assert_eq!(err, StateError::OutOfOrderEvent { event_block: 9, last_block: 10 });
        assert_eq!(state.loan_entities, before);
        assert_eq!(state.last_block_number, 10);
    }

    #[test]
    fn test_suspicious_first_event_is_counted() {
        let eth = underlying_address("ETH").unwrap();
        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        let outcome = state
            .process_event(&zklend_event(1, "Withdrawal", &[USER, eth, "0x10"]))
            .unwrap();
        assert_eq!(outcome, EventOutcome::Applied);
        assert_eq!(state.diagnostics.suspicious_first_events, 1);
        assert_eq!(state.take_dirty().len(), 1);
        assert!(state.take_dirty().is_empty());
    }

    #[test]
    fn test_unknown_token_is_skipped_and_reported_once() {
        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        for block in 1..=3 {
            let outcome = state
                .process_event(&zklend_event(block, "Deposit", &[USER, "0x123", "0x10"]))
                .unwrap();
            assert!(matches!(outcome, EventOutcome::Skipped(StateError::UnknownToken { .. })));
        }
        assert_eq!(state.diagnostics.unknown_token_events, 3);
        assert_eq!(state.diagnostics.unique_unknown_tokens(), 1);
        assert!(state.loan_entities.is_empty());
        assert_eq!(state.last_block_number, 3);
    }

    #[test]
    fn test_phase_transitions() {
        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        assert_eq!(state.phase(), StatePhase::Uninitialized);
        assert!(state.ensure_ready().is_err());

        let mut parameters = TokenParameters::default();
        let registry = state.registry.clone();
        let eth = registry.get(underlying_address("ETH").unwrap()).unwrap();
        parameters
            .collateral
            .insert(eth.address.clone(), crate::ledger::TokenSettings::neutral(eth, "ETH"));
        state.install_token_parameters(parameters);
        assert_eq!(state.phase(), StatePhase::Ready);
        assert!(state.ensure_ready().is_ok());

        state
            .process_event(&zklend_event(1, "Deposit", &[USER, &eth.address, "0x10"]))
            .unwrap();
        assert_eq!(state.phase(), StatePhase::Replaying);
        let id = LoanEntityId::User(USER.to_string());
        assert_eq!(state.entity(&id).unwrap().extra_info.block, Some(1));
        assert!(state.entity(&id).unwrap().collateral.get(&eth.address) == Decimal::ZERO);
    }
}
