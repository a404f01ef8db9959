use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::stats::ReplayStats;
use crate::blockchain::EventSource;
use crate::constants::{DEFAULT_MAX_EMPTY_PAGES, DEFAULT_PAGE_SIZE};
use crate::events::{sort_for_replay, Event};
use crate::state::ProtocolState;
use crate::storage::{InterestRateSnapshot, LoanStateRecord, StateStore};
use crate::types::StateError;

/// 페이지 크기, 재시도 정책
#[derive(Debug, Clone)]
pub struct ReplaySettings {
    pub page_size: u64,
    /// 모든 주소가 비어 있는 윈도우가 이만큼 연속되면 멈춘다
    pub max_empty_pages: u32,
    /// 첫 시도 포함
    pub max_fetch_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_empty_pages: DEFAULT_MAX_EMPTY_PAGES,
            max_fetch_attempts: 2,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// 이벤트 소스를 블록 윈도우 단위로 읽어 ProtocolState에 적용하고 저장한다
pub struct EventReplayDriver {
    source: Arc<dyn EventSource>,
    store: Arc<dyn StateStore>,
    settings: ReplaySettings,
}

impl EventReplayDriver {
    pub fn new(source: Arc<dyn EventSource>, store: Arc<dyn StateStore>, settings: ReplaySettings) -> Self {
        Self { source, store, settings }
    }

    pub fn settings(&self) -> &ReplaySettings {
        &self.settings
    }

    /// 저장된 체크포인트가 있으면 엔티티를 복원하고 그 블록부터 시작한다
    pub async fn resume(&self, state: &mut ProtocolState, start_block: u64, stats: &mut ReplayStats) -> Result<u64> {
        let Some(checkpoint) = self.store.last_block(state.protocol).await? else {
            return Ok(start_block);
        };
        if checkpoint <= start_block {
            return Ok(start_block);
        }

        let records = self.store.load_loan_states(state.protocol).await?;
        stats.resumed_entities = records.len() as u64;
        state.seed(
            records.into_iter().map(LoanStateRecord::into_entity),
            checkpoint.saturating_sub(1),
        );
        if let Some(snapshot) = self.store.latest_interest_rates(state.protocol).await? {
            for (token, index) in &snapshot.collateral {
                state.interest_rate_models.collateral.update(token, *index);
            }
            for (token, index) in &snapshot.debt {
                state.interest_rate_models.debt.update(token, *index);
            }
        }
        info!(
            "🔁 {} 체크포인트에서 재개: 블록 {}, 엔티티 {}개 복원",
            state.protocol, checkpoint, stats.resumed_entities
        );
        Ok(checkpoint)
    }

    /// `addresses`의 이벤트를 `start_block`부터 리플레이한다.
    /// 윈도우마다 모든 주소를 조회하고, 모든 주소가 빈 윈도우가 연속 한도에 닿으면 끝난다.
    /// 조회가 끝내 실패하면 그 윈도우의 체크포인트를 남기지 않고 에러로 끝난다.
    pub async fn run(&self, state: &mut ProtocolState, addresses: &[String], start_block: u64) -> Result<ReplayStats> {
        let started = Instant::now();
        let mut stats = ReplayStats::new(state.protocol, start_block);
        let mut from_block = self.resume(state, start_block, &mut stats).await?;
        stats.start_block = from_block;
        stats.next_block = from_block;

        info!(
            "🚀 {} 리플레이 시작: 블록 {}, 주소 {}개, 페이지 크기 {}",
            state.protocol,
            from_block,
            addresses.len(),
            self.settings.page_size
        );

        let mut empty_windows = 0u32;
        while !addresses.is_empty() && empty_windows < self.settings.max_empty_pages {
            let to_block = from_block + self.settings.page_size.max(1) - 1;
            let mut page = Vec::new();
            for address in addresses {
                let events = self.fetch_page(address, from_block, to_block, &mut stats).await?;
                page.extend(events);
            }

            info!(
                "📦 {} 블록 {}..={}: 이벤트 {}개",
                state.protocol,
                from_block,
                to_block,
                page.len()
            );
            stats.pages += 1;
            stats.events_fetched += page.len() as u64;

            if page.is_empty() {
                empty_windows += 1;
                debug!("{} 빈 윈도우 {}회 연속", state.protocol, empty_windows);
            } else {
                empty_windows = 0;
                self.apply_page(state, page)?;
                self.persist_page(state, &mut stats).await?;
            }

            from_block = to_block + 1;
            self.store.set_last_block(state.protocol, from_block).await?;
            stats.next_block = from_block;
        }

        stats.diagnostics = state.diagnostics.clone();
        stats.execution_time = started.elapsed();
        info!("✅ {} 리플레이 완료: 다음 시작 블록 {}", state.protocol, stats.next_block);
        Ok(stats)
    }

    /// 재시도까지 실패하면 `UpstreamFetchFailure`
    async fn fetch_page(
        &self,
        address: &str,
        from_block: u64,
        to_block: u64,
        stats: &mut ReplayStats,
    ) -> Result<Vec<Event>> {
        let attempts = self.settings.max_fetch_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.source.get_events(address, from_block, to_block).await {
                Ok(events) => return Ok(events),
                Err(e) => {
                    warn!(
                        "⚠️ {} 블록 {}..={} 조회 실패 ({}/{}): {}",
                        address, from_block, to_block, attempt, attempts, e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }
        stats.fetch_failures += 1;
        let err = StateError::UpstreamFetchFailure(format!("{} {}..={}: {}", address, from_block, to_block, last_error));
        error!("❌ {}, 체크포인트 {}에서 중단", err, from_block);
        Err(err.into())
    }

    /// 순서 위반은 실행 전체를 중단시킨다
    fn apply_page(&self, state: &mut ProtocolState, mut page: Vec<Event>) -> Result<()> {
        sort_for_replay(state.protocol, &mut page);
        for event in &page {
            state.process_event(event)?;
        }
        Ok(())
    }

    async fn persist_page(&self, state: &mut ProtocolState, stats: &mut ReplayStats) -> Result<()> {
        let records: Vec<LoanStateRecord> = state
            .take_dirty()
            .into_iter()
            .filter_map(|id| {
                state
                    .entity(&id)
                    .map(|entity| LoanStateRecord::from_entity(&id, entity))
            })
            .collect();
        let timestamp = records.iter().filter_map(|record| record.timestamp).max().unwrap_or_default();
        let written = self.store.upsert_loan_states(records).await?;
        stats.records_written += written as u64;
        debug!("{} loan 상태 {}개 기록", state.protocol, written);

        let snapshot = InterestRateSnapshot::capture(
            state.protocol,
            state.last_block_number,
            timestamp,
            &state.interest_rate_models,
        );
        self.store.save_interest_rates(snapshot).await?;
        stats.interest_rate_snapshots += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{underlying_address, ZKLEND_MARKET};
    use crate::ledger::LoanDetails;
    use crate::mocks::events::zklend_event;
    use crate::mocks::InMemoryEventSource;
    use crate::storage::MemoryStore;
    use crate::types::{LoanEntityId, ProtocolId};
    use rust_decimal::Decimal;

    const USER: &str = "0x0000000000000000000000000000000000000000000000000000000000000abc";

    fn settings(page_size: u64, max_empty_pages: u32) -> ReplaySettings {
        ReplaySettings {
            page_size,
            max_empty_pages,
            max_fetch_attempts: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn scenario_events() -> Vec<Event> {
        let eth = underlying_address("ETH").unwrap();
        vec![
            zklend_event(12, "Withdrawal", &[USER, eth, "0x58d15e176280000"]),
            zklend_event(10, "Deposit", &[USER, eth, "0xde0b6b3a7640000"]),
            zklend_event(11, "CollateralEnabled", &[USER, eth]),
        ]
    }

    fn deposit_of(state: &ProtocolState, token: &str) -> Decimal {
        match &state.entity(&LoanEntityId::User(USER.to_string())).unwrap().details {
            LoanDetails::ZkLend { deposit, .. } => deposit.get(token),
            _ => panic!("not a zkLend entity"),
        }
    }

    #[tokio::test]
    async fn test_zklend_scenario_is_replayed_and_persisted() {
        let eth = underlying_address("ETH").unwrap();
        let source = Arc::new(InMemoryEventSource::new(scenario_events()));
        let store = Arc::new(MemoryStore::new());
        let driver = EventReplayDriver::new(source, store.clone(), settings(2, 2));

        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        let stats = driver
            .run(&mut state, &[ZKLEND_MARKET.to_string()], 10)
            .await
            .unwrap();

        let id = LoanEntityId::User(USER.to_string());
        assert_eq!(deposit_of(&state, eth), Decimal::from(6 * 10u64.pow(17)));
        assert_eq!(state.entity(&id).unwrap().collateral.get(eth), Decimal::from(6 * 10u64.pow(17)));
        assert_eq!(stats.events_fetched, 3);
        assert_eq!(stats.diagnostics.events_applied, 3);

        // 10..=11, 12..=13, 14..=15 (빈 페이지), 16..=17 (빈 페이지)
        assert_eq!(stats.pages, 4);
        assert_eq!(stats.next_block, 18);
        assert_eq!(store.last_block(ProtocolId::ZkLend).await.unwrap(), Some(18));

        let records = store.load_loan_states(ProtocolId::ZkLend).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].collateral.get(eth), Decimal::from(6 * 10u64.pow(17)));
        assert_eq!(records[0].block, Some(12));
        assert_eq!(stats.interest_rate_snapshots, 2);
    }

    #[tokio::test]
    async fn test_restart_resumes_from_checkpoint() {
        let eth = underlying_address("ETH").unwrap();
        let store = Arc::new(MemoryStore::new());
        let first = EventReplayDriver::new(
            Arc::new(InMemoryEventSource::new(scenario_events())),
            store.clone(),
            settings(5, 1),
        );
        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        first.run(&mut state, &[ZKLEND_MARKET.to_string()], 10).await.unwrap();
        let checkpoint = store.last_block(ProtocolId::ZkLend).await.unwrap().unwrap();

        // 이전 이벤트가 다시 적용되면 예치금이 두 배가 된다
        let mut events = scenario_events();
        events.push(zklend_event(checkpoint + 1, "Deposit", &[USER, eth, "0xde0b6b3a7640000"]));
        let second = EventReplayDriver::new(Arc::new(InMemoryEventSource::new(events)), store.clone(), settings(5, 1));
        let mut restarted = ProtocolState::for_protocol(ProtocolId::ZkLend);
        let stats = second
            .run(&mut restarted, &[ZKLEND_MARKET.to_string()], 10)
            .await
            .unwrap();

        assert_eq!(stats.start_block, checkpoint);
        assert_eq!(stats.resumed_entities, 1);
        assert_eq!(stats.events_fetched, 1);
        assert_eq!(deposit_of(&restarted, eth), Decimal::from(16 * 10u64.pow(17)));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let source = Arc::new(InMemoryEventSource::new(scenario_events()).fail_next(1, "timeout"));
        let store = Arc::new(MemoryStore::new());
        let driver = EventReplayDriver::new(source.clone(), store, settings(10, 1));

        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        let stats = driver.run(&mut state, &[ZKLEND_MARKET.to_string()], 10).await.unwrap();
        assert_eq!(stats.fetch_failures, 0);
        assert_eq!(stats.events_fetched, 3);
        // 실패 1 + 재시도 1 + 다음 빈 페이지 1
        assert_eq!(source.request_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_window_keeps_checkpoint_for_next_run() {
        let eth = underlying_address("ETH").unwrap();
        let events = vec![
            zklend_event(5, "Deposit", &[USER, eth, "0xde0b6b3a7640000"]),
            zklend_event(15, "Deposit", &[USER, eth, "0xde0b6b3a7640000"]),
        ];
        let store = Arc::new(MemoryStore::new());
        let flaky = InMemoryEventSource::new(events.clone()).fail_window_containing(15, 2, "rate limited");
        let driver = EventReplayDriver::new(Arc::new(flaky), store.clone(), settings(10, 1));

        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        let err = driver
            .run(&mut state, &[ZKLEND_MARKET.to_string()], 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StateError>(),
            Some(StateError::UpstreamFetchFailure(_))
        ));
        // 0..=9 만 반영됐다
        assert_eq!(store.last_block(ProtocolId::ZkLend).await.unwrap(), Some(10));
        assert_eq!(deposit_of(&state, eth), Decimal::from(10u64.pow(18)));

        let healthy = EventReplayDriver::new(Arc::new(InMemoryEventSource::new(events)), store.clone(), settings(10, 1));
        let mut restarted = ProtocolState::for_protocol(ProtocolId::ZkLend);
        let stats = healthy
            .run(&mut restarted, &[ZKLEND_MARKET.to_string()], 0)
            .await
            .unwrap();
        assert_eq!(stats.start_block, 10);
        assert_eq!(stats.events_fetched, 1);
        assert_eq!(deposit_of(&restarted, eth), Decimal::from(2 * 10u64.pow(18)));
    }

    #[tokio::test]
    async fn test_failure_on_first_window_writes_no_checkpoint() {
        let source = Arc::new(InMemoryEventSource::new(scenario_events()).fail_next(2, "rate limited"));
        let store = Arc::new(MemoryStore::new());
        let driver = EventReplayDriver::new(source.clone(), store.clone(), settings(10, 1));

        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        assert!(driver.run(&mut state, &[ZKLEND_MARKET.to_string()], 10).await.is_err());
        assert_eq!(source.request_count(), 2);
        assert_eq!(store.last_block(ProtocolId::ZkLend).await.unwrap(), None);
        assert!(state.loan_entities.is_empty());
    }

    #[tokio::test]
    async fn test_quiet_address_is_fetched_while_others_are_active() {
        let eth = underlying_address("ETH").unwrap();
        let other_market = "0x000000000000000000000000000000000000000000000000000000000000000b";
        let other_user = "0x0000000000000000000000000000000000000000000000000000000000000def";
        let mut events: Vec<Event> = [5u64, 15, 25, 35, 45, 55]
            .into_iter()
            .map(|block| {
                let mut event = zklend_event(block, "Deposit", &[other_user, eth, "0xde0b6b3a7640000"]);
                event.from_address = other_market.to_string();
                event
            })
            .collect();
        // 시장 주소는 다섯 윈도우 동안 조용하다가 50번 블록에서 이벤트를 낸다
        events.push(zklend_event(50, "Deposit", &[USER, eth, "0xde0b6b3a7640000"]));

        let store = Arc::new(MemoryStore::new());
        let driver = EventReplayDriver::new(Arc::new(InMemoryEventSource::new(events)), store.clone(), settings(10, 2));
        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        let stats = driver
            .run(&mut state, &[ZKLEND_MARKET.to_string(), other_market.to_string()], 0)
            .await
            .unwrap();

        assert_eq!(stats.events_fetched, 7);
        assert_eq!(deposit_of(&state, eth), Decimal::from(10u64.pow(18)));
        // 50..=59 이후 빈 윈도우 두 번
        assert_eq!(stats.next_block, 80);
        assert_eq!(store.last_block(ProtocolId::ZkLend).await.unwrap(), Some(80));
    }

    #[tokio::test]
    async fn test_stops_after_consecutive_empty_pages() {
        let source = Arc::new(InMemoryEventSource::new(Vec::new()));
        let store = Arc::new(MemoryStore::new());
        let driver = EventReplayDriver::new(source.clone(), store.clone(), settings(100, 3));

        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        let stats = driver.run(&mut state, &[ZKLEND_MARKET.to_string()], 0).await.unwrap();
        assert_eq!(source.request_count(), 3);
        assert_eq!(stats.next_block, 300);
        assert_eq!(stats.records_written, 0);
    }

    #[tokio::test]
    async fn test_out_of_order_aborts_without_checkpoint() {
        let source = Arc::new(InMemoryEventSource::new(scenario_events()));
        let store = Arc::new(MemoryStore::new());
        let driver = EventReplayDriver::new(source, store.clone(), settings(10, 1));

        let mut state = ProtocolState::for_protocol(ProtocolId::ZkLend);
        state.seed(Vec::<(LoanEntityId, crate::ledger::LoanEntity)>::new(), 100);
        let err = driver
            .run(&mut state, &[ZKLEND_MARKET.to_string()], 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StateError>(),
            Some(StateError::OutOfOrderEvent { .. })
        ));
        assert_eq!(store.last_block(ProtocolId::ZkLend).await.unwrap(), None);
    }
}
