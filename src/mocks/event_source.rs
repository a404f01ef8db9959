use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::blockchain::EventSource;
use crate::events::Event;
use crate::utils::felt::add_leading_zeros;

/// 메모리에 올려둔 이벤트를 돌려주는 EventSource.
/// `fail_next`로 일시적인 조회 실패를 흉내낸다.
#[derive(Debug, Default)]
pub struct InMemoryEventSource {
    events: BTreeMap<String, Vec<Event>>,
    failures: Mutex<VecDeque<String>>,
    /// 이 블록을 포함하는 윈도우 조회를 남은 횟수만큼 실패시킨다
    window_failures: Mutex<Vec<(u64, usize, String)>>,
    latency: Duration,
    requests: AtomicUsize,
}

impl InMemoryEventSource {
    pub fn new<I>(events: I) -> Self
    where
        I: IntoIterator<Item = Event>,
    {
        let mut by_address: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        for event in events {
            by_address.entry(event.emitter()).or_default().push(event);
        }
        Self {
            events: by_address,
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 다음 `count`번의 조회를 실패시킨다
    pub fn fail_next(self, count: usize, reason: &str) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.extend(std::iter::repeat(reason.to_string()).take(count));
        }
        self
    }

    /// `block`을 포함하는 윈도우 조회를 `count`번 실패시킨다
    pub fn fail_window_containing(self, block: u64, count: usize, reason: &str) -> Self {
        if let Ok(mut failures) = self.window_failures.lock() {
            failures.push((block, count, reason.to_string()));
        }
        self
    }

    fn window_failure(&self, from_block: u64, to_block: u64) -> Option<String> {
        let mut failures = self.window_failures.lock().ok()?;
        failures
            .iter_mut()
            .find(|(block, remaining, _)| *remaining > 0 && (from_block..=to_block).contains(block))
            .map(|(_, remaining, reason)| {
                *remaining -= 1;
                reason.clone()
            })
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn get_events(&self, contract_address: &str, from_block: u64, to_block: u64) -> anyhow::Result<Vec<Event>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(reason) = self.failures.lock().ok().and_then(|mut failures| failures.pop_front()) {
            anyhow::bail!("🎭 [MOCK] {}", reason);
        }
        if let Some(reason) = self.window_failure(from_block, to_block) {
            anyhow::bail!("🎭 [MOCK] {} 블록 {}..={}: {}", contract_address, from_block, to_block, reason);
        }
        let events: Vec<Event> = self
            .events
            .get(&add_leading_zeros(contract_address))
            .map(|events| {
                events
                    .iter()
                    .filter(|event| (from_block..=to_block).contains(&event.block_number))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        debug!("🎭 [MOCK] {} 블록 {}..={}: 이벤트 {}개", contract_address, from_block, to_block, events.len());
        Ok(events)
    }
}
