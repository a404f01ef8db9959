use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::state::ReplayDiagnostics;
use crate::types::ProtocolId;

/// 한 번의 리플레이 실행 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayStats {
    pub run_id: Uuid,
    pub protocol: ProtocolId,
    pub start_block: u64,
    /// 다음 실행이 시작할 블록
    pub next_block: u64,
    pub pages: u64,
    pub events_fetched: u64,
    pub records_written: u64,
    pub interest_rate_snapshots: u64,
    pub fetch_failures: u64,
    pub resumed_entities: u64,
    pub diagnostics: ReplayDiagnostics,
    pub started_at: DateTime<Utc>,
    pub execution_time: Duration,
}

impl ReplayStats {
    pub fn new(protocol: ProtocolId, start_block: u64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            protocol,
            start_block,
            next_block: start_block,
            pages: 0,
            events_fetched: 0,
            records_written: 0,
            interest_rate_snapshots: 0,
            fetch_failures: 0,
            resumed_entities: 0,
            diagnostics: ReplayDiagnostics::default(),
            started_at: Utc::now(),
            execution_time: Duration::ZERO,
        }
    }

    pub fn log_summary(&self) {
        info!(
            "📊 {} 리플레이 요약 [{}]: 블록 {}..{}, 페이지 {}, 이벤트 {} (적용 {}, 무시 {}, 건너뜀 {}), 기록 {}, 조회 실패 {}, {:.2}초",
            self.protocol,
            self.run_id,
            self.start_block,
            self.next_block,
            self.pages,
            self.events_fetched,
            self.diagnostics.events_applied,
            self.diagnostics.events_ignored,
            self.diagnostics.events_skipped,
            self.records_written,
            self.fetch_failures,
            self.execution_time.as_secs_f64()
        );
        if self.diagnostics.unknown_token_events > 0 {
            info!(
                "   미등록 토큰 이벤트 {}개 (토큰 {}종)",
                self.diagnostics.unknown_token_events,
                self.diagnostics.unique_unknown_tokens()
            );
        }
        if self.diagnostics.suspicious_first_events > 0 || self.diagnostics.inconsistent_loans > 0 {
            info!(
                "   SuspiciousFirstEvent {}개, loan 불일치 {}개, 잘못된 데이터 {}개",
                self.diagnostics.suspicious_first_events,
                self.diagnostics.inconsistent_loans,
                self.diagnostics.malformed_events
            );
        }
    }
}
