use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::ProtocolId;

/// 리플레이 중 이벤트 처리 결과 카운터
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayDiagnostics {
    pub events_applied: u64,
    pub events_ignored: u64,
    pub events_skipped: u64,
    pub unknown_token_events: u64,
    pub malformed_events: u64,
    pub inconsistent_loans: u64,
    pub suspicious_first_events: u64,
    #[serde(skip)]
    reported_unknown_tokens: HashSet<(ProtocolId, String)>,
}

impl ReplayDiagnostics {
    /// 처음 보는 (protocol, address) 조합이면 true
    pub fn first_unknown_token(&mut self, protocol: ProtocolId, address: &str) -> bool {
        self.reported_unknown_tokens.insert((protocol, address.to_string()))
    }

    pub fn unique_unknown_tokens(&self) -> usize {
        self.reported_unknown_tokens.len()
    }
}
