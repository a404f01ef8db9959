pub mod driver;
pub mod stats;

pub use driver::{EventReplayDriver, ReplaySettings};
pub use stats::ReplayStats;

use anyhow::Result;
use std::sync::Arc;

use crate::ledger::TokenRegistry;
use crate::protocols::{collect_token_parameters, event_addresses, ChainReader};
use crate::state::ProtocolState;
use crate::types::ProtocolId;

/// 토큰 파라미터 수집 후 전체 리플레이
pub async fn replay_protocol(
    protocol: ProtocolId,
    driver: &EventReplayDriver,
    reader: &dyn ChainReader,
    start_block: u64,
) -> Result<(ProtocolState, ReplayStats)> {
    let registry = Arc::new(TokenRegistry::for_protocol(protocol));
    let mut state = ProtocolState::new(protocol, registry.clone());
    let parameters = collect_token_parameters(protocol, &registry, reader).await?;
    state.install_token_parameters(parameters);

    let addresses = event_addresses(protocol, &registry);
    let stats = driver.run(&mut state, &addresses, start_block).await?;
    Ok((state, stats))
}
