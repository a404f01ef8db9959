pub mod derisk;
pub mod rpc;

pub use derisk::DeRiskApiClient;
pub use rpc::StarknetRpcClient;

use async_trait::async_trait;

use crate::events::Event;

/// 컨트랙트 이벤트 조회
#[async_trait]
pub trait EventSource: Send + Sync {
    /// `from_block..=to_block` 구간의 이벤트. 페이지네이션은 구현체가 끝까지 따라간다.
    async fn get_events(&self, contract_address: &str, from_block: u64, to_block: u64) -> anyhow::Result<Vec<Event>>;
}
