pub mod chain_reader;
pub mod event_source;
pub mod events;

pub use chain_reader::{mock_zklend_reader, ScriptedChainReader};
pub use event_source::InMemoryEventSource;

use std::env;

/// Check if mock mode is enabled
pub fn is_mock_mode() -> bool {
    env::var("API_MODE").unwrap_or_default() == "mock"
}

/// Get mock configuration values
pub fn get_mock_config() -> MockConfig {
    MockConfig {
        start_block: env::var("MOCK_START_BLOCK")
            .unwrap_or_else(|_| "48000".to_string())
            .parse()
            .unwrap_or(48_000),
        user_count: env::var("MOCK_USER_COUNT")
            .unwrap_or_else(|_| "25".to_string())
            .parse()
            .unwrap_or(25),
        eth_price_usd: env::var("MOCK_ETH_PRICE_USD")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .unwrap_or(2_000),
        // 이벤트 소스 지연 (ms)
        network_latency: env::var("MOCK_NETWORK_LATENCY")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0),
    }
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub start_block: u64,
    pub user_count: usize,
    pub eth_price_usd: u64,
    pub network_latency: u64,
}
