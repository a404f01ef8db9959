use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::constants::{DEFAULT_MAX_EMPTY_PAGES, DEFAULT_PAGE_SIZE};
use crate::replay::ReplaySettings;
use crate::types::ProtocolId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Starknet JSON-RPC endpoint (`starknet_getEvents`, `starknet_call`)
    pub rpc_url: String,
    pub derisk_api_url: String,
    pub request_timeout_ms: u64,
    /// 조회 실패 후 재시도까지 대기
    pub retry_delay_ms: u64,
    /// 페이지 조회 시도 횟수 (첫 시도 포함)
    pub max_fetch_attempts: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSourceKind {
    Rpc,
    DeriskApi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub page_size: u64,
    pub max_empty_pages: u32,
    /// 프로토콜 키 (`zklend`, `nostra_alpha`, ...)
    pub protocols: Vec<String>,
    pub event_source: EventSourceKind,
    /// 프로토콜 키 -> 체크포인트가 없을 때 시작 블록
    #[serde(default)]
    pub start_blocks: HashMap<String, u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub redis_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub avnu_url: String,
    /// 견적에 쓰는 USDC 수량
    pub sell_amount_usdc: u64,
    /// 심볼 -> 고정 가격 (견적이 없는 토큰)
    #[serde(default)]
    pub pinned_prices: HashMap<String, Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub price_points: usize,
    /// 곡선 상한 = 현재 가격 * (1 + fraction)
    pub price_range_fraction: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub replay: ReplayConfig,
    pub storage: StorageConfig,
    pub oracle: OracleConfig,
    pub risk: RiskConfig,
    pub monitoring: MonitoringConfig,
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default() -> Self {
        Self {
            network: NetworkConfig {
                rpc_url: "https://starknet-mainnet.public.blastapi.io/rpc/v0_7".to_string(),
                derisk_api_url: "https://data.derisk.io/data/get_raw_events".to_string(),
                request_timeout_ms: 30_000,
                retry_delay_ms: 5_000,
                max_fetch_attempts: 2,
            },
            replay: ReplayConfig {
                page_size: DEFAULT_PAGE_SIZE,
                max_empty_pages: DEFAULT_MAX_EMPTY_PAGES,
                protocols: ProtocolId::ALL.iter().map(|p| p.key().to_string()).collect(),
                event_source: EventSourceKind::Rpc,
                start_blocks: HashMap::new(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                redis_url: "redis://127.0.0.1:6379".to_string(),
            },
            oracle: OracleConfig {
                avnu_url: "https://starknet.impulse.avnu.fi/v1/tokens/prices".to_string(),
                sell_amount_usdc: 10,
                pinned_prices: HashMap::new(),
            },
            risk: RiskConfig {
                price_points: 50,
                price_range_fraction: Decimal::new(2, 1),
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
            },
        }
    }

    pub async fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// `.env` 로드 이후 환경 변수 우선
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("STARKNET_RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Ok(url) = std::env::var("DERISK_API_URL") {
            self.network.derisk_api_url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.storage.redis_url = url;
        }
    }

    pub fn enabled_protocols(&self) -> Result<Vec<ProtocolId>> {
        self.replay
            .protocols
            .iter()
            .map(|key| key.parse::<ProtocolId>())
            .collect()
    }

    pub fn start_block(&self, protocol: ProtocolId) -> u64 {
        self.replay.start_blocks.get(protocol.key()).copied().unwrap_or(0)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.network.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.network.retry_delay_ms)
    }

    pub fn replay_settings(&self) -> ReplaySettings {
        ReplaySettings {
            page_size: self.replay.page_size,
            max_empty_pages: self.replay.max_empty_pages,
            max_fetch_attempts: self.network.max_fetch_attempts,
            retry_delay: self.retry_delay(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            return Err(anyhow::anyhow!("Network RPC URL cannot be empty"));
        }
        if self.replay.event_source == EventSourceKind::DeriskApi && self.network.derisk_api_url.is_empty() {
            return Err(anyhow::anyhow!("DeRisk API URL must be set when event_source = derisk_api"));
        }
        if self.network.max_fetch_attempts == 0 {
            return Err(anyhow::anyhow!("max_fetch_attempts must be at least 1"));
        }
        if self.replay.page_size == 0 {
            return Err(anyhow::anyhow!("Replay page size must be greater than 0"));
        }
        if self.replay.max_empty_pages == 0 {
            return Err(anyhow::anyhow!("max_empty_pages must be greater than 0"));
        }
        if self.replay.protocols.is_empty() {
            return Err(anyhow::anyhow!("At least one protocol must be enabled"));
        }
        self.enabled_protocols()?;
        for key in self.replay.start_blocks.keys() {
            if ProtocolId::from_key(key).is_none() {
                return Err(anyhow::anyhow!("Unknown protocol in start_blocks: {}", key));
            }
        }
        if self.storage.backend == StorageBackend::Redis && self.storage.redis_url.is_empty() {
            return Err(anyhow::anyhow!("Redis URL must be set for the redis backend"));
        }
        if self.oracle.sell_amount_usdc == 0 {
            return Err(anyhow::anyhow!("Oracle sell amount must be positive"));
        }
        if self.oracle.pinned_prices.values().any(|price| *price <= Decimal::ZERO) {
            return Err(anyhow::anyhow!("Pinned prices must be positive"));
        }
        if self.risk.price_points == 0 {
            return Err(anyhow::anyhow!("Risk price_points must be greater than 0"));
        }
        if self.risk.price_range_fraction < Decimal::ZERO {
            return Err(anyhow::anyhow!("Risk price_range_fraction cannot be negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.replay.page_size, 1_000);
        assert_eq!(config.replay.max_empty_pages, 5);
        assert_eq!(config.enabled_protocols().unwrap().len(), 5);
        assert_eq!(config.start_block(ProtocolId::ZkLend), 0);
        assert_eq!(config.replay_settings().max_fetch_attempts, 2);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.network.rpc_url = "".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.replay.protocols.push("aave".to_string());
        assert!(config.validate().is_err());

        config = Config::default();
        config.replay.page_size = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.replay.start_blocks.insert("compound".to_string(), 1);
        assert!(config.validate().is_err());

        config = Config::default();
        config.oracle.pinned_prices.insert("UNO".to_string(), Decimal::ZERO);
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[network]
rpc_url = "http://localhost:5050/rpc"
derisk_api_url = "http://localhost:8000/events"
request_timeout_ms = 1000
retry_delay_ms = 10
max_fetch_attempts = 3

[replay]
page_size = 500
max_empty_pages = 2
protocols = ["zklend", "hashstack_v1"]
event_source = "derisk_api"

[replay.start_blocks]
zklend = 48668

[storage]
backend = "redis"
redis_url = "redis://localhost:6379/1"

[oracle]
avnu_url = "http://localhost:9000/prices"
sell_amount_usdc = 10

[oracle.pinned_prices]
UNO = "0.99"

[risk]
price_points = 20
price_range_fraction = "0.5"

[monitoring]
log_level = "debug"
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).await.unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.replay.event_source, EventSourceKind::DeriskApi);
        assert_eq!(config.storage.backend, StorageBackend::Redis);
        assert_eq!(
            config.enabled_protocols().unwrap(),
            vec![ProtocolId::ZkLend, ProtocolId::HashstackV1]
        );
        assert_eq!(config.start_block(ProtocolId::ZkLend), 48_668);
        assert_eq!(config.start_block(ProtocolId::HashstackV1), 0);
        assert_eq!(config.oracle.pinned_prices["UNO"], Decimal::new(99, 2));
        assert_eq!(config.risk.price_range_fraction, Decimal::new(5, 1));
        assert_eq!(config.replay_settings().retry_delay, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_config_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.replay.start_blocks.insert("nostra_mainnet".to_string(), 68_719);
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.start_block(ProtocolId::NostraMainnet), 68_719);
        assert_eq!(loaded.replay.protocols, config.replay.protocols);
        assert_eq!(loaded.risk.price_range_fraction, config.risk.price_range_fraction);
    }
}
