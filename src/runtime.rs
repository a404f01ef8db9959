use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::blockchain::{DeRiskApiClient, EventSource, StarknetRpcClient};
use crate::config::{Config, EventSourceKind};
use crate::ledger::TokenRegistry;
use crate::mocks::{self, InMemoryEventSource, MockConfig};
use crate::oracle::{AvnuPriceOracle, PriceOracle, StaticPriceOracle};
use crate::protocols::ChainReader;
use crate::replay::EventReplayDriver;
use crate::storage::{open_store, MemoryStore, StateStore};
use crate::types::ProtocolId;

/// 로그 초기화. `RUST_LOG`가 있으면 그쪽이 우선
pub fn init_logging(log_level: &str) {
    let log_filter = match log_level {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 설정 파일을 읽고 환경 변수를 덮어쓴다. 파일이 없으면 기본 설정
pub async fn load_config(path: &str) -> Config {
    info!("📋 설정 파일 로드 중: {}", path);
    let mut config = match Config::load(path).await {
        Ok(config) => config,
        Err(e) => {
            warn!("⚠️ 설정 파일을 읽지 못해 기본 설정을 사용합니다 ({}): {}", path, e);
            Config::default()
        }
    };
    config.apply_env_overrides();
    config
}

/// 리플레이와 위험 집계에 필요한 I/O 구성 요소
pub struct Backends {
    pub events: Arc<dyn EventSource>,
    pub reader: Arc<dyn ChainReader>,
    pub oracle: Arc<dyn PriceOracle>,
    pub store: Arc<dyn StateStore>,
    /// mock 모드에서는 합성 이력의 시작 블록을 쓴다
    mock_start_block: Option<u64>,
}

impl Backends {
    pub async fn live(config: &Config) -> Result<Self> {
        let rpc = Arc::new(StarknetRpcClient::new(&config.network.rpc_url, config.request_timeout())?);
        match rpc.block_number().await {
            Ok(block) => info!("🔌 현재 블록: {}", block),
            Err(e) => warn!("⚠️ 최신 블록 조회 실패: {}", e),
        }

        let events: Arc<dyn EventSource> = match config.replay.event_source {
            EventSourceKind::Rpc => rpc.clone(),
            EventSourceKind::DeriskApi => {
                info!("🔌 DeRisk 이벤트 API 사용: {}", config.network.derisk_api_url);
                Arc::new(DeRiskApiClient::new(&config.network.derisk_api_url, config.request_timeout())?)
            }
        };
        let oracle = AvnuPriceOracle::new(
            &config.oracle.avnu_url,
            config.oracle.sell_amount_usdc,
            config.oracle.pinned_prices.clone(),
            config.request_timeout(),
            config.retry_delay(),
        )?;

        Ok(Self {
            events,
            reader: rpc,
            oracle: Arc::new(oracle),
            store: open_store(&config.storage).await?,
            mock_start_block: None,
        })
    }

    /// 합성 zkLend 이력, 스크립트된 reserve 응답, 고정 가격, 메모리 저장소
    pub fn mock(mock_config: &MockConfig) -> Self {
        let history = mocks::events::synthetic_zklend_history(mock_config);
        info!("🎭 [MOCK] 합성 이벤트 {}개 준비", history.len());
        let events =
            InMemoryEventSource::new(history).with_latency(Duration::from_millis(mock_config.network_latency));
        let registry = TokenRegistry::for_protocol(ProtocolId::ZkLend);

        Self {
            events: Arc::new(events),
            reader: Arc::new(mocks::mock_zklend_reader(&registry)),
            oracle: Arc::new(StaticPriceOracle::new(mocks::events::mock_prices(mock_config))),
            store: Arc::new(MemoryStore::new()),
            mock_start_block: Some(mock_config.start_block),
        }
    }

    pub fn is_mock(&self) -> bool {
        self.mock_start_block.is_some()
    }

    /// 체크포인트가 없을 때 시작 블록
    pub fn start_block(&self, config: &Config, protocol: ProtocolId) -> u64 {
        self.mock_start_block.unwrap_or_else(|| config.start_block(protocol))
    }

    pub fn replay_driver(&self, config: &Config) -> EventReplayDriver {
        EventReplayDriver::new(self.events.clone(), self.store.clone(), config.replay_settings())
    }
}
