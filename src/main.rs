use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use futures::future::join_all;
use tracing::{error, info, warn};

use loan_state_engine::mocks;
use loan_state_engine::replay::replay_protocol;
use loan_state_engine::risk::{compute_protocol_stats, RiskAggregator};
use loan_state_engine::runtime::{init_logging, load_config, Backends};
use loan_state_engine::state::ProtocolState;
use loan_state_engine::types::ProtocolId;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let matches = Command::new("loan_state_replayer")
        .version("0.1.0")
        .about("🦀 Starknet 대출 프로토콜 loan 상태 리플레이어")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value("config/default.toml")
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
                .default_value("info")
        )
        .arg(
            Arg::new("protocols")
                .short('p')
                .long("protocols")
                .value_name("PROTOCOLS")
                .help("리플레이할 프로토콜 (zklend,nostra_alpha,nostra_mainnet,hashstack_v0,hashstack_v1)")
        )
        .arg(
            Arg::new("mock")
                .long("mock")
                .help("합성 zkLend 이력으로 실행 (API_MODE=mock 과 동일)")
                .action(ArgAction::SetTrue)
        )
        .get_matches();

    let log_level = matches.get_one::<String>("log-level").map(String::as_str).unwrap_or("info");
    init_logging(log_level);

    print_banner();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/default.toml");
    let mut config = load_config(config_path).await;

    if let Some(protocols) = matches.get_one::<String>("protocols") {
        config.replay.protocols = protocols
            .split(',')
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
    }

    let mock_mode = matches.get_flag("mock") || mocks::is_mock_mode();
    if mock_mode {
        warn!("🎭 mock 모드: 합성 zkLend 이력과 고정 가격을 사용합니다");
        config.replay.protocols = vec![ProtocolId::ZkLend.key().to_string()];
    }

    if let Err(e) = config.validate() {
        error!("❌ 설정 검증 실패: {}", e);
        std::process::exit(1);
    }
    info!("✅ 설정 로드 완료");

    let protocols = config.enabled_protocols()?;
    let backends = if mock_mode {
        Backends::mock(&mocks::get_mock_config())
    } else {
        Backends::live(&config).await?
    };

    let driver = backends.replay_driver(&config);
    let start_blocks: Vec<(ProtocolId, u64)> = protocols
        .iter()
        .map(|protocol| (*protocol, backends.start_block(&config, *protocol)))
        .collect();
    info!("🚀 {}개 프로토콜 리플레이 시작", start_blocks.len());

    let reader = backends.reader.as_ref();
    let driver = &driver;
    let runs = start_blocks.iter().map(|(protocol, start_block)| async move {
        (*protocol, replay_protocol(*protocol, driver, reader, *start_block).await)
    });
    let results = join_all(runs).await;

    let mut failed = 0usize;
    for (protocol, result) in results {
        match result {
            Ok((state, stats)) => {
                stats.log_summary();
                report_risk(&state, &backends).await;
            }
            Err(e) => {
                failed += 1;
                error!("❌ {} 리플레이 실패: {}", protocol, e);
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{}개 프로토콜 리플레이 실패", failed));
    }
    info!("✅ 모든 리플레이 완료");
    Ok(())
}

/// 가격을 받아 프로토콜 통계와 청산 가능 loan을 로그로 남긴다
async fn report_risk(state: &ProtocolState, backends: &Backends) {
    let prices = match backends.oracle.get_prices(&state.registry.underlying_decimals()).await {
        Ok(prices) => prices,
        Err(e) => {
            warn!("⚠️ {} 가격 조회 실패, 통계 생략 ({}): {}", state.protocol, backends.oracle.source_name(), e);
            return;
        }
    };
    if let Err(e) = state.ensure_ready() {
        warn!("⚠️ {} 상태가 준비되지 않아 통계 생략: {}", state.protocol, e);
        return;
    }

    let stats = compute_protocol_stats(state, &prices, backends.reader.as_ref()).await;
    info!(
        "💰 {} 담보 ${}, 위험 조정 담보 ${}, 전체 사용률 {}",
        state.protocol,
        stats.general.total_collateral_usd.round_dp(2),
        stats.general.total_risk_adjusted_collateral_usd.round_dp(2),
        stats.total_utilization
    );

    let loan_stats = RiskAggregator::new(state).loan_stats(&prices);
    let liquidable: Vec<_> = loan_stats.iter().filter(|record| record.liquidable).collect();
    if liquidable.is_empty() {
        info!("✅ {} 청산 가능한 loan 없음", state.protocol);
        return;
    }
    warn!("⚠️ {} 청산 가능한 loan {}개", state.protocol, liquidable.len());
    for record in liquidable.iter().take(10) {
        info!(
            "   {} HF {} 부채 ${} [{}]",
            record.entity_id,
            record.health_factor,
            record.debt_usd.round_dp(2),
            record.debt
        );
    }
}

fn print_banner() {
    println!(r#"
    ╔══════════════════════════════════════════════════════════════╗
    ║                                                              ║
    ║  🦀 Starknet Loan State Replayer v0.1.0                      ║
    ║                                                              ║
    ║  온체인 이벤트로 대출 프로토콜의 loan 상태를 재구성          ║
    ║                                                              ║
    ║  📦 프로토콜:                                                ║
    ║     • zkLend                                                 ║
    ║     • Nostra Alpha / Mainnet                                 ║
    ║     • Hashstack V0 / V1                                      ║
    ║                                                              ║
    ║  📊 산출물:                                                  ║
    ║     • health factor 와 청산 가능 부채                        ║
    ║     • 프로토콜별 담보/부채/공급/사용률                       ║
    ║                                                              ║
    ╚══════════════════════════════════════════════════════════════╝
    "#);
}
