use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use tracing::{info, warn};

use loan_state_engine::constants::underlying_address;
use loan_state_engine::mocks;
use loan_state_engine::replay::replay_protocol;
use loan_state_engine::risk::{collateral_price_range, RiskAggregator};
use loan_state_engine::runtime::{init_logging, load_config, Backends};
use loan_state_engine::types::ProtocolId;

/// 담보 가격 하락에 따른 청산 가능 부채 곡선 출력
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let matches = Command::new("liquidable_debt")
        .version("0.1.0")
        .about("📉 담보 가격별 청산 가능 부채 곡선")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value("config/default.toml")
        )
        .arg(
            Arg::new("protocol")
                .short('p')
                .long("protocol")
                .value_name("PROTOCOL")
                .help("프로토콜 키 (zklend, nostra_alpha, nostra_mainnet, hashstack_v0, hashstack_v1)")
                .default_value("zklend")
        )
        .arg(
            Arg::new("collateral")
                .long("collateral")
                .value_name("SYMBOL")
                .help("가격을 움직일 담보 토큰")
                .default_value("ETH")
        )
        .arg(
            Arg::new("debt")
                .long("debt")
                .value_name("SYMBOL")
                .help("청산될 부채 토큰")
                .default_value("USDC")
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("곡선을 JSON 으로 출력")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("mock")
                .long("mock")
                .help("합성 zkLend 이력으로 실행")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .default_value("warn")
        )
        .get_matches();

    let arg = |name: &str| matches.get_one::<String>(name).cloned().unwrap_or_default();
    init_logging(&arg("log-level"));

    let mut config = load_config(&arg("config")).await;
    let mock_mode = matches.get_flag("mock") || mocks::is_mock_mode();
    let protocol: ProtocolId = if mock_mode {
        ProtocolId::ZkLend
    } else {
        arg("protocol").parse()?
    };
    config.replay.protocols = vec![protocol.key().to_string()];
    config.validate()?;

    let collateral_symbol = arg("collateral");
    let debt_symbol = arg("debt");
    let collateral = underlying_address(&collateral_symbol)
        .ok_or_else(|| anyhow!("알 수 없는 담보 토큰: {}", collateral_symbol))?;
    let debt = underlying_address(&debt_symbol).ok_or_else(|| anyhow!("알 수 없는 부채 토큰: {}", debt_symbol))?;

    let backends = if mock_mode {
        Backends::mock(&mocks::get_mock_config())
    } else {
        Backends::live(&config).await?
    };
    let driver = backends.replay_driver(&config);
    let start_block = backends.start_block(&config, protocol);
    let (state, stats) = replay_protocol(protocol, &driver, backends.reader.as_ref(), start_block).await?;
    stats.log_summary();
    state.ensure_ready()?;

    let prices = backends
        .oracle
        .get_prices(&state.registry.underlying_decimals())
        .await?;
    let current_price = prices
        .get(collateral)
        .copied()
        .ok_or_else(|| anyhow!("{} 가격이 없습니다", collateral_symbol))?;
    if !prices.contains_key(debt) {
        warn!("⚠️ {} 가격이 없어 부채가 0으로 평가됩니다", debt_symbol);
    }

    let points = collateral_price_range(current_price, config.risk.price_points, config.risk.price_range_fraction);
    info!(
        "📊 {} {} 담보 / {} 부채: 현재 가격 {}, {}개 지점",
        protocol,
        collateral_symbol,
        debt_symbol,
        current_price,
        points.len()
    );
    let curve = RiskAggregator::new(&state).liquidable_debt_curve(&prices, collateral, debt, &points);

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&curve)?);
        return Ok(());
    }
    println!("{:>20} {:>24} {:>24}", "collateral_price", "liquidable_debt_usd", "at_interval_usd");
    for point in &curve {
        println!(
            "{:>20} {:>24} {:>24}",
            point.collateral_price.round_dp(4),
            point.liquidable_debt.round_dp(2),
            point.liquidable_debt_at_interval.round_dp(2)
        );
    }
    Ok(())
}
