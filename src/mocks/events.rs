use rust_decimal::Decimal;

use super::MockConfig;
use crate::constants::{underlying_address, ZKLEND_MARKET};
use crate::events::{short_name, Event};
use crate::types::Prices;
use crate::utils::felt::get_selector_from_name;

fn mock_event(block: u64, from_address: &str, key_name: &str, keys: Vec<String>, data: Vec<String>) -> Event {
    Event {
        block_number: block,
        transaction_hash: format!("0x{:x}", block),
        event_index: 0,
        from_address: from_address.to_string(),
        key_name: key_name.to_string(),
        keys,
        data,
        timestamp: 1_700_000_000 + block,
    }
}

fn owned(data: &[&str]) -> Vec<String> {
    data.iter().map(|felt| felt.to_string()).collect()
}

/// zkLend market 이벤트
pub fn zklend_event(block: u64, key_name: &str, data: &[&str]) -> Event {
    let keys = vec![get_selector_from_name(short_name(key_name))];
    mock_event(block, ZKLEND_MARKET, key_name, keys, owned(data))
}

/// keys에는 selector만 담는 Nostra 이벤트
pub fn nostra_event(block: u64, from_address: &str, key_name: &str, data: &[&str]) -> Event {
    let keys = vec![get_selector_from_name(short_name(key_name))];
    mock_event(block, from_address, key_name, keys, owned(data))
}

/// OpenZeppelin 레이아웃: keys = [selector, from, to], data = [low, high]
pub fn nostra_oz_transfer(block: u64, token: &str, key_name: &str, from: &str, to: &str, low: &str) -> Event {
    let keys = vec![get_selector_from_name("Transfer"), from.to_string(), to.to_string()];
    mock_event(block, token, key_name, keys, vec![low.to_string(), "0x0".to_string()])
}

/// Hashstack 이벤트. emitter는 decode에 쓰이지 않는다
pub fn hashstack_event(block: u64, key_name: &str, data: Vec<String>) -> Event {
    let keys = vec![get_selector_from_name(short_name(key_name))];
    mock_event(block, crate::constants::HASHSTACK_V0_ADDRESS, key_name, keys, data)
}

/// Hashstack V0 loan record (14 felts)
pub fn hashstack_v0_loan_record(
    loan_id: u64,
    owner: &str,
    market: &str,
    amount: u64,
    current_market: &str,
    current_amount: u64,
    debt_category: u8,
) -> Vec<String> {
    vec![
        format!("0x{:x}", loan_id),
        owner.to_string(),
        market.to_string(),
        "0x0".to_string(),
        format!("0x{:x}", amount),
        "0x0".to_string(),
        current_market.to_string(),
        format!("0x{:x}", current_amount),
        "0x0".to_string(),
        "0x0".to_string(),
        format!("0x{:x}", debt_category),
        "0x0".to_string(),
        "0x0".to_string(),
        "0x0".to_string(),
    ]
}

/// Hashstack V1 loan record (12 felts)
pub fn hashstack_v1_loan_record(
    loan_id: u64,
    owner: &str,
    market: &str,
    amount: u64,
    current_market: &str,
    current_amount: u64,
) -> Vec<String> {
    let mut record = vec![
        format!("0x{:x}", loan_id),
        owner.to_string(),
        market.to_string(),
        format!("0x{:x}", amount),
        "0x0".to_string(),
        current_market.to_string(),
        format!("0x{:x}", current_amount),
    ];
    record.extend(std::iter::repeat("0x0".to_string()).take(5));
    record
}

/// mock 모드용 zkLend 이력: 사용자마다 ETH 예치, 담보 활성화, USDC 차입.
/// 사용자 i는 (i + 1) ETH를 맡기고 그 가치의 절반을 빌린다.
pub fn synthetic_zklend_history(config: &MockConfig) -> Vec<Event> {
    let (Some(eth), Some(usdc)) = (underlying_address("ETH"), underlying_address("USDC")) else {
        return Vec::new();
    };
    let mut events = Vec::with_capacity(config.user_count * 3);
    for i in 0..config.user_count {
        let user = format!("0x{:064x}", 0x1000 + i);
        let block = config.start_block + i as u64;
        let eth_amount = (i as u128 + 1) * 10u128.pow(18);
        let usdc_amount = (i as u128 + 1) * config.eth_price_usd as u128 * 10u128.pow(6) / 2;
        let steps = [
            ("Deposit", vec![user.clone(), eth.to_string(), format!("0x{:x}", eth_amount)]),
            ("CollateralEnabled", vec![user.clone(), eth.to_string()]),
            (
                "Borrowing",
                vec![
                    user.clone(),
                    usdc.to_string(),
                    format!("0x{:x}", usdc_amount),
                    format!("0x{:x}", usdc_amount),
                ],
            ),
        ];
        for (index, (name, data)) in steps.into_iter().enumerate() {
            let mut event = mock_event(block, ZKLEND_MARKET, name, vec![get_selector_from_name(name)], data);
            event.event_index = index as u64;
            events.push(event);
        }
    }
    events
}

/// mock 모드 가격
pub fn mock_prices(config: &MockConfig) -> Prices {
    let mut prices = Prices::new();
    if let Some(eth) = underlying_address("ETH") {
        prices.insert(eth.to_string(), Decimal::from(config.eth_price_usd));
    }
    for stable in ["USDC", "USDT", "DAI"] {
        if let Some(address) = underlying_address(stable) {
            prices.insert(address.to_string(), Decimal::ONE);
        }
    }
    prices
}
