use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::constants::ZKLEND_MARKET;
use crate::ledger::{TokenKind, TokenRegistry};
use crate::protocols::ChainReader;
use crate::utils::felt::add_leading_zeros;

type CallKey = (String, String, Vec<String>);

/// 미리 등록한 응답만 돌려주는 ChainReader. 등록되지 않은 호출은 에러
#[derive(Debug, Default)]
pub struct ScriptedChainReader {
    responses: HashMap<CallKey, Vec<String>>,
    calls: Mutex<Vec<CallKey>>,
}

impl ScriptedChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, contract: &str, function: &str, calldata: &[&str], response: Vec<String>) -> Self {
        let calldata = calldata.iter().map(|felt| felt.to_string()).collect();
        self.responses
            .insert((add_leading_zeros(contract), function.to_string(), calldata), response);
        self
    }

    /// 지금까지 받은 호출 수
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChainReader for ScriptedChainReader {
    async fn call(&self, contract: &str, function: &str, calldata: &[String]) -> anyhow::Result<Vec<String>> {
        let key = (add_leading_zeros(contract), function.to_string(), calldata.to_vec());
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("🎭 [MOCK] unscripted call {}::{}({:?})", contract, function, calldata))
    }
}

/// mock 모드용 zkLend `get_reserve_data` 응답. 모든 reserve가 담보 계수 0.8, 청산 보너스 0.1
pub fn mock_zklend_reader(registry: &TokenRegistry) -> ScriptedChainReader {
    // 27자리 고정소수점
    let scaled = |tenths: u128| format!("0x{:x}", tenths * 10u128.pow(26));
    registry
        .tokens_of_kind(TokenKind::Underlying)
        .enumerate()
        .fold(ScriptedChainReader::new(), |reader, (i, token)| {
            let mut reserve = vec!["0x1".to_string(); 16];
            reserve[1] = format!("0x{:x}", token.decimals);
            reserve[2] = format!("0x{:064x}", 0x2000 + i);
            reserve[4] = scaled(8);
            reserve[5] = scaled(10);
            reserve[14] = scaled(1);
            reader.with_response(ZKLEND_MARKET, "get_reserve_data", &[token.address.as_str()], reserve)
        })
}
