use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PriceOracle;
use crate::constants::{underlying_address, underlying_token};
use crate::types::Prices;
use crate::utils::felt::felt_to_decimal;
use crate::utils::math::pow10;

const USDC_DECIMALS: u32 = 6;

/// AVNU 견적 API 기반 가격 오라클.
/// 고정된 USDC 금액을 각 토큰으로 바꾸는 견적 중 가장 좋은 `buyAmount`로 가격을 계산한다.
pub struct AvnuPriceOracle {
    client: Client,
    url: String,
    sell_amount_usdc: u64,
    /// 심볼 -> 고정 가격 (USDC, 견적이 없는 토큰)
    pinned_prices: HashMap<String, Decimal>,
    retry_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    #[serde(default)]
    prices: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(rename = "buyAmount")]
    buy_amount: String,
}

impl AvnuPriceOracle {
    pub fn new(
        url: &str,
        sell_amount_usdc: u64,
        pinned_prices: HashMap<String, Decimal>,
        timeout: Duration,
        retry_delay: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            sell_amount_usdc,
            pinned_prices,
            retry_delay,
        })
    }

    fn pinned_price(&self, token: &str) -> Option<Decimal> {
        let (symbol, _) = underlying_token(token)?;
        self.pinned_prices.get(symbol).copied()
    }

    async fn fetch_quotes(&self, usdc: &str, token: &str) -> Result<Vec<Quote>> {
        let sell_amount = u128::from(self.sell_amount_usdc) * 10u128.pow(USDC_DECIMALS);
        let response: QuotesResponse = self
            .client
            .get(&self.url)
            .query(&[
                ("sellTokenAddress", usdc.to_string()),
                ("buyTokenAddress", token.to_string()),
                ("sellAmount", format!("0x{:x}", sell_amount)),
            ])
            .send()
            .await
            .with_context(|| format!("AVNU quote request failed for {}", token))?
            .error_for_status()?
            .json()
            .await
            .context("AVNU quote response is not valid JSON")?;
        Ok(response.prices)
    }

    async fn get_price(&self, usdc: &str, token: &str, decimals: u32) -> Result<Option<Decimal>> {
        let mut quotes = self.fetch_quotes(usdc, token).await?;
        if quotes.is_empty() {
            warn!("⚠️ {} 견적이 비어 있습니다. 잠시 후 한 번 더 시도합니다", token);
            tokio::time::sleep(self.retry_delay).await;
            quotes = self.fetch_quotes(usdc, token).await?;
        }
        Ok(price_from_quotes(&quotes, self.sell_amount_usdc, decimals))
    }
}

/// 가격 = 판매한 USDC / 받은 토큰 수량
fn price_from_quotes(quotes: &[Quote], sell_amount_usdc: u64, decimals: u32) -> Option<Decimal> {
    let best = quotes
        .iter()
        .filter_map(|quote| felt_to_decimal(&quote.buy_amount))
        .max()?;
    if best.is_zero() {
        return None;
    }
    let tokens_bought = best / pow10(decimals);
    Decimal::from(sell_amount_usdc).checked_div(tokens_bought)
}

#[async_trait]
impl PriceOracle for AvnuPriceOracle {
    async fn get_prices(&self, token_decimals: &HashMap<String, u32>) -> Result<Prices> {
        let usdc = underlying_address("USDC").context("USDC address missing")?;
        let mut prices = Prices::new();
        for (token, decimals) in token_decimals {
            if let Some((symbol, known_decimals)) = underlying_token(token) {
                if known_decimals != *decimals {
                    warn!(
                        "⚠️ {} 소수점 불일치 (요청 {}, 알려진 값 {}), 가격을 건너뜁니다",
                        symbol, decimals, known_decimals
                    );
                    continue;
                }
            }
            if token == usdc {
                prices.insert(token.clone(), Decimal::ONE);
                continue;
            }
            if let Some(price) = self.pinned_price(token) {
                prices.insert(token.clone(), price);
                continue;
            }
            match self.get_price(usdc, token, *decimals).await {
                Ok(Some(price)) => {
                    debug!("{} 가격: {}", token, price);
                    prices.insert(token.clone(), price);
                }
                Ok(None) => warn!("⚠️ {} 가격을 얻지 못했습니다", token),
                Err(e) => warn!("⚠️ {} 가격 조회 실패: {}", token, e),
            }
        }
        info!("💰 AVNU 가격 {}개 수집", prices.len());
        Ok(prices)
    }

    fn source_name(&self) -> &'static str {
        "avnu"
    }
}
