use async_trait::async_trait;
use std::collections::HashMap;

use super::PriceOracle;
use crate::types::Prices;

/// 고정 가격표. 테스트와 mock 모드에서 쓴다
#[derive(Debug, Clone, Default)]
pub struct StaticPriceOracle {
    prices: Prices,
}

impl StaticPriceOracle {
    pub fn new(prices: Prices) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn get_prices(&self, token_decimals: &HashMap<String, u32>) -> anyhow::Result<Prices> {
        Ok(token_decimals
            .keys()
            .filter_map(|token| self.prices.get(token).map(|price| (token.clone(), *price)))
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}
