pub mod avnu;
pub mod static_oracle;

pub use avnu::AvnuPriceOracle;
pub use static_oracle::StaticPriceOracle;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::types::Prices;

/// 가격 오라클 트레이트
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// 기초 자산 주소 -> 소수점을 받아 USD 가격을 돌려준다.
    /// 가격을 얻지 못한 토큰은 결과에서 빠진다.
    async fn get_prices(&self, token_decimals: &HashMap<String, u32>) -> anyhow::Result<Prices>;

    /// 가격 소스 이름
    fn source_name(&self) -> &'static str;
}
