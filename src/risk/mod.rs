//! 재구성된 상태 위의 위험 지표: 청산 깊이 곡선, loan 통계, 프로토콜 통계

pub mod aggregator;
pub mod protocol_stats;

pub use aggregator::{collateral_price_range, LiquidablePoint, LoanStatRecord, RiskAggregator};
pub use protocol_stats::{compute_protocol_stats, GeneralStats, ProtocolStats};
