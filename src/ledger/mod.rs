pub mod interest_rate;
pub mod loan_entity;
pub mod portfolio;
pub mod strategy;
pub mod token_registry;

pub use interest_rate::{InterestRateModelPair, InterestRateModels};
pub use loan_entity::{LoanDetails, LoanEntity, ValuationContext};
pub use portfolio::Portfolio;
pub use strategy::{HealthFactorStrategy, LiquidationStrategy, RiskModel};
pub use token_registry::{RegisteredToken, TokenKind, TokenParameters, TokenRegistry, TokenSettings};
