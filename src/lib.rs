// Starknet lending loan state engine

pub mod config;
pub mod constants;
pub mod types;
pub mod utils;

pub mod events;
pub mod ledger;
pub mod protocols;
pub mod state;

pub mod blockchain;
pub mod oracle;
pub mod storage;

pub mod replay;
pub mod risk;
pub mod runtime;

pub mod mocks;

pub use config::Config;
pub use replay::{replay_protocol, EventReplayDriver, ReplayStats};
pub use state::ProtocolState;
pub use types::ProtocolId;
