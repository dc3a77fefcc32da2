// 8.0: protocol engine. coordinates troves, the stability pool, liquidations
// and redemptions over in-memory custody and a price feed.
// deterministic and event-driven with no external I/O. every public mutating
// operation is all-or-nothing.

mod config;
mod core;
mod troves;
mod stability;
mod liquidations;
mod redemptions;
mod results;

pub use config::EngineConfig;
pub use core::{Engine, ProtocolFees};
pub use results::{
    BatchLiquidationResult, CloseResult, EngineError, ErrorKind, LiquidationResult, RedemptionResult,
    TroveResult,
};
pub use troves::TroveAdjustment;
