// stability-core: stablecoin trove ledger and stability pool engine.
// lazy pro-rata accounting: no operation iterates over depositors or troves to
// distribute a gain or a loss. all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, Asset, FrontEndTag, Caller, Price, Timestamp
//   2.x  math.rs: 18-decimal fixed point, per-unit sums, collateral ratios
//   3.x  accumulator.rs: P/S/G product-and-sum accumulator, L redistribution totals
//   4.x  stability_pool.rs: deposits, front ends, offsets
//   4.6  stability_deposit.rs: depositor view and target-value changes
//   5.1  issuance.rs: time-decaying reward issuance
//   5.2  fees.rs: decaying base rate, borrowing and redemption fees
//   6.x  trove.rs: trove ledger, stakes, pending rewards
//   6.5  liquidation.rs: liquidation checks, gas compensation, offset split
//   7.x  config.rs: protocol parameters, env presets
//   8.x  engine/: core engine: troves, stability pool, liquidations, redemptions
//   9.1  price_feed.rs: oracle aggregation (mocked)
//   9.2  custody.rs: token balances (mocked)
//   10.x journal.rs: undo logs for all-or-nothing operations
//   11.x events.rs: state transition events for audit

// accounting modules
pub mod accumulator;
pub mod fees;
pub mod issuance;
pub mod journal;
pub mod math;
pub mod stability_deposit;
pub mod stability_pool;
pub mod trove;
pub mod types;

// protocol modules
pub mod engine;
pub mod events;
pub mod liquidation;

// integration modules
pub mod config;
pub mod custody;
pub mod price_feed;

// re exports for convenience
pub use accumulator::*;
pub use engine::*;
pub use events::*;
pub use fees::*;
pub use issuance::*;
pub use journal::{JournaledMap, JournaledSet, Transactional};
pub use liquidation::*;
pub use math::*;
pub use stability_deposit::*;
pub use stability_pool::*;
pub use trove::*;
pub use types::*;
pub use config::{ConfigError, Environment, ProtocolParams};
pub use custody::{Custody, TransferError};
pub use price_feed::{PriceFeed, PriceFeedConfig, PriceFeedError, PriceReading, PriceUpdate};
