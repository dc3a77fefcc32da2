// Price Feed Integration
//
// The engine only needs one number: the collateral price in stable units. This
// module turns updates from any number of oracle sources into that number, and
// keeps the last good price around for when every source has gone quiet.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::journal::Transactional;
use crate::types::{Price, Timestamp};

/// Unique identifier for a price source
pub type PriceSourceId = u32;

/// A single price update from an oracle or feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub price: Decimal,
    pub timestamp: Timestamp,
    pub source_id: PriceSourceId,
    /// Seconds before this update is considered stale
    pub ttl_seconds: i64,
}

impl PriceUpdate {
    pub fn new(price: Decimal, timestamp: Timestamp, source_id: PriceSourceId) -> Self {
        Self {
            price,
            timestamp,
            source_id,
            ttl_seconds: 14_400, // 4 hours
        }
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    pub fn is_stale(&self, now: Timestamp) -> bool {
        now.as_millis() > self.timestamp.as_millis() + self.ttl_seconds * 1000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    /// Minimum number of fresh sources required for a valid price
    pub min_sources: usize,
    /// Maximum spread between sources as a ratio of the lowest (0.02 = 2%)
    pub max_source_deviation: Decimal,
    /// Maximum move away from the last good price, if bounded
    pub max_move_from_last: Option<Decimal>,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            min_sources: 1,
            max_source_deviation: Decimal::new(2, 2), // 2%
            max_move_from_last: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceFeedError {
    #[error("Need {required} fresh sources, have {available}")]
    InsufficientSources { required: usize, available: usize },

    #[error("All price sources are stale")]
    AllSourcesStale,

    #[error("Sources deviate by {deviation}")]
    ExcessiveDeviation { deviation: Decimal },

    #[error("Price moved {change} from the last good price")]
    ExcessiveMove { change: Decimal },

    #[error("Price {0} is not positive")]
    InvalidPrice(Decimal),

    #[error("No price available")]
    NoPriceAvailable,
}

/// Price handed to the engine, with whether it came from fresh sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    pub price: Price,
    pub fresh: bool,
}

#[derive(Debug, Clone)]
pub struct PriceFeed {
    config: PriceFeedConfig,
    /// Recent prices from each source (source_id -> price history)
    source_prices: Vec<(PriceSourceId, VecDeque<PriceUpdate>)>,
    max_history: usize,
    last_good_price: Option<Price>,
    // one entry per recorded submission: the source, and the update it pushed out if any
    undo: Vec<(PriceSourceId, Option<PriceUpdate>)>,
    recording: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FeedCheckpoint {
    submissions: usize,
    last_good_price: Option<Price>,
}

impl PriceFeed {
    pub fn new(config: PriceFeedConfig) -> Self {
        Self {
            config,
            source_prices: Vec::new(),
            max_history: 100,
            last_good_price: None,
            undo: Vec::new(),
            recording: false,
        }
    }

    pub fn last_good_price(&self) -> Option<Price> {
        self.last_good_price
    }

    pub fn submit_price(&mut self, update: PriceUpdate) -> Result<(), PriceFeedError> {
        if update.price <= Decimal::ZERO {
            return Err(PriceFeedError::InvalidPrice(update.price));
        }

        let entry = self
            .source_prices
            .iter_mut()
            .find(|(id, _)| *id == update.source_id);

        let source_id = update.source_id;
        let mut evicted = None;
        if let Some((_, history)) = entry {
            history.push_back(update);
            if history.len() > self.max_history {
                evicted = history.pop_front();
            }
        } else {
            let mut history = VecDeque::new();
            history.push_back(update);
            self.source_prices.push((source_id, history));
        }
        if self.recording {
            self.undo.push((source_id, evicted));
        }
        Ok(())
    }

    /// Median of the fresh sources at `now`.
    pub fn aggregate(&self, now: Timestamp) -> Result<Price, PriceFeedError> {
        let mut fresh: Vec<Decimal> = self
            .source_prices
            .iter()
            .filter_map(|(_, history)| history.back())
            .filter(|update| !update.is_stale(now))
            .map(|update| update.price)
            .collect();

        if fresh.is_empty() {
            return Err(PriceFeedError::AllSourcesStale);
        }
        if fresh.len() < self.config.min_sources {
            return Err(PriceFeedError::InsufficientSources {
                required: self.config.min_sources,
                available: fresh.len(),
            });
        }

        fresh.sort();
        let (lowest, highest) = (fresh[0], fresh[fresh.len() - 1]);
        let deviation = (highest - lowest) / lowest;
        if deviation > self.config.max_source_deviation {
            return Err(PriceFeedError::ExcessiveDeviation { deviation });
        }

        let len = fresh.len();
        let median = if len % 2 == 0 {
            (fresh[len / 2 - 1] + fresh[len / 2]) / Decimal::TWO
        } else {
            fresh[len / 2]
        };

        if let (Some(limit), Some(last)) = (self.config.max_move_from_last, self.last_good_price) {
            let last = last.value().value();
            let change = (median - last).abs() / last;
            if change > limit {
                return Err(PriceFeedError::ExcessiveMove { change });
            }
        }

        Price::new(median).ok_or(PriceFeedError::InvalidPrice(median))
    }

    /// Current price, falling back to the last good one when the sources fail.
    pub fn fetch_price(&mut self, now: Timestamp) -> Result<PriceReading, PriceFeedError> {
        match self.aggregate(now) {
            Ok(price) => {
                self.last_good_price = Some(price);
                Ok(PriceReading { price, fresh: true })
            }
            Err(err) => match self.last_good_price {
                Some(price) => Ok(PriceReading { price, fresh: false }),
                None => Err(err),
            },
        }
    }

    pub fn sources(&self) -> Vec<PriceSourceId> {
        self.source_prices.iter().map(|(id, _)| *id).collect()
    }
}

impl Transactional for PriceFeed {
    type Checkpoint = FeedCheckpoint;

    fn begin(&mut self) -> FeedCheckpoint {
        self.recording = true;
        FeedCheckpoint {
            submissions: self.undo.len(),
            last_good_price: self.last_good_price,
        }
    }

    fn rollback(&mut self, checkpoint: FeedCheckpoint) {
        while self.undo.len() > checkpoint.submissions {
            let Some((source_id, evicted)) = self.undo.pop() else {
                break;
            };
            let Some(index) = self.source_prices.iter().position(|(id, _)| *id == source_id) else {
                continue;
            };
            let history = &mut self.source_prices[index].1;
            history.pop_back();
            if let Some(update) = evicted {
                history.push_front(update);
            }
            if history.is_empty() {
                self.source_prices.remove(index);
            }
        }
        self.last_good_price = checkpoint.last_good_price;
    }

    fn commit(&mut self) -> usize {
        self.recording = false;
        let writes = self.undo.len();
        self.undo.clear();
        writes
    }
}
