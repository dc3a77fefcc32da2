// 11.0: every state change produces an event. used for audit trails and for
// notifying external systems. the EventPayload enum lists all event types.
// events of a rejected operation are dropped with the rest of its effects.

use crate::math::{Fixed, PerUnit};
use crate::types::{AccountId, Asset, FrontEndTag, Price, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Account events
    AccountFunded(AccountFundedEvent),
    PriceUpdated(PriceUpdatedEvent),

    // Trove events
    TroveUpdated(TroveUpdatedEvent),
    BorrowingFeePaid(BorrowingFeePaidEvent),
    TroveLiquidated(TroveLiquidatedEvent),
    Redistribution(RedistributionEvent),
    SystemSnapshotsUpdated(SystemSnapshotsUpdatedEvent),
    Redemption(RedemptionEvent),
    BaseRateUpdated(BaseRateUpdatedEvent),
    CollateralSurplusClaimed(CollateralSurplusClaimedEvent),

    // Stability pool events
    PoolOffset(PoolOffsetEvent),
    ScaleUpdated(ScaleUpdatedEvent),
    EpochUpdated(EpochUpdatedEvent),
    DepositUpdated(DepositUpdatedEvent),
    GainsWithdrawn(GainsWithdrawnEvent),
    RewardPaid(RewardPaidEvent),
    RewardIssued(RewardIssuedEvent),
    FrontEndRegistered(FrontEndRegisteredEvent),
    FrontEndStakeChanged(FrontEndStakeChangedEvent),
    CollateralGainMovedToTrove(CollateralGainMovedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountFundedEvent {
    pub account: AccountId,
    pub asset: Asset,
    pub amount: Fixed,
    pub new_balance: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdatedEvent {
    pub price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TroveOperation {
    Open,
    Adjust,
    Close,
    Liquidate,
    Redeem,
    MoveCollateralGain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroveUpdatedEvent {
    pub owner: AccountId,
    pub collateral: Fixed,
    pub debt: Fixed,
    pub stake: Fixed,
    pub operation: TroveOperation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowingFeePaidEvent {
    pub owner: AccountId,
    pub fee: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseRateUpdatedEvent {
    pub base_rate: Fixed,
    pub last_fee_operation: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroveLiquidatedEvent {
    pub owner: AccountId,
    pub liquidator: AccountId,
    pub debt: Fixed,
    pub collateral: Fixed,
    pub debt_offset: Fixed,
    pub collateral_to_pool: Fixed,
    pub debt_redistributed: Fixed,
    pub collateral_redistributed: Fixed,
    pub collateral_gas_compensation: Fixed,
    pub stable_gas_compensation: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedistributionEvent {
    pub debt: Fixed,
    pub collateral: Fixed,
    pub l_collateral: Fixed,
    pub l_debt: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshotsUpdatedEvent {
    pub total_stakes: Fixed,
    pub total_collateral: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionEvent {
    pub redeemer: AccountId,
    pub attempted: Fixed,
    pub redeemed: Fixed,
    pub collateral_sent: Fixed,
    pub fee: Fixed,
    pub troves_touched: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralSurplusClaimedEvent {
    pub owner: AccountId,
    pub amount: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolOffsetEvent {
    pub debt: Fixed,
    pub collateral: Fixed,
    pub p: Fixed,
    pub sum: PerUnit,
    pub total_deposits: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleUpdatedEvent {
    pub scale: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochUpdatedEvent {
    pub epoch: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositUpdatedEvent {
    pub depositor: AccountId,
    pub deposit: Fixed,
    pub front_end: FrontEndTag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GainsWithdrawnEvent {
    pub depositor: AccountId,
    pub collateral: Fixed,
    /// Principal lost to offsets since the last touch
    pub stable_loss: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardPaidEvent {
    pub recipient: AccountId,
    pub amount: Fixed,
    pub front_end: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardIssuedEvent {
    pub amount: Fixed,
    pub total_issued: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontEndRegisteredEvent {
    pub front_end: AccountId,
    pub kickback_rate: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontEndStakeChangedEvent {
    pub front_end: AccountId,
    pub stake: Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralGainMovedEvent {
    pub depositor: AccountId,
    pub amount: Fixed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_to_json() {
        let event = Event::new(
            EventId(7),
            Timestamp::from_millis(1000),
            EventPayload::DepositUpdated(DepositUpdatedEvent {
                depositor: AccountId(1),
                deposit: Fixed::from(500),
                front_end: FrontEndTag::ViaFrontEnd(AccountId(3)),
            }),
        );

        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, EventId(7));
        match back.payload {
            EventPayload::DepositUpdated(e) => {
                assert_eq!(e.deposit, Fixed::from(500));
                assert_eq!(e.front_end.front_end(), Some(AccountId(3)));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
