// 8.8 engine/redemptions.rs: swap stable for collateral at face value.
// troves are drawn from lowest ICR up, skipping any under MCR. a fully redeemed trove is
// closed and whatever collateral it had left waits as surplus for its owner.
// the fee is taken from the collateral drawn after the redemption has raised the base rate.

use super::core::Engine;
use super::results::{EngineError, RedemptionResult};
use crate::custody::TransferError;
use crate::events::{CollateralSurplusClaimedEvent, EventPayload, RedemptionEvent, TroveOperation, TroveUpdatedEvent};
use crate::fees::Fees;
use crate::math::Fixed;
use crate::trove::TroveStatus;
use crate::types::{AccountId, Asset};

impl Engine {
    /// Redeem up to `amount` stable. `max_iterations` caps the troves touched; zero means no cap.
    pub fn redeem_collateral(
        &mut self,
        redeemer: AccountId,
        amount: Fixed,
        max_iterations: usize,
    ) -> Result<RedemptionResult, EngineError> {
        self.atomically(|engine| {
            if amount.is_zero() {
                return Err(EngineError::ZeroAmount);
            }
            let available = engine.state.custody.balance(redeemer, Asset::Stable);
            if available < amount {
                return Err(TransferError::InsufficientBalance {
                    account: redeemer,
                    asset: Asset::Stable,
                    available,
                    requested: amount,
                }
                .into());
            }

            let price = engine.fetch_price()?;
            let mcr = engine.config.params.mcr();
            let tcr = engine.state.ledger.tcr(price)?;
            if tcr < mcr {
                return Err(EngineError::TcrBelowMcr { tcr });
            }
            let supply = engine.state.ledger.total_debt()?;

            let gas = engine.config.params.stable_gas_compensation();
            let min_net_debt = engine.config.params.min_net_debt();
            let mut result = RedemptionResult {
                attempted: amount,
                ..Default::default()
            };
            let mut remaining = amount;

            let mut cursor = engine.state.ledger.lowest();
            while let Some(owner) = cursor {
                if remaining.is_zero() {
                    break;
                }
                if max_iterations != 0 && result.troves_touched.len() >= max_iterations {
                    break;
                }
                // the trove may move or close below, so step the cursor first
                cursor = engine.state.ledger.next_above(owner)?;
                if engine.state.ledger.icr(owner, price)? < mcr {
                    continue;
                }

                let position = engine.state.ledger.apply_pending_rewards(owner)?;
                let stable = remaining.min(position.debt.saturating_sub(gas));
                let collateral = price.collateral_for(stable)?;
                let new_debt = position.debt.checked_sub(stable)?;
                let new_collateral = position.collateral.checked_sub(collateral)?;

                if new_debt == gas {
                    if engine.state.ledger.active_count() <= 1 {
                        break;
                    }
                    engine.state.ledger.close(owner, TroveStatus::ClosedByRedemption)?;
                    engine.state.custody.burn_held(Asset::Stable, gas)?;
                    engine.state.gas_pool = engine.state.gas_pool.checked_sub(gas)?;
                    let surplus = engine.state.surplus.get(&owner).copied().unwrap_or(Fixed::ZERO);
                    engine.state.surplus.insert(owner, surplus.checked_add(new_collateral)?);

                    engine.emit_event(EventPayload::TroveUpdated(TroveUpdatedEvent {
                        owner,
                        collateral: Fixed::ZERO,
                        debt: Fixed::ZERO,
                        stake: Fixed::ZERO,
                        operation: TroveOperation::Redeem,
                    }));
                    result.troves_closed.push(owner);
                } else {
                    // a partial redemption may not leave the trove under the debt floor
                    if new_debt.saturating_sub(gas) < min_net_debt {
                        break;
                    }
                    let trove = engine.state.ledger.set_position(owner, new_collateral, new_debt)?;
                    engine.emit_trove_updated(&trove, TroveOperation::Redeem);
                }

                result.troves_touched.push(owner);
                remaining = remaining.checked_sub(stable)?;
                result.collateral_drawn = result.collateral_drawn.checked_add(collateral)?;
            }

            result.redeemed = amount.checked_sub(remaining)?;
            if result.redeemed.is_zero() {
                return Err(EngineError::NothingRedeemed);
            }

            let params = engine.config.params.fee_params();
            let fees = Fees::new(&engine.state.base_rate, params, engine.current_time, false)?;
            result.fee = result
                .collateral_drawn
                .checked_mul(fees.redemption_rate(result.redeemed, supply)?)?;
            if result.fee >= result.collateral_drawn {
                return Err(EngineError::FeeExceedsCollateral {
                    fee: result.fee,
                    drawn: result.collateral_drawn,
                });
            }
            let before = engine.state.base_rate;
            engine
                .state
                .base_rate
                .raise_by_redemption(result.redeemed, supply, engine.current_time, &params)?;
            engine.emit_base_rate_if_changed(before);

            engine.state.fees.collateral = engine.state.fees.collateral.checked_add(result.fee)?;
            engine.state.custody.burn(redeemer, Asset::Stable, result.redeemed)?;
            let collateral_sent = result.collateral_drawn.checked_sub(result.fee)?;
            engine.state.custody.credit(redeemer, Asset::Collateral, collateral_sent)?;

            engine.emit_event(EventPayload::Redemption(RedemptionEvent {
                redeemer,
                attempted: amount,
                redeemed: result.redeemed,
                collateral_sent,
                fee: result.fee,
                troves_touched: result.troves_touched.len(),
            }));
            Ok(result)
        })
    }

    /// Pay out collateral left behind when a trove was closed by redemption.
    pub fn claim_collateral_surplus(&mut self, owner: AccountId) -> Result<Fixed, EngineError> {
        self.atomically(|engine| {
            let amount = engine
                .state
                .surplus
                .remove(&owner)
                .filter(|amount| !amount.is_zero())
                .ok_or(EngineError::NoSurplus(owner))?;
            engine.state.custody.credit(owner, Asset::Collateral, amount)?;
            engine.emit_event(EventPayload::CollateralSurplusClaimed(CollateralSurplusClaimedEvent {
                owner,
                amount,
            }));
            Ok(amount)
        })
    }
}
