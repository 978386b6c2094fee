//! Payout Instructions
//!
//! The engine never moves money. On a resolved race it hands the payment
//! collaborator one instruction; aborted races produce none.

use serde::{Serialize, Deserialize};
use tracing::info;
use uuid::Uuid;

use crate::race::config::BPS_SCALE;
use crate::race::resolver::TerminalRecord;
use crate::race::roster::ParticipantId;

/// Pot rules. Amounts are in the currency's smallest unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PotConfig {
    /// Stake per entrant.
    pub buy_in: u64,
    /// House share of the gross pot, in basis points.
    pub house_fee_bps: u32,
}

impl Default for PotConfig {
    fn default() -> Self {
        Self {
            // 0.001 ETH in wei
            buy_in: 1_000_000_000_000_000,
            house_fee_bps: 1000,
        }
    }
}

impl PotConfig {
    /// Split the pot for `entrants` stakes: `(gross, house_fee, winner_amount)`.
    pub fn split(&self, entrants: usize) -> Result<(u64, u64, u64), PayoutError> {
        if self.house_fee_bps > BPS_SCALE {
            return Err(PayoutError::InvalidFee(self.house_fee_bps));
        }
        let gross = self
            .buy_in
            .checked_mul(entrants as u64)
            .ok_or(PayoutError::Overflow)?;
        // u128 so the product cannot overflow
        let fee = (gross as u128 * self.house_fee_bps as u128 / BPS_SCALE as u128) as u64;
        Ok((gross, fee, gross - fee))
    }
}

/// What the payment collaborator should pay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutInstruction {
    /// Race identifier.
    pub race_id: Uuid,
    /// Recipient.
    pub winner: ParticipantId,
    /// Amount for the winner.
    pub pot_amount: u64,
    /// All stakes.
    pub gross_pot: u64,
    /// House share.
    pub house_fee: u64,
}

/// External payment system.
pub trait PaymentCollaborator: Send + Sync {
    /// Execute a payout.
    fn pay(&self, instruction: &PayoutInstruction) -> Result<(), PayoutError>;
}

/// Payout errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayoutError {
    /// Fee above 100%.
    #[error("house fee {0} bps exceeds 10000")]
    InvalidFee(u32),

    /// Pot does not fit in u64.
    #[error("pot overflows")]
    Overflow,

    /// Collaborator refused.
    #[error("payment rejected: {0}")]
    Rejected(String),
}

/// Build the instruction for a terminal record. `None` for aborted races.
pub fn payout_instruction(
    race_id: Uuid,
    record: &TerminalRecord,
    entrants: usize,
    pot: &PotConfig,
) -> Result<Option<PayoutInstruction>, PayoutError> {
    let Some(winner) = record.winner() else {
        return Ok(None);
    };
    let (gross_pot, house_fee, pot_amount) = pot.split(entrants)?;
    Ok(Some(PayoutInstruction {
        race_id,
        winner,
        pot_amount,
        gross_pot,
        house_fee,
    }))
}

/// Hand a resolved race to the collaborator. Returns what was paid.
pub fn settle(
    race_id: Uuid,
    record: &TerminalRecord,
    entrants: usize,
    pot: &PotConfig,
    collaborator: &dyn PaymentCollaborator,
) -> Result<Option<PayoutInstruction>, PayoutError> {
    let Some(instruction) = payout_instruction(race_id, record, entrants, pot)? else {
        info!("Race {} ended without a winner; no payout", race_id);
        return Ok(None);
    };

    collaborator.pay(&instruction)?;
    info!(
        "Race {} paid {} to {} (fee {})",
        race_id, instruction.pot_amount, instruction.winner, instruction.house_fee
    );
    Ok(Some(instruction))
}
