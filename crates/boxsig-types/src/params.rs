//! Network parameters needed to build funding payments

use serde::{Deserialize, Serialize};

/// Rounds a payment stays valid when the source reports only the current round
pub const DEFAULT_VALIDITY_WINDOW: u64 = 1000;

/// Minimum transaction fee on the ledger, in micro-units
pub const MIN_TXN_FEE: u64 = 1000;

/// Suggested parameters for the next transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedParams {
    /// Fee per byte suggested by the node (0 when the network is idle)
    pub fee_per_byte: u64,
    /// Minimum flat fee
    pub min_fee: u64,
    /// First round the transaction is valid in
    pub first_valid: u64,
    /// Last round the transaction is valid in
    pub last_valid: u64,
    /// Genesis id of the network
    pub genesis_id: String,
    /// Base64 genesis hash of the network
    pub genesis_hash: String,
}

impl SuggestedParams {
    /// Parameters valid from `round` for [`DEFAULT_VALIDITY_WINDOW`] rounds
    pub fn at_round(round: u64, genesis_id: &str, genesis_hash: &str) -> Self {
        Self {
            fee_per_byte: 0,
            min_fee: MIN_TXN_FEE,
            first_valid: round,
            last_valid: round.saturating_add(DEFAULT_VALIDITY_WINDOW),
            genesis_id: genesis_id.to_string(),
            genesis_hash: genesis_hash.to_string(),
        }
    }

    /// Flat fee for a transaction of `size` encoded bytes, never below the minimum fee
    pub fn fee_for_size(&self, size: usize) -> u64 {
        self.fee_per_byte
            .saturating_mul(size as u64)
            .max(self.min_fee)
    }

    /// Whether the parameters are still usable at `round`
    pub fn is_valid_at(&self, round: u64) -> bool {
        (self.first_valid..=self.last_valid).contains(&round)
    }
}
