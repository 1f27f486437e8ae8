//! Storage cost quotes and funding amounts
//!
//! Every box write must be pre-funded with the increase of the contract's
//! minimum balance. The calculator asks a [`CostOracle`] for the cost of the
//! new and the previously stored size and reports the signed difference.
//! [`FundingPolicy`] turns a quote into the payment amount.

use async_trait::async_trait;
use boxsig_errors::{Error, Result};
use boxsig_log::debug;
use boxsig_types::{SIGNATURE_KEY_LEN, SLOT_KEY_LEN};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ledger charge per box, in micro-units
pub const BOX_FLAT_COST: u64 = 2_500;

/// Ledger charge per byte of box key and value, in micro-units
pub const BOX_BYTE_COST: u64 = 400;

/// Kind of payload a box holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostCategory {
    Transaction,
    Signature,
}

impl CostCategory {
    /// Width of the box key used for this category
    pub fn key_len(self) -> usize {
        match self {
            CostCategory::Transaction => SLOT_KEY_LEN,
            CostCategory::Signature => SIGNATURE_KEY_LEN,
        }
    }
}

/// Minimum-balance cost of storing `byte_length` bytes
#[async_trait]
pub trait CostOracle: Send + Sync {
    async fn cost_for_size(&self, category: CostCategory, byte_length: u32) -> Result<u64>;
}

/// Signed cost difference between the stored and the new payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostQuote {
    pub category: CostCategory,
    pub prior_size: u32,
    pub new_size: u32,
    pub prior_cost: u64,
    pub new_cost: u64,
    pub delta: i64,
}

impl CostQuote {
    /// Whether the write creates the entry rather than replacing one
    pub fn is_fresh(&self) -> bool {
        self.prior_size == 0
    }
}

/// Quotes storage costs against a remote oracle
#[derive(Clone)]
pub struct CostCalculator {
    oracle: Arc<dyn CostOracle>,
}

impl std::fmt::Debug for CostCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostCalculator").finish_non_exhaustive()
    }
}

impl CostCalculator {
    pub fn new(oracle: Arc<dyn CostOracle>) -> Self {
        Self { oracle }
    }

    /// Quote a transaction slot write; `prior_size == 0` means a fresh slot
    pub async fn quote_transaction_cost(&self, prior_size: u32, new_size: u32) -> Result<CostQuote> {
        self.quote(CostCategory::Transaction, prior_size, new_size).await
    }

    /// Quote a signature write; `prior_size == 0` means no stored signature
    pub async fn quote_signature_cost(&self, prior_size: u32, new_size: u32) -> Result<CostQuote> {
        self.quote(CostCategory::Signature, prior_size, new_size).await
    }

    pub async fn quote(
        &self,
        category: CostCategory,
        prior_size: u32,
        new_size: u32,
    ) -> Result<CostQuote> {
        let new_cost = self.cost_of(category, new_size).await?;
        let prior_cost = self.cost_of(category, prior_size).await?;
        let delta = i64::try_from(i128::from(new_cost) - i128::from(prior_cost))
            .map_err(|_| Error::EncodingError("cost delta overflows i64".to_string()))?;

        debug!(?category, prior_size, new_size, prior_cost, new_cost, delta, "quoted storage cost");
        Ok(CostQuote {
            category,
            prior_size,
            new_size,
            prior_cost,
            new_cost,
            delta,
        })
    }

    // Size zero is an absent entry and costs nothing
    async fn cost_of(&self, category: CostCategory, size: u32) -> Result<u64> {
        if size == 0 {
            return Ok(0);
        }
        self.oracle
            .cost_for_size(category, size)
            .await
            .map_err(|err| match err {
                Error::CostOracleUnavailable(_) => err,
                other => Error::CostOracleUnavailable(other.to_string()),
            })
    }
}

/// Turns quotes into funding payment amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPolicy {
    /// Added to every replacement payment
    pub fee_buffer: u64,
}

impl FundingPolicy {
    pub fn new(fee_buffer: u64) -> Self {
        Self { fee_buffer }
    }

    /// Amount the payer transfers before the write.
    ///
    /// A fresh write pays exactly the cost increase. A replacement pays the
    /// positive part of the delta plus the buffer, so a shrinking
    /// replacement still pays the buffer.
    pub fn funding_amount(&self, quote: &CostQuote) -> u64 {
        let increase = u64::try_from(quote.delta.max(0)).unwrap_or(0);
        if quote.is_fresh() {
            increase
        } else {
            increase.saturating_add(self.fee_buffer)
        }
    }
}

impl Default for FundingPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FEE_BUFFER)
    }
}

/// The ledger's box minimum-balance formula
///
/// `flat + per_byte * (key_len + value_overhead + size)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxMbrSchedule {
    pub flat: u64,
    pub per_byte: u64,
    /// Extra bytes the contract stores next to each transaction value
    pub transaction_value_overhead: u32,
    /// Extra bytes the contract stores next to each signature value
    pub signature_value_overhead: u32,
}

impl Default for BoxMbrSchedule {
    fn default() -> Self {
        Self {
            flat: BOX_FLAT_COST,
            per_byte: BOX_BYTE_COST,
            transaction_value_overhead: 0,
            signature_value_overhead: 0,
        }
    }
}

impl BoxMbrSchedule {
    pub fn with_signature_overhead(mut self, overhead: u32) -> Self {
        self.signature_value_overhead = overhead;
        self
    }

    /// Cost of one box holding `size` value bytes
    pub fn cost(&self, category: CostCategory, size: u32) -> u64 {
        let overhead = match category {
            CostCategory::Transaction => self.transaction_value_overhead,
            CostCategory::Signature => self.signature_value_overhead,
        };
        let bytes = category.key_len() as u64 + u64::from(overhead) + u64::from(size);
        self.flat.saturating_add(self.per_byte.saturating_mul(bytes))
    }
}

#[async_trait]
impl CostOracle for BoxMbrSchedule {
    async fn cost_for_size(&self, category: CostCategory, byte_length: u32) -> Result<u64> {
        Ok(self.cost(category, byte_length))
    }
}
