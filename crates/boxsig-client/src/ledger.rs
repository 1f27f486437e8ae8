//! Remote collaborators the protocol drives

use crate::composer::PendingOperation;
use async_trait::async_trait;
use boxsig_errors::Result;
use boxsig_types::{Address, BoxName, SuggestedParams};
use serde::{Deserialize, Serialize};

/// Outcome of one submitted contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReceipt {
    pub tx_id: String,
    /// ABI return value, present for calls that allocate an id
    pub return_value: Option<u64>,
}

/// Ledger access for the coordination contract
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Account of the deployed contract, the receiver of funding payments
    fn app_address(&self) -> Address;

    /// Submit `ops` as one atomic group, applied in order.
    ///
    /// Returns one receipt per operation. Either every operation takes
    /// effect or none does.
    async fn submit(&self, ops: &[PendingOperation]) -> Result<Vec<CallReceipt>>;

    /// Current value of a contract box, `None` when the box does not exist
    async fn read_box(&self, name: &BoxName) -> Result<Option<Vec<u8>>>;
}

/// Source of fee and validity parameters for funding payments
#[async_trait]
pub trait NetworkParamsSource: Send + Sync {
    async fn suggested_params(&self) -> Result<SuggestedParams>;
}
