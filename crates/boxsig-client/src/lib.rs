//! Client side of the box-storage multisig coordination protocol.
//!
//! The [`Coordinator`] manages transaction groups and their slots, the
//! [`SignatureCollector`] manages per-signer signature entries. Both quote
//! storage costs through a [`CostCalculator`], fund every write with a
//! payment to the contract account and submit atomic call groups built by
//! the [`CallComposer`].
//!
//! Remote collaborators are traits ([`LedgerClient`], [`CostOracle`],
//! [`NetworkParamsSource`]). [`MemLedger`] implements all of them in memory;
//! [`AlgodClient`] provides network parameters from a node.

pub mod algod;
pub mod composer;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod cost;
pub mod ledger;
pub mod memory;
pub mod retry;
pub mod signatures;

pub use algod::{AlgodClient, TransactionParamsResponse};
pub use composer::{
    max_payload_len, CallComposer, ContractCall, FundingPayment, PendingOperation, WriteTarget,
};
pub use config::{AlgodConfig, ClientConfig, ConfigError, LedgerLimits};
pub use context::{PreparedWrite, ProtocolContext, WriteOutcome};
pub use coordinator::{Coordinator, GroupState, SlotState};
pub use cost::{BoxMbrSchedule, CostCalculator, CostCategory, CostOracle, CostQuote, FundingPolicy};
pub use ledger::{CallReceipt, LedgerClient, NetworkParamsSource};
pub use memory::{MemLedger, MultisigSetup, Submission, MIN_BALANCE};
pub use retry::{with_retry, RetryPolicy};
pub use signatures::SignatureCollector;
