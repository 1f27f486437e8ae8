//! Box-storage coordination for offline multisignature transaction groups.
//!
//! Signers who never meet share unsigned transactions and their signatures
//! through the boxes of a coordination contract. This crate re-exports the
//! workspace's public API:
//!
//! - key derivation for slot and signature boxes ([`derive_slot_key`],
//!   [`derive_signature_key`])
//! - the chunk codec ([`split`], [`chunk_count`], [`reassemble`])
//! - storage cost quotes ([`CostCalculator`], [`FundingPolicy`])
//! - the group [`Coordinator`] and the [`SignatureCollector`]
//! - multisig address resolution ([`resolve_multisig_address`])
//!
//! ```no_run
//! use boxsig::{ClientConfig, Coordinator, MemLedger, ProtocolContext};
//! use boxsig::types::Address;
//! use std::sync::Arc;
//!
//! # async fn run() -> boxsig::Result<()> {
//! let ledger = Arc::new(MemLedger::default());
//! let sender = Address::from_public_key([1; 32]);
//! let ctx = Arc::new(ProtocolContext::with_backend(sender, ledger, ClientConfig::default()));
//!
//! let mut coordinator = Coordinator::new(ctx);
//! let group = coordinator.open_group().await?;
//! coordinator.write_slot(group, 0, b"raw transaction bytes").await?;
//! # Ok(())
//! # }
//! ```

pub use boxsig_client as client;
pub use boxsig_crypto as crypto;
pub use boxsig_errors as errors;
pub use boxsig_log as log;
pub use boxsig_store as store;
pub use boxsig_types as types;

pub use boxsig_client::{
    AlgodClient, BoxMbrSchedule, CallComposer, CallReceipt, ClientConfig, ContractCall,
    Coordinator, CostCalculator, CostCategory, CostOracle, CostQuote, FundingPolicy, GroupState,
    LedgerClient, MemLedger, MultisigSetup, NetworkParamsSource, PendingOperation, ProtocolContext,
    SignatureCollector, SlotState, WriteOutcome,
};
pub use boxsig_crypto::{
    resolve as resolve_multisig_address, Ed25519Signer, MultisigAccount, Signer,
};
pub use boxsig_errors::{Error, Result};
pub use boxsig_store::{chunk_count, reassemble, split, CHUNK_SIZE};
pub use boxsig_types::{derive_signature_key, derive_slot_key, signature_key_for, Address, BoxName};
