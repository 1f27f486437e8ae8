//! Building atomic groups of contract calls
//!
//! A [`CallComposer`] accumulates [`PendingOperation`]s in issue order and
//! submits them in one atomic group. Chunked writes are laid out as a begin
//! call carrying the funding payment and the first chunk, followed by one
//! continue call per remaining chunk.

use crate::config::LedgerLimits;
use crate::ledger::{CallReceipt, LedgerClient};
use boxsig_crypto::MultisigAccount;
use boxsig_errors::{Error, Result};
use boxsig_log::{debug, info};
use boxsig_store::{ChunkPlan, CHUNK_SIZE};
use boxsig_types::{derive_signature_key, derive_slot_key, Address, BoxName, SuggestedParams};
use serde::{Deserialize, Serialize};

/// Encoded size used to price a signed funding payment
pub const PAYMENT_TXN_SIZE: usize = 250;

/// One call to the coordination contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    /// Records the ordered signer list and threshold of the multisig account
    Setup { threshold: u16, addresses: Vec<Address> },
    NewTransactionGroup,
    AddTransaction { group: u64, index: u8, chunk: Vec<u8> },
    AddTransactionContinued { chunk: Vec<u8> },
    RemoveTransaction { group: u64, index: u8 },
    /// Stores the sender's signatures for `group`.
    ///
    /// The contract method takes one signature per transaction of the group.
    /// Here the value is a single opaque blob: callers with several signatures
    /// concatenate them in slot order, and `sign_and_set` stores one.
    SetSignatures { group: u64, chunk: Vec<u8> },
    SetSignaturesContinued { chunk: Vec<u8> },
    ClearSignatures { group: u64, address: Address },
    DestroyGroup { group: u64 },
}

impl ContractCall {
    /// Setup call for `account`'s signers, in account order
    pub fn setup(account: &MultisigAccount) -> Self {
        ContractCall::Setup {
            threshold: account.threshold(),
            addresses: account.signers().to_vec(),
        }
    }

    /// ABI method name of the call
    pub fn method(&self) -> &'static str {
        match self {
            ContractCall::Setup { .. } => "arc55_setup",
            ContractCall::NewTransactionGroup => "arc55_newTransactionGroup",
            ContractCall::AddTransaction { .. } => "arc55_addTransaction",
            ContractCall::AddTransactionContinued { .. } => "arc55_addTransactionContinued",
            ContractCall::RemoveTransaction { .. } => "arc55_removeTransaction",
            ContractCall::SetSignatures { .. } => "arc55_setSignatures",
            ContractCall::SetSignaturesContinued { .. } => "arc55_setSignaturesContinued",
            ContractCall::ClearSignatures { .. } => "arc55_clearSignatures",
            ContractCall::DestroyGroup { .. } => "arc55_destroyGroup",
        }
    }

    /// Whether the call appends to the value opened by a preceding begin call
    pub fn is_continuation(&self) -> bool {
        matches!(
            self,
            ContractCall::AddTransactionContinued { .. } | ContractCall::SetSignaturesContinued { .. }
        )
    }

    /// Whether `next` may directly follow this call
    pub fn accepts_continuation(&self, next: &ContractCall) -> bool {
        matches!(
            (self, next),
            (
                ContractCall::AddTransaction { .. } | ContractCall::AddTransactionContinued { .. },
                ContractCall::AddTransactionContinued { .. }
            ) | (
                ContractCall::SetSignatures { .. } | ContractCall::SetSignaturesContinued { .. },
                ContractCall::SetSignaturesContinued { .. }
            )
        )
    }

    /// Payload bytes carried by the call
    pub fn chunk(&self) -> Option<&[u8]> {
        match self {
            ContractCall::AddTransaction { chunk, .. }
            | ContractCall::AddTransactionContinued { chunk }
            | ContractCall::SetSignatures { chunk, .. }
            | ContractCall::SetSignaturesContinued { chunk } => Some(chunk),
            _ => None,
        }
    }
}

/// Payment to the contract account covering a storage cost increase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPayment {
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
}

impl FundingPayment {
    pub fn new(sender: Address, receiver: Address, amount: u64, params: &SuggestedParams) -> Self {
        Self {
            sender,
            receiver,
            amount,
            fee: params.fee_for_size(PAYMENT_TXN_SIZE),
            first_valid: params.first_valid,
            last_valid: params.last_valid,
            genesis_id: params.genesis_id.clone(),
        }
    }
}

/// A contract call waiting to be submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub call: ContractCall,
    pub sender: Address,
    /// Boxes the call may touch
    pub boxes: Vec<BoxName>,
    /// Payment grouped directly before the call
    pub payment: Option<FundingPayment>,
    /// Flat fee override
    pub fee: Option<u64>,
}

impl PendingOperation {
    pub fn new(call: ContractCall, sender: Address) -> Self {
        Self {
            call,
            sender,
            boxes: Vec::new(),
            payment: None,
            fee: None,
        }
    }

    pub fn with_box(mut self, name: impl Into<BoxName>) -> Self {
        self.boxes.push(name.into());
        self
    }

    pub fn with_payment(mut self, payment: FundingPayment) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Ledger transactions the operation occupies in its group
    pub fn transaction_count(&self) -> usize {
        1 + usize::from(self.payment.is_some())
    }
}

/// Destination of a possibly chunked write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteTarget {
    Slot { group: u64, index: u8 },
    /// Signatures of `signer`, who must also send the calls
    Signatures { group: u64, signer: Address },
}

impl WriteTarget {
    pub fn box_name(&self) -> BoxName {
        match *self {
            WriteTarget::Slot { group, index } => derive_slot_key(group, index).into(),
            WriteTarget::Signatures { group, signer } => derive_signature_key(&signer, group).into(),
        }
    }

    fn begin(&self, chunk: &[u8]) -> ContractCall {
        match *self {
            WriteTarget::Slot { group, index } => ContractCall::AddTransaction {
                group,
                index,
                chunk: chunk.to_vec(),
            },
            WriteTarget::Signatures { group, .. } => ContractCall::SetSignatures {
                group,
                chunk: chunk.to_vec(),
            },
        }
    }

    fn continuation(&self, chunk: &[u8]) -> ContractCall {
        match self {
            WriteTarget::Slot { .. } => ContractCall::AddTransactionContinued {
                chunk: chunk.to_vec(),
            },
            WriteTarget::Signatures { .. } => ContractCall::SetSignaturesContinued {
                chunk: chunk.to_vec(),
            },
        }
    }
}

/// Largest payload one atomic write sequence can store under `limits`
///
/// One group slot is reserved for the funding payment.
pub fn max_payload_len(limits: &LedgerLimits) -> usize {
    let by_group = limits.max_group_size.saturating_sub(1).saturating_mul(CHUNK_SIZE);
    by_group.min(limits.max_box_size)
}

/// Accumulates operations for one atomic submission
#[derive(Debug, Clone)]
pub struct CallComposer {
    ops: Vec<PendingOperation>,
    limits: LedgerLimits,
}

impl CallComposer {
    pub fn new(limits: LedgerLimits) -> Self {
        Self {
            ops: Vec::new(),
            limits,
        }
    }

    /// Append one operation
    pub fn push(&mut self, op: PendingOperation) -> Result<&mut Self> {
        let count = self.transaction_count() + op.transaction_count();
        if count > self.limits.max_group_size {
            return Err(Error::rejected(format!(
                "atomic group of {count} transactions exceeds {}",
                self.limits.max_group_size
            )));
        }
        self.ops.push(op);
        Ok(self)
    }

    /// Append the begin/continue sequence storing `payload` at `target`
    ///
    /// Box references are spread over the calls so the group's pooled I/O
    /// budget covers the whole value.
    pub fn push_write(
        &mut self,
        sender: Address,
        target: WriteTarget,
        payload: &[u8],
        payment: Option<FundingPayment>,
    ) -> Result<&mut Self> {
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        let max = max_payload_len(&self.limits);
        if payload.len() > max {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        let plan = ChunkPlan::new(payload, CHUNK_SIZE)?;
        let needed = self.transaction_count() + plan.len() + usize::from(payment.is_some());
        if needed > self.limits.max_group_size {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: self
                    .limits
                    .max_group_size
                    .saturating_sub(self.transaction_count() + 1)
                    .saturating_mul(CHUNK_SIZE),
            });
        }

        let name = target.box_name();
        let mut refs = payload.len().div_ceil(self.limits.box_io_budget).max(1);
        let capacity = plan.len() * self.limits.max_references_per_call;
        if refs > capacity {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: capacity * self.limits.box_io_budget,
            });
        }
        debug!(box_name = %name, chunks = plan.len(), refs, "planned chunked write");

        for (i, chunk) in plan.chunks().iter().enumerate() {
            let call = if i == 0 {
                target.begin(chunk)
            } else {
                target.continuation(chunk)
            };
            let mut op = PendingOperation::new(call, sender);
            let take = refs.min(self.limits.max_references_per_call);
            op.boxes = vec![name; take];
            refs -= take;
            if i == 0 {
                op.payment = payment.clone();
            }
            self.ops.push(op);
        }
        Ok(self)
    }

    pub fn operations(&self) -> &[PendingOperation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Ledger transactions in the group, payments included
    pub fn transaction_count(&self) -> usize {
        self.ops.iter().map(PendingOperation::transaction_count).sum()
    }

    /// Total fees the group pays under `params`
    pub fn estimated_fees(&self, params: &SuggestedParams) -> u64 {
        self.ops
            .iter()
            .map(|op| {
                let call_fee = op.fee.unwrap_or(params.min_fee);
                let payment_fee = op.payment.as_ref().map_or(0, |p| p.fee);
                call_fee.saturating_add(payment_fee)
            })
            .sum()
    }

    /// Submit the accumulated operations as one atomic group
    ///
    /// An empty composer submits nothing.
    pub async fn commit(&self, ledger: &dyn LedgerClient) -> Result<Vec<CallReceipt>> {
        if self.ops.is_empty() {
            return Ok(Vec::new());
        }
        check_sequence(&self.ops)?;

        let receipts = ledger.submit(&self.ops).await?;
        if receipts.len() != self.ops.len() {
            return Err(Error::rejected(format!(
                "ledger returned {} receipts for {} calls",
                receipts.len(),
                self.ops.len()
            )));
        }
        info!(
            calls = self.ops.len(),
            transactions = self.transaction_count(),
            "committed call group"
        );
        Ok(receipts)
    }
}

// Continuations must directly follow the begin call of the same kind
fn check_sequence(ops: &[PendingOperation]) -> Result<()> {
    let mut previous: Option<&ContractCall> = None;
    for (i, op) in ops.iter().enumerate() {
        if op.call.is_continuation() && !previous.is_some_and(|p| p.accepts_continuation(&op.call)) {
            return Err(Error::InconsistentChunkSequence(format!(
                "{} at position {i} does not follow a matching begin call",
                op.call.method()
            )));
        }
        previous = Some(&op.call);
    }
    Ok(())
}
