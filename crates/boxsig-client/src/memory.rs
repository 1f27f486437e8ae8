//! In-memory coordination contract
//!
//! [`MemLedger`] applies submitted call groups to a [`MemStore`] the way the
//! deployed contract applies them to its boxes. A group is applied to a
//! scratch copy of the store and swapped in only when every call succeeds,
//! so a rejected group leaves no trace.

use crate::composer::{ContractCall, PendingOperation};
use crate::config::{ClientConfig, LedgerLimits};
use crate::cost::{BoxMbrSchedule, CostCategory, CostOracle};
use crate::ledger::{CallReceipt, LedgerClient, NetworkParamsSource};
use async_trait::async_trait;
use boxsig_errors::{Error, Result};
use boxsig_log::{debug, info};
use boxsig_store::{KVStore, MemStore};
use boxsig_types::{
    derive_signature_key, derive_slot_key, group_prefix, Address, BoxName, SuggestedParams,
    SLOT_KEY_LEN,
};
use std::collections::{BTreeSet, VecDeque};
use tokio::sync::Mutex;

/// Balance the contract account keeps regardless of boxes
pub const MIN_BALANCE: u64 = 100_000;

pub const MEMNET_GENESIS_ID: &str = "memnet-v1";
pub const MEMNET_GENESIS_HASH: &str = "bWVtbmV0LWdlbmVzaXMtaGFzaA==";

/// One applied call group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub round: u64,
    pub calls: Vec<ContractCall>,
    /// Sum of the funding payments in the group
    pub funded: u64,
}

/// Signer list and threshold recorded by the setup call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigSetup {
    pub threshold: u16,
    pub signers: Vec<Address>,
}

#[derive(Debug)]
struct LedgerState {
    store: MemStore,
    setup: Option<MultisigSetup>,
    groups: BTreeSet<u64>,
    last_group: u64,
    balance: u64,
    refunded: u64,
    round: u64,
    submissions: Vec<Submission>,
    submit_failures: VecDeque<Error>,
    read_failures: VecDeque<Error>,
    oracle_online: bool,
    params_online: bool,
}

/// In-memory ledger hosting one coordination contract
#[derive(Debug)]
pub struct MemLedger {
    app_id: u64,
    app_address: Address,
    schedule: BoxMbrSchedule,
    limits: LedgerLimits,
    state: Mutex<LedgerState>,
}

impl Default for MemLedger {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MemLedger {
    /// Ledger with the contract deployed as application `app_id`
    pub fn new(app_id: u64) -> Self {
        Self::with_limits(app_id, LedgerLimits::default())
    }

    pub fn with_limits(app_id: u64, limits: LedgerLimits) -> Self {
        Self {
            app_id,
            app_address: Address::for_application(app_id),
            schedule: BoxMbrSchedule::default(),
            state: Mutex::new(LedgerState {
                store: MemStore::with_max_value_len(limits.max_box_size),
                setup: None,
                groups: BTreeSet::new(),
                last_group: 0,
                balance: MIN_BALANCE,
                refunded: 0,
                round: 1,
                submissions: Vec::new(),
                submit_failures: VecDeque::new(),
                read_failures: VecDeque::new(),
                oracle_online: true,
                params_online: true,
            }),
            limits,
        }
    }

    /// Ledger whose limits and box schedule follow `config`
    pub fn from_config(app_id: u64, config: &ClientConfig) -> Self {
        Self::with_limits(app_id, config.limits.clone()).with_schedule(
            BoxMbrSchedule::default().with_signature_overhead(config.signature_value_overhead),
        )
    }

    pub fn with_schedule(mut self, schedule: BoxMbrSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    /// Fail the next submission with `err` without applying it
    pub async fn fail_next_submit(&self, err: Error) {
        self.state.lock().await.submit_failures.push_back(err);
    }

    /// Fail the next box read with `err`
    pub async fn fail_next_read(&self, err: Error) {
        self.state.lock().await.read_failures.push_back(err);
    }

    pub async fn set_oracle_online(&self, online: bool) {
        self.state.lock().await.oracle_online = online;
    }

    pub async fn set_params_online(&self, online: bool) {
        self.state.lock().await.params_online = online;
    }

    /// Contract account balance
    pub async fn balance(&self) -> u64 {
        self.state.lock().await.balance
    }

    /// Total paid back to callers for freed boxes
    pub async fn refunded(&self) -> u64 {
        self.state.lock().await.refunded
    }

    /// Minimum balance currently locked by boxes
    pub async fn locked_mbr(&self) -> u64 {
        let state = self.state.lock().await;
        self.locked(&state.store)
    }

    pub async fn box_value(&self, name: &BoxName) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state.store.get(name.as_bytes()).ok().flatten()
    }

    pub async fn box_count(&self) -> usize {
        self.state.lock().await.store.len()
    }

    pub async fn multisig_setup(&self) -> Option<MultisigSetup> {
        self.state.lock().await.setup.clone()
    }

    pub async fn group_exists(&self, group: u64) -> bool {
        self.state.lock().await.groups.contains(&group)
    }

    /// Applied call groups, oldest first
    pub async fn submissions(&self) -> Vec<Submission> {
        self.state.lock().await.submissions.clone()
    }

    fn locked(&self, store: &MemStore) -> u64 {
        store
            .prefix_iterator(&[])
            .map(|(key, value)| {
                let category = if key.len() == SLOT_KEY_LEN {
                    CostCategory::Transaction
                } else {
                    CostCategory::Signature
                };
                self.schedule.cost(category, value.len() as u32)
            })
            .sum()
    }

    fn box_cost(&self, name: &BoxName, len: usize) -> u64 {
        let category = match name {
            BoxName::Slot(_) => CostCategory::Transaction,
            BoxName::Signature(_) => CostCategory::Signature,
        };
        self.schedule.cost(category, len as u32)
    }
}

// Working copy of the contract state while a group is applied
struct Batch {
    store: MemStore,
    setup: Option<MultisigSetup>,
    groups: BTreeSet<u64>,
    last_group: u64,
    funded: u64,
    refunded: u64,
    open_write: Option<BoxName>,
    written: BTreeSet<BoxName>,
}

impl Batch {
    fn require_group(&self, group: u64) -> Result<()> {
        if self.groups.contains(&group) {
            Ok(())
        } else {
            Err(Error::rejected(format!("group {group} does not exist")))
        }
    }
}

fn require_reference(op: &PendingOperation, name: &BoxName) -> Result<()> {
    if op.boxes.contains(name) {
        Ok(())
    } else {
        Err(Error::rejected(format!(
            "{} touches unreferenced box {name}",
            op.call.method()
        )))
    }
}

impl MemLedger {
    fn apply(&self, batch: &mut Batch, op: &PendingOperation) -> Result<Option<u64>> {
        if let Some(payment) = &op.payment {
            if payment.receiver != self.app_address {
                return Err(Error::rejected(format!(
                    "funding payment to {} instead of the application account",
                    payment.receiver
                )));
            }
            batch.funded = batch.funded.saturating_add(payment.amount);
        }

        match &op.call {
            ContractCall::Setup {
                threshold,
                addresses,
            } => {
                if !batch.groups.is_empty() {
                    return Err(Error::rejected("setup while transaction groups are open"));
                }
                if *threshold == 0 || usize::from(*threshold) > addresses.len() {
                    return Err(Error::ThresholdOutOfRange {
                        threshold: *threshold,
                        signers: addresses.len(),
                    });
                }
                batch.setup = Some(MultisigSetup {
                    threshold: *threshold,
                    signers: addresses.clone(),
                });
                batch.open_write = None;
            }
            ContractCall::NewTransactionGroup => {
                batch.last_group += 1;
                batch.groups.insert(batch.last_group);
                batch.open_write = None;
                return Ok(Some(batch.last_group));
            }
            ContractCall::AddTransaction {
                group,
                index,
                chunk,
            } => {
                batch.require_group(*group)?;
                let name = BoxName::from(derive_slot_key(*group, *index));
                require_reference(op, &name)?;
                batch.store.set(name.as_bytes().to_vec(), chunk.clone())?;
                batch.written.insert(name);
                batch.open_write = Some(name);
            }
            ContractCall::SetSignatures { group, chunk } => {
                batch.require_group(*group)?;
                let name = BoxName::from(derive_signature_key(&op.sender, *group));
                require_reference(op, &name)?;
                batch.store.set(name.as_bytes().to_vec(), chunk.clone())?;
                batch.written.insert(name);
                batch.open_write = Some(name);
            }
            ContractCall::AddTransactionContinued { chunk }
            | ContractCall::SetSignaturesContinued { chunk } => {
                let name = match (&op.call, batch.open_write) {
                    (ContractCall::AddTransactionContinued { .. }, Some(name @ BoxName::Slot(_)))
                    | (
                        ContractCall::SetSignaturesContinued { .. },
                        Some(name @ BoxName::Signature(_)),
                    ) => name,
                    _ => {
                        return Err(Error::InconsistentChunkSequence(format!(
                            "{} without a preceding begin call",
                            op.call.method()
                        )))
                    }
                };
                batch.store.append(name.as_bytes(), chunk)?;
            }
            ContractCall::RemoveTransaction { group, index } => {
                batch.require_group(*group)?;
                let name = BoxName::from(derive_slot_key(*group, *index));
                require_reference(op, &name)?;
                self.free(batch, &name)?;
            }
            ContractCall::ClearSignatures { group, address } => {
                let name = BoxName::from(derive_signature_key(address, *group));
                require_reference(op, &name)?;
                self.free(batch, &name)?;
            }
            ContractCall::DestroyGroup { group } => {
                batch.require_group(*group)?;
                let slots = batch
                    .store
                    .prefix_iterator(&group_prefix(*group))
                    .filter(|(key, _)| key.len() == SLOT_KEY_LEN)
                    .count();
                if slots > 0 {
                    return Err(Error::GroupNotEmpty {
                        group: *group,
                        slots,
                    });
                }
                batch.groups.remove(group);
                batch.open_write = None;
            }
        }
        Ok(None)
    }

    fn free(&self, batch: &mut Batch, name: &BoxName) -> Result<()> {
        if let Some(len) = batch.store.value_len(name.as_bytes())? {
            batch.store.delete(name.as_bytes())?;
            batch.refunded = batch.refunded.saturating_add(self.box_cost(name, len));
        }
        batch.open_write = None;
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for MemLedger {
    fn app_address(&self) -> Address {
        self.app_address
    }

    async fn submit(&self, ops: &[PendingOperation]) -> Result<Vec<CallReceipt>> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }

        let transactions: usize = ops.iter().map(PendingOperation::transaction_count).sum();
        if transactions > self.limits.max_group_size {
            return Err(Error::rejected(format!(
                "group of {transactions} transactions exceeds {}",
                self.limits.max_group_size
            )));
        }

        let mut batch = Batch {
            store: state.store.clone(),
            setup: state.setup.clone(),
            groups: state.groups.clone(),
            last_group: state.last_group,
            funded: 0,
            refunded: 0,
            open_write: None,
            written: BTreeSet::new(),
        };
        let mut returns = Vec::with_capacity(ops.len());
        for op in ops {
            returns.push(self.apply(&mut batch, op)?);
        }

        // Box references pool their I/O budget across the group
        let budget = ops.iter().map(|op| op.boxes.len()).sum::<usize>() * self.limits.box_io_budget;
        for name in &batch.written {
            let len = batch.store.value_len(name.as_bytes())?.unwrap_or(0);
            if len > budget {
                return Err(Error::rejected(format!(
                    "box {name} of {len} bytes exceeds the group's i/o budget of {budget}"
                )));
            }
        }

        let available = state
            .balance
            .saturating_add(batch.funded)
            .saturating_sub(batch.refunded);
        let required = MIN_BALANCE + self.locked(&batch.store);
        if available < required {
            let prior = state.balance.saturating_sub(batch.refunded);
            return Err(Error::InsufficientFunding {
                paid: batch.funded,
                required: required.saturating_sub(prior),
            });
        }

        state.store = batch.store;
        state.setup = batch.setup;
        state.groups = batch.groups;
        state.last_group = batch.last_group;
        state.balance = available;
        state.refunded = state.refunded.saturating_add(batch.refunded);
        state.round += 1;
        let round = state.round;
        state.submissions.push(Submission {
            round,
            calls: ops.iter().map(|op| op.call.clone()).collect(),
            funded: batch.funded,
        });
        info!(round, calls = ops.len(), funded = batch.funded, "applied call group");

        Ok(returns
            .into_iter()
            .enumerate()
            .map(|(i, return_value)| CallReceipt {
                tx_id: format!("MEM-{round}-{i}"),
                return_value,
            })
            .collect())
    }

    async fn read_box(&self, name: &BoxName) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.read_failures.pop_front() {
            return Err(err);
        }
        debug!(box_name = %name, "read box");
        Ok(state.store.get(name.as_bytes())?)
    }
}

#[async_trait]
impl CostOracle for MemLedger {
    async fn cost_for_size(&self, category: CostCategory, byte_length: u32) -> Result<u64> {
        if !self.state.lock().await.oracle_online {
            return Err(Error::CostOracleUnavailable("cost oracle offline".to_string()));
        }
        Ok(self.schedule.cost(category, byte_length))
    }
}

#[async_trait]
impl NetworkParamsSource for MemLedger {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        let state = self.state.lock().await;
        if !state.params_online {
            return Err(Error::transient("parameter source offline"));
        }
        Ok(SuggestedParams::at_round(
            state.round,
            MEMNET_GENESIS_ID,
            MEMNET_GENESIS_HASH,
        ))
    }
}
