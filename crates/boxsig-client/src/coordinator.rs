//! Transaction group lifecycle
//!
//! The coordinator opens groups, writes and removes transaction slots and
//! destroys emptied groups. The contract's boxes are the source of truth;
//! the slot sizes kept here are a cache that is refilled from box reads
//! whenever it has no entry, so a coordinator attached to an existing group
//! after a restart behaves like the one that opened it.

use crate::composer::{ContractCall, PendingOperation, WriteTarget};
use crate::context::{ProtocolContext, WriteOutcome};
use crate::cost::CostCategory;
use boxsig_crypto::MultisigAccount;
use boxsig_errors::{Error, Result};
use boxsig_log::{debug, info, instrument, warn};
use boxsig_types::{derive_slot_key, BoxName};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Known state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Holds a complete payload of `size` bytes
    Populated { size: u32 },
    /// A chunked write failed; only removal is accepted
    Inconsistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Open,
    Destroyed,
}

#[derive(Debug, Default)]
struct GroupEntry {
    destroyed: bool,
    slots: BTreeMap<u8, SlotState>,
}

/// Drives the lifecycle of transaction groups for one sender
#[derive(Debug)]
pub struct Coordinator {
    ctx: Arc<ProtocolContext>,
    groups: HashMap<u64, GroupEntry>,
}

impl Coordinator {
    pub fn new(ctx: Arc<ProtocolContext>) -> Self {
        Self {
            ctx,
            groups: HashMap::new(),
        }
    }

    pub fn context(&self) -> &ProtocolContext {
        &self.ctx
    }

    /// Record `account`'s signers and threshold on the contract.
    ///
    /// The contract accepts this only while no transaction group is open.
    #[instrument(skip(self, account), fields(threshold = account.threshold()))]
    pub async fn setup(&mut self, account: &MultisigAccount) -> Result<()> {
        let mut composer = self.ctx.composer();
        composer.push(PendingOperation::new(
            ContractCall::setup(account),
            self.ctx.sender(),
        ))?;
        self.ctx.commit_retrying(&composer).await?;
        info!(
            signers = account.signers().len(),
            address = %account.address(),
            "multisig set up"
        );
        Ok(())
    }

    /// Create a group on the contract and return its id
    #[instrument(skip(self))]
    pub async fn open_group(&mut self) -> Result<u64> {
        let mut composer = self.ctx.composer();
        composer.push(PendingOperation::new(
            ContractCall::NewTransactionGroup,
            self.ctx.sender(),
        ))?;
        // Not retried: a lost response may still have allocated a group
        let receipts = self.ctx.commit_once(&composer).await?;
        let group = receipts
            .first()
            .and_then(|r| r.return_value)
            .ok_or_else(|| Error::rejected("group creation returned no id"))?;

        self.groups.insert(group, GroupEntry::default());
        info!(group, "opened transaction group");
        Ok(group)
    }

    /// Resume a group created earlier, possibly by another process
    pub fn attach_group(&mut self, group: u64) -> Result<()> {
        match self.groups.get(&group) {
            Some(entry) if entry.destroyed => Err(Error::UnknownGroup(group)),
            Some(_) => Ok(()),
            None => {
                self.groups.insert(group, GroupEntry::default());
                debug!(group, "attached transaction group");
                Ok(())
            }
        }
    }

    /// Store `payload` in slot `index`, replacing any previous payload
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub async fn write_slot(&mut self, group: u64, index: u8, payload: &[u8]) -> Result<WriteOutcome> {
        let prior_size = match self.open_entry(group)?.slots.get(&index) {
            Some(SlotState::Inconsistent) => {
                return Err(Error::InconsistentChunkSequence(format!(
                    "slot {index} of group {group} must be removed before it is rewritten"
                )))
            }
            Some(SlotState::Populated { size }) => *size,
            None => self.ctx.stored_len(&slot_box(group, index)).await?,
        };

        let sender = self.ctx.sender();
        let prepared = self
            .ctx
            .prepare_write(
                sender,
                WriteTarget::Slot { group, index },
                CostCategory::Transaction,
                prior_size,
                payload,
            )
            .await?;
        let chunked = prepared.is_chunked();

        match self.ctx.commit_write(prepared).await {
            Ok(outcome) => {
                self.entry_mut(group)?
                    .slots
                    .insert(index, SlotState::Populated { size: outcome.quote.new_size });
                info!(
                    group,
                    index,
                    size = outcome.quote.new_size,
                    chunks = outcome.chunks,
                    funding = outcome.funding,
                    "slot written"
                );
                Ok(outcome)
            }
            Err(err) => {
                let slots = &mut self.entry_mut(group)?.slots;
                if chunked {
                    warn!(group, index, error = %err, "chunked write failed, slot is inconsistent");
                    slots.insert(index, SlotState::Inconsistent);
                } else if slots.remove(&index).is_some() {
                    // The cached size may be stale; the next write re-reads the box
                    debug!(group, index, error = %err, "dropped cached slot size");
                }
                Err(err)
            }
        }
    }

    /// Vacate slot `index`. Returns whether a stored payload was removed.
    ///
    /// An absent box is never sent a removal; a cached entry for it, including
    /// an inconsistent mark, is dropped locally.
    #[instrument(skip(self))]
    pub async fn remove_slot(&mut self, group: u64, index: u8) -> Result<bool> {
        self.open_entry(group)?;
        let name = slot_box(group, index);
        if self.ctx.stored_len(&name).await? == 0 {
            self.entry_mut(group)?.slots.remove(&index);
            debug!(group, index, "slot already empty");
            return Ok(false);
        }

        let mut composer = self.ctx.composer();
        composer.push(
            PendingOperation::new(
                ContractCall::RemoveTransaction { group, index },
                self.ctx.sender(),
            )
            .with_box(name)
            .with_fee(self.ctx.config().elevated_fee),
        )?;
        self.ctx.commit_retrying(&composer).await?;

        self.entry_mut(group)?.slots.remove(&index);
        info!(group, index, "slot removed");
        Ok(true)
    }

    /// Destroy an emptied group; no operation accepts it afterwards
    #[instrument(skip(self))]
    pub async fn destroy_group(&mut self, group: u64) -> Result<()> {
        let slots = self.reconcile_slots(group).await?;
        if slots > 0 {
            return Err(Error::GroupNotEmpty { group, slots });
        }

        let mut composer = self.ctx.composer();
        composer.push(
            PendingOperation::new(ContractCall::DestroyGroup { group }, self.ctx.sender())
                .with_fee(self.ctx.config().elevated_fee),
        )?;
        self.ctx.commit_retrying(&composer).await?;

        let entry = self.entry_mut(group)?;
        entry.destroyed = true;
        entry.slots.clear();
        info!(group, "destroyed transaction group");
        Ok(())
    }

    /// Re-read slot `index` from the contract and return its stored size
    ///
    /// An inconsistent slot stays inconsistent until it is removed.
    pub async fn refresh_slot(&mut self, group: u64, index: u8) -> Result<Option<u32>> {
        self.open_entry(group)?;
        let size = self.ctx.stored_len(&slot_box(group, index)).await?;
        let slots = &mut self.entry_mut(group)?.slots;
        if slots.get(&index) != Some(&SlotState::Inconsistent) {
            if size == 0 {
                slots.remove(&index);
            } else {
                slots.insert(index, SlotState::Populated { size });
            }
        }
        Ok((size > 0).then_some(size))
    }

    /// Re-read every cached slot and forget those whose box is gone.
    /// Returns the number of slots still held.
    async fn reconcile_slots(&mut self, group: u64) -> Result<usize> {
        let cached: Vec<u8> = self.open_entry(group)?.slots.keys().copied().collect();
        for index in cached {
            if self.ctx.stored_len(&slot_box(group, index)).await? == 0 {
                self.entry_mut(group)?.slots.remove(&index);
                debug!(group, index, "forgot slot removed elsewhere");
            }
        }
        Ok(self.open_entry(group)?.slots.len())
    }

    /// Cached state of a slot, `None` when unknown or empty
    pub fn slot_state(&self, group: u64, index: u8) -> Option<SlotState> {
        self.groups.get(&group)?.slots.get(&index).copied()
    }

    pub fn group_state(&self, group: u64) -> Option<GroupState> {
        self.groups.get(&group).map(|entry| {
            if entry.destroyed {
                GroupState::Destroyed
            } else {
                GroupState::Open
            }
        })
    }

    /// Indices of known populated or inconsistent slots, ascending
    pub fn populated_slots(&self, group: u64) -> Vec<u8> {
        self.groups
            .get(&group)
            .map(|entry| entry.slots.keys().copied().collect())
            .unwrap_or_default()
    }

    fn open_entry(&self, group: u64) -> Result<&GroupEntry> {
        match self.groups.get(&group) {
            Some(entry) if !entry.destroyed => Ok(entry),
            _ => Err(Error::UnknownGroup(group)),
        }
    }

    fn entry_mut(&mut self, group: u64) -> Result<&mut GroupEntry> {
        match self.groups.get_mut(&group) {
            Some(entry) if !entry.destroyed => Ok(entry),
            _ => Err(Error::UnknownGroup(group)),
        }
    }
}

fn slot_box(group: u64, index: u8) -> BoxName {
    derive_slot_key(group, index).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::cost::BoxMbrSchedule;
    use crate::memory::MemLedger;
    use boxsig_types::Address;

    fn setup() -> (Arc<MemLedger>, Coordinator) {
        let ledger = Arc::new(MemLedger::default());
        let mut config = ClientConfig::default();
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 1;
        let ctx = ProtocolContext::with_backend(
            Address::from_public_key([3; 32]),
            ledger.clone(),
            config,
        );
        (ledger, Coordinator::new(Arc::new(ctx)))
    }

    fn tx_cost(size: u32) -> u64 {
        BoxMbrSchedule::default().cost(CostCategory::Transaction, size)
    }

    #[tokio::test]
    async fn test_setup_records_signers() {
        let (ledger, mut coordinator) = setup();
        let signers: Vec<Address> = (1..=3u8).map(|b| Address::from_public_key([b; 32])).collect();
        let account = MultisigAccount::new(1, 2, signers.clone()).unwrap();

        coordinator.setup(&account).await.unwrap();
        let recorded = ledger.multisig_setup().await.unwrap();
        assert_eq!(recorded.threshold, 2);
        assert_eq!(recorded.signers, signers);
        assert_eq!(
            ledger.submissions().await.last().unwrap().calls[0].method(),
            "arc55_setup"
        );

        let group = coordinator.open_group().await.unwrap();
        assert!(coordinator.setup(&account).await.is_err());
        assert!(ledger.group_exists(group).await);
    }

    #[tokio::test]
    async fn test_small_write_is_single_call() {
        let (ledger, mut coordinator) = setup();
        let group = coordinator.open_group().await.unwrap();
        assert_eq!(coordinator.group_state(group), Some(GroupState::Open));

        let outcome = coordinator.write_slot(group, 0, &[5; 21]).await.unwrap();
        assert_eq!(outcome.chunks, 1);
        assert_eq!(outcome.receipts.len(), 1);
        assert_eq!(outcome.funding, tx_cost(21));
        assert_eq!(
            coordinator.slot_state(group, 0),
            Some(SlotState::Populated { size: 21 })
        );
        assert_eq!(
            ledger.box_value(&slot_box(group, 0)).await,
            Some(vec![5; 21])
        );
    }

    #[tokio::test]
    async fn test_replacement_uses_prior_size() {
        let (ledger, mut coordinator) = setup();
        let group = coordinator.open_group().await.unwrap();
        coordinator.write_slot(group, 0, &[5; 21]).await.unwrap();

        let large: Vec<u8> = (0..7432u32).map(|i| (i % 256) as u8).collect();
        let outcome = coordinator.write_slot(group, 0, &large).await.unwrap();
        assert_eq!(outcome.chunks, 4);
        assert_eq!(outcome.quote.prior_size, 21);
        assert_eq!(outcome.quote.delta, (tx_cost(7432) - tx_cost(21)) as i64);
        assert_eq!(outcome.funding, tx_cost(7432) - tx_cost(21) + 100_000);
        assert_eq!(ledger.box_value(&slot_box(group, 0)).await, Some(large));
    }

    #[tokio::test]
    async fn test_failed_chunked_write_marks_slot_inconsistent() {
        let (ledger, mut coordinator) = setup();
        let group = coordinator.open_group().await.unwrap();

        ledger.fail_next_submit(Error::transient("connection reset")).await;
        let err = coordinator.write_slot(group, 1, &[1; 4500]).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(coordinator.slot_state(group, 1), Some(SlotState::Inconsistent));

        let err = coordinator.write_slot(group, 1, &[1; 10]).await.unwrap_err();
        assert!(err.requires_restart());

        // The failed group stored nothing, so removal only clears the mark
        let before = ledger.submissions().await.len();
        assert!(!coordinator.remove_slot(group, 1).await.unwrap());
        assert_eq!(ledger.submissions().await.len(), before);
        assert_eq!(coordinator.slot_state(group, 1), None);
        coordinator.write_slot(group, 1, &[1; 4500]).await.unwrap();
        assert!(coordinator.remove_slot(group, 1).await.unwrap());
    }

    fn peer(ledger: &Arc<MemLedger>, coordinator: &Coordinator) -> Coordinator {
        let ctx = coordinator.context();
        Coordinator::new(Arc::new(ProtocolContext::with_backend(
            ctx.sender(),
            ledger.clone(),
            ctx.config().clone(),
        )))
    }

    #[tokio::test]
    async fn test_stale_size_is_dropped_after_failed_write() {
        let (ledger, mut first) = setup();
        let group = first.open_group().await.unwrap();
        first.write_slot(group, 0, &[1; 300]).await.unwrap();

        let mut second = peer(&ledger, &first);
        second.attach_group(group).unwrap();
        assert!(second.remove_slot(group, 0).await.unwrap());

        // Priced as a replacement of 300 bytes, but the box is gone
        let err = first.write_slot(group, 0, &[2; 299]).await.unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientFunding {
                paid: 100_000,
                required: tx_cost(299)
            }
        );
        assert_eq!(first.slot_state(group, 0), None);

        let outcome = first.write_slot(group, 0, &[2; 299]).await.unwrap();
        assert_eq!(outcome.quote.prior_size, 0);
        assert_eq!(outcome.funding, tx_cost(299));
    }

    #[tokio::test]
    async fn test_destroy_rereads_cached_slots() {
        let (ledger, mut first) = setup();
        let group = first.open_group().await.unwrap();
        first.write_slot(group, 0, &[1; 300]).await.unwrap();
        first.write_slot(group, 1, &[1; 30]).await.unwrap();

        let mut second = peer(&ledger, &first);
        second.attach_group(group).unwrap();
        second.remove_slot(group, 0).await.unwrap();

        assert_eq!(
            first.destroy_group(group).await.unwrap_err(),
            Error::GroupNotEmpty { group, slots: 1 }
        );
        assert_eq!(first.populated_slots(group), vec![1]);

        second.remove_slot(group, 1).await.unwrap();
        first.destroy_group(group).await.unwrap();
        assert!(!ledger.group_exists(group).await);
    }

    #[tokio::test]
    async fn test_single_write_retries_transient_failure() {
        let (ledger, mut coordinator) = setup();
        let group = coordinator.open_group().await.unwrap();

        ledger.fail_next_submit(Error::transient("timeout")).await;
        coordinator.write_slot(group, 0, &[1; 100]).await.unwrap();
        assert_eq!(
            coordinator.slot_state(group, 0),
            Some(SlotState::Populated { size: 100 })
        );
    }

    #[tokio::test]
    async fn test_destroy_lifecycle() {
        let (ledger, mut coordinator) = setup();
        let group = coordinator.open_group().await.unwrap();
        coordinator.write_slot(group, 0, &[1; 30]).await.unwrap();
        coordinator.write_slot(group, 7, &[2; 30]).await.unwrap();
        assert_eq!(coordinator.populated_slots(group), vec![0, 7]);

        assert_eq!(
            coordinator.destroy_group(group).await.unwrap_err(),
            Error::GroupNotEmpty { group, slots: 2 }
        );

        coordinator.remove_slot(group, 0).await.unwrap();
        coordinator.remove_slot(group, 7).await.unwrap();
        coordinator.destroy_group(group).await.unwrap();

        assert_eq!(coordinator.group_state(group), Some(GroupState::Destroyed));
        assert!(!ledger.group_exists(group).await);
        assert_eq!(
            coordinator.write_slot(group, 0, &[1]).await.unwrap_err(),
            Error::UnknownGroup(group)
        );
        assert_eq!(coordinator.attach_group(group), Err(Error::UnknownGroup(group)));
    }

    #[tokio::test]
    async fn test_remove_absent_slot_is_noop() {
        let (ledger, mut coordinator) = setup();
        let group = coordinator.open_group().await.unwrap();
        let before = ledger.submissions().await.len();
        assert!(!coordinator.remove_slot(group, 9).await.unwrap());
        assert_eq!(ledger.submissions().await.len(), before);
    }

    #[tokio::test]
    async fn test_attach_recovers_sizes_from_boxes() {
        let (ledger, mut first) = setup();
        let group = first.open_group().await.unwrap();
        first.write_slot(group, 2, &[9; 300]).await.unwrap();

        let ctx = first.context();
        let second_ctx = ProtocolContext::with_backend(ctx.sender(), ledger.clone(), ctx.config().clone());
        let mut second = Coordinator::new(Arc::new(second_ctx));
        second.attach_group(group).unwrap();
        assert_eq!(second.slot_state(group, 2), None);

        let outcome = second.write_slot(group, 2, &[8; 100]).await.unwrap();
        assert_eq!(outcome.quote.prior_size, 300);
        assert_eq!(outcome.funding, 100_000);

        assert_eq!(second.refresh_slot(group, 2).await.unwrap(), Some(100));
        assert_eq!(second.refresh_slot(group, 3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_group_rejected() {
        let (_, mut coordinator) = setup();
        assert_eq!(
            coordinator.write_slot(42, 0, &[1]).await.unwrap_err(),
            Error::UnknownGroup(42)
        );
        assert_eq!(
            coordinator.destroy_group(42).await.unwrap_err(),
            Error::UnknownGroup(42)
        );
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_before_any_call() {
        let (ledger, mut coordinator) = setup();
        let group = coordinator.open_group().await.unwrap();
        let before = ledger.submissions().await.len();

        let err = coordinator.write_slot(group, 0, &vec![0; 30_001]).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
        assert_eq!(coordinator.write_slot(group, 0, &[]).await.unwrap_err(), Error::EmptyPayload);
        assert_eq!(ledger.submissions().await.len(), before);
        assert_eq!(coordinator.slot_state(group, 0), None);
    }
}
