//! Per-signer signature storage
//!
//! Each signer's signatures for a group live in their own box, keyed by the
//! group id and the signer's public key. Set and clear never touch
//! transaction slots.

use crate::composer::{ContractCall, PendingOperation, WriteTarget};
use crate::context::{ProtocolContext, WriteOutcome};
use crate::cost::CostCategory;
use boxsig_crypto::Signer;
use boxsig_errors::{Error, Result};
use boxsig_log::{info, instrument, warn};
use boxsig_types::{derive_signature_key, Address, SignatureKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Stores and clears signatures on the contract
#[derive(Debug)]
pub struct SignatureCollector {
    ctx: Arc<ProtocolContext>,
    sizes: HashMap<SignatureKey, u32>,
    inconsistent: HashSet<SignatureKey>,
}

impl SignatureCollector {
    pub fn new(ctx: Arc<ProtocolContext>) -> Self {
        Self {
            ctx,
            sizes: HashMap::new(),
            inconsistent: HashSet::new(),
        }
    }

    /// Store `signature` as `address`'s signatures for `group`.
    ///
    /// The calls are sent and funded by `address`, since the contract keys
    /// the entry by the call sender.
    #[instrument(skip(self, signature), fields(len = signature.len()))]
    pub async fn set_signature(
        &mut self,
        group: u64,
        address: &Address,
        signature: &[u8],
    ) -> Result<WriteOutcome> {
        let key = derive_signature_key(address, group);
        if self.inconsistent.contains(&key) {
            return Err(Error::InconsistentChunkSequence(format!(
                "signatures of {address} for group {group} must be cleared before they are rewritten"
            )));
        }
        let prior_size = match self.sizes.get(&key) {
            Some(size) => *size,
            None => self.ctx.stored_len(&key.into()).await?,
        };

        let prepared = self
            .ctx
            .prepare_write(
                *address,
                WriteTarget::Signatures {
                    group,
                    signer: *address,
                },
                CostCategory::Signature,
                prior_size,
                signature,
            )
            .await?;
        let chunked = prepared.is_chunked();

        match self.ctx.commit_write(prepared).await {
            Ok(outcome) => {
                self.sizes.insert(key, outcome.quote.new_size);
                info!(group, %address, size = outcome.quote.new_size, "signature stored");
                Ok(outcome)
            }
            Err(err) => {
                // A failed write leaves the cached size in doubt
                self.sizes.remove(&key);
                if chunked {
                    warn!(group, %address, error = %err, "chunked signature write failed");
                    self.inconsistent.insert(key);
                }
                Err(err)
            }
        }
    }

    /// Sign `payload` with `signer` and store the detached signature
    pub async fn sign_and_set(
        &mut self,
        group: u64,
        signer: &dyn Signer,
        payload: &[u8],
    ) -> Result<WriteOutcome> {
        let signature = signer
            .sign(payload)
            .await
            .map_err(|e| Error::Signing(e.to_string()))?;
        self.set_signature(group, &signer.address(), &signature).await
    }

    /// Remove `address`'s signatures for `group`; a later set starts fresh
    #[instrument(skip(self))]
    pub async fn clear_signature(&mut self, group: u64, address: &Address) -> Result<()> {
        let key = derive_signature_key(address, group);
        let mut composer = self.ctx.composer();
        composer.push(
            PendingOperation::new(
                ContractCall::ClearSignatures {
                    group,
                    address: *address,
                },
                self.ctx.sender(),
            )
            .with_box(key)
            .with_fee(self.ctx.config().elevated_fee),
        )?;
        self.ctx.commit_retrying(&composer).await?;

        self.sizes.remove(&key);
        self.inconsistent.remove(&key);
        info!(group, %address, "signatures cleared");
        Ok(())
    }

    /// Size of the signatures last stored through this collector
    pub fn stored_size(&self, group: u64, address: &Address) -> Option<u32> {
        self.sizes.get(&derive_signature_key(address, group)).copied()
    }

    pub fn is_inconsistent(&self, group: u64, address: &Address) -> bool {
        self.inconsistent
            .contains(&derive_signature_key(address, group))
    }
}
