//! Collaborators and settings shared by the coordinator and the collector

use crate::composer::{CallComposer, FundingPayment, WriteTarget};
use crate::config::ClientConfig;
use crate::cost::{CostCalculator, CostCategory, CostOracle, CostQuote, FundingPolicy};
use crate::ledger::{CallReceipt, LedgerClient, NetworkParamsSource};
use crate::retry::with_retry;
use boxsig_errors::{Error, Result};
use boxsig_log::debug;
use boxsig_store::{chunk_count, CHUNK_SIZE};
use boxsig_types::{Address, BoxName};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a funded box write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub quote: CostQuote,
    /// Amount of the funding payment, zero when none was attached
    pub funding: u64,
    pub chunks: u32,
    pub receipts: Vec<CallReceipt>,
}

/// A funded write ready to be committed
#[derive(Debug, Clone)]
pub struct PreparedWrite {
    pub composer: CallComposer,
    pub quote: CostQuote,
    pub funding: u64,
    pub chunks: u32,
}

impl PreparedWrite {
    pub fn is_chunked(&self) -> bool {
        self.chunks > 1
    }
}

/// Everything a protocol operation needs to reach the ledger
pub struct ProtocolContext {
    sender: Address,
    ledger: Arc<dyn LedgerClient>,
    params: Arc<dyn NetworkParamsSource>,
    costs: CostCalculator,
    config: ClientConfig,
}

impl std::fmt::Debug for ProtocolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolContext")
            .field("sender", &self.sender)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProtocolContext {
    pub fn new(
        sender: Address,
        ledger: Arc<dyn LedgerClient>,
        params: Arc<dyn NetworkParamsSource>,
        oracle: Arc<dyn CostOracle>,
        config: ClientConfig,
    ) -> Self {
        Self {
            sender,
            ledger,
            params,
            costs: CostCalculator::new(oracle),
            config,
        }
    }

    /// Context over a backend that provides all three collaborators
    pub fn with_backend<B>(sender: Address, backend: Arc<B>, config: ClientConfig) -> Self
    where
        B: LedgerClient + NetworkParamsSource + CostOracle + 'static,
    {
        Self::new(sender, backend.clone(), backend.clone(), backend, config)
    }

    /// Account sending coordinator calls
    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    pub fn costs(&self) -> &CostCalculator {
        &self.costs
    }

    pub fn funding_policy(&self) -> FundingPolicy {
        FundingPolicy::new(self.config.fee_buffer)
    }

    pub fn composer(&self) -> CallComposer {
        CallComposer::new(self.config.limits.clone())
    }

    /// Authoritative length of a box, 0 when absent
    pub async fn stored_len(&self, name: &BoxName) -> Result<u32> {
        let value = with_retry(&self.config.retry, "read_box", || self.ledger.read_box(name)).await?;
        let len = value.map_or(0, |v| v.len());
        u32::try_from(len).map_err(|_| Error::EncodingError(format!("box {name} holds {len} bytes")))
    }

    /// Payment of `amount` from `payer` to the contract account
    pub async fn funding_payment(&self, payer: Address, amount: u64) -> Result<FundingPayment> {
        let params = with_retry(&self.config.retry, "suggested_params", || {
            self.params.suggested_params()
        })
        .await
        .map_err(|err| match err {
            Error::CostOracleUnavailable(_) => err,
            other => Error::CostOracleUnavailable(format!("network parameters:: {other}")),
        })?;
        Ok(FundingPayment::new(
            payer,
            self.ledger.app_address(),
            amount,
            &params,
        ))
    }

    /// Quote, fund and lay out a write of `payload` to `target`.
    ///
    /// `sender` sends the calls and pays the funding. Nothing is submitted.
    pub async fn prepare_write(
        &self,
        sender: Address,
        target: WriteTarget,
        category: CostCategory,
        prior_size: u32,
        payload: &[u8],
    ) -> Result<PreparedWrite> {
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        let max = crate::composer::max_payload_len(&self.config.limits);
        if payload.len() > max {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }
        let new_size = u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge {
            len: payload.len(),
            max,
        })?;

        let quote = self.costs.quote(category, prior_size, new_size).await?;
        let funding = self.funding_policy().funding_amount(&quote);
        let payment = if funding > 0 {
            Some(self.funding_payment(sender, funding).await?)
        } else {
            None
        };

        let mut composer = self.composer();
        composer.push_write(sender, target, payload, payment)?;
        let chunks = chunk_count(payload.len(), CHUNK_SIZE)?;
        debug!(?target, prior_size, new_size, funding, chunks, "prepared write");

        Ok(PreparedWrite {
            composer,
            quote,
            funding,
            chunks,
        })
    }

    /// Commit a prepared write; single-call writes are retried on transient failure
    pub async fn commit_write(&self, prepared: PreparedWrite) -> Result<WriteOutcome> {
        let receipts = if prepared.is_chunked() {
            self.commit_once(&prepared.composer).await?
        } else {
            self.commit_retrying(&prepared.composer).await?
        };
        Ok(WriteOutcome {
            quote: prepared.quote,
            funding: prepared.funding,
            chunks: prepared.chunks,
            receipts,
        })
    }

    /// Commit with the configured retry policy
    pub async fn commit_retrying(&self, composer: &CallComposer) -> Result<Vec<CallReceipt>> {
        with_retry(&self.config.retry, "submit", || composer.commit(self.ledger())).await
    }

    /// Commit exactly once
    pub async fn commit_once(&self, composer: &CallComposer) -> Result<Vec<CallReceipt>> {
        composer.commit(self.ledger()).await
    }
}
