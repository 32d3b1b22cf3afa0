//! Chain capability
//!
//! [`ChainHandle`] is everything the relay protocol needs from one ledger:
//! submit a transaction, read a log range, make a read-only call, report
//! the current height and wait for a given height. The EVM implementation lives in [`crate::evm`], the
//! in-memory one in `crate::testing`.

use alloy::primitives::{Address, Bytes, B256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use eyre::{Result, WrapErr};

use crate::error::{RelayError, RelayResult};
use crate::poll::{PollOutcome, PollPolicy, Poller};
use crate::types::{ChainLog, ChainSide, RelayReceipt};

/// Log filter over a block range
///
/// `topics[i]` constrains indexed topic `i + 1` (topic0 is the event signature).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub event_signature: B256,
    pub topics: [Option<B256>; 3],
    pub from_block: u64,
    /// `None` = latest
    pub to_block: Option<u64>,
}

impl LogQuery {
    pub fn new(address: Address, event_signature: B256, from_block: u64) -> Self {
        Self {
            address,
            event_signature,
            topics: [None; 3],
            from_block,
            to_block: None,
        }
    }

    /// Constrain the indexed topic at `position` (1..=3)
    pub fn topic(mut self, position: usize, value: B256) -> Self {
        if (1..=3).contains(&position) {
            self.topics[position - 1] = Some(value);
        }
        self
    }

    pub fn to_block(mut self, block: u64) -> Self {
        self.to_block = Some(block);
        self
    }

    /// Whether a log satisfies this filter, ignoring the block range
    pub fn matches(&self, log: &ChainLog) -> bool {
        if log.address() != self.address || log.topic0() != Some(self.event_signature) {
            return false;
        }
        let topics = log.inner.data.topics();
        self.topics.iter().enumerate().all(|(i, expected)| match expected {
            Some(value) => topics.get(i + 1) == Some(value),
            None => true,
        })
    }

    pub fn contains_block(&self, block: u64) -> bool {
        block >= self.from_block && self.to_block.map_or(true, |to| block <= to)
    }
}

/// A capability bound to one chain (and at most one signing account)
#[async_trait]
pub trait ChainHandle: Send + Sync {
    fn side(&self) -> ChainSide;

    /// Account used by [`ChainHandle::submit`], if any
    fn account(&self) -> Option<Address>;

    async fn block_number(&self) -> Result<u64>;

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>>;

    /// Read-only call returning raw ABI-encoded output
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes>;

    /// Broadcast a transaction and wait for its receipt
    ///
    /// A reverted transaction is an `Ok` receipt with `status == false`.
    async fn submit(&self, to: Address, input: Bytes) -> Result<RelayReceipt>;

    async fn receipt(&self, tx_hash: B256) -> Result<Option<RelayReceipt>>;

    /// Wait until the chain is at `height` or above and return the height seen
    async fn wait_for_block(&self, height: u64, policy: PollPolicy) -> RelayResult<u64> {
        let current = self.block_number().await?;
        if current >= height {
            return Ok(current);
        }

        let outcome = Poller::new(policy)
            .run("block height", |_| async move {
                let current = self.block_number().await?;
                Ok::<_, RelayError>((current >= height).then_some(current))
            })
            .await?;

        match outcome {
            PollOutcome::Ready(current) => Ok(current),
            PollOutcome::Exhausted { attempts } => Err(RelayError::BlockHeightTimeout {
                side: self.side(),
                height,
                attempts,
            }),
        }
    }
}

/// Typed read-only call through a [`ChainHandle`]
pub async fn call_contract<C: SolCall>(
    chain: &dyn ChainHandle,
    to: Address,
    call: C,
) -> Result<C::Return> {
    let output = chain.call(to, call.abi_encode().into()).await?;
    C::abi_decode_returns(&output, true)
        .wrap_err_with(|| format!("Failed to decode {} output from {}", C::SIGNATURE, to))
}

/// Typed transaction through a [`ChainHandle`]
pub async fn submit_call<C: SolCall>(
    chain: &dyn ChainHandle,
    to: Address,
    call: C,
) -> Result<RelayReceipt> {
    chain
        .submit(to, call.abi_encode().into())
        .await
        .wrap_err_with(|| format!("Failed to submit {} to {}", C::SIGNATURE, to))
}
