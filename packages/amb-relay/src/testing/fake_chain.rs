//! In-memory chain handle
//!
//! Calls and submissions are answered by responders registered per
//! (contract, selector). Logs can be made visible only after a number of log
//! queries, which is how tests simulate a message that is not processed yet.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::chain::{ChainHandle, LogQuery};
use crate::types::{ChainLog, ChainSide, RelayReceipt};

type Selector = [u8; 4];
type CallResponder = Arc<dyn Fn(&[u8]) -> Result<Bytes> + Send + Sync>;
type SubmitResponder = Arc<dyn Fn(&Submission) -> Result<SubmitResponse> + Send + Sync>;

/// A transaction recorded by [`FakeChain::submit`]
#[derive(Debug, Clone)]
pub struct Submission {
    pub from: Option<Address>,
    pub to: Address,
    pub input: Bytes,
    pub tx_hash: B256,
    pub block_number: u64,
}

impl Submission {
    pub fn selector(&self) -> Option<Selector> {
        selector_of(&self.input)
    }
}

/// What a scripted submission produces
#[derive(Debug, Clone, Default)]
pub struct SubmitResponse {
    pub status: bool,
    pub logs: Vec<ChainLog>,
}

impl SubmitResponse {
    pub fn success(logs: Vec<ChainLog>) -> Self {
        Self { status: true, logs }
    }

    pub fn reverted() -> Self {
        Self {
            status: false,
            logs: Vec::new(),
        }
    }
}

struct StoredLog {
    log: ChainLog,
    /// Visible from this log query on (1-based)
    visible_from_query: u32,
}

#[derive(Default)]
struct FakeState {
    block: u64,
    tx_count: u64,
    logs: Vec<StoredLog>,
    log_queries: u32,
    calls: HashMap<(Address, Selector), CallResponder>,
    call_counts: HashMap<(Address, Selector), u32>,
    submits: HashMap<(Address, Selector), SubmitResponder>,
    submissions: Vec<Submission>,
    receipts: HashMap<B256, RelayReceipt>,
}

impl FakeState {
    fn next_tx(&mut self, side: ChainSide) -> (B256, u64) {
        self.block += 1;
        self.tx_count += 1;
        let tag = U256::from(side as u8 + 1) << 248;
        (B256::from(tag | U256::from(self.tx_count)), self.block)
    }

    fn commit(&mut self, submission: &Submission, response: SubmitResponse) -> RelayReceipt {
        let logs: Vec<ChainLog> = response
            .logs
            .into_iter()
            .enumerate()
            .map(|(i, mut log)| {
                log.tx_hash = submission.tx_hash;
                log.block_number = submission.block_number;
                log.log_index = i as u64;
                log
            })
            .collect();

        let receipt = RelayReceipt {
            tx_hash: submission.tx_hash,
            block_number: submission.block_number,
            status: response.status,
            logs,
        };

        if receipt.status {
            for log in &receipt.logs {
                self.logs.push(StoredLog {
                    log: log.clone(),
                    visible_from_query: 0,
                });
            }
        }
        self.receipts.insert(receipt.tx_hash, receipt.clone());
        receipt
    }
}

/// Shared in-memory ledger; handles created by [`FakeChain::connect`] see the same state
pub struct FakeChain {
    side: ChainSide,
    account: Option<Address>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeChain {
    pub fn new(side: ChainSide) -> Self {
        Self {
            side,
            account: None,
            state: Arc::new(Mutex::new(FakeState {
                block: 1,
                ..Default::default()
            })),
        }
    }

    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    /// Another account on the same chain
    pub fn connect(&self, account: Address) -> Self {
        Self {
            side: self.side,
            account: Some(account),
            state: self.state.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        // A panicking responder must not hide the original failure behind a poison error
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    pub fn respond_with<F>(&self, to: Address, selector: Selector, f: F)
    where
        F: Fn(&[u8]) -> Result<Bytes> + Send + Sync + 'static,
    {
        self.state().calls.insert((to, selector), Arc::new(f));
    }

    /// Answer every call to `selector` with a single ABI-encoded return value
    pub fn respond_value<T>(&self, to: Address, selector: Selector, value: T)
    where
        T: SolValue + Send + Sync + 'static,
    {
        let encoded: Bytes = (value,).abi_encode_params().into();
        self.respond_with(to, selector, move |_| Ok(encoded.clone()));
    }

    pub fn on_submit<F>(&self, to: Address, selector: Selector, f: F)
    where
        F: Fn(&Submission) -> Result<SubmitResponse> + Send + Sync + 'static,
    {
        self.state().submits.insert((to, selector), Arc::new(f));
    }

    /// Make a log visible to every query from now on
    pub fn push_log(&self, log: ChainLog) {
        self.push_log_after(log, 0);
    }

    /// Make a log visible starting with the `query`-th log query
    pub fn push_log_after(&self, log: ChainLog, query: u32) {
        self.state().logs.push(StoredLog {
            log,
            visible_from_query: query,
        });
    }

    pub fn advance_blocks(&self, n: u64) {
        self.state().block += n;
    }

    /// Include a transaction sent by someone else (e.g. an AMB validator) in a new block
    pub fn mine(&self, to: Address, response: SubmitResponse) -> RelayReceipt {
        let mut state = self.state();
        let (tx_hash, block_number) = state.next_tx(self.side);
        let submission = Submission {
            from: None,
            to,
            input: Bytes::new(),
            tx_hash,
            block_number,
        };
        state.commit(&submission, response)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn log_queries(&self) -> u32 {
        self.state().log_queries
    }

    pub fn call_count(&self, to: Address, selector: Selector) -> u32 {
        self.state()
            .call_counts
            .get(&(to, selector))
            .copied()
            .unwrap_or_default()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Submissions to `to` whose calldata starts with `selector`
    pub fn submissions_to(&self, to: Address, selector: Selector) -> Vec<Submission> {
        self.state()
            .submissions
            .iter()
            .filter(|s| s.to == to && s.selector() == Some(selector))
            .cloned()
            .collect()
    }
}

fn selector_of(input: &[u8]) -> Option<Selector> {
    input.get(..4).and_then(|s| s.try_into().ok())
}

#[async_trait]
impl ChainHandle for FakeChain {
    fn side(&self) -> ChainSide {
        self.side
    }

    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.state().block)
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>> {
        let mut state = self.state();
        state.log_queries += 1;
        let current = state.log_queries;
        Ok(state
            .logs
            .iter()
            .filter(|stored| stored.visible_from_query <= current)
            .map(|stored| &stored.log)
            .filter(|log| query.matches(log) && query.contains_block(log.block_number))
            .cloned()
            .collect())
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        let selector =
            selector_of(&input).ok_or_else(|| eyre!("call to {} without selector", to))?;
        let responder = {
            let mut state = self.state();
            *state.call_counts.entry((to, selector)).or_default() += 1;
            state.calls.get(&(to, selector)).cloned()
        };
        match responder {
            Some(f) => f(&input),
            None => Err(eyre!(
                "execution reverted: no responder for 0x{} on {}",
                hex::encode(selector),
                to
            )),
        }
    }

    async fn submit(&self, to: Address, input: Bytes) -> Result<RelayReceipt> {
        let (submission, responder) = {
            let mut state = self.state();
            let (tx_hash, block_number) = state.next_tx(self.side);
            let submission = Submission {
                from: self.account,
                to,
                input: input.clone(),
                tx_hash,
                block_number,
            };
            let responder = selector_of(&input).and_then(|s| state.submits.get(&(to, s)).cloned());
            state.submissions.push(submission.clone());
            (submission, responder)
        };

        let response = match responder {
            Some(f) => f(&submission)?,
            None => SubmitResponse::success(Vec::new()),
        };
        Ok(self.state().commit(&submission, response))
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<RelayReceipt>> {
        Ok(self.state().receipts.get(&tx_hash).cloned())
    }
}
