//! AMB Relay: cross-chain message relay and reconciliation for the NFT Omnibridge
//!
//! Shared by the E2E harness and operator tooling:
//!
//! - **Chain** - [`ChainHandle`] capability and the alloy-backed EVM implementation
//! - **Correlation** - typed per-contract event schema, receipt to `messageId`
//! - **Delivery** - oracle confirmation waiting or manual relay with validator signatures
//! - **Reconciliation** - failed message fixes and mediator balance fixes
//! - **Testing** - in-memory chain and transfer assertions (`testing` feature)
//!
//! ## Flow
//!
//! ```text
//! NftToken::relay ─► MessageCorrelator ─┬─► ConfirmationWaiter                  (oracle)
//!                                       └─► ThresholdSignatureAggregator
//!                                           └─► ManualRelayExecutor           (manual)
//!                        Delivery { status: Failed } ─► ReconciliationController
//! ```

pub mod bridge;
pub mod chain;
pub mod correlator;
pub mod error;
pub mod evm;
pub mod executor;
pub mod mediator;
pub mod poll;
pub mod reconciliation;
pub mod signatures;
pub mod token;
pub mod types;
pub mod waiter;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::{eth_call_request_selector, AmbBridge, AmbSide, DeliveryRoute, RelayTicket};
pub use chain::{call_contract, submit_call, ChainHandle, LogQuery};
pub use correlator::MessageCorrelator;
pub use error::{CorrelationError, RelayError, RelayResult};
pub use evm::{EvmChain, EvmChainConfig};
pub use executor::ManualRelayExecutor;
pub use mediator::Mediator;
pub use poll::{PollOutcome, PollPolicy, Poller};
pub use reconciliation::{
    unaccounted_assets, FixOutcome, FixRecord, FixRequest, FixState, MediatorBalanceDelta,
    ReconciliationController,
};
pub use signatures::{PackedSignatures, Signature, ThresholdSignatureAggregator};
pub use token::NftToken;
pub use types::{
    AssetBatch, ChainLog, ChainSide, Delivery, DeliveryStatus, MessageHash, MessageId,
    MetadataUpdate, RelayOptions, RelayReceipt, TokenKind,
};
pub use waiter::ConfirmationWaiter;
