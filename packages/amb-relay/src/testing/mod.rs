//! Testing Utilities
//!
//! Helpers shared by unit tests, the integration tests and the E2E harness:
//!
//! - `fake_chain` - in-memory [`ChainHandle`](crate::chain::ChainHandle) with scripted responses
//! - `logs` - builders for AMB, mediator and token event logs
//! - `assertions` - token transfer checks on destination receipts

pub mod assertions;
pub mod fake_chain;
pub mod logs;

pub use assertions::{assert_erc1155_transfer, assert_erc721_transfer, assert_transfer, check_transfer};
pub use fake_chain::{FakeChain, SubmitResponse, Submission};
