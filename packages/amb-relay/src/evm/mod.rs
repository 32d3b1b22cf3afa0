//! EVM Chain Module
//!
//! - Contract bindings for the AMBs, mediators and test tokens
//! - Typed event schema per contract kind
//! - Alloy-backed [`ChainHandle`](crate::chain::ChainHandle)
//! - Per-account nonce serialization

pub mod client;
pub mod contracts;
pub mod events;
pub mod nonce;

pub use client::{EvmChain, EvmChainConfig, DEFAULT_GAS_LIMIT};
pub use events::{ContractKind, FinalizationEvent, MessageEvent};
pub use nonce::NonceCounter;
