//! Common types for cross-chain message relay
//!
//! Identifiers, receipts and delivery results shared by the correlator,
//! waiters, the manual relay path and reconciliation.

use alloy::primitives::{keccak256, Address, Bytes, Log, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Chain side
// ============================================================================

/// One of the two independently finalizing ledgers connected by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainSide {
    Home,
    Foreign,
}

impl ChainSide {
    /// The side a message sent from this side is delivered to
    pub fn opposite(&self) -> Self {
        match self {
            ChainSide::Home => ChainSide::Foreign,
            ChainSide::Foreign => ChainSide::Home,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainSide::Home => "home",
            ChainSide::Foreign => "foreign",
        }
    }
}

impl fmt::Display for ChainSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Message identifiers
// ============================================================================

/// Bridge-assigned identifier of one cross-chain request
///
/// Joins the source-side submission with destination-side execution and
/// finalization events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub B256);

impl MessageId {
    pub fn as_b256(&self) -> B256 {
        self.0
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<B256> for MessageId {
    fn from(value: B256) -> Self {
        MessageId(value)
    }
}

/// Digest of the full encoded message payload, used to request and collect
/// validator signatures on the manual relay path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHash(pub B256);

impl MessageHash {
    /// keccak256 over the raw `encodedData` bytes
    pub fn of_encoded_data(encoded_data: &[u8]) -> Self {
        MessageHash(keccak256(encoded_data))
    }

    pub fn as_b256(&self) -> B256 {
        self.0
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ============================================================================
// Receipts and logs
// ============================================================================

/// A log record together with its position on chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainLog {
    /// Emitting contract, topics and data
    pub inner: Log,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
}

impl ChainLog {
    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn topic0(&self) -> Option<B256> {
        self.inner.data.topics().first().copied()
    }
}

/// Result of a submitted transaction as seen by the relay protocol
#[derive(Debug, Clone, PartialEq)]
pub struct RelayReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    /// On-chain execution status (`false` = reverted)
    pub status: bool,
    pub logs: Vec<ChainLog>,
}

impl RelayReceipt {
    /// Logs emitted by a particular contract
    pub fn logs_from(&self, address: Address) -> impl Iterator<Item = &ChainLog> {
        self.logs.iter().filter(move |l| l.address() == address)
    }
}

// ============================================================================
// Delivery results
// ============================================================================

/// Destination-side outcome of applying a message
///
/// `Failed` means the message reached the destination but its execution
/// (e.g. the target mediator call) failed. It is a recoverable protocol state,
/// distinct from a reverted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Executed,
    Failed,
}

impl DeliveryStatus {
    pub fn from_flag(status: bool) -> Self {
        if status {
            DeliveryStatus::Executed
        } else {
            DeliveryStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Executed => "executed",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message observed on its destination chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: MessageId,
    pub status: DeliveryStatus,
    /// Destination transaction that executed the message
    pub tx_hash: B256,
}

impl Delivery {
    pub fn is_executed(&self) -> bool {
        self.status == DeliveryStatus::Executed
    }
}

// ============================================================================
// Assets
// ============================================================================

/// Token standard of a bridged asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Erc721,
    Erc1155,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Erc721 => f.write_str("ERC721"),
            TokenKind::Erc1155 => f.write_str("ERC1155"),
        }
    }
}

/// Token metadata a mediator synchronizes from a native token to its bridged copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataUpdate {
    Owner,
    Erc721Uri(U256),
    Erc1155Uri(U256),
}

impl fmt::Display for MetadataUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataUpdate::Owner => f.write_str("owner"),
            MetadataUpdate::Erc721Uri(id) => write!(f, "ERC721 URI of #{}", id),
            MetadataUpdate::Erc1155Uri(id) => write!(f, "ERC1155 URI of #{}", id),
        }
    }
}

/// Per-asset payload of a bridge operation
///
/// For ERC-721 `values` is empty; for ERC-1155 it is parallel to `token_ids`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBatch {
    pub token: Address,
    pub recipient: Address,
    pub token_ids: Vec<U256>,
    pub values: Vec<U256>,
}

impl AssetBatch {
    pub fn erc721(token: Address, recipient: Address, token_ids: Vec<U256>) -> Self {
        Self {
            token,
            recipient,
            token_ids,
            values: Vec::new(),
        }
    }

    pub fn erc1155(
        token: Address,
        recipient: Address,
        token_ids: Vec<U256>,
        values: Vec<U256>,
    ) -> Self {
        Self {
            token,
            recipient,
            token_ids,
            values,
        }
    }

    pub fn kind(&self) -> TokenKind {
        if self.values.is_empty() {
            TokenKind::Erc721
        } else {
            TokenKind::Erc1155
        }
    }
}

/// Extra payload forwarded with a token relay
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    /// Alternative receiver on the other side
    pub receiver: Option<Address>,
    /// Bytes appended after the receiver
    pub data: Bytes,
}

impl RelayOptions {
    pub fn to(receiver: Address) -> Self {
        Self {
            receiver: Some(receiver),
            data: Bytes::new(),
        }
    }

    /// `data` argument of `safeTransferFrom`: receiver address followed by extra bytes
    ///
    /// Without a receiver the mediator credits the sender, and any extra data is dropped.
    pub fn transfer_data(&self) -> Bytes {
        match self.receiver {
            Some(receiver) => {
                let mut out = Vec::with_capacity(20 + self.data.len());
                out.extend_from_slice(receiver.as_slice());
                out.extend_from_slice(&self.data);
                out.into()
            }
            None => Bytes::new(),
        }
    }
}
