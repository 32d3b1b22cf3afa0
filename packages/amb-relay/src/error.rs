//! Relay protocol error taxonomy
//!
//! Low-level chain errors travel unchanged inside [`RelayError::Rpc`]; every
//! protocol condition is translated into one of the other variants before it
//! reaches the caller. A destination `status=false` is not an error (see
//! [`crate::types::DeliveryStatus`]).

use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

use crate::types::{ChainSide, MessageHash, MessageId};

/// The receipt cannot be joined with a cross-chain message
///
/// Never retried: it means the submission failed or the wrong contract/ABI
/// was used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("Transaction with AMB request has failed: {tx_hash} reverted")]
    TransactionReverted { tx_hash: B256 },

    #[error("No event with messageId field was found in {tx_hash}")]
    MissingMessageId { tx_hash: B256 },

    #[error("Message {message_id} has no encodedData in {tx_hash}")]
    MissingPayload { tx_hash: B256, message_id: MessageId },

    #[error("Transaction {tx_hash} executed message {found} instead of {expected}")]
    UnexpectedMessage {
        tx_hash: B256,
        expected: MessageId,
        found: MessageId,
    },
}

/// Errors surfaced by the relay and reconciliation flows
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    #[error("Message {message_id} is not processed after {attempts} attempts, check if AMB validators are working correctly")]
    ConfirmationTimeout { message_id: MessageId, attempts: u32 },

    #[error("Signatures for message hash {message_hash} were not collected after {attempts} attempts")]
    SignatureCollectionTimeout {
        message_hash: MessageHash,
        attempts: u32,
    },

    #[error("{side} did not reach block {height} after {attempts} attempts")]
    BlockHeightTimeout {
        side: ChainSide,
        height: u64,
        attempts: u32,
    },

    #[error("Signature #{index} has {len} bytes, expected 65")]
    MalformedSignature { index: usize, len: usize },

    #[error("{count} signatures exceed the packed format limit of 255")]
    TooManySignatures { count: usize },

    #[error("Manual relay is only available for home -> foreign messages, got one from {from}")]
    UnsupportedRoute { from: ChainSide },

    #[error("Manual relay submission {tx_hash} reverted")]
    RelaySubmission { tx_hash: B256 },

    #[error("Fix for message {message_id} rejected: {reason}")]
    FixRejected {
        message_id: MessageId,
        reason: String,
    },

    #[error("Token {token} id {token_id} is already accounted for by the mediator ({owned} owned)")]
    BalanceAlreadyAccounted {
        token: Address,
        token_id: U256,
        owned: U256,
    },

    #[error("Mediator balance fix for {token} reverted in {tx_hash}")]
    BalanceFixRejected { token: Address, tx_hash: B256 },

    #[error("{0:#}")]
    Rpc(eyre::Report),
}

impl From<eyre::Report> for RelayError {
    fn from(report: eyre::Report) -> Self {
        RelayError::Rpc(report)
    }
}

impl RelayError {
    /// Timeouts leave the decision (fallback to manual relay, abort) to the caller
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RelayError::ConfirmationTimeout { .. }
                | RelayError::SignatureCollectionTimeout { .. }
                | RelayError::BlockHeightTimeout { .. }
        )
    }

    pub fn is_reverted_submission(&self) -> bool {
        matches!(
            self,
            RelayError::Correlation(CorrelationError::TransactionReverted { .. })
                | RelayError::RelaySubmission { .. }
        )
    }
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;
