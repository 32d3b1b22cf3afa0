//! Message correlation
//!
//! Extracts the cross-chain `messageId` from a source-side receipt so the
//! request can be joined with its effect on the other chain.

use alloy::primitives::{Address, Bytes};
use tracing::debug;

use crate::error::CorrelationError;
use crate::evm::events::{ContractKind, MessageEvent};
use crate::types::{MessageId, RelayReceipt};

/// Scans receipts using the typed event schema of known contract kinds
///
/// Without registered sources every contract kind's schema is tried against
/// every log; with sources only logs from those addresses are considered,
/// each under its own schema.
#[derive(Debug, Clone, Default)]
pub struct MessageCorrelator {
    sources: Vec<(Address, ContractKind)>,
}

impl MessageCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, address: Address, kind: ContractKind) -> Self {
        self.sources.push((address, kind));
        self
    }

    /// First message-bearing event in the receipt, in log order
    pub fn first_event(&self, receipt: &RelayReceipt) -> Result<MessageEvent, CorrelationError> {
        self.events(receipt)?
            .into_iter()
            .next()
            .ok_or(CorrelationError::MissingMessageId {
                tx_hash: receipt.tx_hash,
            })
    }

    /// `messageId` of the first message-bearing event
    pub fn correlate(&self, receipt: &RelayReceipt) -> Result<MessageId, CorrelationError> {
        let event = self.first_event(receipt)?;
        debug!(
            tx_hash = %receipt.tx_hash,
            message_id = %event.message_id(),
            "Correlated receipt with message"
        );
        Ok(event.message_id())
    }

    /// `messageId` together with the full `encodedData`, for the manual path
    ///
    /// Only AMB request events carry `encodedData`, so the first such event is
    /// used. A receipt with a message id but no payload is `MissingPayload`.
    pub fn correlate_with_payload(
        &self,
        receipt: &RelayReceipt,
    ) -> Result<(MessageId, Bytes), CorrelationError> {
        let events = self.events(receipt)?;
        let first_id = match events.first() {
            Some(event) => event.message_id(),
            None => {
                return Err(CorrelationError::MissingMessageId {
                    tx_hash: receipt.tx_hash,
                })
            }
        };
        events
            .iter()
            .find_map(|e| e.encoded_data().map(|data| (e.message_id(), data.clone())))
            .ok_or(CorrelationError::MissingPayload {
                tx_hash: receipt.tx_hash,
                message_id: first_id,
            })
    }

    fn events(&self, receipt: &RelayReceipt) -> Result<Vec<MessageEvent>, CorrelationError> {
        if !receipt.status {
            return Err(CorrelationError::TransactionReverted {
                tx_hash: receipt.tx_hash,
            });
        }

        let events = receipt
            .logs
            .iter()
            .filter_map(|log| {
                if self.sources.is_empty() {
                    ContractKind::ALL
                        .iter()
                        .find_map(|kind| MessageEvent::decode(*kind, log))
                } else {
                    self.sources
                        .iter()
                        .filter(|(address, _)| *address == log.address())
                        .find_map(|(_, kind)| MessageEvent::decode(*kind, log))
                }
            })
            .collect();
        Ok(events)
    }
}
