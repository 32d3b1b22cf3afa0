//! Typed event schema for bridge contracts
//!
//! Each contract kind has a fixed, versioned set of events that may carry a
//! `messageId`. Decoding is driven by topic0 against that set, so a log from an
//! unrelated contract is never mistaken for a bridge request.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolEvent;
use tracing::warn;

use crate::evm::contracts::{IForeignAmb, IHomeAmb, INftMediator};
use crate::types::{ChainLog, DeliveryStatus, MessageHash, MessageId};

/// Contract families whose events are understood by the correlator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    HomeAmb,
    ForeignAmb,
    Mediator,
}

impl ContractKind {
    /// Topic0 of every message-bearing event this contract kind emits
    pub fn message_event_topics(&self) -> &'static [B256] {
        const HOME: [B256; 2] = [
            IHomeAmb::UserRequestForSignature::SIGNATURE_HASH,
            IHomeAmb::UserRequestForInformation::SIGNATURE_HASH,
        ];
        const FOREIGN: [B256; 1] = [IForeignAmb::UserRequestForAffirmation::SIGNATURE_HASH];
        const MEDIATOR: [B256; 3] = [
            INftMediator::TokensBridgingInitiated::SIGNATURE_HASH,
            INftMediator::TokensBridged::SIGNATURE_HASH,
            INftMediator::FailedMessageFixed::SIGNATURE_HASH,
        ];
        match self {
            ContractKind::HomeAmb => &HOME,
            ContractKind::ForeignAmb => &FOREIGN,
            ContractKind::Mediator => &MEDIATOR,
        }
    }

    pub const ALL: [ContractKind; 3] = [
        ContractKind::HomeAmb,
        ContractKind::ForeignAmb,
        ContractKind::Mediator,
    ];
}

/// An event that carries the identifier of a cross-chain message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// Home AMB: Home -> Foreign request awaiting validator signatures
    SignatureRequest {
        message_id: MessageId,
        encoded_data: Bytes,
    },
    /// Foreign AMB: Foreign -> Home request awaiting affirmation
    AffirmationRequest {
        message_id: MessageId,
        encoded_data: Bytes,
    },
    /// Home AMB: request for data read from the Foreign chain
    InformationRequest {
        message_id: MessageId,
        request_selector: B256,
        sender: Address,
        data: Bytes,
    },
    /// Mediator: tokens locked/burned and a message sent
    BridgingInitiated {
        message_id: MessageId,
        token: Address,
        sender: Address,
        token_ids: Vec<U256>,
        values: Vec<U256>,
    },
    /// Mediator: tokens minted/unlocked for an incoming message
    Bridged {
        message_id: MessageId,
        token: Address,
        recipient: Address,
        token_ids: Vec<U256>,
        values: Vec<U256>,
    },
    /// Mediator: a failed outgoing message was refunded
    FailedMessageFixed {
        message_id: MessageId,
        token: Address,
        recipient: Address,
        token_ids: Vec<U256>,
        values: Vec<U256>,
    },
}

impl MessageEvent {
    /// Decode a log using the schema of `kind`
    ///
    /// Returns `None` when topic0 is not part of the schema. A log whose topic0
    /// matches but whose body does not decode is logged and skipped.
    pub fn decode(kind: ContractKind, log: &ChainLog) -> Option<Self> {
        let topic0 = log.topic0()?;
        if !kind.message_event_topics().contains(&topic0) {
            return None;
        }

        let data = &log.inner.data;
        let decoded = if topic0 == IHomeAmb::UserRequestForSignature::SIGNATURE_HASH {
            IHomeAmb::UserRequestForSignature::decode_log_data(data, true).map(|e| {
                MessageEvent::SignatureRequest {
                    message_id: MessageId(e.messageId),
                    encoded_data: e.encodedData,
                }
            })
        } else if topic0 == IHomeAmb::UserRequestForInformation::SIGNATURE_HASH {
            IHomeAmb::UserRequestForInformation::decode_log_data(data, true).map(|e| {
                MessageEvent::InformationRequest {
                    message_id: MessageId(e.messageId),
                    request_selector: e.requestSelector,
                    sender: e.sender,
                    data: e.data,
                }
            })
        } else if topic0 == IForeignAmb::UserRequestForAffirmation::SIGNATURE_HASH {
            IForeignAmb::UserRequestForAffirmation::decode_log_data(data, true).map(|e| {
                MessageEvent::AffirmationRequest {
                    message_id: MessageId(e.messageId),
                    encoded_data: e.encodedData,
                }
            })
        } else if topic0 == INftMediator::TokensBridgingInitiated::SIGNATURE_HASH {
            INftMediator::TokensBridgingInitiated::decode_log_data(data, true).map(|e| {
                MessageEvent::BridgingInitiated {
                    message_id: MessageId(e.messageId),
                    token: e.token,
                    sender: e.sender,
                    token_ids: e.tokenIds,
                    values: e.values,
                }
            })
        } else if topic0 == INftMediator::TokensBridged::SIGNATURE_HASH {
            INftMediator::TokensBridged::decode_log_data(data, true).map(|e| {
                MessageEvent::Bridged {
                    message_id: MessageId(e.messageId),
                    token: e.token,
                    recipient: e.recipient,
                    token_ids: e.tokenIds,
                    values: e.values,
                }
            })
        } else {
            INftMediator::FailedMessageFixed::decode_log_data(data, true).map(|e| {
                MessageEvent::FailedMessageFixed {
                    message_id: MessageId(e.messageId),
                    token: e.token,
                    recipient: e.recipient,
                    token_ids: e.tokenIds,
                    values: e.values,
                }
            })
        };

        match decoded {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(
                    block = log.block_number,
                    tx = %log.tx_hash,
                    error = %e,
                    "Failed to decode bridge event from log"
                );
                None
            }
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            MessageEvent::SignatureRequest { message_id, .. }
            | MessageEvent::AffirmationRequest { message_id, .. }
            | MessageEvent::InformationRequest { message_id, .. }
            | MessageEvent::BridgingInitiated { message_id, .. }
            | MessageEvent::Bridged { message_id, .. }
            | MessageEvent::FailedMessageFixed { message_id, .. } => *message_id,
        }
    }

    /// Full encoded AMB message, present only on AMB requests relayed to the other chain
    pub fn encoded_data(&self) -> Option<&Bytes> {
        match self {
            MessageEvent::SignatureRequest { encoded_data, .. }
            | MessageEvent::AffirmationRequest { encoded_data, .. } => Some(encoded_data),
            _ => None,
        }
    }
}

// ============================================================================
// Destination-side events
// ============================================================================

/// Event marking a message as executed on its destination chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizationEvent {
    /// Home AMB, for Foreign -> Home messages
    AffirmationCompleted,
    /// Foreign AMB, for Home -> Foreign messages
    RelayedMessage,
    /// Home AMB, answer to an information request
    InformationRetrieved,
}

impl FinalizationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FinalizationEvent::AffirmationCompleted => "AffirmationCompleted",
            FinalizationEvent::RelayedMessage => "RelayedMessage",
            FinalizationEvent::InformationRetrieved => "InformationRetrieved",
        }
    }

    /// Index of the topic holding `messageId`
    pub fn message_id_topic(&self) -> usize {
        match self {
            FinalizationEvent::AffirmationCompleted | FinalizationEvent::RelayedMessage => 3,
            FinalizationEvent::InformationRetrieved => 1,
        }
    }

    pub fn signature_hash(&self) -> B256 {
        match self {
            FinalizationEvent::AffirmationCompleted => {
                IHomeAmb::AffirmationCompleted::SIGNATURE_HASH
            }
            FinalizationEvent::RelayedMessage => IForeignAmb::RelayedMessage::SIGNATURE_HASH,
            FinalizationEvent::InformationRetrieved => {
                IHomeAmb::InformationRetrieved::SIGNATURE_HASH
            }
        }
    }

    /// Decode `(messageId, status)` from a log of this event
    ///
    /// An information request only counts as executed when both the data
    /// call and the requester's callback succeeded.
    pub fn decode(&self, log: &ChainLog) -> Option<(MessageId, DeliveryStatus)> {
        if log.topic0() != Some(self.signature_hash()) {
            return None;
        }
        let data = &log.inner.data;
        let decoded = match self {
            FinalizationEvent::AffirmationCompleted => {
                IHomeAmb::AffirmationCompleted::decode_log_data(data, true)
                    .map(|e| (e.messageId, e.status))
            }
            FinalizationEvent::RelayedMessage => {
                IForeignAmb::RelayedMessage::decode_log_data(data, true)
                    .map(|e| (e.messageId, e.status))
            }
            FinalizationEvent::InformationRetrieved => {
                IHomeAmb::InformationRetrieved::decode_log_data(data, true)
                    .map(|e| (e.messageId, e.status && e.callbackStatus))
            }
        };
        match decoded {
            Ok((id, status)) => Some((MessageId(id), DeliveryStatus::from_flag(status))),
            Err(e) => {
                warn!(
                    event = self.name(),
                    tx = %log.tx_hash,
                    error = %e,
                    "Failed to decode finalization event"
                );
                None
            }
        }
    }
}

/// Decode a `CollectedSignatures` log into its message hash
pub fn decode_collected_signatures(log: &ChainLog) -> Option<MessageHash> {
    if log.topic0() != Some(IHomeAmb::CollectedSignatures::SIGNATURE_HASH) {
        return None;
    }
    IHomeAmb::CollectedSignatures::decode_log_data(&log.inner.data, true)
        .ok()
        .map(|e| MessageHash(e.messageHash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::logs;
    use alloy::primitives::address;

    const AMB: Address = address!("00000000000000000000000000000000000a4b00");
    const MEDIATOR: Address = address!("000000000000000000000000000000000000bed1");

    #[test]
    fn test_decode_signature_request() {
        let id = MessageId(B256::repeat_byte(0x11));
        let log = logs::signature_request(AMB, id, Bytes::from(vec![1, 2, 3]));

        let event = MessageEvent::decode(ContractKind::HomeAmb, &log).expect("decodes");
        assert_eq!(event.message_id(), id);
        assert_eq!(event.encoded_data().map(|d| d.to_vec()), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_schema_is_keyed_by_contract_kind() {
        let id = MessageId(B256::repeat_byte(0x22));
        let log = logs::signature_request(AMB, id, Bytes::new());

        // UserRequestForSignature is not part of the Foreign AMB or mediator schema
        assert!(MessageEvent::decode(ContractKind::ForeignAmb, &log).is_none());
        assert!(MessageEvent::decode(ContractKind::Mediator, &log).is_none());
    }

    #[test]
    fn test_decode_bridging_initiated() {
        let id = MessageId(B256::repeat_byte(0x33));
        let token = address!("0000000000000000000000000000000000007070");
        let sender = address!("0000000000000000000000000000000000005e5d");
        let log = logs::bridging_initiated(MEDIATOR, token, sender, vec![U256::from(7)], id);

        let event = MessageEvent::decode(ContractKind::Mediator, &log).expect("decodes");
        assert_eq!(event.message_id(), id);
        assert!(event.encoded_data().is_none());
        match event {
            MessageEvent::BridgingInitiated {
                token: t,
                sender: s,
                token_ids,
                ..
            } => {
                assert_eq!(t, token);
                assert_eq!(s, sender);
                assert_eq!(token_ids, vec![U256::from(7)]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_finalization_event_status() {
        let id = MessageId(B256::repeat_byte(0x44));
        let ok = logs::relayed_message(AMB, id, true);
        let failed = logs::relayed_message(AMB, id, false);

        let event = FinalizationEvent::RelayedMessage;
        assert_eq!(event.decode(&ok), Some((id, DeliveryStatus::Executed)));
        assert_eq!(event.decode(&failed), Some((id, DeliveryStatus::Failed)));
        assert_eq!(FinalizationEvent::AffirmationCompleted.decode(&ok), None);
    }

    #[test]
    fn test_information_request_has_no_payload() {
        let id = MessageId(B256::repeat_byte(0x66));
        let sender = address!("0000000000000000000000000000000000005e5d");
        let log = logs::information_request(AMB, id, B256::repeat_byte(0x01), sender, Bytes::new());

        let event = MessageEvent::decode(ContractKind::HomeAmb, &log).expect("decodes");
        assert_eq!(event.message_id(), id);
        assert!(event.encoded_data().is_none());
        assert!(MessageEvent::decode(ContractKind::ForeignAmb, &log).is_none());
    }

    #[test]
    fn test_information_retrieved_needs_callback() {
        let id = MessageId(B256::repeat_byte(0x77));
        let event = FinalizationEvent::InformationRetrieved;
        assert_eq!(event.message_id_topic(), 1);

        let ok = logs::information_retrieved(AMB, id, true, true);
        let callback_failed = logs::information_retrieved(AMB, id, true, false);
        let call_failed = logs::information_retrieved(AMB, id, false, true);
        assert_eq!(event.decode(&ok), Some((id, DeliveryStatus::Executed)));
        assert_eq!(event.decode(&callback_failed), Some((id, DeliveryStatus::Failed)));
        assert_eq!(event.decode(&call_failed), Some((id, DeliveryStatus::Failed)));
        assert_eq!(FinalizationEvent::AffirmationCompleted.decode(&ok), None);
    }

    #[test]
    fn test_collected_signatures() {
        let hash = MessageHash(B256::repeat_byte(0x55));
        let log = logs::collected_signatures(AMB, hash, 2);
        assert_eq!(decode_collected_signatures(&log), Some(hash));
    }
}
