//! Manual relay execution
//!
//! Submits `executeSignatures(encodedData, packedSignatures)` to the Foreign
//! AMB. Submissions are never retried: a reverted relay is surfaced as
//! [`RelayError::RelaySubmission`].

use alloy::primitives::{Address, Bytes};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::{submit_call, ChainHandle};
use crate::error::{CorrelationError, RelayError, RelayResult};
use crate::evm::contracts::IForeignAmb;
use crate::evm::events::FinalizationEvent;
use crate::signatures::PackedSignatures;
use crate::types::{Delivery, MessageId};

pub struct ManualRelayExecutor {
    chain: Arc<dyn ChainHandle>,
    amb: Address,
}

impl ManualRelayExecutor {
    pub fn new(chain: Arc<dyn ChainHandle>, amb: Address) -> Self {
        Self { chain, amb }
    }

    /// Execute a message on the destination and read its `RelayedMessage` status
    pub async fn execute(
        &self,
        message_id: MessageId,
        encoded_data: Bytes,
        signatures: PackedSignatures,
    ) -> RelayResult<Delivery> {
        info!(
            message_id = %message_id,
            signatures = signatures.count(),
            amb = %self.amb,
            "Executing message with collected signatures"
        );

        let receipt = submit_call(
            self.chain.as_ref(),
            self.amb,
            IForeignAmb::executeSignaturesCall {
                encodedData: encoded_data,
                signatures: signatures.into_bytes(),
            },
        )
        .await?;

        if !receipt.status {
            warn!(message_id = %message_id, tx_hash = %receipt.tx_hash, "Manual relay reverted");
            return Err(RelayError::RelaySubmission {
                tx_hash: receipt.tx_hash,
            });
        }

        let event = FinalizationEvent::RelayedMessage;
        let relayed: Vec<_> = receipt
            .logs_from(self.amb)
            .filter_map(|log| event.decode(log))
            .collect();
        let (id, status) = match relayed.iter().find(|(id, _)| *id == message_id) {
            Some(found) => *found,
            None => {
                let err = match relayed.first() {
                    Some((other, _)) => {
                        warn!(
                            expected = %message_id,
                            found = %other,
                            tx_hash = %receipt.tx_hash,
                            "Manual relay executed a different message"
                        );
                        CorrelationError::UnexpectedMessage {
                            tx_hash: receipt.tx_hash,
                            expected: message_id,
                            found: *other,
                        }
                    }
                    None => CorrelationError::MissingMessageId {
                        tx_hash: receipt.tx_hash,
                    },
                };
                return Err(err.into());
            }
        };

        let delivery = Delivery {
            message_id: id,
            status,
            tx_hash: receipt.tx_hash,
        };
        if delivery.is_executed() {
            info!(message_id = %id, tx_hash = %receipt.tx_hash, "Message executed manually");
        } else {
            warn!(
                message_id = %id,
                tx_hash = %receipt.tx_hash,
                "Message relayed but execution failed on destination"
            );
        }
        Ok(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::Signature;
    use crate::testing::{logs, FakeChain, SubmitResponse};
    use crate::types::{ChainSide, DeliveryStatus};
    use alloy::primitives::{address, B256};
    use alloy::sol_types::SolCall;

    const AMB: Address = address!("00000000000000000000000000000000000f0a4b");

    fn packed() -> PackedSignatures {
        PackedSignatures::pack(&[Signature {
            v: 27,
            r: B256::repeat_byte(1),
            s: B256::repeat_byte(2),
        }])
        .unwrap()
    }

    #[tokio::test]
    async fn test_executed_with_status() {
        let chain = Arc::new(FakeChain::new(ChainSide::Foreign));
        let id = MessageId(B256::repeat_byte(5));
        chain.on_submit(AMB, IForeignAmb::executeSignaturesCall::SELECTOR, move |_| {
            Ok(SubmitResponse::success(vec![logs::relayed_message(AMB, id, false)]))
        });

        let executor = ManualRelayExecutor::new(chain.clone(), AMB);
        let delivery = executor
            .execute(id, Bytes::from(vec![1, 2]), packed())
            .await
            .unwrap();
        assert_eq!(delivery.message_id, id);
        assert_eq!(delivery.status, DeliveryStatus::Failed);

        let submitted = chain.submissions();
        assert_eq!(submitted.len(), 1);
        let call = IForeignAmb::executeSignaturesCall::abi_decode(&submitted[0].input, true).unwrap();
        assert_eq!(call.encodedData.to_vec(), vec![1, 2]);
        assert_eq!(call.signatures[0], 1);
    }

    #[tokio::test]
    async fn test_relayed_message_must_match() {
        let chain = Arc::new(FakeChain::new(ChainSide::Foreign));
        let expected = MessageId(B256::repeat_byte(6));
        let other = MessageId(B256::repeat_byte(7));
        chain.on_submit(AMB, IForeignAmb::executeSignaturesCall::SELECTOR, move |_| {
            Ok(SubmitResponse::success(vec![logs::relayed_message(AMB, other, true)]))
        });

        let err = ManualRelayExecutor::new(chain, AMB)
            .execute(expected, Bytes::new(), packed())
            .await
            .unwrap_err();
        match err {
            RelayError::Correlation(CorrelationError::UnexpectedMessage {
                expected: e,
                found,
                ..
            }) => {
                assert_eq!(e, expected);
                assert_eq!(found, other);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reverted_relay_is_submission_error() {
        let chain = Arc::new(FakeChain::new(ChainSide::Foreign));
        chain.on_submit(AMB, IForeignAmb::executeSignaturesCall::SELECTOR, |_| {
            Ok(SubmitResponse::reverted())
        });

        let err = ManualRelayExecutor::new(chain.clone(), AMB)
            .execute(MessageId(B256::ZERO), Bytes::new(), packed())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::RelaySubmission { .. }));
        assert!(err.is_reverted_submission());
        // Never retried
        assert_eq!(chain.submissions().len(), 1);
    }
}
