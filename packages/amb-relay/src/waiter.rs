//! Destination-side confirmation
//!
//! Waits for the AMB on the destination chain to emit the finalization event
//! for a message, searching from the block height recorded at submission.

use alloy::primitives::Address;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::{ChainHandle, LogQuery};
use crate::error::{RelayError, RelayResult};
use crate::evm::events::FinalizationEvent;
use crate::poll::{PollOutcome, PollPolicy, Poller};
use crate::types::{Delivery, MessageId};

pub struct ConfirmationWaiter {
    chain: Arc<dyn ChainHandle>,
    amb: Address,
    event: FinalizationEvent,
    start_block: u64,
    policy: PollPolicy,
}

impl ConfirmationWaiter {
    pub fn new(
        chain: Arc<dyn ChainHandle>,
        amb: Address,
        event: FinalizationEvent,
        start_block: u64,
    ) -> Self {
        Self {
            chain,
            amb,
            event,
            start_block,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Poll until `message_id` is finalized on the destination
    ///
    /// A found event with `status=false` is `Ok` with a failed delivery. If
    /// several events match, the earliest (block, log index) wins.
    pub async fn wait(&self, message_id: MessageId) -> RelayResult<Delivery> {
        info!(
            side = %self.chain.side(),
            event = self.event.name(),
            message_id = %message_id,
            from_block = self.start_block,
            "Waiting for message to be processed"
        );

        let query = LogQuery::new(self.amb, self.event.signature_hash(), self.start_block)
            .topic(self.event.message_id_topic(), message_id.as_b256());

        let outcome = Poller::new(self.policy)
            .run(self.event.name(), |_| {
                let query = &query;
                async move {
                    let mut logs = self.chain.logs(query).await?;
                    logs.sort_by_key(|l| (l.block_number, l.log_index));
                    let found = logs.iter().find_map(|log| {
                        self.event
                            .decode(log)
                            .filter(|(id, _)| *id == message_id)
                            .map(|(id, status)| Delivery {
                                message_id: id,
                                status,
                                tx_hash: log.tx_hash,
                            })
                    });
                    Ok::<_, RelayError>(found)
                }
            })
            .await?;

        match outcome {
            PollOutcome::Ready(delivery) => {
                if delivery.is_executed() {
                    info!(
                        message_id = %message_id,
                        tx_hash = %delivery.tx_hash,
                        "Message processed"
                    );
                } else {
                    warn!(
                        message_id = %message_id,
                        tx_hash = %delivery.tx_hash,
                        "Message delivered but execution failed"
                    );
                }
                Ok(delivery)
            }
            PollOutcome::Exhausted { attempts } => {
                Err(RelayError::ConfirmationTimeout {
                    message_id,
                    attempts,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{logs, FakeChain};
    use crate::types::{ChainSide, DeliveryStatus};
    use alloy::primitives::{address, B256};
    use std::time::Duration;
    use tokio::time::Instant;

    const AMB: Address = address!("00000000000000000000000000000000000a4b00");

    fn waiter(chain: Arc<FakeChain>) -> ConfirmationWaiter {
        ConfirmationWaiter::new(chain, AMB, FinalizationEvent::RelayedMessage, 0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_after_delay() {
        let chain = Arc::new(FakeChain::new(ChainSide::Foreign));
        let id = MessageId(B256::repeat_byte(7));
        // Becomes visible after the third poll
        chain.push_log_after(logs::relayed_message(AMB, id, true), 3);

        let delivery = waiter(chain.clone()).wait(id).await.unwrap();
        assert_eq!(delivery.message_id, id);
        assert_eq!(delivery.status, DeliveryStatus::Executed);
        assert_eq!(chain.log_queries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_but_failed_is_not_an_error() {
        let chain = Arc::new(FakeChain::new(ChainSide::Foreign));
        let id = MessageId(B256::repeat_byte(8));
        chain.push_log(logs::relayed_message(AMB, id, false));

        let delivery = waiter(chain).wait(id).await.unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert!(!delivery.is_executed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_match_chronologically() {
        let chain = Arc::new(FakeChain::new(ChainSide::Foreign));
        let id = MessageId(B256::repeat_byte(9));
        let mut late = logs::relayed_message(AMB, id, true);
        late.block_number = 20;
        late.tx_hash = B256::repeat_byte(0x20);
        let mut early = logs::relayed_message(AMB, id, false);
        early.block_number = 10;
        early.tx_hash = B256::repeat_byte(0x10);
        chain.push_log(late);
        chain.push_log(early);

        let delivery = waiter(chain).wait(id).await.unwrap();
        assert_eq!(delivery.tx_hash, B256::repeat_byte(0x10));
        assert_eq!(delivery.status, DeliveryStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_messages_ignored_and_budget_respected() {
        let chain = Arc::new(FakeChain::new(ChainSide::Foreign));
        let id = MessageId(B256::repeat_byte(1));
        chain.push_log(logs::relayed_message(AMB, MessageId(B256::repeat_byte(2)), true));
        // Right message, wrong event
        chain.push_log(logs::affirmation_completed(AMB, id, true));

        let start = Instant::now();
        let err = waiter(chain.clone()).wait(id).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::ConfirmationTimeout { attempts: 20, .. }
        ));
        assert!(err.is_timeout());
        assert_eq!(chain.log_queries(), 20);
        assert_eq!(start.elapsed(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_information_answer_matched_on_first_topic() {
        let chain = Arc::new(FakeChain::new(ChainSide::Home));
        let id = MessageId(B256::repeat_byte(5));
        chain.push_log(logs::information_retrieved(AMB, MessageId(B256::repeat_byte(6)), true, true));
        chain.push_log_after(logs::information_retrieved(AMB, id, true, false), 2);

        let delivery = ConfirmationWaiter::new(chain.clone(), AMB, FinalizationEvent::InformationRetrieved, 0)
            .wait(id)
            .await
            .unwrap();
        assert_eq!(delivery.message_id, id);
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(chain.log_queries(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logs_before_start_block_ignored() {
        let chain = Arc::new(FakeChain::new(ChainSide::Foreign));
        let id = MessageId(B256::repeat_byte(3));
        let mut old = logs::relayed_message(AMB, id, true);
        old.block_number = 4;
        chain.push_log(old);

        let err = ConfirmationWaiter::new(chain, AMB, FinalizationEvent::RelayedMessage, 5)
            .with_policy(PollPolicy::new(Duration::from_secs(1), 2))
            .wait(id)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::ConfirmationTimeout { attempts: 2, .. }));
    }
}
