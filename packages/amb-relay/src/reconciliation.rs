//! Failed-message and mediator-balance reconciliation
//!
//! ## Failed messages
//!
//! A message that reached its destination with `status=false` left the assets
//! locked (or burned) on the side it came from. The fix is requested on the
//! side where execution failed; it travels back as a regular AMB message and
//! `fixFailedMessage` refunds the sender on the origin side, marking
//! `messageFixed(messageId)` there.
//!
//! ```text
//! Delivered(Executed)                      (terminal, nothing to fix)
//! Delivered(Failed) --request--> FixRequested --confirm--> Fixed
//!                                                          (terminal)
//! ```
//!
//! Requesting a fix for a fixed message is a no-op reported as
//! [`FixOutcome::AlreadyApplied`].
//!
//! ## Mediator balance
//!
//! Tokens sent to a mediator with a plain transfer are held but not accounted.
//! [`unaccounted_assets`] computes that delta; [`ReconciliationController::fix_mediator_balance`]
//! refuses any amount the mediator already accounts for.

use alloy::primitives::{Address, U256};
use eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bridge::{AmbBridge, DeliveryRoute, RelayTicket};
use crate::error::{CorrelationError, RelayError, RelayResult};
use crate::mediator::Mediator;
use crate::token::NftToken;
use crate::types::{AssetBatch, ChainSide, Delivery, DeliveryStatus, MessageId, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixState {
    Delivered(DeliveryStatus),
    FixRequested,
    Fixed,
}

/// Reconciliation state of one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixRecord {
    pub message_id: MessageId,
    /// Side where the message failed to execute
    pub failed_on: ChainSide,
    pub state: FixState,
    pub fixed: bool,
}

impl FixRecord {
    pub fn from_delivery(delivery: &Delivery, destination: ChainSide) -> Self {
        Self {
            message_id: delivery.message_id,
            failed_on: destination,
            state: FixState::Delivered(delivery.status),
            fixed: false,
        }
    }

    /// Side where the refund is applied and `messageFixed` is recorded
    pub fn origin(&self) -> ChainSide {
        self.failed_on.opposite()
    }

    fn mark_fixed(&mut self) {
        self.state = FixState::Fixed;
        self.fixed = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    /// The fix message was executed on the origin side
    Applied(Delivery),
    /// The message had already been fixed; nothing was re-applied
    AlreadyApplied { message_id: MessageId },
}

impl FixOutcome {
    pub fn is_already_applied(&self) -> bool {
        matches!(self, FixOutcome::AlreadyApplied { .. })
    }
}

/// Result of [`ReconciliationController::request_fix`]
#[derive(Debug, Clone)]
pub enum FixRequest {
    Submitted(RelayTicket),
    AlreadyApplied,
}

/// Assets held by a mediator beyond what it accounts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediatorBalanceDelta {
    pub token: Address,
    pub kind: TokenKind,
    /// (token id, unaccounted units)
    pub unaccounted: Vec<(U256, U256)>,
}

impl MediatorBalanceDelta {
    pub fn is_empty(&self) -> bool {
        self.unaccounted.is_empty()
    }

    /// Asset set to submit, crediting `recipient` on the other side
    pub fn into_batch(self, recipient: Address) -> AssetBatch {
        let (ids, values): (Vec<_>, Vec<_>) = self.unaccounted.into_iter().unzip();
        match self.kind {
            TokenKind::Erc721 => AssetBatch::erc721(self.token, recipient, ids),
            TokenKind::Erc1155 => AssetBatch::erc1155(self.token, recipient, ids, values),
        }
    }
}

/// Compare what `mediator` holds of `candidate_ids` against `mediatorOwns`
pub async fn unaccounted_assets(
    mediator: &Mediator,
    token: &NftToken,
    candidate_ids: &[U256],
) -> Result<MediatorBalanceDelta> {
    let mut unaccounted = Vec::new();
    for id in candidate_ids {
        let held = token.balance_of(mediator.address(), *id).await?;
        let owned = mediator.mediator_owns(token.address(), *id).await?;
        if held > owned {
            unaccounted.push((*id, held - owned));
        }
    }
    Ok(MediatorBalanceDelta {
        token: token.address(),
        kind: token.kind(),
        unaccounted,
    })
}

pub struct ReconciliationController {
    bridge: Arc<AmbBridge>,
}

impl ReconciliationController {
    pub fn new(bridge: Arc<AmbBridge>) -> Self {
        Self { bridge }
    }

    // =========================================================================
    // Failed message fix
    // =========================================================================

    /// Request a refund for a failed message
    ///
    /// `owner` must be the mediator on `record.failed_on` bound to an account
    /// allowed to request fixes. `batch` must match the failed transfer
    /// exactly (origin-side token, original sender, ids, values).
    pub async fn request_fix(
        &self,
        record: &mut FixRecord,
        owner: &Mediator,
        batch: &AssetBatch,
    ) -> RelayResult<FixRequest> {
        match record.state {
            FixState::Fixed => return Ok(FixRequest::AlreadyApplied),
            FixState::Delivered(DeliveryStatus::Executed) => {
                return Err(RelayError::FixRejected {
                    message_id: record.message_id,
                    reason: "message was executed successfully".to_string(),
                })
            }
            FixState::Delivered(DeliveryStatus::Failed) | FixState::FixRequested => {}
        }

        if self.is_fixed_on_origin(record).await? {
            info!(message_id = %record.message_id, "Message already fixed");
            record.mark_fixed();
            return Ok(FixRequest::AlreadyApplied);
        }

        let message_id = record.message_id;
        if self
            .bridge
            .message_call_status(record.failed_on, message_id)
            .await?
        {
            return Err(RelayError::FixRejected {
                message_id,
                reason: format!("message call succeeded on {}", record.failed_on),
            });
        }

        let ticket = self
            .bridge
            .submit(record.failed_on, || {
                owner.request_failed_message_fix(message_id, batch)
            })
            .await
            .map_err(|e| match e {
                RelayError::Correlation(CorrelationError::TransactionReverted { tx_hash }) => {
                    RelayError::FixRejected {
                        message_id,
                        reason: format!("requestFailedMessageFix reverted in {}", tx_hash),
                    }
                }
                other => other,
            })?;

        record.state = FixState::FixRequested;
        Ok(FixRequest::Submitted(ticket))
    }

    /// Deliver a submitted fix request and settle the record
    pub async fn confirm_fix(
        &self,
        record: &mut FixRecord,
        ticket: &RelayTicket,
        route: DeliveryRoute,
    ) -> RelayResult<FixOutcome> {
        let delivery = self.bridge.deliver(ticket, route).await?;

        if delivery.is_executed() {
            info!(
                message_id = %record.message_id,
                tx_hash = %delivery.tx_hash,
                "Failed message fixed"
            );
            record.mark_fixed();
            return Ok(FixOutcome::Applied(delivery));
        }

        // A fix for an already fixed message fails on-chain without effect
        if self.is_fixed_on_origin(record).await? {
            info!(message_id = %record.message_id, "Fix was already applied");
            record.mark_fixed();
            return Ok(FixOutcome::AlreadyApplied {
                message_id: record.message_id,
            });
        }

        warn!(
            message_id = %record.message_id,
            tx_hash = %delivery.tx_hash,
            "Fix message failed on the origin side"
        );
        Err(RelayError::FixRejected {
            message_id: record.message_id,
            reason: format!(
                "fix delivery {} failed and the message is not marked fixed",
                delivery.tx_hash
            ),
        })
    }

    /// Request and confirm in one go, delivering by the default route
    pub async fn fix(
        &self,
        record: &mut FixRecord,
        owner: &Mediator,
        batch: &AssetBatch,
    ) -> RelayResult<FixOutcome> {
        match self.request_fix(record, owner, batch).await? {
            FixRequest::AlreadyApplied => Ok(FixOutcome::AlreadyApplied {
                message_id: record.message_id,
            }),
            FixRequest::Submitted(ticket) => {
                let route = DeliveryRoute::default_for(ticket.source);
                self.confirm_fix(record, &ticket, route).await
            }
        }
    }

    async fn is_fixed_on_origin(&self, record: &FixRecord) -> RelayResult<bool> {
        let fixed = self
            .bridge
            .side(record.origin())
            .mediator
            .message_fixed(record.message_id)
            .await?;
        Ok(fixed)
    }

    // =========================================================================
    // Mediator balance
    // =========================================================================

    /// Account for `batch` on `owner`'s mediator and bridge it to the other side
    ///
    /// Nothing is submitted unless every asset is unaccounted: an ERC-721 id
    /// needs `mediatorOwns == 0`, an ERC-1155 value must fit in what the
    /// mediator holds beyond `mediatorOwns`.
    pub async fn fix_mediator_balance(
        &self,
        owner: &Mediator,
        batch: &AssetBatch,
    ) -> RelayResult<RelayTicket> {
        let kind = batch.kind();
        let token = NftToken::new(owner.chain().clone(), batch.token, kind);
        for (i, token_id) in batch.token_ids.iter().enumerate() {
            let owned = owner.mediator_owns(batch.token, *token_id).await?;
            let refused = match kind {
                TokenKind::Erc721 => owned != U256::ZERO,
                TokenKind::Erc1155 => {
                    let held = token.balance_of(owner.address(), *token_id).await?;
                    let value = batch.values.get(i).copied().unwrap_or_default();
                    owned.saturating_add(value) > held
                }
            };
            if refused {
                return Err(RelayError::BalanceAlreadyAccounted {
                    token: batch.token,
                    token_id: *token_id,
                    owned,
                });
            }
        }

        self.bridge
            .submit(owner.side(), || owner.fix_mediator_balance(batch))
            .await
            .map_err(|e| match e {
                RelayError::Correlation(CorrelationError::TransactionReverted { tx_hash }) => {
                    RelayError::BalanceFixRejected {
                        token: batch.token,
                        tx_hash,
                    }
                }
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn failed_record() -> FixRecord {
        FixRecord::from_delivery(
            &Delivery {
                message_id: MessageId(B256::repeat_byte(1)),
                status: DeliveryStatus::Failed,
                tx_hash: B256::ZERO,
            },
            ChainSide::Home,
        )
    }

    #[test]
    fn test_record_from_failed_delivery() {
        let record = failed_record();
        assert_eq!(record.state, FixState::Delivered(DeliveryStatus::Failed));
        assert_eq!(record.origin(), ChainSide::Foreign);
        assert!(!record.fixed);
    }

    #[test]
    fn test_fixed_is_terminal() {
        let mut record = failed_record();
        record.mark_fixed();
        assert_eq!(record.state, FixState::Fixed);
        assert!(record.fixed);
    }

    #[test]
    fn test_delta_into_batch() {
        let token = Address::repeat_byte(7);
        let recipient = Address::repeat_byte(8);
        let delta = MediatorBalanceDelta {
            token,
            kind: TokenKind::Erc1155,
            unaccounted: vec![(U256::from(1), U256::from(3)), (U256::from(2), U256::from(1))],
        };
        let batch = delta.into_batch(recipient);
        assert_eq!(batch.token_ids, vec![U256::from(1), U256::from(2)]);
        assert_eq!(batch.values, vec![U256::from(3), U256::from(1)]);
        assert_eq!(batch.recipient, recipient);

        let delta = MediatorBalanceDelta {
            token,
            kind: TokenKind::Erc721,
            unaccounted: vec![(U256::from(5), U256::from(1))],
        };
        let batch = delta.into_batch(recipient);
        assert_eq!(batch.kind(), TokenKind::Erc721);
        assert!(batch.values.is_empty());
    }
}
