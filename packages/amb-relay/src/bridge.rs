//! Two-sided AMB bridge
//!
//! Ties the Home and Foreign chains together: submits bridge requests,
//! correlates them with a message id and delivers them either through the
//! oracle (wait for the destination event) or manually (collect validator
//! signatures on Home, execute on Foreign).
//!
//! Information requests are the exception: they are sent and answered on
//! Home, with the validators reading the requested data on Foreign.

use alloy::primitives::{keccak256, Address, B256, U256};
use eyre::{eyre, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::chain::{call_contract, submit_call, ChainHandle};
use crate::correlator::MessageCorrelator;
use crate::error::{RelayError, RelayResult};
use crate::evm::contracts::{IAmb, IHomeAmb};
use crate::evm::events::{ContractKind, FinalizationEvent};
use crate::executor::ManualRelayExecutor;
use crate::mediator::Mediator;
use crate::poll::PollPolicy;
use crate::signatures::ThresholdSignatureAggregator;
use crate::token::NftToken;
use crate::types::{ChainSide, Delivery, MessageId, MetadataUpdate, RelayOptions, RelayReceipt};
use crate::waiter::ConfirmationWaiter;

/// How a message reaches its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryRoute {
    /// AMB validators relay it; only wait for the destination event
    Oracle,
    /// Collect signatures on Home and execute on Foreign ourselves
    Manual,
}

impl DeliveryRoute {
    /// Default route for messages leaving `source`
    pub fn default_for(source: ChainSide) -> Self {
        match source {
            ChainSide::Home => DeliveryRoute::Manual,
            ChainSide::Foreign => DeliveryRoute::Oracle,
        }
    }
}

/// A submitted bridge request joined with its message id
#[derive(Debug, Clone)]
pub struct RelayTicket {
    pub source: ChainSide,
    pub receipt: RelayReceipt,
    pub message_id: MessageId,
    /// Source height just before submission (signature collection lower bound)
    pub source_start_block: u64,
    /// Destination height just before submission (finalization lower bound)
    pub destination_start_block: u64,
}

impl RelayTicket {
    pub fn destination(&self) -> ChainSide {
        self.source.opposite()
    }
}

/// Request selector of `eth_call` information requests
pub fn eth_call_request_selector() -> B256 {
    keccak256("eth_call(address,bytes)")
}

/// One side of the bridge: chain, AMB and mediator
#[derive(Debug, Clone)]
pub struct AmbSide {
    pub mediator: Mediator,
    pub amb: Address,
    /// Height when the bridge was connected
    pub start_block: u64,
}

impl AmbSide {
    pub async fn connect(mediator: Mediator) -> Result<Self> {
        let amb = mediator.bridge_contract().await?;
        let start_block = mediator.chain().block_number().await?;
        info!(
            side = %mediator.side(),
            mediator = %mediator.address(),
            amb = %amb,
            start_block,
            "Connected bridge side"
        );
        Ok(Self {
            mediator,
            amb,
            start_block,
        })
    }

    pub fn chain(&self) -> &Arc<dyn ChainHandle> {
        self.mediator.chain()
    }

    pub fn side(&self) -> ChainSide {
        self.mediator.side()
    }

    pub fn amb_kind(&self) -> ContractKind {
        match self.side() {
            ChainSide::Home => ContractKind::HomeAmb,
            ChainSide::Foreign => ContractKind::ForeignAmb,
        }
    }

    /// Event the AMB on this side emits when it executes an incoming message
    pub fn finalization_event(&self) -> FinalizationEvent {
        match self.side() {
            ChainSide::Home => FinalizationEvent::AffirmationCompleted,
            ChainSide::Foreign => FinalizationEvent::RelayedMessage,
        }
    }

    pub fn correlator(&self) -> MessageCorrelator {
        MessageCorrelator::new()
            .with_source(self.amb, self.amb_kind())
            .with_source(self.mediator.address(), ContractKind::Mediator)
    }
}

pub struct AmbBridge {
    home: AmbSide,
    foreign: AmbSide,
    policy: PollPolicy,
    aggregator: ThresholdSignatureAggregator,
}

impl AmbBridge {
    pub fn new(home: AmbSide, foreign: AmbSide) -> Self {
        let aggregator = ThresholdSignatureAggregator::new(home.chain().clone(), home.amb);
        Self {
            home,
            foreign,
            policy: PollPolicy::default(),
            aggregator,
        }
    }

    /// Discover both AMBs through their mediators
    pub async fn connect(home_mediator: Mediator, foreign_mediator: Mediator) -> Result<Self> {
        let home = AmbSide::connect(home_mediator).await?;
        let foreign = AmbSide::connect(foreign_mediator).await?;
        Ok(Self::new(home, foreign))
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self.aggregator =
            ThresholdSignatureAggregator::new(self.home.chain().clone(), self.home.amb)
                .with_policy(policy);
        self
    }

    pub fn side(&self, side: ChainSide) -> &AmbSide {
        match side {
            ChainSide::Home => &self.home,
            ChainSide::Foreign => &self.foreign,
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn aggregator(&self) -> &ThresholdSignatureAggregator {
        &self.aggregator
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submit a bridge request on `source` and correlate it with its message id
    ///
    /// Both chains' heights are taken before submitting, so the later searches
    /// cannot miss an event emitted in between.
    pub async fn submit<F, Fut>(&self, source: ChainSide, submit: F) -> RelayResult<RelayTicket>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RelayReceipt>>,
    {
        let source_side = self.side(source);
        let source_start_block = source_side.chain().block_number().await?;
        let destination_start_block = self.side(source.opposite()).chain().block_number().await?;

        let receipt = submit().await?;
        let message_id = source_side.correlator().correlate(&receipt)?;
        info!(
            source = %source,
            tx_hash = %receipt.tx_hash,
            message_id = %message_id,
            "Bridge request submitted"
        );
        Ok(RelayTicket {
            source,
            receipt,
            message_id,
            source_start_block,
            destination_start_block,
        })
    }

    /// Send `token_id` through its side's mediator
    pub async fn relay_token(
        &self,
        token: &NftToken,
        token_id: U256,
        value: U256,
        options: &RelayOptions,
    ) -> RelayResult<RelayTicket> {
        let mediator = self.side(token.side()).mediator.address();
        self.submit(token.side(), || token.relay(mediator, token_id, value, options))
            .await
    }

    /// Send the metadata of a native token on `side` to its bridged copy
    ///
    /// The message is a regular AMB message; deliver it like a transfer.
    pub async fn push_metadata(
        &self,
        side: ChainSide,
        token: Address,
        update: MetadataUpdate,
    ) -> RelayResult<RelayTicket> {
        let mediator = &self.side(side).mediator;
        self.submit(side, || mediator.push_metadata(token, update))
            .await
    }

    /// Ask for the metadata of the Foreign native token behind a Home bridged token
    ///
    /// Await the answer with [`AmbBridge::wait_for_information`].
    pub async fn pull_metadata(
        &self,
        bridged_token: Address,
        update: MetadataUpdate,
    ) -> RelayResult<RelayTicket> {
        let mediator = &self.home.mediator;
        self.submit(ChainSide::Home, || mediator.pull_metadata(bridged_token, update))
            .await
    }

    /// Allow or forbid a request selector on the Home AMB (owner only)
    pub async fn enable_async_request_selector(
        &self,
        owner: &dyn ChainHandle,
        selector: B256,
        enable: bool,
    ) -> Result<RelayReceipt> {
        info!(selector = %selector, enable, "Updating async request selector");
        let receipt = submit_call(
            owner,
            self.home.amb,
            IHomeAmb::enableAsyncRequestSelectorCall {
                requestSelector: selector,
                enable,
            },
        )
        .await?;
        if !receipt.status {
            return Err(eyre!(
                "enableAsyncRequestSelector({}, {}) reverted in {}",
                selector,
                enable,
                receipt.tx_hash
            ));
        }
        Ok(receipt)
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Wait on Home for the answer to an information request
    ///
    /// The delivery is executed only when the data call and the mediator
    /// callback both succeeded.
    pub async fn wait_for_information(&self, ticket: &RelayTicket) -> RelayResult<Delivery> {
        ConfirmationWaiter::new(
            self.home.chain().clone(),
            self.home.amb,
            FinalizationEvent::InformationRetrieved,
            ticket.source_start_block,
        )
        .with_policy(self.policy)
        .wait(ticket.message_id)
        .await
    }

    /// Deliver a ticket to its destination by `route`
    pub async fn deliver(&self, ticket: &RelayTicket, route: DeliveryRoute) -> RelayResult<Delivery> {
        match route {
            DeliveryRoute::Oracle => {
                self.waiter(ticket.destination(), ticket.destination_start_block)
                    .wait(ticket.message_id)
                    .await
            }
            DeliveryRoute::Manual => {
                if ticket.source != ChainSide::Home {
                    return Err(RelayError::UnsupportedRoute {
                        from: ticket.source,
                    });
                }
                self.execute_receipt(&ticket.receipt, ticket.source_start_block)
                    .await
            }
        }
    }

    /// Wait on `destination` for the message sent by `receipt`
    ///
    /// The search starts at the height recorded when the bridge was connected.
    pub async fn wait_until_processed(
        &self,
        destination: ChainSide,
        receipt: &RelayReceipt,
    ) -> RelayResult<Delivery> {
        let source = self.side(destination.opposite());
        let message_id = source.correlator().correlate(receipt)?;
        self.waiter(destination, self.side(destination).start_block)
            .wait(message_id)
            .await
    }

    /// Relay a Home -> Foreign message with collected validator signatures
    pub async fn execute_manually(&self, receipt: &RelayReceipt) -> RelayResult<Delivery> {
        self.execute_receipt(receipt, self.home.start_block).await
    }

    async fn execute_receipt(
        &self,
        receipt: &RelayReceipt,
        start_block: u64,
    ) -> RelayResult<Delivery> {
        let (message_id, encoded_data) = self.home.correlator().correlate_with_payload(receipt)?;
        let signatures = self.aggregator.collect(&encoded_data, start_block).await?;
        ManualRelayExecutor::new(self.foreign.chain().clone(), self.foreign.amb)
            .execute(message_id, encoded_data, signatures)
            .await
    }

    fn waiter(&self, destination: ChainSide, start_block: u64) -> ConfirmationWaiter {
        let side = self.side(destination);
        ConfirmationWaiter::new(
            side.chain().clone(),
            side.amb,
            side.finalization_event(),
            start_block,
        )
        .with_policy(self.policy)
    }

    /// Destination-side call status of a delivered message
    pub async fn message_call_status(&self, side: ChainSide, message_id: MessageId) -> Result<bool> {
        let side = self.side(side);
        let ret = call_contract(
            side.chain().as_ref(),
            side.amb,
            IAmb::messageCallStatusCall {
                messageId: message_id.as_b256(),
            },
        )
        .await?;
        Ok(ret._0)
    }
}

impl std::fmt::Debug for AmbBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbBridge")
            .field("home", &self.home)
            .field("foreign", &self.foreign)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routes() {
        assert_eq!(DeliveryRoute::default_for(ChainSide::Home), DeliveryRoute::Manual);
        assert_eq!(DeliveryRoute::default_for(ChainSide::Foreign), DeliveryRoute::Oracle);
    }
}
