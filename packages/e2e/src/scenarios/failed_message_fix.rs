//! Messages that fail on one side, refunded on the other through a fix request

use alloy::primitives::{Address, U256};
use amb_relay::{
    AssetBatch, ChainSide, DeliveryStatus, FixOutcome, FixRecord, FixState, NftToken,
    RelayOptions, TokenKind,
};
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::info;

use super::Scenario;
use crate::env::{expect_failed, TestEnv};

pub struct FailedMessageFix {
    failed_on: ChainSide,
}

impl FailedMessageFix {
    pub fn new(failed_on: ChainSide) -> Self {
        Self { failed_on }
    }
}

#[async_trait]
impl Scenario for FailedMessageFix {
    fn name(&self) -> String {
        format!(
            "Fixing failed bridge operations on the {} side for ERC721 tokens",
            self.failed_on
        )
    }

    async fn should_run(&self, env: &TestEnv) -> Result<bool> {
        if !env.has_owner() {
            return Ok(false);
        }
        let failed_on = env.side(self.failed_on);
        let origin = env.side(self.failed_on.opposite());
        let bridged = failed_on
            .mediator
            .bridged_token_address(origin.erc721.address())
            .await?;
        Ok(bridged != Address::ZERO)
    }

    async fn run(&self, env: &TestEnv) -> Result<()> {
        let failed_on = env.side(self.failed_on);
        let origin = env.side(self.failed_on.opposite());

        // Native token of the origin side: the refund unlocks it from the mediator
        let bridged_here = failed_on.bridged_token(&origin.erc721).await?;
        failed_on
            .with_disabled_execution(bridged_here.address(), || async {
                let id = origin.mint(TokenKind::Erc721).await?;
                fail_then_fix(env, &origin.erc721, id, origin.mediator.address()).await
            })
            .await?;

        // Bridged token on the origin side: the refund mints it again
        let id = failed_on.mint(TokenKind::Erc721).await?;
        env.relay_and_deliver(&failed_on.erc721, id, &RelayOptions::default())
            .await?;
        let bridged_there = origin.bridged_token(&failed_on.erc721).await?;
        failed_on
            .with_disabled_execution(failed_on.erc721.address(), || async {
                fail_then_fix(env, &bridged_there, id, Address::ZERO).await
            })
            .await
    }
}

/// Relay `token_id` of `token` and expect it to fail on the other side
async fn relay_failing(
    env: &TestEnv,
    token: &NftToken,
    token_id: U256,
) -> Result<(ChainSide, FixRecord)> {
    let ticket = env.relay(token, token_id, &RelayOptions::default()).await?;
    let delivery = env.deliver(&ticket).await?;
    expect_failed(&delivery)?;
    let failed_on = ticket.destination();
    Ok((failed_on, FixRecord::from_delivery(&delivery, failed_on)))
}

/// Fail a relay, fix it, then check that a second fix is a no-op
///
/// The refund must move the token from `refund_from` back to the user.
async fn fail_then_fix(
    env: &TestEnv,
    token: &NftToken,
    token_id: U256,
    refund_from: Address,
) -> Result<()> {
    let user = env.user()?;
    let (failed_on, mut record) = relay_failing(env, token, token_id).await?;
    let owner = env.side(failed_on).owner_mediator()?;
    let batch = AssetBatch::erc721(token.address(), user, vec![token_id]);

    info!(
        "Requesting failed message fix for message id {}",
        record.message_id
    );
    let delivery = match env.controller.fix(&mut record, &owner, &batch).await? {
        FixOutcome::Applied(delivery) => delivery,
        FixOutcome::AlreadyApplied { message_id } => {
            return Err(eyre!("Message {} was fixed before the fix request", message_id))
        }
    };
    env.check_transfer(token.side(), delivery.tx_hash, token, refund_from, user, token_id)
        .await?;

    // A record that does not know about the fix must not refund twice
    let balance = token.balance_of(user, token_id).await?;
    let mut stale = FixRecord {
        state: FixState::Delivered(DeliveryStatus::Failed),
        fixed: false,
        ..record.clone()
    };
    let outcome = env.controller.fix(&mut stale, &owner, &batch).await?;
    if !outcome.is_already_applied() {
        return Err(eyre!(
            "Second fix of message {} was applied again",
            record.message_id
        ));
    }
    if token.balance_of(user, token_id).await? != balance {
        return Err(eyre!(
            "Second fix of message {} changed the balance",
            record.message_id
        ));
    }
    Ok(())
}
