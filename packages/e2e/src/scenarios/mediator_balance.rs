//! Tokens sent straight to a mediator, then accounted and bridged by the owner

use alloy::primitives::Address;
use amb_relay::{unaccounted_assets, ChainSide, RelayError, TokenKind};
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::info;

use super::Scenario;
use crate::env::{expect_executed, TestEnv};

pub struct FixMediatorBalance {
    side: ChainSide,
}

impl FixMediatorBalance {
    pub fn new(side: ChainSide) -> Self {
        Self { side }
    }
}

#[async_trait]
impl Scenario for FixMediatorBalance {
    fn name(&self) -> String {
        format!("Fixing mediator balance of the {} mediator", self.side)
    }

    async fn should_run(&self, env: &TestEnv) -> Result<bool> {
        if !env.has_owner() {
            return Ok(false);
        }
        let side = env.side(self.side);
        Ok(side.mediator.is_token_registered(side.erc721.address()).await?)
    }

    async fn run(&self, env: &TestEnv) -> Result<()> {
        let side = env.side(self.side);
        let other = env.side(self.side.opposite());
        let token = &side.erc721;
        let user = env.user()?;

        let id = side.mint(TokenKind::Erc721).await?;
        info!("Sending token #{} to the {} mediator, bypassing the bridge", id, side.side);
        token.transfer_from(side.mediator.address(), id).await?;

        let delta = unaccounted_assets(&side.mediator, token, &[id]).await?;
        if delta.is_empty() {
            return Err(eyre!("Mediator accounts for token #{} already", id));
        }
        let batch = delta.into_batch(user);

        info!("Sending fixMediatorBalance request to the {} mediator", side.side);
        let owner = side.owner_mediator()?;
        let ticket = env.controller.fix_mediator_balance(&owner, &batch).await?;
        let delivery = env.deliver(&ticket).await?;
        expect_executed(&delivery)?;

        let bridged = other.bridged_token(token).await?;
        env.check_transfer(other.side, delivery.tx_hash, &bridged, Address::ZERO, user, id)
            .await?;

        info!("Repeating fixMediatorBalance for token #{}", id);
        match env.controller.fix_mediator_balance(&owner, &batch).await {
            Err(RelayError::BalanceAlreadyAccounted { .. }) => Ok(()),
            Err(other) => Err(eyre!("Expected the repeated fix to be refused, got: {}", other)),
            Ok(ticket) => Err(eyre!(
                "Repeated fixMediatorBalance was accepted as message {}",
                ticket.message_id
            )),
        }
    }
}
