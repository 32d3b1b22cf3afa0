//! Relay attempted by an account that does not own the token

use alloy::primitives::U256;
use amb_relay::{ChainSide, CorrelationError, RelayError, RelayOptions, TokenKind};
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::info;

use super::{title, Scenario};
use crate::env::TestEnv;

pub struct RelayByNotOwner {
    origin: ChainSide,
}

impl RelayByNotOwner {
    pub fn new(origin: ChainSide) -> Self {
        Self { origin }
    }
}

#[async_trait]
impl Scenario for RelayByNotOwner {
    fn name(&self) -> String {
        format!(
            "Bridging of native {} ERC721 tokens fails when sent by a non-owner",
            title(self.origin)
        )
    }

    async fn should_run(&self, env: &TestEnv) -> Result<bool> {
        Ok(env.has_second_user())
    }

    async fn run(&self, env: &TestEnv) -> Result<()> {
        let origin = env.side(self.origin);
        let id = origin.mint(TokenKind::Erc721).await?;
        let intruder = origin.as_second_user(&origin.erc721)?;

        info!("Sending token #{} to the {} mediator from a non-owner", id, origin.side);
        match env
            .bridge
            .relay_token(&intruder, id, U256::ZERO, &RelayOptions::default())
            .await
        {
            Err(RelayError::Correlation(CorrelationError::TransactionReverted { tx_hash })) => {
                info!(tx_hash = %tx_hash, "Relay was reverted as expected");
            }
            Err(other) => return Err(eyre!("Expected a reverted relay, got: {}", other)),
            Ok(ticket) => {
                return Err(eyre!(
                    "Relay by a non-owner was accepted as message {}",
                    ticket.message_id
                ))
            }
        }

        let holder = origin.erc721.owner_of(id).await?;
        let user = env.user()?;
        if holder != user {
            return Err(eyre!("Token #{} moved to {} instead of staying with {}", id, holder, user));
        }
        Ok(())
    }
}
