//! Native tokens bridged to the other side and back
//!
//! Tokens issued by the token factory keep their address on the other side,
//! and the destination mediator maps that address back to itself.

use alloy::primitives::Address;
use amb_relay::{ChainSide, NftToken, RelayOptions, TokenKind};
use async_trait::async_trait;
use eyre::{ensure, Result};
use tracing::info;

use super::{title, Scenario};
use crate::env::TestEnv;

pub struct RoundTrip {
    origin: ChainSide,
    kind: TokenKind,
    other_user: bool,
    token_factory: bool,
}

impl RoundTrip {
    pub fn new(origin: ChainSide, kind: TokenKind) -> Self {
        Self {
            origin,
            kind,
            other_user: false,
            token_factory: false,
        }
    }

    /// Bridge the ERC-721 token issued by the token factory
    pub fn using_token_factory(mut self) -> Self {
        self.kind = TokenKind::Erc721;
        self.token_factory = true;
        self
    }

    /// Credit the second user on the way out and the first user on the way back
    pub fn to_other_user(mut self) -> Self {
        self.other_user = true;
        self
    }

    fn native<'a>(&self, env: &'a TestEnv) -> Result<&'a NftToken> {
        let origin = env.side(self.origin);
        if self.token_factory {
            origin.factory_token()
        } else {
            origin.token(self.kind)
        }
    }
}

#[async_trait]
impl Scenario for RoundTrip {
    fn name(&self) -> String {
        let mut name = format!("Bridging of native {} {} tokens", title(self.origin), self.kind);
        if self.token_factory {
            name.push_str(" issued by token factory");
        }
        name.push_str(" in both directions");
        if self.other_user {
            name.push_str(" with alternative receiver");
        }
        name
    }

    async fn should_run(&self, env: &TestEnv) -> Result<bool> {
        if self.other_user && !env.has_second_user() {
            return Ok(false);
        }
        Ok(self.native(env).is_ok())
    }

    async fn run(&self, env: &TestEnv) -> Result<()> {
        let origin = env.side(self.origin);
        let destination = env.side(self.origin.opposite());
        let native = self.native(env)?;
        let user = env.user()?;
        let receiver = if self.other_user {
            env.second_user()?
        } else {
            user
        };

        info!(
            "Bridging native {} token to {} chain",
            title(self.origin),
            title(destination.side)
        );
        let id = origin.mint_token(native).await?;
        let outbound = if self.other_user {
            RelayOptions::to(receiver)
        } else {
            RelayOptions::default()
        };
        let delivery = env.relay_and_deliver(native, id, &outbound).await?;
        let bridged = destination.bridged_token(native).await?;
        if self.token_factory {
            ensure!(
                bridged.address() == native.address(),
                "Bridged token {} must have the same address as the native token {}",
                bridged.address(),
                native.address()
            );
            let mapped = destination.mediator.native_token_address(bridged.address()).await?;
            ensure!(
                mapped == native.address(),
                "{} mediator maps the bridged token to {} instead of {}",
                destination.side,
                mapped,
                native.address()
            );
        }
        env.check_transfer(
            destination.side,
            delivery.tx_hash,
            &bridged,
            Address::ZERO,
            receiver,
            id,
        )
        .await?;

        info!("Sending token back to the {} mediator", destination.side);
        let (holder_token, inbound) = if self.other_user {
            (destination.as_second_user(&bridged)?, RelayOptions::to(user))
        } else {
            (bridged, RelayOptions::default())
        };
        let delivery = env.relay_and_deliver(&holder_token, id, &inbound).await?;
        env.check_transfer(
            origin.side,
            delivery.tx_hash,
            native,
            origin.mediator.address(),
            user,
            id,
        )
        .await
    }
}
