//! Metadata of native tokens synchronized to their bridged copies
//!
//! Pushes start on the native side and travel as regular messages. Pulls are
//! information requests sent on Home and answered there by the validators.

use alloy::primitives::U256;
use amb_relay::{
    eth_call_request_selector, ChainSide, MetadataUpdate, RelayOptions, TokenKind,
};
use async_trait::async_trait;
use eyre::{ensure, eyre, Result};
use tracing::info;

use super::Scenario;
use crate::env::{expect_executed, expect_failed, TestEnv};

const NEW_EXAMPLE_URI: &str = "https://example.com";

/// URI update matching `kind`, and the one of the other standard
fn uri_updates(kind: TokenKind, id: U256) -> (MetadataUpdate, MetadataUpdate) {
    match kind {
        TokenKind::Erc721 => (MetadataUpdate::Erc721Uri(id), MetadataUpdate::Erc1155Uri(id)),
        TokenKind::Erc1155 => (MetadataUpdate::Erc1155Uri(id), MetadataUpdate::Erc721Uri(id)),
    }
}

/// Owner and URI of a native Home token pushed to the Foreign bridged token
pub struct PushMetadata {
    kind: TokenKind,
}

impl PushMetadata {
    pub fn new(kind: TokenKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Scenario for PushMetadata {
    fn name(&self) -> String {
        format!(
            "Pushing updated metadata of {} tokens to the bridged foreign token",
            self.kind
        )
    }

    async fn should_run(&self, env: &TestEnv) -> Result<bool> {
        Ok(env.home.token(self.kind).is_ok())
    }

    async fn run(&self, env: &TestEnv) -> Result<()> {
        let native = env.home.token(self.kind)?;
        let user = env.user()?;

        info!("Bridging native Home token to Foreign chain");
        let id = env.home.mint(self.kind).await?;
        env.relay_and_deliver(native, id, &RelayOptions::default())
            .await?;
        let bridged = env.foreign.bridged_token(native).await?;

        native.set_owner(user).await?;
        native.set_token_uri(id, NEW_EXAMPLE_URI).await?;

        info!("Pushing metadata updates to Foreign chain");
        let (uri_update, wrong_update) = uri_updates(self.kind, id);
        let owner_ticket = env
            .bridge
            .push_metadata(ChainSide::Home, native.address(), MetadataUpdate::Owner)
            .await?;
        let uri_ticket = env
            .bridge
            .push_metadata(ChainSide::Home, native.address(), uri_update)
            .await?;
        let wrong = env
            .bridge
            .push_metadata(ChainSide::Home, native.address(), wrong_update)
            .await;
        if let Ok(ticket) = wrong {
            return Err(eyre!(
                "Pushing the {} should have failed, sent message {}",
                wrong_update,
                ticket.message_id
            ));
        }

        expect_executed(&env.deliver(&owner_ticket).await?)?;
        expect_executed(&env.deliver(&uri_ticket).await?)?;

        let owner = bridged.owner().await?;
        ensure!(owner == user, "Owner is not updated: {} instead of {}", owner, user);
        let uri = bridged.token_uri(id).await?;
        ensure!(uri == NEW_EXAMPLE_URI, "Token URI is not updated: {:?}", uri);
        Ok(())
    }
}

/// Owner and URI of a native Foreign ERC-1155 token pulled from Home
pub struct PullMetadata;

#[async_trait]
impl Scenario for PullMetadata {
    fn name(&self) -> String {
        "Pulling updated metadata from the native foreign ERC1155 token".to_string()
    }

    async fn should_run(&self, env: &TestEnv) -> Result<bool> {
        Ok(env.home.owner.is_some() && env.foreign.token(TokenKind::Erc1155).is_ok())
    }

    async fn run(&self, env: &TestEnv) -> Result<()> {
        let owner = env
            .home
            .owner
            .clone()
            .ok_or_else(|| eyre!("No owner account configured"))?;
        let native = env.foreign.token(TokenKind::Erc1155)?;
        let user = env.user()?;

        info!("Enabling async AMB requests");
        env.bridge
            .enable_async_request_selector(owner.as_ref(), eth_call_request_selector(), true)
            .await?;

        info!("Bridging native Foreign token to Home chain");
        let id = env.foreign.mint(TokenKind::Erc1155).await?;
        env.relay_and_deliver(native, id, &RelayOptions::default())
            .await?;
        let bridged = env.home.bridged_token(native).await?;

        native.set_owner(user).await?;
        native.set_token_uri(id, NEW_EXAMPLE_URI).await?;

        info!("Pulling metadata updates from Foreign chain");
        let mut tickets = Vec::new();
        for update in [
            MetadataUpdate::Owner,
            MetadataUpdate::Erc721Uri(id),
            MetadataUpdate::Erc1155Uri(id),
        ] {
            tickets.push(env.bridge.pull_metadata(bridged.address(), update).await?);
        }

        let mut answers = Vec::with_capacity(tickets.len());
        for ticket in &tickets {
            answers.push(env.bridge.wait_for_information(ticket).await?);
        }
        expect_executed(&answers[0])?;
        // ERC-1155 tokens have no tokenURI
        expect_failed(&answers[1])?;
        expect_executed(&answers[2])?;

        let owner = bridged.owner().await?;
        ensure!(owner == user, "Owner is not updated: {} instead of {}", owner, user);
        let uri = bridged.token_uri(id).await?;
        ensure!(uri == NEW_EXAMPLE_URI, "Token URI is not updated: {:?}", uri);
        Ok(())
    }
}
