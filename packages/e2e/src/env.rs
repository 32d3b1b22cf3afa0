//! Test environment shared by all scenarios
//!
//! One signing [`EvmChain`] per (side, account), so each account has exactly
//! one nonce counter per chain. Tokens, mediators and the bridge are bound to
//! the primary user's handles; the second user and the owner get their own.

use alloy::primitives::{Address, B256, U256};
use amb_relay::testing::check_transfer;
use amb_relay::{
    AmbBridge, ChainHandle, ChainSide, Delivery, DeliveryRoute, EvmChain, EvmChainConfig,
    Mediator, NftToken, ReconciliationController, RelayOptions, RelayTicket, TokenKind,
};
use eyre::{eyre, Result, WrapErr};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{E2eConfig, SideConfig};

/// Handles for one chain of the bridge
pub struct SideEnv {
    pub side: ChainSide,
    pub user: Arc<EvmChain>,
    pub second_user: Option<Arc<EvmChain>>,
    pub owner: Option<Arc<EvmChain>>,
    pub mediator: Mediator,
    pub erc721: NftToken,
    pub erc1155: Option<NftToken>,
    /// ERC-721 token issued by the token factory
    pub erc721_factory: Option<NftToken>,
    first_token_id: u64,
    /// Next id to mint, per token contract
    next_ids: Mutex<HashMap<Address, u64>>,
}

impl SideEnv {
    fn connect(config: &E2eConfig, side: &SideConfig) -> Result<Self> {
        let accounts = &config.accounts;
        let handle = |key: &str| -> Result<Arc<EvmChain>> {
            let chain_config = EvmChainConfig::new(side.side, side.rpc_url.as_str())
                .with_private_key(key)
                .with_gas_price(side.gas_price);
            Ok(Arc::new(EvmChain::new(chain_config)?))
        };

        info!(side = %side.side, "Importing accounts");
        let user = handle(&accounts.user_key)?;
        let second_user = accounts
            .second_user_key
            .as_deref()
            .map(&handle)
            .transpose()?;
        let owner = accounts.owner_key.as_deref().map(&handle).transpose()?;

        info!(side = %side.side, mediator = %side.mediator, "Initializing tokens");
        let erc721 = NftToken::erc721(user.clone(), side.erc721_token);
        let erc1155 = side
            .erc1155_token
            .map(|address| NftToken::erc1155(user.clone(), address));
        let erc721_factory = side
            .erc721_factory_token
            .map(|address| NftToken::erc721(user.clone(), address));

        Ok(Self {
            side: side.side,
            mediator: Mediator::new(user.clone(), side.mediator),
            user,
            second_user,
            owner,
            erc721,
            erc1155,
            erc721_factory,
            first_token_id: config.first_token_id,
            next_ids: Mutex::new(HashMap::new()),
        })
    }

    pub fn user_address(&self) -> Result<Address> {
        self.user
            .account()
            .ok_or_else(|| eyre!("{} user handle has no account", self.side))
    }

    /// Test token of `kind` deployed on this side
    pub fn token(&self, kind: TokenKind) -> Result<&NftToken> {
        match kind {
            TokenKind::Erc721 => Ok(&self.erc721),
            TokenKind::Erc1155 => self
                .erc1155
                .as_ref()
                .ok_or_else(|| eyre!("No {} ERC1155 token configured", self.side)),
        }
    }

    /// ERC-721 token issued by the token factory on this side
    pub fn factory_token(&self) -> Result<&NftToken> {
        self.erc721_factory
            .as_ref()
            .ok_or_else(|| eyre!("No {} token factory ERC721 token configured", self.side))
    }

    /// Mint the next id of `kind` to the primary user
    pub async fn mint(&self, kind: TokenKind) -> Result<U256> {
        self.mint_token(self.token(kind)?).await
    }

    /// Mint the next id of `token` to the primary user
    pub async fn mint_token(&self, token: &NftToken) -> Result<U256> {
        // Held across the mint so concurrent callers never reuse an id
        let mut next_ids = self.next_ids.lock().await;
        let next = next_ids
            .entry(token.address())
            .or_insert(self.first_token_id);
        let id = U256::from(*next);
        token.mint(self.user_address()?, id, U256::from(1)).await?;
        *next += 1;
        Ok(id)
    }

    /// Bridged counterpart of `native` on this side
    pub async fn bridged_token(&self, native: &NftToken) -> Result<NftToken> {
        info!(side = %self.side, native = %native.address(), "Getting address of the bridged token");
        let address = self.mediator.require_bridged_token(native.address()).await?;
        Ok(native.connect(self.user.clone()).at(address))
    }

    /// `token` bound to the second user
    pub fn as_second_user(&self, token: &NftToken) -> Result<NftToken> {
        let chain = self
            .second_user
            .clone()
            .ok_or_else(|| eyre!("No second test account configured"))?;
        Ok(token.connect(chain))
    }

    /// The mediator, transactions sent by the owner
    pub fn owner_mediator(&self) -> Result<Mediator> {
        let chain = self
            .owner
            .clone()
            .ok_or_else(|| eyre!("No owner account configured"))?;
        Ok(self.mediator.connect(chain))
    }

    /// Run `f` with execution of `token` disabled on this side's mediator
    ///
    /// Execution is enabled back whatever `f` returns; an error from `f`
    /// takes precedence over an error while re-enabling.
    pub async fn with_disabled_execution<F, Fut, T>(&self, token: Address, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let owner = self.owner_mediator()?;
        info!(side = %self.side, token = %token, "Disabling execution");
        owner.disable_token_execution(token, true).await?;

        let result = f().await;

        info!(side = %self.side, token = %token, "Enabling back execution");
        let restored = owner.disable_token_execution(token, false).await;
        let value = result?;
        restored.wrap_err_with(|| format!("Failed to enable execution for {}", token))?;
        Ok(value)
    }
}

/// Both sides plus the bridge and reconciliation services
pub struct TestEnv {
    pub home: SideEnv,
    pub foreign: SideEnv,
    pub bridge: Arc<AmbBridge>,
    pub controller: ReconciliationController,
}

impl TestEnv {
    /// Connect both chains and discover the AMBs through the mediators
    pub async fn create(config: &E2eConfig) -> Result<Self> {
        info!("Initializing test environment");
        let home = SideEnv::connect(config, &config.home)?;
        let foreign = SideEnv::connect(config, &config.foreign)?;

        let bridge = AmbBridge::connect(home.mediator.clone(), foreign.mediator.clone())
            .await
            .wrap_err("Failed to initialize AMB contracts")?
            .with_policy(config.poll);
        let bridge = Arc::new(bridge);

        Ok(Self {
            controller: ReconciliationController::new(bridge.clone()),
            home,
            foreign,
            bridge,
        })
    }

    pub fn side(&self, side: ChainSide) -> &SideEnv {
        match side {
            ChainSide::Home => &self.home,
            ChainSide::Foreign => &self.foreign,
        }
    }

    pub fn user(&self) -> Result<Address> {
        self.home.user_address()
    }

    pub fn second_user(&self) -> Result<Address> {
        self.home
            .second_user
            .as_ref()
            .and_then(|chain| chain.account())
            .ok_or_else(|| eyre!("No second test account configured"))
    }

    pub fn has_second_user(&self) -> bool {
        self.home.second_user.is_some()
    }

    pub fn has_owner(&self) -> bool {
        self.home.owner.is_some() && self.foreign.owner.is_some()
    }

    /// Send `token_id` of `token` through the mediator on the token's side
    pub async fn relay(
        &self,
        token: &NftToken,
        token_id: U256,
        options: &RelayOptions,
    ) -> Result<RelayTicket> {
        info!(side = %token.side(), id = %token_id, "Sending token to the mediator");
        let ticket = self
            .bridge
            .relay_token(token, token_id, U256::from(1), options)
            .await?;
        Ok(ticket)
    }

    /// Deliver by the default route of the ticket's direction
    pub async fn deliver(&self, ticket: &RelayTicket) -> Result<Delivery> {
        let route = DeliveryRoute::default_for(ticket.source);
        let delivery = self.bridge.deliver(ticket, route).await?;
        Ok(delivery)
    }

    /// Relay and require successful execution on the other side
    pub async fn relay_and_deliver(
        &self,
        token: &NftToken,
        token_id: U256,
        options: &RelayOptions,
    ) -> Result<Delivery> {
        let ticket = self.relay(token, token_id, options).await?;
        let delivery = self.deliver(&ticket).await?;
        expect_executed(&delivery)?;
        Ok(delivery)
    }

    /// Check that `tx_hash` on `side` moved `token_id` of `token` from `from` to `to`
    pub async fn check_transfer(
        &self,
        side: ChainSide,
        tx_hash: B256,
        token: &NftToken,
        from: Address,
        to: Address,
        token_id: U256,
    ) -> Result<()> {
        let chain = self.side(side).user.clone();
        check_transfer(
            chain.as_ref(),
            tx_hash,
            token.address(),
            token.kind(),
            from,
            to,
            token_id,
        )
        .await
    }
}

pub fn expect_executed(delivery: &Delivery) -> Result<()> {
    if delivery.is_executed() {
        Ok(())
    } else {
        Err(eyre!(
            "Message {} failed on the destination side in {}",
            delivery.message_id,
            delivery.tx_hash
        ))
    }
}

pub fn expect_failed(delivery: &Delivery) -> Result<()> {
    if delivery.is_executed() {
        Err(eyre!(
            "Message {} should have failed, but was executed in {}",
            delivery.message_id,
            delivery.tx_hash
        ))
    } else {
        Ok(())
    }
}
