//! NFT mediator capability
//!
//! Thin typed wrapper over a mediator contract. Custody bookkeeping lives in
//! the contract; this only exposes the calls the relay and reconciliation
//! flows need.

use alloy::primitives::{Address, U256};
use eyre::{eyre, Result};
use std::sync::Arc;
use tracing::info;

use crate::chain::{call_contract, submit_call, ChainHandle};
use crate::evm::contracts::INftMediator;
use crate::types::{AssetBatch, ChainSide, MessageId, MetadataUpdate, RelayReceipt, TokenKind};

#[derive(Clone)]
pub struct Mediator {
    chain: Arc<dyn ChainHandle>,
    address: Address,
}

impl Mediator {
    pub fn new(chain: Arc<dyn ChainHandle>, address: Address) -> Self {
        Self { chain, address }
    }

    /// Same mediator, transactions sent from another account
    pub fn connect(&self, chain: Arc<dyn ChainHandle>) -> Self {
        Self::new(chain, self.address)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn side(&self) -> ChainSide {
        self.chain.side()
    }

    pub fn chain(&self) -> &Arc<dyn ChainHandle> {
        &self.chain
    }

    // =========================================================================
    // Registry and custody views
    // =========================================================================

    /// AMB used by this mediator
    pub async fn bridge_contract(&self) -> Result<Address> {
        let ret = call_contract(
            self.chain.as_ref(),
            self.address,
            INftMediator::bridgeContractCall {},
        )
        .await?;
        Ok(ret._0)
    }

    pub async fn is_token_registered(&self, token: Address) -> Result<bool> {
        let ret = call_contract(
            self.chain.as_ref(),
            self.address,
            INftMediator::isTokenRegisteredCall { token },
        )
        .await?;
        Ok(ret._0)
    }

    /// Bridged counterpart of a native token of the other side; zero if none yet
    pub async fn bridged_token_address(&self, native_token: Address) -> Result<Address> {
        let ret = call_contract(
            self.chain.as_ref(),
            self.address,
            INftMediator::bridgedTokenAddressCall {
                nativeToken: native_token,
            },
        )
        .await?;
        Ok(ret._0)
    }

    /// Like [`Mediator::bridged_token_address`] but the token must exist
    pub async fn require_bridged_token(&self, native_token: Address) -> Result<Address> {
        let bridged = self.bridged_token_address(native_token).await?;
        if bridged == Address::ZERO {
            return Err(eyre!(
                "Bridged token address for {} is not initialized on {}",
                native_token,
                self.side()
            ));
        }
        Ok(bridged)
    }

    pub async fn native_token_address(&self, bridged_token: Address) -> Result<Address> {
        let ret = call_contract(
            self.chain.as_ref(),
            self.address,
            INftMediator::nativeTokenAddressCall {
                bridgedToken: bridged_token,
            },
        )
        .await?;
        Ok(ret._0)
    }

    /// Units of `token_id` the mediator has accounted for
    pub async fn mediator_owns(&self, token: Address, token_id: U256) -> Result<U256> {
        let ret = call_contract(
            self.chain.as_ref(),
            self.address,
            INftMediator::mediatorOwnsCall {
                token,
                tokenId: token_id,
            },
        )
        .await?;
        Ok(ret._0)
    }

    pub async fn message_fixed(&self, message_id: MessageId) -> Result<bool> {
        let ret = call_contract(
            self.chain.as_ref(),
            self.address,
            INftMediator::messageFixedCall {
                messageId: message_id.as_b256(),
            },
        )
        .await?;
        Ok(ret._0)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Ask the other side to refund a message that failed here
    pub async fn request_failed_message_fix(
        &self,
        message_id: MessageId,
        batch: &AssetBatch,
    ) -> Result<RelayReceipt> {
        info!(
            side = %self.side(),
            message_id = %message_id,
            token = %batch.token,
            "Requesting failed message fix"
        );
        submit_call(
            self.chain.as_ref(),
            self.address,
            INftMediator::requestFailedMessageFixCall {
                messageId: message_id.as_b256(),
                token: batch.token,
                sender: batch.recipient,
                tokenIds: batch.token_ids.clone(),
                values: batch.values.clone(),
            },
        )
        .await
    }

    /// Account for tokens sent to the mediator outside the relay entry point
    /// and bridge them to `batch.recipient`
    pub async fn fix_mediator_balance(&self, batch: &AssetBatch) -> Result<RelayReceipt> {
        info!(
            side = %self.side(),
            token = %batch.token,
            ids = batch.token_ids.len(),
            kind = %batch.kind(),
            "Fixing mediator balance"
        );
        match batch.kind() {
            TokenKind::Erc721 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    INftMediator::fixMediatorBalanceERC721Call {
                        token: batch.token,
                        receiver: batch.recipient,
                        tokenIds: batch.token_ids.clone(),
                    },
                )
                .await
            }
            TokenKind::Erc1155 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    INftMediator::fixMediatorBalanceERC1155Call {
                        token: batch.token,
                        receiver: batch.recipient,
                        tokenIds: batch.token_ids.clone(),
                        values: batch.values.clone(),
                    },
                )
                .await
            }
        }
    }

    /// Send the current metadata of the native `token` to its bridged copy
    ///
    /// The returned receipt may be reverted (e.g. a URI update of the wrong
    /// token standard).
    pub async fn push_metadata(&self, token: Address, update: MetadataUpdate) -> Result<RelayReceipt> {
        info!(side = %self.side(), token = %token, update = %update, "Pushing token metadata");
        let chain = self.chain.as_ref();
        match update {
            MetadataUpdate::Owner => {
                submit_call(chain, self.address, INftMediator::pushTokenOwnerUpdateCall { token }).await
            }
            MetadataUpdate::Erc721Uri(token_id) => {
                submit_call(
                    chain,
                    self.address,
                    INftMediator::pushERC721URIUpdateCall {
                        token,
                        tokenId: token_id,
                    },
                )
                .await
            }
            MetadataUpdate::Erc1155Uri(token_id) => {
                submit_call(
                    chain,
                    self.address,
                    INftMediator::pushERC1155URIUpdateCall {
                        token,
                        tokenId: token_id,
                    },
                )
                .await
            }
        }
    }

    /// Request the metadata of the native token behind `bridged_token`
    ///
    /// Sent on Home; the AMB answers asynchronously with data read on Foreign.
    pub async fn pull_metadata(
        &self,
        bridged_token: Address,
        update: MetadataUpdate,
    ) -> Result<RelayReceipt> {
        info!(side = %self.side(), token = %bridged_token, update = %update, "Pulling token metadata");
        let chain = self.chain.as_ref();
        match update {
            MetadataUpdate::Owner => {
                submit_call(
                    chain,
                    self.address,
                    INftMediator::pullTokenOwnerUpdateCall {
                        bridgedToken: bridged_token,
                    },
                )
                .await
            }
            MetadataUpdate::Erc721Uri(token_id) => {
                submit_call(
                    chain,
                    self.address,
                    INftMediator::pullERC721URIUpdateCall {
                        bridgedToken: bridged_token,
                        tokenId: token_id,
                    },
                )
                .await
            }
            MetadataUpdate::Erc1155Uri(token_id) => {
                submit_call(
                    chain,
                    self.address,
                    INftMediator::pullERC1155URIUpdateCall {
                        bridgedToken: bridged_token,
                        tokenId: token_id,
                    },
                )
                .await
            }
        }
    }

    pub async fn disable_token_execution(&self, token: Address, disable: bool) -> Result<RelayReceipt> {
        let receipt = submit_call(
            self.chain.as_ref(),
            self.address,
            INftMediator::disableTokenExecutionCall { token, disable },
        )
        .await?;
        if !receipt.status {
            return Err(eyre!(
                "disableTokenExecution({}, {}) reverted in {}",
                token,
                disable,
                receipt.tx_hash
            ));
        }
        Ok(receipt)
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("side", &self.side())
            .field("address", &self.address)
            .finish()
    }
}
