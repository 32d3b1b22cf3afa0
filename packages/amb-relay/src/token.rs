//! Bridgeable NFT token capability

use alloy::primitives::{Address, U256};
use eyre::{eyre, Result};
use std::sync::Arc;
use tracing::info;

use crate::chain::{call_contract, submit_call, ChainHandle};
use crate::evm::contracts::{IERC1155Bridgeable, IERC721Bridgeable};
use crate::types::{ChainSide, RelayOptions, RelayReceipt, TokenKind};

#[derive(Clone)]
pub struct NftToken {
    chain: Arc<dyn ChainHandle>,
    address: Address,
    kind: TokenKind,
}

impl NftToken {
    pub fn new(chain: Arc<dyn ChainHandle>, address: Address, kind: TokenKind) -> Self {
        Self {
            chain,
            address,
            kind,
        }
    }

    pub fn erc721(chain: Arc<dyn ChainHandle>, address: Address) -> Self {
        Self::new(chain, address, TokenKind::Erc721)
    }

    pub fn erc1155(chain: Arc<dyn ChainHandle>, address: Address) -> Self {
        Self::new(chain, address, TokenKind::Erc1155)
    }

    /// Same token, transactions sent from another account
    pub fn connect(&self, chain: Arc<dyn ChainHandle>) -> Self {
        Self::new(chain, self.address, self.kind)
    }

    /// Token of the same standard at another address on the same chain
    pub fn at(&self, address: Address) -> Self {
        Self::new(self.chain.clone(), address, self.kind)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn side(&self) -> ChainSide {
        self.chain.side()
    }

    fn sender(&self) -> Result<Address> {
        self.chain
            .account()
            .ok_or_else(|| eyre!("{} token handle has no signing account", self.side()))
    }

    /// Mint `value` units of `token_id` (ERC-721 ignores `value`)
    pub async fn mint(&self, to: Address, token_id: U256, value: U256) -> Result<RelayReceipt> {
        info!(side = %self.side(), token = %self.address, id = %token_id, to = %to, "Minting token");
        let receipt = match self.kind {
            TokenKind::Erc721 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    IERC721Bridgeable::mintCall {
                        to,
                        tokenId: token_id,
                    },
                )
                .await?
            }
            TokenKind::Erc1155 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    IERC1155Bridgeable::mintCall {
                        to,
                        tokenIds: vec![token_id],
                        values: vec![value],
                    },
                )
                .await?
            }
        };
        if !receipt.status {
            return Err(eyre!("Minting token #{} reverted in {}", token_id, receipt.tx_hash));
        }
        Ok(receipt)
    }

    /// Send a token to `mediator` through `safeTransferFrom`, which starts a bridge operation
    ///
    /// The returned receipt may be reverted (e.g. the sender does not own the
    /// token); correlating it surfaces that as an error.
    pub async fn relay(
        &self,
        mediator: Address,
        token_id: U256,
        value: U256,
        options: &RelayOptions,
    ) -> Result<RelayReceipt> {
        let from = self.sender()?;
        let data = options.transfer_data();
        info!(
            side = %self.side(),
            token = %self.address,
            id = %token_id,
            data = %data,
            "Relaying token"
        );
        match self.kind {
            TokenKind::Erc721 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    IERC721Bridgeable::safeTransferFromCall {
                        from,
                        to: mediator,
                        tokenId: token_id,
                        data,
                    },
                )
                .await
            }
            TokenKind::Erc1155 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    IERC1155Bridgeable::safeTransferFromCall {
                        from,
                        to: mediator,
                        id: token_id,
                        value,
                        data,
                    },
                )
                .await
            }
        }
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub async fn owner(&self) -> Result<Address> {
        let owner = match self.kind {
            TokenKind::Erc721 => {
                call_contract(self.chain.as_ref(), self.address, IERC721Bridgeable::ownerCall {})
                    .await?
                    ._0
            }
            TokenKind::Erc1155 => {
                call_contract(self.chain.as_ref(), self.address, IERC1155Bridgeable::ownerCall {})
                    .await?
                    ._0
            }
        };
        Ok(owner)
    }

    pub async fn set_owner(&self, new_owner: Address) -> Result<RelayReceipt> {
        info!(side = %self.side(), token = %self.address, owner = %new_owner, "Setting token owner");
        let receipt = match self.kind {
            TokenKind::Erc721 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    IERC721Bridgeable::setOwnerCall { newOwner: new_owner },
                )
                .await?
            }
            TokenKind::Erc1155 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    IERC1155Bridgeable::setOwnerCall { newOwner: new_owner },
                )
                .await?
            }
        };
        if !receipt.status {
            return Err(eyre!("setOwner reverted in {}", receipt.tx_hash));
        }
        Ok(receipt)
    }

    /// `tokenURI(id)` for ERC-721, `uri(id)` for ERC-1155
    pub async fn token_uri(&self, token_id: U256) -> Result<String> {
        let uri = match self.kind {
            TokenKind::Erc721 => {
                call_contract(
                    self.chain.as_ref(),
                    self.address,
                    IERC721Bridgeable::tokenURICall { tokenId: token_id },
                )
                .await?
                ._0
            }
            TokenKind::Erc1155 => {
                call_contract(
                    self.chain.as_ref(),
                    self.address,
                    IERC1155Bridgeable::uriCall { id: token_id },
                )
                .await?
                ._0
            }
        };
        Ok(uri)
    }

    pub async fn set_token_uri(&self, token_id: U256, uri: &str) -> Result<RelayReceipt> {
        info!(side = %self.side(), token = %self.address, id = %token_id, uri, "Setting token URI");
        let receipt = match self.kind {
            TokenKind::Erc721 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    IERC721Bridgeable::setTokenURICall {
                        tokenId: token_id,
                        newTokenURI: uri.to_string(),
                    },
                )
                .await?
            }
            TokenKind::Erc1155 => {
                submit_call(
                    self.chain.as_ref(),
                    self.address,
                    IERC1155Bridgeable::setTokenURICall {
                        id: token_id,
                        newTokenURI: uri.to_string(),
                    },
                )
                .await?
            }
        };
        if !receipt.status {
            return Err(eyre!("setTokenURI of #{} reverted in {}", token_id, receipt.tx_hash));
        }
        Ok(receipt)
    }

    /// Plain transfer that bypasses the mediator's receive hook (ERC-721 only)
    pub async fn transfer_from(&self, to: Address, token_id: U256) -> Result<RelayReceipt> {
        if self.kind != TokenKind::Erc721 {
            return Err(eyre!("transferFrom is only available for ERC721 tokens"));
        }
        let from = self.sender()?;
        let receipt = submit_call(
            self.chain.as_ref(),
            self.address,
            IERC721Bridgeable::transferFromCall {
                from,
                to,
                tokenId: token_id,
            },
        )
        .await?;
        if !receipt.status {
            return Err(eyre!("transferFrom of #{} reverted in {}", token_id, receipt.tx_hash));
        }
        Ok(receipt)
    }

    pub async fn owner_of(&self, token_id: U256) -> Result<Address> {
        let ret = call_contract(
            self.chain.as_ref(),
            self.address,
            IERC721Bridgeable::ownerOfCall { tokenId: token_id },
        )
        .await?;
        Ok(ret._0)
    }

    /// Units of `token_id` held by `owner` (0 or 1 for ERC-721)
    pub async fn balance_of(&self, owner: Address, token_id: U256) -> Result<U256> {
        match self.kind {
            TokenKind::Erc721 => {
                let holder = self.owner_of(token_id).await?;
                Ok(if holder == owner { U256::from(1) } else { U256::ZERO })
            }
            TokenKind::Erc1155 => {
                let ret = call_contract(
                    self.chain.as_ref(),
                    self.address,
                    IERC1155Bridgeable::balanceOfCall {
                        account: owner,
                        id: token_id,
                    },
                )
                .await?;
                Ok(ret._0)
            }
        }
    }
}

impl std::fmt::Debug for NftToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NftToken")
            .field("side", &self.side())
            .field("address", &self.address)
            .field("kind", &self.kind)
            .finish()
    }
}
