//! Token transfer assertions
//!
//! Check that a destination transaction moved a token the expected way. On
//! failure the error lists every transfer of that token found in the receipt.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use eyre::{eyre, Result};
use std::fmt;
use tracing::info;

use crate::chain::ChainHandle;
use crate::evm::contracts::{IERC1155Bridgeable, IERC721Bridgeable};
use crate::types::{ChainLog, RelayReceipt, TokenKind};

/// A decoded token movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub ids: Vec<U256>,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.ids.iter().map(|id| id.to_string()).collect();
        write!(f, "Transfer({}, {}, {})", self.from, self.to, ids.join(","))
    }
}

fn decode_transfer(kind: TokenKind, log: &ChainLog) -> Option<Transfer> {
    let data = &log.inner.data;
    match kind {
        TokenKind::Erc721 => {
            if log.topic0() != Some(IERC721Bridgeable::Transfer::SIGNATURE_HASH) {
                return None;
            }
            // ERC-20 Transfer shares topic0 but has only two indexed fields
            if data.topics().len() != 4 {
                return None;
            }
            IERC721Bridgeable::Transfer::decode_log_data(data, true)
                .ok()
                .map(|e| Transfer {
                    from: e.from,
                    to: e.to,
                    ids: vec![e.tokenId],
                })
        }
        TokenKind::Erc1155 => {
            let topic0 = log.topic0()?;
            if topic0 == IERC1155Bridgeable::TransferSingle::SIGNATURE_HASH {
                IERC1155Bridgeable::TransferSingle::decode_log_data(data, true)
                    .ok()
                    .map(|e| Transfer {
                        from: e.from,
                        to: e.to,
                        ids: vec![e.id],
                    })
            } else if topic0 == IERC1155Bridgeable::TransferBatch::SIGNATURE_HASH {
                IERC1155Bridgeable::TransferBatch::decode_log_data(data, true)
                    .ok()
                    .map(|e| Transfer {
                        from: e.from,
                        to: e.to,
                        ids: e.ids,
                    })
            } else {
                None
            }
        }
    }
}

/// Transfers of `token` in a receipt
pub fn transfers(receipt: &RelayReceipt, token: Address, kind: TokenKind) -> Vec<Transfer> {
    receipt
        .logs_from(token)
        .filter_map(|log| decode_transfer(kind, log))
        .collect()
}

/// Assert that `receipt` moved `token_id` of `token` from `from` to `to`
pub fn assert_transfer(
    receipt: &RelayReceipt,
    token: Address,
    kind: TokenKind,
    from: Address,
    to: Address,
    token_id: U256,
) -> Result<()> {
    let found = transfers(receipt, token, kind);
    if found.is_empty() {
        return Err(eyre!("No transfers are found for the token {}", token));
    }
    let expected = Transfer {
        from,
        to,
        ids: vec![token_id],
    };
    if found
        .iter()
        .any(|t| t.from == from && t.to == to && t.ids.contains(&token_id))
    {
        return Ok(());
    }
    let listed: Vec<String> = found.iter().map(|t| format!("- {}", t)).collect();
    Err(eyre!(
        "No {} was found in the logs, found transfers:\n{}",
        expected,
        listed.join(",\n")
    ))
}

pub fn assert_erc721_transfer(
    receipt: &RelayReceipt,
    token: Address,
    from: Address,
    to: Address,
    token_id: U256,
) -> Result<()> {
    assert_transfer(receipt, token, TokenKind::Erc721, from, to, token_id)
}

pub fn assert_erc1155_transfer(
    receipt: &RelayReceipt,
    token: Address,
    from: Address,
    to: Address,
    token_id: U256,
) -> Result<()> {
    assert_transfer(receipt, token, TokenKind::Erc1155, from, to, token_id)
}

/// Fetch the receipt of `tx_hash` and run [`assert_transfer`] on it
pub async fn check_transfer(
    chain: &dyn ChainHandle,
    tx_hash: B256,
    token: Address,
    kind: TokenKind,
    from: Address,
    to: Address,
    token_id: U256,
) -> Result<()> {
    info!(
        side = %chain.side(),
        tx_hash = %tx_hash,
        "Checking if transaction has the required Transfer({}, {}, {})",
        from,
        to,
        token_id
    );
    let receipt = chain
        .receipt(tx_hash)
        .await?
        .ok_or_else(|| eyre!("Receipt of {} not found", tx_hash))?;
    assert_transfer(&receipt, token, kind, from, to, token_id)
}
