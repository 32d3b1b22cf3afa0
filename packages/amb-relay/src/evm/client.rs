//! EVM chain handle
//!
//! Implements [`ChainHandle`] over alloy's HTTP provider. Transactions are
//! built explicitly (legacy gas pricing, fixed gas limit) and signed locally;
//! the nonce comes from the per-account [`NonceCounter`].

use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    network::{Ethereum, EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, B256},
    providers::{
        fillers::{FillProvider, JoinFill, WalletFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::{Filter, Log as RpcLog, TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::fmt;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use crate::chain::{ChainHandle, LogQuery};
use crate::evm::nonce::NonceCounter;
use crate::types::{ChainLog, ChainSide, RelayReceipt};

/// Gas limit applied to every transaction unless configured otherwise
pub const DEFAULT_GAS_LIMIT: u64 = 1_000_000;

/// How long a broadcast transaction may stay unmined
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

type SignerProvider = FillProvider<
    JoinFill<Identity, WalletFiller<EthereumWallet>>,
    RootProvider<Http<Client>>,
    Http<Client>,
    Ethereum,
>;

/// Connection settings for one side of the bridge
#[derive(Clone)]
pub struct EvmChainConfig {
    pub side: ChainSide,
    pub rpc_url: String,
    /// Hex private key (with or without 0x); `None` gives a read-only handle
    pub private_key: Option<String>,
    /// Fixed gas price in wei; read once from the node when unset
    pub gas_price: Option<u128>,
    pub gas_limit: u64,
    /// Budget for a broadcast transaction to be mined
    pub receipt_timeout: Duration,
}

impl EvmChainConfig {
    pub fn new(side: ChainSide, rpc_url: impl Into<String>) -> Self {
        Self {
            side,
            rpc_url: rpc_url.into(),
            private_key: None,
            gas_price: None,
            gas_limit: DEFAULT_GAS_LIMIT,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    pub fn with_gas_price(mut self, gas_price: Option<u128>) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }
}

impl fmt::Debug for EvmChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmChainConfig")
            .field("side", &self.side)
            .field("rpc_url", &self.rpc_url)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("gas_price", &self.gas_price)
            .field("gas_limit", &self.gas_limit)
            .field("receipt_timeout", &self.receipt_timeout)
            .finish()
    }
}

struct Signing {
    address: Address,
    provider: SignerProvider,
    nonce: NonceCounter,
}

/// [`ChainHandle`] for an EVM JSON-RPC endpoint
pub struct EvmChain {
    side: ChainSide,
    provider: RootProvider<Http<Client>>,
    signing: Option<Signing>,
    gas_price: OnceCell<u128>,
    chain_id: OnceCell<u64>,
    gas_limit: u64,
    receipt_timeout: Duration,
}

impl EvmChain {
    pub fn new(config: EvmChainConfig) -> Result<Self> {
        let url: Url = config
            .rpc_url
            .parse()
            .map_err(|e| eyre!("Invalid RPC URL {}: {}", config.rpc_url, e))?;

        let provider = ProviderBuilder::new().on_http(url.clone());

        let signing = match &config.private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key
                    .trim_start_matches("0x")
                    .parse()
                    .map_err(|e| eyre!("Invalid private key: {}", e))?;
                let address = signer.address();
                let provider = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .on_http(url);
                Some(Signing {
                    address,
                    provider,
                    nonce: NonceCounter::new(),
                })
            }
            None => None,
        };

        let gas_price = match config.gas_price {
            Some(price) => OnceCell::new_with(Some(price)),
            None => OnceCell::new(),
        };

        info!(
            side = %config.side,
            rpc_url = %config.rpc_url,
            account = ?signing.as_ref().map(|s| s.address),
            "Created EVM chain handle"
        );

        Ok(Self {
            side: config.side,
            provider,
            signing,
            gas_price,
            chain_id: OnceCell::new(),
            gas_limit: config.gas_limit,
            receipt_timeout: config.receipt_timeout,
        })
    }

    pub fn provider(&self) -> &RootProvider<Http<Client>> {
        &self.provider
    }

    /// Chain ID reported by the node, cached after the first read
    pub async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                self.provider
                    .get_chain_id()
                    .await
                    .wrap_err("Failed to get chain id")
            })
            .await
            .copied()
    }

    async fn gas_price(&self) -> Result<u128> {
        self.gas_price
            .get_or_try_init(|| async {
                let price = self
                    .provider
                    .get_gas_price()
                    .await
                    .wrap_err("Failed to get gas price")?;
                debug!(side = %self.side, gas_price = price, "Using node gas price");
                Ok::<_, eyre::Report>(price)
            })
            .await
            .copied()
    }

    fn signing(&self) -> Result<&Signing> {
        self.signing
            .as_ref()
            .ok_or_else(|| eyre!("{} chain handle has no signing account", self.side))
    }
}

#[async_trait]
impl ChainHandle for EvmChain {
    fn side(&self) -> ChainSide {
        self.side
    }

    fn account(&self) -> Option<Address> {
        self.signing.as_ref().map(|s| s.address)
    }

    async fn block_number(&self) -> Result<u64> {
        let block = self.provider.get_block_number().await?;
        Ok(block)
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>> {
        let to_block = match query.to_block {
            Some(n) => BlockNumberOrTag::Number(n),
            None => BlockNumberOrTag::Latest,
        };
        let mut filter = Filter::new()
            .address(query.address)
            .event_signature(query.event_signature)
            .from_block(query.from_block)
            .to_block(to_block);
        if let Some(t) = query.topics[0] {
            filter = filter.topic1(t);
        }
        if let Some(t) = query.topics[1] {
            filter = filter.topic2(t);
        }
        if let Some(t) = query.topics[2] {
            filter = filter.topic3(t);
        }

        let logs = self.provider.get_logs(&filter).await.wrap_err_with(|| {
            format!(
                "Failed to get logs of {} from block {}",
                query.address, query.from_block
            )
        })?;

        Ok(logs.into_iter().filter_map(convert_log).collect())
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        let mut tx = TransactionRequest::default().with_to(to).with_input(input);
        if let Some(from) = self.account() {
            tx = tx.with_from(from);
        }
        let out = self
            .provider
            .call(&tx)
            .await
            .wrap_err_with(|| format!("eth_call to {} failed", to))?;
        Ok(out)
    }

    async fn submit(&self, to: Address, input: Bytes) -> Result<RelayReceipt> {
        let signing = self.signing()?;
        let gas_price = self.gas_price().await?;
        let chain_id = self.chain_id().await?;

        let sent = signing
            .nonce
            .with_next(
                || async {
                    self.provider
                        .get_transaction_count(signing.address)
                        .block_id(BlockId::pending())
                        .await
                        .wrap_err("Failed to get pending nonce")
                },
                |nonce| {
                    let tx = TransactionRequest::default()
                        .with_from(signing.address)
                        .with_to(to)
                        .with_input(input)
                        .with_nonce(nonce)
                        .with_chain_id(chain_id)
                        .with_gas_price(gas_price)
                        .with_gas_limit(self.gas_limit);
                    async move {
                        let pending = signing
                            .provider
                            .send_transaction(tx)
                            .await
                            .wrap_err("Failed to send transaction")?;
                        let tx_hash = *pending.tx_hash();
                        info!(side = %self.side, tx_hash = %tx_hash, nonce, "pending tx");
                        Ok(tx_hash)
                    }
                },
            )
            .await;

        let tx_hash = match sent {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                // The node rejected our nonce: reload it before the next submission
                if is_nonce_error(&e) {
                    warn!(side = %self.side, error = %e, "Nonce rejected, resyncing");
                    signing.nonce.resync().await;
                }
                return Err(e);
            }
        };

        let receipt = self
            .wait_for_receipt(tx_hash)
            .await
            .wrap_err_with(|| format!("Failed to get receipt of {}", tx_hash))?;
        Ok(receipt)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<RelayReceipt>> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(convert_receipt))
    }
}

impl EvmChain {
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<RelayReceipt> {
        let start = tokio::time::Instant::now();
        while start.elapsed() < self.receipt_timeout {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                debug!(
                    side = %self.side,
                    tx_hash = %tx_hash,
                    status = receipt.status(),
                    "Transaction mined"
                );
                return Ok(convert_receipt(receipt));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }

        Err(eyre!(
            "Transaction {} not confirmed after {:?}",
            tx_hash,
            self.receipt_timeout
        ))
    }
}

/// Errors after which the cached nonce can no longer be trusted
fn is_nonce_error(error: &eyre::Report) -> bool {
    let message = format!("{:#}", error).to_lowercase();
    message.contains("nonce too low")
        || message.contains("nonce too high")
        || message.contains("replacement transaction underpriced")
        || message.contains("already known")
}

fn convert_log(log: RpcLog) -> Option<ChainLog> {
    Some(ChainLog {
        tx_hash: log.transaction_hash?,
        block_number: log.block_number?,
        log_index: log.log_index.unwrap_or_default(),
        inner: log.inner,
    })
}

fn convert_receipt(receipt: TransactionReceipt) -> RelayReceipt {
    let status = receipt.status();
    let logs = receipt
        .inner
        .logs()
        .iter()
        .cloned()
        .filter_map(convert_log)
        .collect();
    RelayReceipt {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number.unwrap_or_default(),
        status,
        logs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Anvil's first dev account
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_config_debug_redacts_key() {
        let config = EvmChainConfig::new(ChainSide::Home, "http://localhost:8545")
            .with_private_key(DEV_KEY);
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("ac0974"));
    }

    #[test]
    fn test_new_derives_account() {
        let config = EvmChainConfig::new(ChainSide::Foreign, "http://localhost:8545")
            .with_private_key(DEV_KEY);
        let chain = EvmChain::new(config).unwrap();
        assert_eq!(chain.side(), ChainSide::Foreign);
        assert_eq!(
            chain.account().map(|a| a.to_string().to_lowercase()),
            Some("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string())
        );
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(EvmChain::new(EvmChainConfig::new(ChainSide::Home, "not a url")).is_err());
        let bad_key = EvmChainConfig::new(ChainSide::Home, "http://localhost:8545")
            .with_private_key("0x1234");
        assert!(EvmChain::new(bad_key).is_err());
    }

    #[test]
    fn test_receipt_timeout_is_configurable() {
        let config = EvmChainConfig::new(ChainSide::Home, "http://localhost:8545");
        assert_eq!(config.receipt_timeout, DEFAULT_RECEIPT_TIMEOUT);
        let config = config.with_receipt_timeout(Duration::from_secs(3));
        assert_eq!(config.receipt_timeout, Duration::from_secs(3));
        assert!(format!("{:?}", config).contains("receipt_timeout: 3s"));
    }

    #[test]
    fn test_nonce_errors_detected() {
        let err = eyre!("server returned an error response: nonce too low")
            .wrap_err("Failed to send transaction");
        assert!(is_nonce_error(&err));
        assert!(is_nonce_error(&eyre!("Replacement transaction underpriced")));
        assert!(!is_nonce_error(&eyre!("insufficient funds for gas * price + value")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmined_transaction_times_out() {
        // A zero budget gives up before asking the node
        let chain = EvmChain::new(
            EvmChainConfig::new(ChainSide::Home, "http://127.0.0.1:1")
                .with_receipt_timeout(Duration::ZERO),
        )
        .unwrap();
        let err = chain.wait_for_receipt(B256::ZERO).await.unwrap_err();
        assert!(err.to_string().contains("not confirmed after 0ns"));
    }

    #[tokio::test]
    async fn test_read_only_handle_cannot_submit() {
        let chain =
            EvmChain::new(EvmChainConfig::new(ChainSide::Home, "http://localhost:8545")).unwrap();
        assert!(chain.account().is_none());
        let err = chain.submit(Address::ZERO, Bytes::new()).await.unwrap_err();
        assert!(err.to_string().contains("no signing account"));
    }
}
