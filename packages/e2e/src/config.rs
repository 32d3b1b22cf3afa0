//! Configuration for the E2E scenarios
//!
//! Everything comes from environment variables (a `.env` file is loaded first
//! when present). Chain endpoints, mediators and the ERC-721 tokens are
//! required; the second user, the owner, the ERC-1155 tokens and the tokens
//! issued by the token factory are optional and only gate the scenarios that
//! need them.

use alloy::primitives::Address;
use amb_relay::{ChainSide, PollPolicy};
use eyre::{eyre, Result, WrapErr};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Root configuration for the E2E run
#[derive(Debug, Clone)]
pub struct E2eConfig {
    pub home: SideConfig,
    pub foreign: SideConfig,
    pub accounts: TestAccounts,
    pub poll: PollPolicy,
    /// First id minted by the per-token counters
    pub first_token_id: u64,
}

impl E2eConfig {
    /// Load `.env` (if any) and read the process environment
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PollPolicy::default();
        let interval_ms = parse_or(&lookup, "POLL_INTERVAL_MS", defaults.interval.as_millis() as u64)?;
        let max_attempts = parse_or(&lookup, "POLL_ATTEMPTS", defaults.max_attempts)?;

        Ok(Self {
            home: SideConfig::from_lookup(&lookup, ChainSide::Home)?,
            foreign: SideConfig::from_lookup(&lookup, ChainSide::Foreign)?,
            accounts: TestAccounts::from_lookup(&lookup)?,
            poll: PollPolicy {
                interval: Duration::from_millis(interval_ms),
                max_attempts,
            },
            first_token_id: parse_or(&lookup, "FIRST_TOKEN_ID", 1)?,
        })
    }

    pub fn side(&self, side: ChainSide) -> &SideConfig {
        match side {
            ChainSide::Home => &self.home,
            ChainSide::Foreign => &self.foreign,
        }
    }
}

/// One chain of the bridge
#[derive(Debug, Clone)]
pub struct SideConfig {
    pub side: ChainSide,
    pub rpc_url: Url,
    pub mediator: Address,
    pub erc721_token: Address,
    pub erc1155_token: Option<Address>,
    /// ERC-721 token deployed by the token factory; bridged under the same address
    pub erc721_factory_token: Option<Address>,
    /// Fixed gas price in wei; read from the node when unset
    pub gas_price: Option<u128>,
}

impl SideConfig {
    fn from_lookup<F>(lookup: &F, side: ChainSide) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = side.as_str().to_uppercase();
        let key = |name: &str| format!("{}_{}", prefix, name);

        let rpc_url = required(lookup, &key("RPC_URL"))?;
        Ok(Self {
            side,
            rpc_url: Url::parse(&rpc_url)
                .wrap_err_with(|| format!("Invalid {}", key("RPC_URL")))?,
            mediator: parse_address(&key("MEDIATOR_ADDRESS"), &required(lookup, &key("MEDIATOR_ADDRESS"))?)?,
            erc721_token: parse_address(
                &key("ERC721_TOKEN_ADDRESS"),
                &required(lookup, &key("ERC721_TOKEN_ADDRESS"))?,
            )?,
            erc1155_token: optional(lookup, &key("ERC1155_TOKEN_ADDRESS"))
                .map(|value| parse_address(&key("ERC1155_TOKEN_ADDRESS"), &value))
                .transpose()?,
            erc721_factory_token: optional(lookup, &key("ERC721_FACTORY_TOKEN_ADDRESS"))
                .map(|value| parse_address(&key("ERC721_FACTORY_TOKEN_ADDRESS"), &value))
                .transpose()?,
            gas_price: optional(lookup, &key("GAS_PRICE"))
                .map(|value| {
                    value
                        .parse::<u128>()
                        .map_err(|e| eyre!("Invalid {}: {}", key("GAS_PRICE"), e))
                })
                .transpose()?,
        })
    }
}

/// Accounts used by the scenarios
#[derive(Clone)]
pub struct TestAccounts {
    pub user_key: String,
    pub second_user_key: Option<String>,
    pub owner_key: Option<String>,
}

impl TestAccounts {
    fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            user_key: required(lookup, "TEST_ACCOUNT_PRIVATE_KEY")?,
            second_user_key: optional(lookup, "SECOND_TEST_ACCOUNT_PRIVATE_KEY"),
            owner_key: optional(lookup, "OWNER_ACCOUNT_PRIVATE_KEY"),
        })
    }
}

impl fmt::Debug for TestAccounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestAccounts")
            .field("user_key", &"<redacted>")
            .field(
                "second_user_key",
                &self.second_user_key.as_ref().map(|_| "<redacted>"),
            )
            .field("owner_key", &self.owner_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// --- Helper functions ---

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| eyre!("{} is not set", key))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match optional(lookup, key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| eyre!("Invalid {}: {}", key, e)),
        None => Ok(default),
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse()
        .map_err(|e| eyre!("Invalid address in {}: {}", key, e))
}
