// Configuration is read from the environment (optionally seeded from a .env file):
// - global polling, chunking, rpc and storage settings
// - one block of settings per chain listed in CHAINS, prefixed with the chain name

use alloy::primitives::{address, Address};
use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::validation::{validate_address, ValidationError};

/// Canonical Multicall3 deployment, identical on most EVM chains.
pub const DEFAULT_MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(String),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no chains configured (set CHAINS)")]
    NoChains,
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: Url,
    pub chain_id: u64,
    pub instance_registry: Address,
    pub router: Address,
    pub relayer_registry: Address,
    pub echoer: Address,
    pub governance: Address,
    pub multicall: Address,
    /// Last block treated as already processed on first run; scanning starts right after it.
    pub start_block: u64,
    pub native_currency: String,
    pub confirmations: u64,
    pub database_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub poll_interval: Duration,
    pub chunk_size: u64,
    pub rpc_timeout_secs: u64,
    pub rpc_max_retries: usize,
    pub rpc_rate_limit: Option<u32>,
    pub block_time_cache_capacity: u64,
    pub db_max_connections: u32,
    /// Directory holding the default per-chain database files.
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_interval = Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 30)?);
        let chunk_size: u64 = parse_or(&lookup, "CHUNK_SIZE", 1000)?;
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "CHUNK_SIZE".to_string(),
                value: "0".to_string(),
            });
        }
        let rpc_timeout_secs = parse_or(&lookup, "RPC_TIMEOUT_SECS", 30)?;
        let rpc_max_retries = parse_or(&lookup, "RPC_MAX_RETRIES", 3)?;
        let rpc_rate_limit = match lookup("RPC_RATE_LIMIT") {
            Some(v) if !v.trim().is_empty() => Some(parse_value("RPC_RATE_LIMIT", &v)?),
            _ => None,
        };
        let block_time_cache_capacity = parse_or(&lookup, "BLOCK_TIME_CACHE_CAPACITY", 10_000)?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;
        let data_dir = lookup("DATA_DIR").unwrap_or_else(|| "data".to_string());

        let names: Vec<String> = lookup("CHAINS")
            .unwrap_or_default()
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return Err(ConfigError::NoChains);
        }

        let chains = names
            .iter()
            .map(|name| ChainConfig::from_lookup(name, &data_dir, &lookup))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            chains,
            poll_interval,
            chunk_size,
            rpc_timeout_secs,
            rpc_max_retries,
            rpc_rate_limit,
            block_time_cache_capacity,
            db_max_connections,
            data_dir: PathBuf::from(data_dir),
        })
    }

    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|chain| chain.name == name)
    }
}

impl ChainConfig {
    fn from_lookup<F>(name: &str, data_dir: &str, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = name.to_uppercase().replace('-', "_");
        let key = |suffix: &str| format!("{prefix}_{suffix}");
        let required = |suffix: &str| {
            let k = key(suffix);
            lookup(&k).ok_or(ConfigError::Missing(k))
        };
        let contract = |suffix: &str| -> Result<Address, ConfigError> {
            let k = key(suffix);
            let value = lookup(&k).ok_or_else(|| ConfigError::Missing(k.clone()))?;
            Ok(validate_address(&k, &value)?)
        };

        let rpc_url_raw = required("RPC_URL")?;
        let rpc_url = Url::parse(&rpc_url_raw).map_err(|_| ConfigError::Invalid {
            key: key("RPC_URL"),
            value: rpc_url_raw.clone(),
        })?;
        let chain_id = parse_value(&key("CHAIN_ID"), &required("CHAIN_ID")?)?;

        let multicall = match lookup(&key("MULTICALL3_ADDRESS")) {
            Some(value) => validate_address(&key("MULTICALL3_ADDRESS"), &value)?,
            None => DEFAULT_MULTICALL3,
        };

        Ok(Self {
            name: name.to_string(),
            rpc_url,
            chain_id,
            instance_registry: contract("INSTANCE_REGISTRY_ADDRESS")?,
            router: contract("ROUTER_ADDRESS")?,
            relayer_registry: contract("RELAYER_REGISTRY_ADDRESS")?,
            echoer: contract("ECHOER_ADDRESS")?,
            governance: contract("GOVERNANCE_ADDRESS")?,
            multicall,
            start_block: parse_or(lookup, &key("FROM_BLOCK"), 0)?,
            native_currency: lookup(&key("NATIVE_CURRENCY")).unwrap_or_else(|| name.to_lowercase()),
            confirmations: parse_or(lookup, &key("CONFIRMATIONS"), 0)?,
            database_url: lookup(&key("DATABASE_URL"))
                .unwrap_or_else(|| format!("sqlite:{data_dir}/{name}.db")),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}
