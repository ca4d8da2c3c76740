use crate::blockchain::contracts::{Call3, CallResult, IMulticall3};
use crate::config::{ChainConfig, Config};
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionInput, TransactionRequest};
use alloy::sol_types::SolCall;
use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("RPC error: {0}")]
    Rpc(#[from] TransportError),

    #[error("ABI error: {0}")]
    Abi(#[from] alloy::sol_types::Error),

    #[error("Block not found: {0}")]
    BlockNotFound(u64),

    #[error("Multicall returned {got} results for {expected} calls")]
    MulticallLength { expected: usize, got: usize },
}

/// The RPC capabilities the ingestion pipeline relies on.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current head block number.
    async fn block_number(&self) -> Result<u64, ClientError>;

    /// All logs in `from_block..=to_block` whose first topic is one of `topics`.
    async fn logs(
        &self,
        from_block: u64,
        to_block: u64,
        topics: &[B256],
    ) -> Result<Vec<Log>, ClientError>;

    /// Unix timestamp of block `number`.
    async fn block_timestamp(&self, number: u64) -> Result<u64, ClientError>;

    /// Read-only `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError>;

    /// Runs `calls` through Multicall3 `aggregate3` in a single round trip.
    async fn aggregate(
        &self,
        multicall: Address,
        calls: Vec<Call3>,
    ) -> Result<Vec<CallResult>, ClientError> {
        let expected = calls.len();
        let data = IMulticall3::aggregate3Call { calls }.abi_encode();
        let output = self.call(multicall, data.into()).await?;
        let results = IMulticall3::aggregate3Call::abi_decode_returns(&output)?;
        if results.len() != expected {
            return Err(ClientError::MulticallLength {
                expected,
                got: results.len(),
            });
        }
        Ok(results)
    }
}

pub struct EvmClient {
    chain: String,
    provider: DynProvider,
    limiter: Option<DefaultDirectRateLimiter>,
    max_retries: usize,
}

impl EvmClient {
    pub fn new(chain: &ChainConfig, config: &Config) -> Result<Self, ClientError> {
        info!(
            chain = %chain.name,
            rpc_url = %chain.rpc_url,
            chain_id = chain.chain_id,
            "Initializing EVM client"
        );

        let http = reqwest::Client::builder()
            .connect_timeout(RPC_CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.rpc_timeout_secs))
            .build()
            .map_err(TransportErrorKind::custom)?;
        let provider = ProviderBuilder::new()
            .connect_reqwest(http, chain.rpc_url.clone())
            .erased();

        let limiter = config
            .rpc_rate_limit
            .and_then(NonZeroU32::new)
            .map(|per_second| RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            chain: chain.name.clone(),
            provider,
            limiter,
            max_retries: config.rpc_max_retries,
        })
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(10))
            .with_max_times(self.max_retries)
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    fn log_retry(&self, method: &'static str, err: &TransportError, delay: Duration) {
        warn!(chain = %self.chain, method, ?delay, "retrying rpc call: {}", err);
    }
}

/// Errors worth retrying within the same cycle: transport failures and provider throttling.
fn is_transient(err: &TransportError) -> bool {
    match err {
        RpcError::Transport(_) => true,
        RpcError::ErrorResp(resp) => {
            resp.code == 429
                || resp.message.contains("limit exceeded")
                || resp.message.contains("rate limit")
        }
        _ => false,
    }
}

#[async_trait]
impl ChainRpc for EvmClient {
    async fn block_number(&self) -> Result<u64, ClientError> {
        let number = (|| async {
            self.throttle().await;
            self.provider.get_block_number().await
        })
        .retry(self.backoff())
        .when(is_transient)
        .notify(|err, delay| self.log_retry("eth_blockNumber", err, delay))
        .await?;
        Ok(number)
    }

    async fn logs(
        &self,
        from_block: u64,
        to_block: u64,
        topics: &[B256],
    ) -> Result<Vec<Log>, ClientError> {
        let filter = Filter::new()
            .select(from_block..=to_block)
            .event_signature(topics.to_vec());

        let logs = (|| async {
            self.throttle().await;
            self.provider.get_logs(&filter).await
        })
        .retry(self.backoff())
        .when(is_transient)
        .notify(|err, delay| self.log_retry("eth_getLogs", err, delay))
        .await?;
        Ok(logs)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, ClientError> {
        let block = (|| async {
            self.throttle().await;
            self.provider
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .await
        })
        .retry(self.backoff())
        .when(is_transient)
        .notify(|err, delay| self.log_retry("eth_getBlockByNumber", err, delay))
        .await?;

        let block = block.ok_or(ClientError::BlockNotFound(number))?;
        Ok(block.header.timestamp)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        let request = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::new(data));

        let output = (|| async {
            self.throttle().await;
            self.provider.call(request.clone()).await
        })
        .retry(self.backoff())
        .when(is_transient)
        .notify(|err, delay| self.log_retry("eth_call", err, delay))
        .await?;
        Ok(output)
    }
}
