//! Shared fixtures: an in-memory store and a scripted RPC node.

use alloy::primitives::aliases::U24;
use alloy::primitives::{address, Address, Bytes, LogData, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::{SolCall, SolEvent};
use alloy::transports::TransportErrorKind;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use url::Url;

use crate::blockchain::client::{ChainRpc, ClientError};
use crate::blockchain::contracts::{CallResult, IInstanceRegistry, IMulticall3};
use crate::cache::BlockTimeCache;
use crate::config::{ChainConfig, DEFAULT_MULTICALL3};
use crate::blockchain::polling::ChainPoller;
use crate::db::{checkpoint, connection};

pub const CHAIN: &str = "etn";
pub const REGISTRY: Address = address!("1000000000000000000000000000000000000001");
pub const ROUTER: Address = address!("1000000000000000000000000000000000000002");
pub const RELAYER_REGISTRY: Address = address!("1000000000000000000000000000000000000003");
pub const ECHOER: Address = address!("1000000000000000000000000000000000000004");
pub const GOVERNANCE: Address = address!("1000000000000000000000000000000000000005");

pub const NATIVE_POOL: Address = address!("2000000000000000000000000000000000000001");
pub const TOKEN_POOL: Address = address!("2000000000000000000000000000000000000002");
pub const RETIRED_POOL: Address = address!("2000000000000000000000000000000000000003");
pub const BROKEN_POOL: Address = address!("2000000000000000000000000000000000000004");
pub const TOKEN: Address = address!("00000000000000000000000000000000000000aa");

pub fn test_chain(start_block: u64) -> ChainConfig {
    ChainConfig {
        name: CHAIN.to_string(),
        rpc_url: Url::parse("http://localhost:8545").unwrap(),
        chain_id: 52014,
        instance_registry: REGISTRY,
        router: ROUTER,
        relayer_registry: RELAYER_REGISTRY,
        echoer: ECHOER,
        governance: GOVERNANCE,
        multicall: DEFAULT_MULTICALL3,
        start_block,
        native_currency: "etn".to_string(),
        confirmations: 0,
        database_url: "sqlite::memory:".to_string(),
    }
}

/// A single-connection in-memory database with the schema applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    connection::init_schema(&pool).await.expect("schema");
    pool
}

#[derive(Debug, Clone)]
pub struct MockInstance {
    pub address: Address,
    pub token: Option<Address>,
    pub denomination: U256,
    pub state: u8,
    /// The metadata call reverts inside the multicall.
    pub reverts: bool,
}

impl MockInstance {
    pub fn native(address: Address, denomination: U256) -> Self {
        Self {
            address,
            token: None,
            denomination,
            state: 1,
            reverts: false,
        }
    }
}

pub fn default_instances() -> Vec<MockInstance> {
    vec![
        MockInstance::native(NATIVE_POOL, U256::from(1_500_000_000_000_000_000u128)),
        MockInstance {
            address: TOKEN_POOL,
            token: Some(TOKEN),
            denomination: U256::from(100_000_000_000_000_000u128),
            state: 1,
            reverts: false,
        },
        MockInstance {
            address: RETIRED_POOL,
            token: None,
            denomination: U256::from(1_000_000_000_000_000_000u128),
            state: 2,
            reverts: false,
        },
    ]
}

/// Scripted node: serves a fixed log set, answers registry and multicall reads and records every
/// request it receives.
pub struct MockRpc {
    head: AtomicU64,
    logs: Mutex<Vec<Log>>,
    instances: Mutex<Vec<MockInstance>>,
    /// `eth_getLogs` fails for any range containing this block.
    fail_logs_at: Mutex<Option<u64>>,
    log_requests: Mutex<Vec<(u64, u64)>>,
    timestamp_requests: AtomicUsize,
    head_requests: AtomicUsize,
    /// When set, every head request waits for a notification.
    gate: Option<Arc<Notify>>,
}

impl MockRpc {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            logs: Mutex::new(Vec::new()),
            instances: Mutex::new(default_instances()),
            fail_logs_at: Mutex::new(None),
            log_requests: Mutex::new(Vec::new()),
            timestamp_requests: AtomicUsize::new(0),
            head_requests: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated(head: u64, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(head)
        }
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn set_instances(&self, instances: Vec<MockInstance>) {
        *self.instances.lock().unwrap() = instances;
    }

    pub fn fail_logs_at(&self, block: Option<u64>) {
        *self.fail_logs_at.lock().unwrap() = block;
    }

    pub fn log_requests(&self) -> Vec<(u64, u64)> {
        self.log_requests.lock().unwrap().clone()
    }

    pub fn timestamp_requests(&self) -> usize {
        self.timestamp_requests.load(Ordering::SeqCst)
    }

    pub fn head_requests(&self) -> usize {
        self.head_requests.load(Ordering::SeqCst)
    }

    /// Timestamp the mock reports for `block`.
    pub fn timestamp_of(block: u64) -> u64 {
        1_700_000_000 + block * 5
    }

    fn instance_result(&self, call_data: &[u8]) -> CallResult {
        let failure = CallResult {
            success: false,
            returnData: Bytes::new(),
        };
        let Ok(call) = IInstanceRegistry::instancesCall::abi_decode(call_data) else {
            return failure;
        };
        let instances = self.instances.lock().unwrap();
        let Some(instance) = instances.iter().find(|i| i.address == call.instance) else {
            return failure;
        };
        if instance.reverts {
            return failure;
        }

        let info = IInstanceRegistry::instancesReturn {
            isERC20: instance.token.is_some(),
            token: instance.token.unwrap_or(Address::ZERO),
            denomination: instance.denomination,
            state: instance.state,
            poolSwappingFee: U24::ZERO,
            protocolFeePercentage: 0,
        };
        CallResult {
            success: true,
            returnData: IInstanceRegistry::instancesCall::abi_encode_returns(&info).into(),
        }
    }
}

fn rpc_error(message: &str) -> ClientError {
    ClientError::Rpc(TransportErrorKind::custom_str(message))
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn block_number(&self) -> Result<u64, ClientError> {
        self.head_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn logs(
        &self,
        from_block: u64,
        to_block: u64,
        topics: &[B256],
    ) -> Result<Vec<Log>, ClientError> {
        self.log_requests.lock().unwrap().push((from_block, to_block));
        if let Some(block) = *self.fail_logs_at.lock().unwrap() {
            if (from_block..=to_block).contains(&block) {
                return Err(rpc_error("query returned more than 10000 results"));
            }
        }

        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|log| {
                log.block_number
                    .is_some_and(|block| (from_block..=to_block).contains(&block))
            })
            .filter(|log| log.topic0().is_some_and(|topic| topics.contains(topic)))
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, ClientError> {
        self.timestamp_requests.fetch_add(1, Ordering::SeqCst);
        Ok(Self::timestamp_of(number))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        if to == REGISTRY
            && data.starts_with(&IInstanceRegistry::getAllInstanceAddressesCall::SELECTOR)
        {
            let addresses: Vec<Address> = self
                .instances
                .lock()
                .unwrap()
                .iter()
                .map(|i| i.address)
                .collect();
            return Ok(
                IInstanceRegistry::getAllInstanceAddressesCall::abi_encode_returns(&addresses)
                    .into(),
            );
        }

        if to == DEFAULT_MULTICALL3 {
            let batch = IMulticall3::aggregate3Call::abi_decode(&data)?;
            let results: Vec<CallResult> = batch
                .calls
                .iter()
                .map(|call| self.instance_result(&call.callData))
                .collect();
            return Ok(IMulticall3::aggregate3Call::abi_encode_returns(&results).into());
        }

        Err(rpc_error("execution reverted"))
    }
}

/// Wraps an encoded event into an RPC log at `(block, log_index)`.
pub fn log_of<E: SolEvent>(emitter: Address, event: &E, block: u64, log_index: u64) -> Log {
    let data: LogData = event.encode_log_data();
    Log {
        inner: alloy::primitives::Log {
            address: emitter,
            data,
        },
        block_number: Some(block),
        log_index: Some(log_index),
        transaction_hash: Some(tx_hash(block, log_index)),
        ..Default::default()
    }
}

/// Deterministic transaction hash per log position.
pub fn tx_hash(block: u64, log_index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[16..24].copy_from_slice(&block.to_be_bytes());
    bytes[24..].copy_from_slice(&log_index.to_be_bytes());
    B256::from(bytes)
}

pub struct Harness {
    pub rpc: Arc<MockRpc>,
    pub pool: SqlitePool,
    pub chain: ChainConfig,
}

impl Harness {
    pub async fn new(rpc: MockRpc, start_block: u64) -> Self {
        let pool = memory_pool().await;
        let chain = test_chain(start_block);
        checkpoint::ensure_checkpoint(&pool, CHAIN, start_block)
            .await
            .unwrap();
        Self {
            rpc: Arc::new(rpc),
            pool,
            chain,
        }
    }

    pub fn poller(&self, chunk_size: u64) -> ChainPoller {
        let rpc: Arc<dyn ChainRpc> = self.rpc.clone();
        ChainPoller::new(
            &self.chain,
            chunk_size,
            rpc,
            self.pool.clone(),
            BlockTimeCache::new(1_000),
        )
    }

    pub async fn last_block(&self) -> u64 {
        checkpoint::get_last_block(&self.pool, CHAIN, self.chain.start_block)
            .await
            .unwrap()
    }
}
