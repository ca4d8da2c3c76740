//! Block timestamp cache using Moka

use moka::future::Cache;
use tracing::debug;

use crate::blockchain::client::{ChainRpc, ClientError};

/// Caches block number to unix timestamp for one chain.
///
/// Block timestamps never change once a block is final, so entries carry no TTL and are only
/// evicted by capacity.
#[derive(Clone)]
pub struct BlockTimeCache {
    cache: Cache<u64, u64>,
}

impl BlockTimeCache {
    /// Create a new block timestamp cache
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(capacity).build();
        Self { cache }
    }

    /// Cached timestamp for `block`, fetched through `rpc` on a miss.
    pub async fn get_or_fetch(&self, rpc: &dyn ChainRpc, block: u64) -> Result<u64, ClientError> {
        if let Some(timestamp) = self.cache.get(&block).await {
            debug!(block, "Block timestamp cache hit");
            return Ok(timestamp);
        }

        let timestamp = rpc.block_timestamp(block).await?;
        self.cache.insert(block, timestamp).await;
        debug!(block, timestamp, "Cached block timestamp");
        Ok(timestamp)
    }
}
