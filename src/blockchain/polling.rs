use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::blockchain::client::{ChainRpc, ClientError};
use crate::blockchain::metadata::MetadataResolver;
use crate::blockchain::processor::{ChunkContext, DispatchError, EventProcessor};
use crate::blockchain::routing::RoutingTable;
use crate::cache::BlockTimeCache;
use crate::config::ChainConfig;
use crate::db::{checkpoint, StoreError};

#[derive(Error, Debug)]
pub enum PollError {
    #[error("RPC error: {0}")]
    Rpc(#[from] ClientError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to fetch logs for blocks {from_block}..={to_block}: {source}")]
    Logs {
        from_block: u64,
        to_block: u64,
        #[source]
        source: ClientError,
    },

    #[error("failed to process blocks {from_block}..={to_block}: {source}")]
    Chunk {
        from_block: u64,
        to_block: u64,
        #[source]
        source: DispatchError,
    },

    #[error("checkpoint would move backwards from {current} to {attempted}")]
    CheckpointRegression { current: u64, attempted: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    FetchingMetadata,
    Scanning { chunk_start: u64 },
    Committing { chunk_end: u64 },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing new past the checkpoint.
    UpToDate { checkpoint: u64 },
    Advanced {
        from_block: u64,
        to_block: u64,
        chunks: usize,
        records: usize,
    },
}

/// Splits `from_block..=to_block` into consecutive inclusive ranges of at most `chunk_size`
/// blocks.
pub fn chunk_ranges(from_block: u64, to_block: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    if from_block > to_block || chunk_size == 0 {
        return Vec::new();
    }
    let step = usize::try_from(chunk_size).unwrap_or(usize::MAX);
    (from_block..=to_block)
        .step_by(step)
        .map(|start| (start, start.saturating_add(chunk_size - 1).min(to_block)))
        .collect()
}

/// Ingestion state machine for a single chain.
pub struct ChainPoller {
    chain: String,
    start_block: u64,
    confirmations: u64,
    chunk_size: u64,
    rpc: Arc<dyn ChainRpc>,
    pool: SqlitePool,
    resolver: MetadataResolver,
    processor: EventProcessor,
    state: PollState,
}

impl ChainPoller {
    pub fn new(
        chain: &ChainConfig,
        chunk_size: u64,
        rpc: Arc<dyn ChainRpc>,
        pool: SqlitePool,
        block_times: BlockTimeCache,
    ) -> Self {
        Self {
            chain: chain.name.clone(),
            start_block: chain.start_block,
            confirmations: chain.confirmations,
            chunk_size,
            rpc,
            pool,
            resolver: MetadataResolver::from_chain(chain),
            processor: EventProcessor::new(RoutingTable::new(chain), block_times),
            state: PollState::Idle,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Runs one cycle and logs its result. Failures are reported, never propagated: the next
    /// cycle resumes from the last committed chunk.
    pub async fn run_cycle(&mut self) {
        match self.poll_once().await {
            Ok(PollOutcome::Advanced {
                from_block,
                to_block,
                chunks,
                records,
            }) => info!(
                chain = %self.chain,
                from_block, to_block, chunks, records,
                "Ingested new blocks"
            ),
            Ok(PollOutcome::UpToDate { checkpoint }) => {
                debug!(chain = %self.chain, checkpoint, "Already up to date")
            }
            Err(PollError::Chunk {
                from_block,
                to_block,
                source,
            }) => error!(
                chain = %self.chain,
                from_block,
                to_block,
                kind = ?source.kind(),
                "Polling cycle failed: {}",
                source
            ),
            Err(PollError::Logs {
                from_block,
                to_block,
                source,
            }) => error!(
                chain = %self.chain,
                from_block, to_block,
                "Polling cycle failed fetching logs: {}",
                source
            ),
            Err(err) => error!(chain = %self.chain, "Polling cycle failed: {}", err),
        }
    }

    pub async fn poll_once(&mut self) -> Result<PollOutcome, PollError> {
        if self.state == PollState::Failed {
            debug!(chain = %self.chain, "Retrying after failed cycle");
        }
        self.state = PollState::Idle;

        let result = self.scan().await;
        self.state = match result {
            Ok(_) => PollState::Idle,
            Err(_) => PollState::Failed,
        };
        result
    }

    async fn scan(&mut self) -> Result<PollOutcome, PollError> {
        let checkpoint =
            checkpoint::get_last_block(&self.pool, &self.chain, self.start_block).await?;
        let head = self
            .rpc
            .block_number()
            .await?
            .saturating_sub(self.confirmations);

        if head <= checkpoint {
            return Ok(PollOutcome::UpToDate { checkpoint });
        }

        self.state = PollState::FetchingMetadata;
        let instances = self.resolver.resolve(self.rpc.as_ref()).await?;
        let topics = self.processor.routes().topics();

        let ranges = chunk_ranges(checkpoint + 1, head, self.chunk_size);
        debug!(
            chain = %self.chain,
            from_block = checkpoint + 1,
            to_block = head,
            chunks = ranges.len(),
            "Scanning block range"
        );

        let mut records = 0;
        for &(from_block, to_block) in &ranges {
            self.state = PollState::Scanning {
                chunk_start: from_block,
            };
            let logs = self
                .rpc
                .logs(from_block, to_block, &topics)
                .await
                .map_err(|source| PollError::Logs {
                    from_block,
                    to_block,
                    source,
                })?;

            let ctx = ChunkContext {
                chain: &self.chain,
                rpc: self.rpc.as_ref(),
                pool: &self.pool,
                instances: &instances,
                from_block,
                to_block,
            };
            let summary = self
                .processor
                .process_chunk(&ctx, logs)
                .await
                .map_err(|source| PollError::Chunk {
                    from_block,
                    to_block,
                    source,
                })?;

            self.state = PollState::Committing {
                chunk_end: to_block,
            };
            self.commit(to_block).await?;

            debug!(
                chain = %self.chain,
                from_block,
                to_block,
                records = summary.total(),
                skipped = summary.skipped,
                "Chunk committed"
            );
            records += summary.total();
        }

        Ok(PollOutcome::Advanced {
            from_block: checkpoint + 1,
            to_block: head,
            chunks: ranges.len(),
            records,
        })
    }

    async fn commit(&self, block: u64) -> Result<(), PollError> {
        let current = checkpoint::get_last_block(&self.pool, &self.chain, self.start_block).await?;
        if block < current {
            return Err(PollError::CheckpointRegression {
                current,
                attempted: block,
            });
        }
        checkpoint::set_last_block(&self.pool, &self.chain, block).await?;
        Ok(())
    }
}
