// Set up logging
// Load configuration
// Open one store per chain
// Build a poller per chain and hand them to the scheduler
// Run until Ctrl-C

use pool_indexer::blockchain::{ChainPoller, ChainRpc, EvmClient, Scheduler};
use pool_indexer::cache::BlockTimeCache;
use pool_indexer::config::Config;
use pool_indexer::db::{checkpoint, connection};
use pool_indexer::logging;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init();
    let config = Config::from_env().inspect_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
    })?;
    tracing::info!(
        chains = config.chains.len(),
        poll_interval = ?config.poll_interval,
        chunk_size = config.chunk_size,
        "Starting pool-indexer"
    );

    std::fs::create_dir_all(&config.data_dir)?;

    let mut scheduler = Scheduler::new(config.poll_interval);
    for chain in &config.chains {
        let pool = connection::establish_connection(&chain.database_url, config.db_max_connections)
            .await?;
        checkpoint::ensure_checkpoint(&pool, &chain.name, chain.start_block).await?;
        tracing::info!(chain = %chain.name, database = %chain.database_url, "Store ready");

        let rpc: Arc<dyn ChainRpc> = Arc::new(EvmClient::new(chain, &config)?);
        let block_times = BlockTimeCache::new(config.block_time_cache_capacity);
        scheduler.add_chain(ChainPoller::new(
            chain,
            config.chunk_size,
            rpc,
            pool,
            block_times,
        ));
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    scheduler.run(shutdown).await;
    tracing::info!("pool-indexer stopped");
    Ok(())
}
