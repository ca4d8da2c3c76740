use sqlx::SqlitePool;
use tracing::debug;

use crate::db::StoreError;

/// Seeds the checkpoint row for `chain` on first run. Existing rows are left untouched.
pub async fn ensure_checkpoint(
    pool: &SqlitePool,
    chain: &str,
    start_block: u64,
) -> Result<(), StoreError> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO checkpoints (chain, last_block, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(chain) DO NOTHING",
    )
    .bind(chain)
    .bind(to_db_block(start_block)?)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Last fully ingested block for `chain`, or `start_block` when nothing was stored yet.
pub async fn get_last_block(
    pool: &SqlitePool,
    chain: &str,
    start_block: u64,
) -> Result<u64, StoreError> {
    let stored: Option<i64> =
        sqlx::query_scalar("SELECT last_block FROM checkpoints WHERE chain = ?")
            .bind(chain)
            .fetch_optional(pool)
            .await?;

    match stored {
        Some(block) => u64::try_from(block).map_err(|_| {
            StoreError::Database(sqlx::Error::Decode(
                format!("negative checkpoint {block} for {chain}").into(),
            ))
        }),
        None => Ok(start_block),
    }
}

/// Records `block` as the last processed block. Callers only ever move it forward.
pub async fn set_last_block(pool: &SqlitePool, chain: &str, block: u64) -> Result<(), StoreError> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO checkpoints (chain, last_block, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(chain) DO UPDATE SET last_block = excluded.last_block,
                                          updated_at = excluded.updated_at",
    )
    .bind(chain)
    .bind(to_db_block(block)?)
    .bind(now)
    .execute(pool)
    .await?;

    debug!(chain, block, "checkpoint advanced");
    Ok(())
}

fn to_db_block(block: u64) -> Result<i64, StoreError> {
    i64::try_from(block).map_err(|_| {
        StoreError::Database(sqlx::Error::Encode(
            format!("block {block} exceeds storable range").into(),
        ))
    })
}
