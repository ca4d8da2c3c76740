//! Turns a chunk of raw logs into stored records.
//!
//! Logs are handled strictly in `(block_number, log_index)` order and every record is written
//! before the next log is looked at, so sequence numbers assigned from the current maximum stay
//! consistent with what is already stored.

use alloy::primitives::{keccak256, Address};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use sqlx::SqlitePool;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::blockchain::client::{ChainRpc, ClientError};
use crate::blockchain::contracts;
use crate::blockchain::format::{format_amount, to_hex, DENOMINATION_DECIMALS};
use crate::blockchain::metadata::{InstanceMap, InstanceMetadata, InstanceStatus};
use crate::blockchain::routing::{EventClass, RoutingTable};
use crate::cache::BlockTimeCache;
use crate::db::entity::{self, Entity};
use crate::db::query::Filter;
use crate::db::{EntityKind, StoreError};
use crate::models::{
    record_id, Delegation, DelegationKind, Deposit, EncryptedNote, NoteAccount, Relayer,
    Withdrawal,
};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("log is missing {field} (block {block:?}, log index {log_index:?})")]
    MissingMetadata {
        field: &'static str,
        block: Option<u64>,
        log_index: Option<u64>,
    },

    #[error("failed to decode {kind} log at block {block}, log index {log_index}: {reason}")]
    Decode {
        kind: EntityKind,
        block: u64,
        log_index: u64,
        reason: String,
    },

    #[error("RPC error while building {kind} record at block {block}: {source}")]
    Rpc {
        kind: EntityKind,
        block: u64,
        #[source]
        source: ClientError,
    },

    #[error("failed to store {kind} record at block {block}: {source}")]
    Store {
        kind: EntityKind,
        block: u64,
        #[source]
        source: StoreError,
    },
}

impl DispatchError {
    /// Record kind being built when the failure happened, if known.
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            Self::Decode { kind, .. }
            | Self::Rpc { kind, .. }
            | Self::Store { kind, .. } => Some(*kind),
            Self::MissingMetadata { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkSummary {
    pub stored: HashMap<EntityKind, usize>,
    pub skipped: usize,
}

impl ChunkSummary {
    pub fn total(&self) -> usize {
        self.stored.values().sum()
    }
}

/// Everything a chunk needs that lives outside the processor.
pub struct ChunkContext<'a> {
    pub chain: &'a str,
    pub rpc: &'a dyn ChainRpc,
    pub pool: &'a SqlitePool,
    pub instances: &'a InstanceMap,
    pub from_block: u64,
    pub to_block: u64,
}

struct LogPosition {
    block: u64,
    log_index: u64,
    transaction_hash: String,
}

impl LogPosition {
    fn of(log: &Log) -> Result<Self, DispatchError> {
        let missing = |field| DispatchError::MissingMetadata {
            field,
            block: log.block_number,
            log_index: log.log_index,
        };
        Ok(Self {
            block: log.block_number.ok_or_else(|| missing("block number"))?,
            log_index: log.log_index.ok_or_else(|| missing("log index"))?,
            transaction_hash: to_hex(log.transaction_hash.ok_or_else(|| missing("transaction hash"))?),
        })
    }

    fn id(&self) -> String {
        record_id(&self.transaction_hash, self.log_index)
    }

    fn decode_error(&self, kind: EntityKind, reason: impl ToString) -> DispatchError {
        DispatchError::Decode {
            kind,
            block: self.block,
            log_index: self.log_index,
            reason: reason.to_string(),
        }
    }

    fn block_i64(&self, kind: EntityKind) -> Result<i64, DispatchError> {
        i64::try_from(self.block).map_err(|_| self.decode_error(kind, "block number out of range"))
    }

    fn log_index_i64(&self, kind: EntityKind) -> Result<i64, DispatchError> {
        i64::try_from(self.log_index).map_err(|_| self.decode_error(kind, "log index out of range"))
    }
}

/// Sequence numbers handed out within one chunk.
///
/// The stored maximum is read once per chunk (per address for note accounts). Records already
/// stored for the chunk's block range keep their index, so a re-scan rewrites identical rows.
#[derive(Default)]
struct IndexAllocator {
    existing: HashMap<EntityKind, HashMap<String, i64>>,
    note_max: Option<i64>,
    account_max: HashMap<String, i64>,
}

impl IndexAllocator {
    async fn existing_index(
        &mut self,
        ctx: &ChunkContext<'_>,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<i64>, StoreError> {
        if !self.existing.contains_key(&kind) {
            let from = i64::try_from(ctx.from_block).unwrap_or(i64::MAX);
            let to = i64::try_from(ctx.to_block).unwrap_or(i64::MAX);
            let known = entity::indices_in_block_range(ctx.pool, kind, from, to).await?;
            self.existing.insert(kind, known);
        }
        Ok(self.existing.get(&kind).and_then(|known| known.get(id)).copied())
    }

    async fn note_index(&mut self, ctx: &ChunkContext<'_>, id: &str) -> Result<i64, StoreError> {
        if let Some(index) = self.existing_index(ctx, EntityKind::EncryptedNotes, id).await? {
            return Ok(index);
        }
        let max = match self.note_max {
            Some(max) => max,
            None => entity::max_index(ctx.pool, EntityKind::EncryptedNotes, &Filter::new()).await?,
        };
        self.note_max = Some(max + 1);
        Ok(max + 1)
    }

    async fn account_index(
        &mut self,
        ctx: &ChunkContext<'_>,
        id: &str,
        address: &str,
    ) -> Result<i64, StoreError> {
        if let Some(index) = self.existing_index(ctx, EntityKind::NoteAccounts, id).await? {
            return Ok(index);
        }
        let max = match self.account_max.get(address) {
            Some(max) => *max,
            None => {
                let scope = Filter::new().eq("address", address);
                entity::max_index(ctx.pool, EntityKind::NoteAccounts, &scope).await?
            }
        };
        self.account_max.insert(address.to_string(), max + 1);
        Ok(max + 1)
    }
}

enum Outcome {
    Stored,
    Skipped,
}

pub struct EventProcessor {
    routes: RoutingTable,
    block_times: BlockTimeCache,
}

impl EventProcessor {
    pub fn new(routes: RoutingTable, block_times: BlockTimeCache) -> Self {
        Self {
            routes,
            block_times,
        }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Decodes and stores every tracked log of a chunk. Any failure aborts the chunk; records
    /// stored before the failure are rewritten identically when the chunk is retried.
    pub async fn process_chunk(
        &self,
        ctx: &ChunkContext<'_>,
        mut logs: Vec<Log>,
    ) -> Result<ChunkSummary, DispatchError> {
        sort_logs(&mut logs);

        let mut indices = IndexAllocator::default();
        let mut summary = ChunkSummary::default();
        for log in &logs {
            let Some(class) = self.routes.classify(log, ctx.instances) else {
                trace!(address = %log.address(), "Ignoring untracked log");
                continue;
            };

            match self.process_log(ctx, &mut indices, class, log).await? {
                Outcome::Stored => *summary.stored.entry(class.kind()).or_default() += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
        }

        Ok(summary)
    }

    async fn process_log(
        &self,
        ctx: &ChunkContext<'_>,
        indices: &mut IndexAllocator,
        class: EventClass,
        log: &Log,
    ) -> Result<Outcome, DispatchError> {
        let kind = class.kind();
        let pos = LogPosition::of(log)?;

        match class {
            EventClass::Deposit => {
                let Some(instance) = active_instance(ctx, log, kind, &pos) else {
                    return Ok(Outcome::Skipped);
                };
                let event = decode::<contracts::Deposit>(log, kind, &pos)?;
                let record = Deposit {
                    id: pos.id(),
                    currency: instance.currency.clone(),
                    amount: format_amount(instance.denomination, DENOMINATION_DECIMALS),
                    leaf_index: i64::from(event.leafIndex),
                    timestamp: i64::try_from(event.timestamp)
                        .map_err(|_| pos.decode_error(kind, "timestamp out of range"))?,
                    block_number: pos.block_i64(kind)?,
                    commitment: to_hex(event.commitment),
                    transaction_hash: pos.transaction_hash.clone(),
                };
                store(ctx, &pos, &record).await?;
            }
            EventClass::Withdrawal => {
                let Some(instance) = active_instance(ctx, log, kind, &pos) else {
                    return Ok(Outcome::Skipped);
                };
                let event = decode::<contracts::Withdrawal>(log, kind, &pos)?;
                let timestamp = self
                    .block_times
                    .get_or_fetch(ctx.rpc, pos.block)
                    .await
                    .map_err(|source| DispatchError::Rpc {
                        kind,
                        block: pos.block,
                        source,
                    })?;
                let record = Withdrawal {
                    id: pos.id(),
                    currency: instance.currency.clone(),
                    amount: format_amount(instance.denomination, DENOMINATION_DECIMALS),
                    recipient: to_hex(event.to),
                    fee: event.fee.to_string(),
                    nullifier: to_hex(event.nullifierHash),
                    timestamp: i64::try_from(timestamp)
                        .map_err(|_| pos.decode_error(kind, "timestamp out of range"))?,
                    block_number: pos.block_i64(kind)?,
                    transaction_hash: pos.transaction_hash.clone(),
                };
                store(ctx, &pos, &record).await?;
            }
            EventClass::EncryptedNote => {
                let event = decode::<contracts::EncryptedNote>(log, kind, &pos)?;
                let id = pos.id();
                let global_index = indices
                    .note_index(ctx, &id)
                    .await
                    .map_err(|source| store_error(kind, &pos, source))?;
                let record = EncryptedNote {
                    id,
                    global_index,
                    block_number: pos.block_i64(kind)?,
                    encrypted_note: to_hex(&event.encryptedNote),
                    transaction_hash: pos.transaction_hash.clone(),
                };
                store(ctx, &pos, &record).await?;
            }
            EventClass::RelayerRegistered => {
                let event = decode::<contracts::RelayerRegistered>(log, kind, &pos)?;
                let record = Relayer {
                    id: pos.id(),
                    address: to_hex(event.relayerAddress),
                    host_name_hash: to_hex(keccak256(event.hostName.as_bytes())),
                    host_name: event.hostName,
                    registration_block: pos.block_i64(kind)?,
                };
                store(ctx, &pos, &record).await?;
            }
            EventClass::NoteAccount => {
                let event = decode::<contracts::Echo>(log, kind, &pos)?;
                let id = pos.id();
                let address = to_hex(event.who);
                let account_index = indices
                    .account_index(ctx, &id, &address)
                    .await
                    .map_err(|source| store_error(kind, &pos, source))?;
                let record = NoteAccount {
                    id,
                    account_index,
                    address,
                    encrypted_account: to_hex(&event.data),
                    block_number: pos.block_i64(kind)?,
                    transaction_hash: pos.transaction_hash.clone(),
                };
                store(ctx, &pos, &record).await?;
            }
            EventClass::Delegated => {
                let event = decode::<contracts::Delegated>(log, kind, &pos)?;
                let record = delegation(&pos, DelegationKind::Delegated, event.account, event.to)?;
                store(ctx, &pos, &record).await?;
            }
            EventClass::Undelegated => {
                let event = decode::<contracts::Undelegated>(log, kind, &pos)?;
                let record =
                    delegation(&pos, DelegationKind::Undelegated, event.account, event.from)?;
                store(ctx, &pos, &record).await?;
            }
        }

        Ok(Outcome::Stored)
    }
}

/// Orders logs by block number, then by position within the block.
pub fn sort_logs(logs: &mut [Log]) {
    logs.sort_by_key(|log| (log.block_number, log.log_index));
}

/// Metadata of the emitting instance, or `None` when its logs are not recorded this cycle.
/// Instances whose metadata could not be read are excluded until a later cycle resolves them.
fn active_instance<'a>(
    ctx: &ChunkContext<'a>,
    log: &Log,
    kind: EntityKind,
    pos: &LogPosition,
) -> Option<&'a InstanceMetadata> {
    let address = log.address();
    match ctx.instances.status(&address) {
        InstanceStatus::Active(metadata) => Some(metadata),
        InstanceStatus::Unresolved => {
            warn!(
                chain = ctx.chain,
                instance = %address,
                block = pos.block,
                %kind,
                "Skipping log from instance with unresolved metadata"
            );
            None
        }
        InstanceStatus::Inactive | InstanceStatus::Unknown => {
            debug!(instance = %address, block = pos.block, "Skipping log from inactive instance");
            None
        }
    }
}

fn decode<E: SolEvent>(log: &Log, kind: EntityKind, pos: &LogPosition) -> Result<E, DispatchError> {
    E::decode_log(&log.inner)
        .map(|decoded| decoded.data)
        .map_err(|err| pos.decode_error(kind, err))
}

fn delegation(
    pos: &LogPosition,
    kind: DelegationKind,
    delegator: Address,
    delegatee: Address,
) -> Result<Delegation, DispatchError> {
    Ok(Delegation {
        id: pos.id(),
        kind,
        delegator: to_hex(delegator),
        delegatee: to_hex(delegatee),
        block: pos.block_i64(EntityKind::Delegations)?,
        log_index: pos.log_index_i64(EntityKind::Delegations)?,
        transaction_hash: pos.transaction_hash.clone(),
    })
}

fn store_error(kind: EntityKind, pos: &LogPosition, source: StoreError) -> DispatchError {
    DispatchError::Store {
        kind,
        block: pos.block,
        source,
    }
}

async fn store<T: Entity>(
    ctx: &ChunkContext<'_>,
    pos: &LogPosition,
    record: &T,
) -> Result<(), DispatchError> {
    entity::upsert(ctx.pool, record)
        .await
        .map_err(|source| store_error(T::KIND, pos, source))?;
    trace!(kind = %T::KIND, id = record.id(), "Stored record");
    Ok(())
}
