//! Read-only access to the stored records of every configured chain.

pub mod error;
pub mod request;
pub mod response;

pub use error::ApiError;
pub use request::ListRequest;
pub use response::ApiResponse;

use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;

use crate::db::entity::{self, Entity};
use crate::db::query::QueryParams;
use crate::db::{checkpoint, delegation, EntityKind};
use crate::models::{
    ActiveDelegation, Delegation, Deposit, EncryptedNote, NoteAccount, Relayer, Withdrawal,
};
use crate::validation::validate_address;

#[derive(Debug, Clone)]
struct ChainStore {
    pool: SqlitePool,
    start_block: u64,
}

#[derive(Debug, Clone, Default)]
pub struct QueryService {
    chains: HashMap<String, ChainStore>,
}

impl QueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chain(&mut self, chain: impl Into<String>, pool: SqlitePool, start_block: u64) {
        self.chains
            .insert(chain.into(), ChainStore { pool, start_block });
    }

    fn store(&self, chain: &str) -> Result<&ChainStore, ApiError> {
        self.chains
            .get(chain)
            .ok_or_else(|| ApiError::UnknownChain(chain.to_string()))
    }

    pub async fn query<T: Entity>(
        &self,
        chain: &str,
        params: &QueryParams,
    ) -> Result<Vec<T>, ApiError> {
        let store = self.store(chain)?;
        let records = entity::query::<T>(&store.pool, params).await?;
        debug!(chain, kind = %T::KIND, count = records.len(), "Query served");
        Ok(records)
    }

    pub async fn deposits(&self, chain: &str, params: &QueryParams) -> Result<Vec<Deposit>, ApiError> {
        self.query(chain, params).await
    }

    pub async fn withdrawals(
        &self,
        chain: &str,
        params: &QueryParams,
    ) -> Result<Vec<Withdrawal>, ApiError> {
        self.query(chain, params).await
    }

    pub async fn encrypted_notes(
        &self,
        chain: &str,
        params: &QueryParams,
    ) -> Result<Vec<EncryptedNote>, ApiError> {
        self.query(chain, params).await
    }

    pub async fn relayers(&self, chain: &str, params: &QueryParams) -> Result<Vec<Relayer>, ApiError> {
        self.query(chain, params).await
    }

    pub async fn note_accounts(
        &self,
        chain: &str,
        params: &QueryParams,
    ) -> Result<Vec<NoteAccount>, ApiError> {
        self.query(chain, params).await
    }

    pub async fn delegations(
        &self,
        chain: &str,
        params: &QueryParams,
    ) -> Result<Vec<Delegation>, ApiError> {
        self.query(chain, params).await
    }

    /// Last fully ingested block of `chain`.
    pub async fn last_block(&self, chain: &str) -> Result<u64, ApiError> {
        let store = self.store(chain)?;
        Ok(checkpoint::get_last_block(&store.pool, chain, store.start_block).await?)
    }

    pub async fn count(&self, chain: &str, kind: EntityKind) -> Result<i64, ApiError> {
        let store = self.store(chain)?;
        Ok(entity::count(&store.pool, kind).await?)
    }

    pub async fn active_delegators(
        &self,
        chain: &str,
        delegatee: &str,
    ) -> Result<Vec<ActiveDelegation>, ApiError> {
        let store = self.store(chain)?;
        validate_address("delegatee", delegatee)?;
        Ok(delegation::active_delegators(&store.pool, delegatee).await?)
    }
}
