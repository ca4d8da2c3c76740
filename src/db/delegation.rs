use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::db::StoreError;
use crate::models::{ActiveDelegation, Delegation, DelegationKind};

/// Delegators whose most recent governance event, across every delegatee, is a delegation
/// to `delegatee`.
pub async fn active_delegators(
    pool: &SqlitePool,
    delegatee: &str,
) -> Result<Vec<ActiveDelegation>, StoreError> {
    let delegatee = delegatee.trim().to_lowercase();

    // Full history of every delegator that ever touched this delegatee.
    let events = sqlx::query_as::<_, Delegation>(
        "SELECT id, kind, delegator, delegatee, block, log_index, transaction_hash
         FROM delegations
         WHERE delegator IN (SELECT DISTINCT delegator FROM delegations WHERE delegatee = ?)
         ORDER BY block ASC, log_index ASC",
    )
    .bind(&delegatee)
    .fetch_all(pool)
    .await?;

    Ok(derive_active(&events, &delegatee))
}

/// Keeps the latest event per delegator and reports it if it delegates to `delegatee`.
pub fn derive_active(events: &[Delegation], delegatee: &str) -> Vec<ActiveDelegation> {
    let mut latest: HashMap<&str, &Delegation> = HashMap::new();
    for event in events {
        latest
            .entry(event.delegator.as_str())
            .and_modify(|current| {
                if (event.block, event.log_index) >= (current.block, current.log_index) {
                    *current = event;
                }
            })
            .or_insert(event);
    }

    let mut active: Vec<ActiveDelegation> = latest
        .into_values()
        .filter(|event| event.kind == DelegationKind::Delegated && event.delegatee == delegatee)
        .map(|event| ActiveDelegation {
            delegator: event.delegator.clone(),
            block: event.block,
            transaction_hash: event.transaction_hash.clone(),
        })
        .collect();
    active.sort_by(|a, b| (a.block, &a.delegator).cmp(&(b.block, &b.delegator)));
    active
}
