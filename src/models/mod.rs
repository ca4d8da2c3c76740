// Typed records persisted per entity kind.
// Every record carries an `id` derived from "{transaction_hash}-{log_index}" so that
// re-scanning a block range rewrites the same rows instead of adding new ones.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: String,
    pub currency: String,
    pub amount: String,
    pub leaf_index: i64,
    pub timestamp: i64,
    pub block_number: i64,
    pub commitment: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: String,
    pub currency: String,
    pub amount: String,
    #[serde(rename = "to")]
    pub recipient: String,
    /// Raw fee in token units.
    pub fee: String,
    pub nullifier: String,
    pub timestamp: i64,
    pub block_number: i64,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedNote {
    pub id: String,
    #[serde(rename = "index")]
    pub global_index: i64,
    pub block_number: i64,
    pub encrypted_note: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Relayer {
    pub id: String,
    pub address: String,
    pub host_name: String,
    pub host_name_hash: String,
    pub registration_block: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NoteAccount {
    pub id: String,
    #[serde(rename = "index")]
    pub account_index: i64,
    pub address: String,
    pub encrypted_account: String,
    pub block_number: i64,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DelegationKind {
    Delegated,
    Undelegated,
}

impl DelegationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delegated => "Delegated",
            Self::Undelegated => "Undelegated",
        }
    }
}

impl fmt::Display for DelegationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for DelegationKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "Delegated" => Ok(Self::Delegated),
            "Undelegated" => Ok(Self::Undelegated),
            _ => Err(format!("unknown delegation kind: {value}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    pub id: String,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: DelegationKind,
    pub delegator: String,
    pub delegatee: String,
    pub block: i64,
    pub log_index: i64,
    pub transaction_hash: String,
}

/// A delegator whose latest governance event is a delegation to the queried delegatee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDelegation {
    pub delegator: String,
    pub block: i64,
    pub transaction_hash: String,
}

/// Builds the provenance key shared by every record kind.
pub fn record_id(transaction_hash: &str, log_index: u64) -> String {
    format!("{transaction_hash}-{log_index}")
}
