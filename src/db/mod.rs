pub mod checkpoint;
pub mod connection;
pub mod delegation;
pub mod entity;
pub mod query;

use thiserror::Error;

use crate::validation::ValidationError;
pub use entity::{EntityKind, FieldValue};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown field `{field}` for {kind}")]
    UnknownField { kind: EntityKind, field: String },

    #[error("invalid value for `{field}` on {kind}: {reason}")]
    InvalidValue {
        kind: EntityKind,
        field: String,
        reason: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// One database per chain. Every entity table is keyed on the provenance id and indexed on
// its ordering field plus every field the query layer filters on.
pub const INIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    chain TEXT PRIMARY KEY,
    last_block INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS deposits (
    id TEXT PRIMARY KEY,
    currency TEXT NOT NULL,
    amount TEXT NOT NULL,
    leaf_index INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    block_number INTEGER NOT NULL,
    commitment TEXT NOT NULL,
    transaction_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_deposits_block_number ON deposits(block_number);
CREATE INDEX IF NOT EXISTS idx_deposits_leaf_index ON deposits(leaf_index);
CREATE INDEX IF NOT EXISTS idx_deposits_currency_amount ON deposits(currency, amount);

CREATE TABLE IF NOT EXISTS withdrawals (
    id TEXT PRIMARY KEY,
    currency TEXT NOT NULL,
    amount TEXT NOT NULL,
    recipient TEXT NOT NULL,
    fee TEXT NOT NULL,
    nullifier TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    block_number INTEGER NOT NULL,
    transaction_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_withdrawals_block_number ON withdrawals(block_number);
CREATE INDEX IF NOT EXISTS idx_withdrawals_currency_amount ON withdrawals(currency, amount);

CREATE TABLE IF NOT EXISTS encrypted_notes (
    id TEXT PRIMARY KEY,
    global_index INTEGER NOT NULL,
    block_number INTEGER NOT NULL,
    encrypted_note TEXT NOT NULL,
    transaction_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_encrypted_notes_global_index ON encrypted_notes(global_index);
CREATE INDEX IF NOT EXISTS idx_encrypted_notes_block_number ON encrypted_notes(block_number);

CREATE TABLE IF NOT EXISTS relayers (
    id TEXT PRIMARY KEY,
    address TEXT NOT NULL,
    host_name TEXT NOT NULL,
    host_name_hash TEXT NOT NULL,
    registration_block INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_relayers_registration_block ON relayers(registration_block);
CREATE INDEX IF NOT EXISTS idx_relayers_address ON relayers(address);

CREATE TABLE IF NOT EXISTS note_accounts (
    id TEXT PRIMARY KEY,
    account_index INTEGER NOT NULL,
    address TEXT NOT NULL,
    encrypted_account TEXT NOT NULL,
    block_number INTEGER NOT NULL,
    transaction_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_note_accounts_address_index ON note_accounts(address, account_index);
CREATE INDEX IF NOT EXISTS idx_note_accounts_block_number ON note_accounts(block_number);

CREATE TABLE IF NOT EXISTS delegations (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    delegator TEXT NOT NULL,
    delegatee TEXT NOT NULL,
    block INTEGER NOT NULL,
    log_index INTEGER NOT NULL,
    transaction_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_delegations_delegator ON delegations(delegator);
CREATE INDEX IF NOT EXISTS idx_delegations_delegatee ON delegations(delegatee);
CREATE INDEX IF NOT EXISTS idx_delegations_block ON delegations(block);
"#;
