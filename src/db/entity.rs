//! Generic per-kind storage: keyed upsert, filtered/sorted/paginated reads and index lookups.
//!
//! Each [`EntityKind`] declares its table and fields statically. Caller-supplied field names
//! are always resolved against those declarations before they reach SQL.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::fmt;

use crate::db::query::{Comparison, Condition, QueryParams, SortDirection};
use crate::db::StoreError;
use crate::models::{Delegation, Deposit, EncryptedNote, NoteAccount, Relayer, Withdrawal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Deposits,
    Withdrawals,
    EncryptedNotes,
    Relayers,
    NoteAccounts,
    Delegations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Text,
    /// Text holding a hex address; compared lower-cased.
    Address,
    /// Text holding a decimal number; range filters compare it numerically.
    Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    /// Name used by readers in filters and sort keys.
    pub name: &'static str,
    pub column: &'static str,
    pub ty: FieldType,
}

const fn field(name: &'static str, column: &'static str, ty: FieldType) -> FieldDef {
    FieldDef { name, column, ty }
}

const DEPOSIT_FIELDS: &[FieldDef] = &[
    field("currency", "currency", FieldType::Text),
    field("amount", "amount", FieldType::Decimal),
    field("leafIndex", "leaf_index", FieldType::Integer),
    field("timestamp", "timestamp", FieldType::Integer),
    field("blockNumber", "block_number", FieldType::Integer),
    field("commitment", "commitment", FieldType::Text),
    field("transactionHash", "transaction_hash", FieldType::Text),
];

const WITHDRAWAL_FIELDS: &[FieldDef] = &[
    field("currency", "currency", FieldType::Text),
    field("amount", "amount", FieldType::Decimal),
    field("to", "recipient", FieldType::Address),
    field("fee", "fee", FieldType::Decimal),
    field("nullifier", "nullifier", FieldType::Text),
    field("timestamp", "timestamp", FieldType::Integer),
    field("blockNumber", "block_number", FieldType::Integer),
    field("transactionHash", "transaction_hash", FieldType::Text),
];

const ENCRYPTED_NOTE_FIELDS: &[FieldDef] = &[
    field("index", "global_index", FieldType::Integer),
    field("blockNumber", "block_number", FieldType::Integer),
    field("encryptedNote", "encrypted_note", FieldType::Text),
    field("transactionHash", "transaction_hash", FieldType::Text),
];

const RELAYER_FIELDS: &[FieldDef] = &[
    field("address", "address", FieldType::Address),
    field("hostName", "host_name", FieldType::Text),
    field("hostNameHash", "host_name_hash", FieldType::Text),
    field("registrationBlock", "registration_block", FieldType::Integer),
];

const NOTE_ACCOUNT_FIELDS: &[FieldDef] = &[
    field("index", "account_index", FieldType::Integer),
    field("address", "address", FieldType::Address),
    field("encryptedAccount", "encrypted_account", FieldType::Text),
    field("blockNumber", "block_number", FieldType::Integer),
    field("transactionHash", "transaction_hash", FieldType::Text),
];

const DELEGATION_FIELDS: &[FieldDef] = &[
    field("type", "kind", FieldType::Text),
    field("delegator", "delegator", FieldType::Address),
    field("delegatee", "delegatee", FieldType::Address),
    field("block", "block", FieldType::Integer),
    field("logIndex", "log_index", FieldType::Integer),
    field("transactionHash", "transaction_hash", FieldType::Text),
];

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        Self::Deposits,
        Self::Withdrawals,
        Self::EncryptedNotes,
        Self::Relayers,
        Self::NoteAccounts,
        Self::Delegations,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Self::Deposits => "deposits",
            Self::Withdrawals => "withdrawals",
            Self::EncryptedNotes => "encrypted_notes",
            Self::Relayers => "relayers",
            Self::NoteAccounts => "note_accounts",
            Self::Delegations => "delegations",
        }
    }

    /// Declared fields, excluding the `id` key, in storage order.
    pub fn fields(&self) -> &'static [FieldDef] {
        match self {
            Self::Deposits => DEPOSIT_FIELDS,
            Self::Withdrawals => WITHDRAWAL_FIELDS,
            Self::EncryptedNotes => ENCRYPTED_NOTE_FIELDS,
            Self::Relayers => RELAYER_FIELDS,
            Self::NoteAccounts => NOTE_ACCOUNT_FIELDS,
            Self::Delegations => DELEGATION_FIELDS,
        }
    }

    /// Field used for default iteration and for `max_index`.
    pub fn ordering_field(&self) -> &'static str {
        match self {
            Self::Deposits => "leafIndex",
            Self::Withdrawals => "blockNumber",
            Self::EncryptedNotes | Self::NoteAccounts => "index",
            Self::Relayers => "registrationBlock",
            Self::Delegations => "block",
        }
    }

    /// Sort direction when the reader does not pick one. Deposits list newest first.
    pub fn default_direction(&self) -> SortDirection {
        match self {
            Self::Deposits => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }

    /// Field holding the block a record originated in.
    pub fn block_field(&self) -> &'static str {
        match self {
            Self::Relayers => "registrationBlock",
            Self::Delegations => "block",
            _ => "blockNumber",
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields().iter().find(|f| f.name == name)
    }

    pub(crate) fn require_field(&self, name: &str) -> Result<&'static FieldDef, StoreError> {
        self.field(name).ok_or_else(|| StoreError::UnknownField {
            kind: *self,
            field: name.to_string(),
        })
    }

    fn column_list(&self) -> String {
        self.fields()
            .iter()
            .map(|f| f.column)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A single column value, used both for writes and for filter operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A record stored in one entity table.
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Column values in the order of `KIND.fields()`.
    fn values(&self) -> Vec<FieldValue>;
}

impl Entity for Deposit {
    const KIND: EntityKind = EntityKind::Deposits;

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.currency.clone().into(),
            self.amount.clone().into(),
            self.leaf_index.into(),
            self.timestamp.into(),
            self.block_number.into(),
            self.commitment.clone().into(),
            self.transaction_hash.clone().into(),
        ]
    }
}

impl Entity for Withdrawal {
    const KIND: EntityKind = EntityKind::Withdrawals;

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.currency.clone().into(),
            self.amount.clone().into(),
            self.recipient.clone().into(),
            self.fee.clone().into(),
            self.nullifier.clone().into(),
            self.timestamp.into(),
            self.block_number.into(),
            self.transaction_hash.clone().into(),
        ]
    }
}

impl Entity for EncryptedNote {
    const KIND: EntityKind = EntityKind::EncryptedNotes;

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.global_index.into(),
            self.block_number.into(),
            self.encrypted_note.clone().into(),
            self.transaction_hash.clone().into(),
        ]
    }
}

impl Entity for Relayer {
    const KIND: EntityKind = EntityKind::Relayers;

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.address.clone().into(),
            self.host_name.clone().into(),
            self.host_name_hash.clone().into(),
            self.registration_block.into(),
        ]
    }
}

impl Entity for NoteAccount {
    const KIND: EntityKind = EntityKind::NoteAccounts;

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.account_index.into(),
            self.address.clone().into(),
            self.encrypted_account.clone().into(),
            self.block_number.into(),
            self.transaction_hash.clone().into(),
        ]
    }
}

impl Entity for Delegation {
    const KIND: EntityKind = EntityKind::Delegations;

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.kind.as_str().into(),
            self.delegator.clone().into(),
            self.delegatee.clone().into(),
            self.block.into(),
            self.log_index.into(),
            self.transaction_hash.clone().into(),
        ]
    }
}

fn upsert_sql(kind: EntityKind) -> String {
    let fields = kind.fields();
    let placeholders = vec!["?"; fields.len() + 1].join(", ");
    let updates = fields
        .iter()
        .map(|f| format!("{0} = excluded.{0}", f.column))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} (id, {}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        kind.table(),
        kind.column_list(),
        placeholders,
        updates
    )
}

/// Inserts `record`, or replaces the row with the same id. A single statement, so readers
/// see either the old row or the new one.
pub async fn upsert<T: Entity>(pool: &SqlitePool, record: &T) -> Result<(), StoreError> {
    let sql = upsert_sql(T::KIND);
    let mut query = sqlx::query(&sql).bind(record.id().to_string());
    for value in record.values() {
        query = match value {
            FieldValue::Integer(v) => query.bind(v),
            FieldValue::Text(v) => query.bind(v),
        };
    }
    query.execute(pool).await?;
    Ok(())
}

fn push_conditions(builder: &mut QueryBuilder<'_, Sqlite>, conditions: Vec<Condition>) {
    for (i, condition) in conditions.into_iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        let numeric = condition.ty == FieldType::Decimal && condition.comparison == Comparison::Gte;
        if numeric {
            builder.push(format!("CAST({} AS REAL)", condition.column));
        } else {
            builder.push(condition.column);
        }
        builder.push(condition.comparison.sql_operator());
        if numeric {
            builder.push("CAST(");
        }
        match condition.value {
            FieldValue::Integer(v) => builder.push_bind(v),
            FieldValue::Text(v) => builder.push_bind(v),
        };
        if numeric {
            builder.push(" AS REAL)");
        }
    }
}

/// Returns records of `T` matching `params`, ordered and paginated.
pub async fn query<T: Entity>(pool: &SqlitePool, params: &QueryParams) -> Result<Vec<T>, StoreError> {
    let kind = T::KIND;
    let conditions = params.filter.resolve(kind)?;
    let order_by = params.order_by.as_deref().unwrap_or(kind.ordering_field());
    let order_column = kind.require_field(order_by)?.column;
    let direction = params.direction.unwrap_or(kind.default_direction()).sql();
    let (limit, offset) = params.page()?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT id, {} FROM {}",
        kind.column_list(),
        kind.table()
    ));
    push_conditions(&mut builder, conditions);
    builder.push(format!(" ORDER BY {order_column} {direction}, id {direction}"));
    builder.push(" LIMIT ").push_bind(limit);
    builder.push(" OFFSET ").push_bind(offset);

    let records = builder.build_query_as::<T>().fetch_all(pool).await?;
    Ok(records)
}

/// Highest value of the kind's ordering field among records matching `scope`, or 0.
pub async fn max_index(
    pool: &SqlitePool,
    kind: EntityKind,
    scope: &crate::db::query::Filter,
) -> Result<i64, StoreError> {
    let conditions = scope.resolve(kind)?;
    let column = kind.require_field(kind.ordering_field())?.column;

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT COALESCE(MAX({column}), 0) AS max_index FROM {}",
        kind.table()
    ));
    push_conditions(&mut builder, conditions);

    let row = builder.build().fetch_one(pool).await?;
    Ok(row.try_get::<i64, _>("max_index")?)
}

/// Maps id to ordering value for every record of `kind` originating in `from..=to`.
pub async fn indices_in_block_range(
    pool: &SqlitePool,
    kind: EntityKind,
    from_block: i64,
    to_block: i64,
) -> Result<HashMap<String, i64>, StoreError> {
    let index_column = kind.require_field(kind.ordering_field())?.column;
    let block_column = kind.require_field(kind.block_field())?.column;

    let rows = sqlx::query(&format!(
        "SELECT id, {index_column} AS idx FROM {} WHERE {block_column} BETWEEN ? AND ?",
        kind.table()
    ))
    .bind(from_block)
    .bind(to_block)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<(String, i64), StoreError> {
            Ok((row.try_get("id")?, row.try_get("idx")?))
        })
        .collect()
}

pub async fn count(pool: &SqlitePool, kind: EntityKind) -> Result<i64, StoreError> {
    let row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM {}", kind.table()))
        .fetch_one(pool)
        .await?;
    Ok(row.try_get::<i64, _>("total")?)
}
