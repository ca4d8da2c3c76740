//! Filter, sort and pagination parameters understood by [`crate::db::entity::query`].

use serde_json::Value;
use std::str::FromStr;

use crate::db::entity::{EntityKind, FieldType, FieldValue};
use crate::db::StoreError;
use crate::validation::{validate_limit, validate_offset, ValidationError};

pub const DEFAULT_LIMIT: i64 = 1000;

/// Filter keys ending in this suffix select records whose field is greater than or equal to
/// the value. Integer and decimal fields compare numerically, every other text field compares
/// lexicographically.
pub const GTE_SUFFIX: &str = "_gte";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gte,
}

impl Comparison {
    pub(crate) fn sql_operator(&self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Gte => " >= ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Term {
    field: String,
    comparison: Comparison,
    value: FieldValue,
}

/// A term checked against a kind's declared fields and coerced to the column type.
#[derive(Debug, Clone)]
pub(crate) struct Condition {
    pub column: &'static str,
    pub ty: FieldType,
    pub comparison: Comparison,
    pub value: FieldValue,
}

/// Conjunction of equality and lower-bound terms. Fields without a term match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    terms: Vec<Term>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.terms.push(Term {
            field: field.into(),
            comparison: Comparison::Eq,
            value: value.into(),
        });
        self
    }

    pub fn gte(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.terms.push(Term {
            field: field.into(),
            comparison: Comparison::Gte,
            value: value.into(),
        });
        self
    }

    /// Adds a term from a reader-facing key, where `blockNumber_gte` means `blockNumber >=`.
    pub fn with_key(self, key: &str, value: impl Into<FieldValue>) -> Self {
        match key.strip_suffix(GTE_SUFFIX) {
            Some(field) => self.gte(field, value),
            None => self.eq(key, value),
        }
    }

    /// Builds a filter from a JSON object such as `{"currency": "etn", "blockNumber_gte": 20}`.
    /// Null values are treated as absent.
    pub fn from_json(map: &serde_json::Map<String, Value>) -> Result<Self, ValidationError> {
        let mut filter = Self::new();
        for (key, value) in map {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => FieldValue::Text(s.clone()),
                Value::Number(n) => match n.as_i64() {
                    Some(v) => FieldValue::Integer(v),
                    None => {
                        return Err(ValidationError::InvalidParameter(format!(
                            "{key}: {n} is not an integer"
                        )))
                    }
                },
                Value::Bool(b) => FieldValue::Text(b.to_string()),
                other => {
                    return Err(ValidationError::InvalidParameter(format!(
                        "{key}: unsupported filter value {other}"
                    )))
                }
            };
            filter = filter.with_key(key, value);
        }
        Ok(filter)
    }

    pub(crate) fn resolve(&self, kind: EntityKind) -> Result<Vec<Condition>, StoreError> {
        self.terms
            .iter()
            .map(|term| -> Result<Condition, StoreError> {
                let def = kind.require_field(&term.field)?;
                let invalid = |reason: String| StoreError::InvalidValue {
                    kind,
                    field: term.field.clone(),
                    reason,
                };
                let value = match (def.ty, &term.value) {
                    (FieldType::Integer, FieldValue::Integer(v)) => FieldValue::Integer(*v),
                    (FieldType::Integer, FieldValue::Text(s)) => FieldValue::Integer(
                        s.trim()
                            .parse()
                            .map_err(|_| invalid(format!("expected an integer, got {s:?}")))?,
                    ),
                    (FieldType::Decimal, FieldValue::Text(s)) => {
                        let trimmed = s.trim();
                        if !trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
                            return Err(invalid(format!("expected a decimal number, got {s:?}")));
                        }
                        FieldValue::Text(trimmed.to_string())
                    }
                    (FieldType::Decimal, FieldValue::Integer(v)) => FieldValue::Text(v.to_string()),
                    (FieldType::Text, FieldValue::Text(s)) => FieldValue::Text(s.clone()),
                    (FieldType::Text, FieldValue::Integer(v)) => FieldValue::Text(v.to_string()),
                    (FieldType::Address, FieldValue::Text(s)) => {
                        FieldValue::Text(s.trim().to_lowercase())
                    }
                    (FieldType::Address, FieldValue::Integer(v)) => {
                        return Err(invalid(format!("expected an address, got {v}")))
                    }
                };
                Ok(Condition {
                    column: def.column,
                    ty: def.ty,
                    comparison: term.comparison,
                    value,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ValidationError::InvalidParameter(format!(
                "sort direction must be 'asc' or 'desc', got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub filter: Filter,
    /// Reader-facing field name; `None` sorts by the kind's ordering field.
    pub order_by: Option<String>,
    /// `None` uses the kind's default direction.
    pub direction: Option<SortDirection>,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(field.into());
        self.direction = Some(direction);
        self
    }

    pub fn direction(mut self, direction: SortDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub(crate) fn page(&self) -> Result<(i64, i64), ValidationError> {
        let limit = validate_limit(self.limit.unwrap_or(DEFAULT_LIMIT))?;
        let offset = validate_offset(self.offset)?;
        Ok((limit, offset))
    }
}
