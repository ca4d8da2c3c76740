use serde::Deserialize;
use serde_json::{Map, Value};

use crate::db::query::{Filter, QueryParams};
use crate::validation::ValidationError;

/// List arguments as external readers send them, e.g.
/// `{"first": 10, "skip": 0, "orderBy": "blockNumber", "orderDirection": "desc",
///   "where": {"currency": "etn", "blockNumber_gte": 100}}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub first: Option<i64>,
    pub skip: Option<i64>,
    pub order_by: Option<String>,
    pub order_direction: Option<String>,
    #[serde(rename = "where")]
    pub filter: Option<Map<String, Value>>,
}

impl TryFrom<ListRequest> for QueryParams {
    type Error = ValidationError;

    fn try_from(request: ListRequest) -> Result<Self, Self::Error> {
        let mut params = QueryParams::new();

        if let Some(filter) = &request.filter {
            params = params.filter(Filter::from_json(filter)?);
        }

        params.order_by = request.order_by;
        if let Some(direction) = request.order_direction.as_deref() {
            params = params.direction(direction.parse()?);
        }

        if let Some(first) = request.first {
            params = params.limit(first);
        }
        if let Some(skip) = request.skip {
            params = params.offset(skip);
        }

        Ok(params)
    }
}
