//! tests/api_tests.rs - read interface over the per-chain stores

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::api::{ApiError, ApiResponse, ListRequest, QueryService};
    use crate::db::query::{QueryParams, SortDirection};
    use crate::db::{checkpoint, entity, EntityKind, StoreError};
    use crate::models::{record_id, Deposit};
    use crate::tests::support::{memory_pool, CHAIN};

    fn deposit(block: i64, currency: &str) -> Deposit {
        let tx = format!("0x{block:064x}");
        Deposit {
            id: record_id(&tx, 0),
            currency: currency.to_string(),
            amount: "1".to_string(),
            leaf_index: block,
            timestamp: 1_700_000_000,
            block_number: block,
            commitment: format!("0x{:064x}", block + 1),
            transaction_hash: tx,
        }
    }

    async fn service() -> QueryService {
        let pool = memory_pool().await;
        checkpoint::ensure_checkpoint(&pool, CHAIN, 100).await.unwrap();
        for (block, currency) in [(10, "etn"), (20, "etn"), (30, "0xaa"), (40, "etn")] {
            entity::upsert(&pool, &deposit(block, currency)).await.unwrap();
        }
        let mut service = QueryService::new();
        service.add_chain(CHAIN, pool, 100);
        service
    }

    #[tokio::test]
    async fn test_list_request_drives_query() {
        let service = service().await;
        let request: ListRequest = serde_json::from_value(json!({
            "first": 2,
            "skip": 0,
            "orderBy": "blockNumber",
            "orderDirection": "desc",
            "where": { "currency": "etn", "blockNumber_gte": 15 }
        }))
        .unwrap();
        let params = QueryParams::try_from(request).unwrap();
        assert_eq!(params.direction, Some(SortDirection::Desc));

        let found = service.deposits(CHAIN, &params).await.unwrap();
        let blocks: Vec<i64> = found.iter().map(|d| d.block_number).collect();
        assert_eq!(blocks, vec![40, 20]);

        let body = serde_json::to_value(ApiResponse::new(found)).unwrap();
        assert_eq!(body["data"][0]["blockNumber"], 40);
        assert_eq!(body["data"][0]["leafIndex"], 40);
        assert!(body.get("total").is_none());
    }

    #[tokio::test]
    async fn test_deposits_default_to_newest_first() {
        let service = service().await;
        let request: ListRequest = serde_json::from_value(json!({ "first": 3 })).unwrap();
        let params = QueryParams::try_from(request).unwrap();
        assert_eq!(params.direction, None);

        let found = service.deposits(CHAIN, &params).await.unwrap();
        let leaves: Vec<i64> = found.iter().map(|d| d.leaf_index).collect();
        assert_eq!(leaves, vec![40, 30, 20]);

        let request: ListRequest =
            serde_json::from_value(json!({ "orderDirection": "asc" })).unwrap();
        let params = QueryParams::try_from(request).unwrap();
        let found = service.deposits(CHAIN, &params).await.unwrap();
        assert_eq!(found.first().map(|d| d.leaf_index), Some(10));
    }

    #[tokio::test]
    async fn test_bad_list_requests_are_rejected() {
        let request: ListRequest =
            serde_json::from_value(json!({ "orderDirection": "sideways" })).unwrap();
        assert!(QueryParams::try_from(request).is_err());

        let request: ListRequest =
            serde_json::from_value(json!({ "where": { "blockNumber": [1, 2] } })).unwrap();
        assert!(QueryParams::try_from(request).is_err());

        let service = service().await;
        let request: ListRequest =
            serde_json::from_value(json!({ "where": { "nonsense": 1 } })).unwrap();
        let params = QueryParams::try_from(request).unwrap();
        let err = service.deposits(CHAIN, &params).await.unwrap_err();
        assert!(matches!(err, ApiError::Store(StoreError::UnknownField { .. })));
    }

    #[tokio::test]
    async fn test_unknown_chain() {
        let service = service().await;
        let err = service
            .deposits("nowhere", &QueryParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnknownChain(ref chain) if chain == "nowhere"));
        assert!(matches!(
            service.last_block("nowhere").await,
            Err(ApiError::UnknownChain(_))
        ));
    }

    #[tokio::test]
    async fn test_last_block_and_counts() {
        let service = service().await;
        assert_eq!(service.last_block(CHAIN).await.unwrap(), 100);
        assert_eq!(service.count(CHAIN, EntityKind::Deposits).await.unwrap(), 4);
        assert_eq!(service.count(CHAIN, EntityKind::Relayers).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_active_delegators_validates_address() {
        let service = service().await;
        let err = service
            .active_delegators(CHAIN, "not-an-address")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidParameter(_)));

        let found = service
            .active_delegators(CHAIN, "0x00000000000000000000000000000000000000f1")
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
