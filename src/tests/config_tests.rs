//! tests/config_tests.rs - environment driven configuration

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::config::{Config, ConfigError, DEFAULT_MULTICALL3};

    fn base() -> HashMap<String, String> {
        [
            ("CHAINS", "etn, etn-testnet"),
            ("ETN_RPC_URL", "https://rpc.example.org"),
            ("ETN_CHAIN_ID", "52014"),
            ("ETN_INSTANCE_REGISTRY_ADDRESS", "0x1000000000000000000000000000000000000001"),
            ("ETN_ROUTER_ADDRESS", "0x1000000000000000000000000000000000000002"),
            ("ETN_RELAYER_REGISTRY_ADDRESS", "0x1000000000000000000000000000000000000003"),
            ("ETN_ECHOER_ADDRESS", "0x1000000000000000000000000000000000000004"),
            ("ETN_GOVERNANCE_ADDRESS", "0x1000000000000000000000000000000000000005"),
            ("ETN_FROM_BLOCK", "4000000"),
            ("ETN_TESTNET_RPC_URL", "https://testnet.example.org"),
            ("ETN_TESTNET_CHAIN_ID", "5201420"),
            ("ETN_TESTNET_INSTANCE_REGISTRY_ADDRESS", "0x2000000000000000000000000000000000000001"),
            ("ETN_TESTNET_ROUTER_ADDRESS", "0x2000000000000000000000000000000000000002"),
            ("ETN_TESTNET_RELAYER_REGISTRY_ADDRESS", "0x2000000000000000000000000000000000000003"),
            ("ETN_TESTNET_ECHOER_ADDRESS", "0x2000000000000000000000000000000000000004"),
            ("ETN_TESTNET_GOVERNANCE_ADDRESS", "0x2000000000000000000000000000000000000005"),
            ("ETN_TESTNET_MULTICALL3_ADDRESS", "0x3000000000000000000000000000000000000003"),
            ("ETN_TESTNET_NATIVE_CURRENCY", "tetn"),
            ("ETN_TESTNET_CONFIRMATIONS", "12"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn load(vars: &HashMap<String, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_and_per_chain_settings() {
        let config = load(&base()).unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.rpc_rate_limit, None);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.chains.len(), 2);

        let etn = config.chain("etn").unwrap();
        assert_eq!(etn.chain_id, 52014);
        assert_eq!(etn.start_block, 4_000_000);
        assert_eq!(etn.native_currency, "etn");
        assert_eq!(etn.multicall, DEFAULT_MULTICALL3);
        assert_eq!(etn.confirmations, 0);
        assert_eq!(etn.database_url, "sqlite:data/etn.db");

        let testnet = config.chain("etn-testnet").unwrap();
        assert_eq!(testnet.start_block, 0);
        assert_eq!(testnet.native_currency, "tetn");
        assert_eq!(testnet.confirmations, 12);
        assert_eq!(
            testnet.multicall,
            address!("3000000000000000000000000000000000000003")
        );
    }

    #[test]
    fn test_global_overrides() {
        let mut vars = base();
        vars.insert("POLL_INTERVAL_SECS".into(), "5".into());
        vars.insert("CHUNK_SIZE".into(), "250".into());
        vars.insert("RPC_RATE_LIMIT".into(), "20".into());
        vars.insert("DATA_DIR".into(), "/var/lib/indexer".into());
        let config = load(&vars).unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.rpc_rate_limit, Some(20));
        assert_eq!(
            config.chain("etn").unwrap().database_url,
            "sqlite:/var/lib/indexer/etn.db"
        );
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut vars = base();
        vars.insert("CHUNK_SIZE".into(), "0".into());
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = base();
        vars.insert("ETN_ROUTER_ADDRESS".into(), "0x1234".into());
        assert!(matches!(load(&vars), Err(ConfigError::Validation(_))));

        let mut vars = base();
        vars.remove("ETN_GOVERNANCE_ADDRESS");
        match load(&vars) {
            Err(ConfigError::Missing(key)) => assert_eq!(key, "ETN_GOVERNANCE_ADDRESS"),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut vars = base();
        vars.insert("ETN_RPC_URL".into(), "not a url".into());
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = base();
        vars.insert("CHAINS".into(), " , ".into());
        assert!(matches!(load(&vars), Err(ConfigError::NoChains)));
    }

    #[test]
    fn test_logging_is_ready_before_configuration_loads() {
        crate::logging::init();
        crate::logging::init();
        assert!(tracing::dispatcher::has_been_set());

        // Configuration failures go through the subscriber
        let err = load(&HashMap::new()).unwrap_err();
        tracing::error!("Invalid configuration: {}", err);
    }
}
