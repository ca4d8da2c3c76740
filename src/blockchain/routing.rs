use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use std::collections::HashMap;

use crate::blockchain::contracts::{
    Delegated, Deposit, EncryptedNote, Echo, RelayerRegistered, Undelegated, Withdrawal,
};
use crate::blockchain::metadata::InstanceMap;
use crate::config::ChainConfig;
use crate::db::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressRole {
    Instance,
    Router,
    RelayerRegistry,
    Echoer,
    Governance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Deposit,
    Withdrawal,
    EncryptedNote,
    RelayerRegistered,
    NoteAccount,
    Delegated,
    Undelegated,
}

impl EventClass {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Deposit => EntityKind::Deposits,
            Self::Withdrawal => EntityKind::Withdrawals,
            Self::EncryptedNote => EntityKind::EncryptedNotes,
            Self::RelayerRegistered => EntityKind::Relayers,
            Self::NoteAccount => EntityKind::NoteAccounts,
            Self::Delegated | Self::Undelegated => EntityKind::Delegations,
        }
    }
}

const EVENT_ROUTES: &[(AddressRole, B256, EventClass)] = &[
    (AddressRole::Instance, Deposit::SIGNATURE_HASH, EventClass::Deposit),
    (AddressRole::Instance, Withdrawal::SIGNATURE_HASH, EventClass::Withdrawal),
    (AddressRole::Router, EncryptedNote::SIGNATURE_HASH, EventClass::EncryptedNote),
    (
        AddressRole::RelayerRegistry,
        RelayerRegistered::SIGNATURE_HASH,
        EventClass::RelayerRegistered,
    ),
    (AddressRole::Echoer, Echo::SIGNATURE_HASH, EventClass::NoteAccount),
    (AddressRole::Governance, Delegated::SIGNATURE_HASH, EventClass::Delegated),
    (AddressRole::Governance, Undelegated::SIGNATURE_HASH, EventClass::Undelegated),
];

/// Maps `(emitting contract role, topic0)` to the record kind a log produces.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    roles: HashMap<Address, AddressRole>,
    events: HashMap<(AddressRole, B256), EventClass>,
}

impl RoutingTable {
    pub fn new(chain: &ChainConfig) -> Self {
        let roles = HashMap::from([
            (chain.router, AddressRole::Router),
            (chain.relayer_registry, AddressRole::RelayerRegistry),
            (chain.echoer, AddressRole::Echoer),
            (chain.governance, AddressRole::Governance),
        ]);
        let events = EVENT_ROUTES
            .iter()
            .map(|(role, topic, class)| ((*role, *topic), *class))
            .collect();

        Self { roles, events }
    }

    /// Distinct topic0 values worth requesting from the node.
    pub fn topics(&self) -> Vec<B256> {
        let mut topics: Vec<B256> = EVENT_ROUTES.iter().map(|(_, topic, _)| *topic).collect();
        topics.sort();
        topics.dedup();
        topics
    }

    pub fn role_of(&self, address: &Address, instances: &InstanceMap) -> Option<AddressRole> {
        match self.roles.get(address) {
            Some(role) => Some(*role),
            None if instances.contains(address) => Some(AddressRole::Instance),
            None => None,
        }
    }

    /// Event class for `log`, or `None` when it comes from an untracked contract or carries an
    /// untracked topic.
    pub fn classify(&self, log: &Log, instances: &InstanceMap) -> Option<EventClass> {
        let topic = log.topic0()?;
        let role = self.role_of(&log.address(), instances)?;
        self.events.get(&(role, *topic)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::metadata::InstanceMetadata;
    use alloy::primitives::{address, LogData, U256};
    use url::Url;

    fn chain() -> ChainConfig {
        ChainConfig {
            name: "etn".to_string(),
            rpc_url: Url::parse("http://localhost:8545").unwrap(),
            chain_id: 52014,
            instance_registry: address!("1000000000000000000000000000000000000001"),
            router: address!("1000000000000000000000000000000000000002"),
            relayer_registry: address!("1000000000000000000000000000000000000003"),
            echoer: address!("1000000000000000000000000000000000000004"),
            governance: address!("1000000000000000000000000000000000000005"),
            multicall: crate::config::DEFAULT_MULTICALL3,
            start_block: 0,
            native_currency: "etn".to_string(),
            confirmations: 0,
            database_url: "sqlite::memory:".to_string(),
        }
    }

    fn log_at(address: Address, topic: B256) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address,
                data: LogData::new_unchecked(vec![topic], Default::default()),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_by_role_and_topic() {
        let config = chain();
        let table = RoutingTable::new(&config);
        let instance = address!("2000000000000000000000000000000000000001");
        let mut instances = InstanceMap::default();
        instances.insert_active(
            instance,
            InstanceMetadata {
                currency: "etn".to_string(),
                denomination: U256::from(1u64),
            },
        );

        assert_eq!(
            table.classify(&log_at(instance, Deposit::SIGNATURE_HASH), &instances),
            Some(EventClass::Deposit)
        );
        assert_eq!(
            table.classify(&log_at(config.echoer, Echo::SIGNATURE_HASH), &instances),
            Some(EventClass::NoteAccount)
        );
        assert_eq!(
            table.classify(&log_at(config.governance, Undelegated::SIGNATURE_HASH), &instances),
            Some(EventClass::Undelegated)
        );
    }

    #[test]
    fn test_unmatched_logs_are_ignored() {
        let config = chain();
        let table = RoutingTable::new(&config);
        let instances = InstanceMap::default();
        let stranger = address!("3000000000000000000000000000000000000003");

        // Right topic, wrong emitter.
        assert_eq!(
            table.classify(&log_at(config.router, Deposit::SIGNATURE_HASH), &instances),
            None
        );
        assert_eq!(
            table.classify(&log_at(stranger, Deposit::SIGNATURE_HASH), &instances),
            None
        );
        assert_eq!(table.classify(&Log::default(), &instances), None);
    }

    #[test]
    fn test_topics_are_distinct() {
        let table = RoutingTable::new(&chain());
        assert_eq!(table.topics().len(), EVENT_ROUTES.len());
    }
}
