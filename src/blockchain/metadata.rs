use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::blockchain::client::{ChainRpc, ClientError};
use crate::blockchain::contracts::{Call3, IInstanceRegistry, INSTANCE_STATE_ENABLED};
use crate::blockchain::format::to_hex;
use crate::config::ChainConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetadata {
    /// Lower-case token address, or the chain's native currency sentinel.
    pub currency: String,
    /// Raw deposit size in token units.
    pub denomination: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus<'a> {
    Active(&'a InstanceMetadata),
    Inactive,
    /// Listed by the registry but its metadata could not be read this cycle.
    Unresolved,
    Unknown,
}

/// Snapshot of the registry's instances, rebuilt once per cycle.
#[derive(Debug, Clone, Default)]
pub struct InstanceMap {
    active: HashMap<Address, InstanceMetadata>,
    inactive: HashSet<Address>,
    unresolved: HashSet<Address>,
}

impl InstanceMap {
    pub fn status(&self, address: &Address) -> InstanceStatus<'_> {
        if let Some(metadata) = self.active.get(address) {
            InstanceStatus::Active(metadata)
        } else if self.inactive.contains(address) {
            InstanceStatus::Inactive
        } else if self.unresolved.contains(address) {
            InstanceStatus::Unresolved
        } else {
            InstanceStatus::Unknown
        }
    }

    /// Whether the registry listed `address`, whatever its state.
    pub fn contains(&self, address: &Address) -> bool {
        !matches!(self.status(address), InstanceStatus::Unknown)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }

    pub fn insert_active(&mut self, address: Address, metadata: InstanceMetadata) {
        self.active.insert(address, metadata);
    }

    pub fn insert_inactive(&mut self, address: Address) {
        self.inactive.insert(address);
    }

    pub fn insert_unresolved(&mut self, address: Address) {
        self.unresolved.insert(address);
    }
}

/// Reads the instance registry and the per-instance configuration in two round trips:
/// one for the address list and one Multicall3 batch for every instance.
#[derive(Debug, Clone)]
pub struct MetadataResolver {
    registry: Address,
    multicall: Address,
    native_currency: String,
}

impl MetadataResolver {
    pub fn new(registry: Address, multicall: Address, native_currency: impl Into<String>) -> Self {
        Self {
            registry,
            multicall,
            native_currency: native_currency.into(),
        }
    }

    pub fn from_chain(chain: &ChainConfig) -> Self {
        Self::new(
            chain.instance_registry,
            chain.multicall,
            chain.native_currency.clone(),
        )
    }

    pub async fn resolve(&self, rpc: &dyn ChainRpc) -> Result<InstanceMap, ClientError> {
        let output = rpc
            .call(
                self.registry,
                IInstanceRegistry::getAllInstanceAddressesCall {}.abi_encode().into(),
            )
            .await?;
        let addresses = IInstanceRegistry::getAllInstanceAddressesCall::abi_decode_returns(&output)?;

        let mut instances = InstanceMap::default();
        if addresses.is_empty() {
            debug!(registry = %self.registry, "Instance registry is empty");
            return Ok(instances);
        }

        let calls = addresses
            .iter()
            .map(|instance| Call3 {
                target: self.registry,
                allowFailure: true,
                callData: IInstanceRegistry::instancesCall {
                    instance: *instance,
                }
                .abi_encode()
                .into(),
            })
            .collect();
        let results = rpc.aggregate(self.multicall, calls).await?;

        for (address, result) in addresses.into_iter().zip(results) {
            if !result.success {
                warn!(instance = %address, "Instance metadata call reverted");
                instances.insert_unresolved(address);
                continue;
            }

            match IInstanceRegistry::instancesCall::abi_decode_returns(&result.returnData) {
                Ok(info) if info.state == INSTANCE_STATE_ENABLED => {
                    let currency = if info.isERC20 {
                        to_hex(info.token)
                    } else {
                        self.native_currency.clone()
                    };
                    instances.insert_active(
                        address,
                        InstanceMetadata {
                            currency,
                            denomination: info.denomination,
                        },
                    );
                }
                Ok(_) => instances.insert_inactive(address),
                Err(err) => {
                    warn!(instance = %address, "Undecodable instance metadata: {}", err);
                    instances.insert_unresolved(address);
                }
            }
        }

        info!(
            active = instances.active_count(),
            unresolved = instances.unresolved_count(),
            "Resolved instance metadata"
        );
        Ok(instances)
    }
}
