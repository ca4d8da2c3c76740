pub mod client;
pub mod contracts;
pub mod format;
pub mod metadata;
pub mod polling;
pub mod processor;
pub mod routing;
pub mod scheduler;

// Re-exports for convenience
pub use client::{ChainRpc, ClientError, EvmClient};
pub use polling::{ChainPoller, PollError, PollOutcome, PollState};
pub use scheduler::{Scheduler, Trigger};
