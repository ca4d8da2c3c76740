use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::blockchain::polling::ChainPoller;

/// Result of asking a chain to start a cycle.
#[derive(Debug)]
pub enum Trigger {
    Started(JoinHandle<()>),
    /// A cycle for the chain is still in flight.
    Skipped,
}

#[derive(Clone)]
struct ChainSlot {
    name: String,
    poller: Arc<Mutex<ChainPoller>>,
}

impl ChainSlot {
    fn trigger(&self) -> Trigger {
        match self.poller.clone().try_lock_owned() {
            Ok(mut guard) => {
                let span = info_span!("chain", chain = %self.name);
                let handle = tokio::spawn(
                    async move {
                        guard.run_cycle().await;
                    }
                    .instrument(span),
                );
                Trigger::Started(handle)
            }
            Err(_) => {
                debug!(chain = %self.name, "Previous cycle still running, skipping trigger");
                Trigger::Skipped
            }
        }
    }
}

/// Drives every chain's poller on a fixed cadence. Chains run independently; at most one cycle
/// per chain is in flight at any time.
pub struct Scheduler {
    interval: Duration,
    slots: Vec<ChainSlot>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slots: Vec::new(),
        }
    }

    pub fn add_chain(&mut self, poller: ChainPoller) {
        let name = poller.chain().to_string();
        info!(chain = %name, interval = ?self.interval, "Scheduling chain");
        self.slots.push(ChainSlot {
            name,
            poller: Arc::new(Mutex::new(poller)),
        });
    }

    pub fn chains(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    /// Starts a cycle for `chain` unless one is already running. `None` for unknown chains.
    pub fn trigger(&self, chain: &str) -> Option<Trigger> {
        self.slot(chain).map(ChainSlot::trigger)
    }

    fn slot(&self, chain: &str) -> Option<&ChainSlot> {
        self.slots.iter().find(|slot| slot.name == chain)
    }

    /// Ticks every chain until `shutdown` fires, then waits for in-flight cycles to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        let period = self.interval;
        let tasks = self
            .slots
            .into_iter()
            .map(|slot| tokio::spawn(run_slot(slot, period, shutdown.clone())));

        for result in join_all(tasks).await {
            if let Err(err) = result {
                tracing::error!("Chain scheduler task panicked: {}", err);
            }
        }
        info!("Scheduler stopped");
    }
}

async fn run_slot(slot: ChainSlot, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                slot.trigger();
            }
            _ = shutdown.cancelled() => {
                info!(chain = %slot.name, "Shutting down chain poller");
                break;
            }
        }
    }

    // Any in-flight cycle holds the lock until it finishes.
    let _idle = slot.poller.lock().await;
    debug!(chain = %slot.name, "Chain poller idle");
}
