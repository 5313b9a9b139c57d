use super::{ExchangeSink, RetryPolicy};
use crate::capture::ExchangeReady;
use crate::metrics;
use crate::scheduler::Scheduler;
use crate::store::ExchangeStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Delivers ready exchanges in the background.
///
/// Each event gets its own task: up to `max_attempts` tries with backoff
/// between them, then the event is parked in the store's undelivered list.
/// Signal processing never waits on delivery.
///
/// [`Emitter::reset`] abandons every delivery still in progress; clones
/// share the reset.
#[derive(Clone)]
pub struct Emitter {
    sink: Arc<dyn ExchangeSink>,
    policy: RetryPolicy,
    store: Arc<dyn ExchangeStore>,
    scheduler: Arc<dyn Scheduler>,
    epoch: Arc<AtomicU64>,
}

impl Emitter {
    pub fn new(
        sink: Arc<dyn ExchangeSink>,
        policy: RetryPolicy,
        store: Arc<dyn ExchangeStore>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            sink,
            policy,
            store,
            scheduler,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, ready: ExchangeReady) {
        let delivery = Delivery {
            sink: self.sink.clone(),
            policy: self.policy.clone(),
            store: self.store.clone(),
            scheduler: self.scheduler.clone(),
            epoch: self.epoch.clone(),
            started: self.epoch.load(Ordering::SeqCst),
        };

        self.scheduler.spawn(Box::pin(async move {
            delivery.run(ready).await;
        }));
    }

    /// Drop deliveries emitted before this call: no further attempts, and
    /// nothing is parked as undelivered.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

struct Delivery {
    sink: Arc<dyn ExchangeSink>,
    policy: RetryPolicy,
    store: Arc<dyn ExchangeStore>,
    scheduler: Arc<dyn Scheduler>,
    epoch: Arc<AtomicU64>,
    started: u64,
}

impl Delivery {
    fn is_stale(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) != self.started
    }

    async fn run(self, ready: ExchangeReady) {
        let Delivery {
            sink,
            policy,
            store,
            scheduler,
            ..
        } = &self;

        let mut attempt = 0;
        loop {
            if self.is_stale() {
                debug!(correlation_key = %ready.correlation_key, "Delivery dropped after reset");
                return;
            }
            match sink.deliver(&ready).await {
                Ok(()) => {
                    debug!(
                        correlation_key = %ready.correlation_key,
                        revision = ready.revision,
                        attempt = attempt + 1,
                        sink = sink.name(),
                        "Delivered exchange"
                    );
                    metrics::record_delivery("delivered");
                    return;
                }
                Err(e) => {
                    warn!(
                        correlation_key = %ready.correlation_key,
                        revision = ready.revision,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        sink = sink.name(),
                        "Delivery failed: {}",
                        e
                    );
                }
            }

            if attempt + 1 >= policy.max_attempts {
                break;
            }
            metrics::record_delivery("retry");
            scheduler.sleep(policy.delay_for(attempt)).await;
            attempt += 1;
        }

        if self.is_stale() {
            debug!(correlation_key = %ready.correlation_key, "Delivery dropped after reset");
            return;
        }
        metrics::record_delivery("undelivered");
        if let Err(e) = store.put_undelivered(&ready) {
            error!(
                correlation_key = %ready.correlation_key,
                "Failed to persist undelivered exchange: {:#}",
                e
            );
        }
    }
}
