use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::fanout::registry::SubscriptionRegistry;
use crate::types::TickPayload;

/// Single choke point between tick sources and the subscription registry.
///
/// Any number of sources may call [`Dispatcher::dispatch`] concurrently for
/// the same or different symbols.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    published: AtomicU64,
    delivered: AtomicU64,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Publish `payload` to the group for `symbol`; returns the number of
    /// sinks it was queued for.
    pub fn dispatch(&self, symbol: &str, payload: &TickPayload) -> usize {
        let delivered = self.registry.publish(symbol, payload);
        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        debug!(symbol = %symbol, delivered, "tick dispatched");
        delivered
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Payloads dispatched since start.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Sink deliveries since start.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}
