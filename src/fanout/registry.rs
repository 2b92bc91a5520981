// =============================================================================
// Subscription Registry — ticker symbol → group of delivery sinks
// =============================================================================
//
// The registry exclusively owns the group → sinks mapping. Sinks never touch
// their own entry; a connection holds a `Subscription` guard that carries a
// weak reference back to the registry and removes the entry on drop.
//
// Thread safety:
//   - parking_lot::RwLock over the whole mapping.
//   - publish takes a snapshot of the group under the read lock and pushes
//     outside it; pushes never block, so no lock is held while a client is
//     slow.
// =============================================================================

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::fanout::sink::{PushOutcome, SinkHandle, SinkId};
use crate::types::{normalize_symbol, TickPayload};

/// Message type tag on every outbound frame.
pub const UPDATE_TYPE: &str = "ticker.update";

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: &'a TickPayload,
}

/// Serialize `payload` into the wire envelope
/// `{"type": "ticker.update", "payload": ...}`.
pub fn encode_update(payload: &TickPayload) -> serde_json::Result<Arc<str>> {
    let json = serde_json::to_string(&Envelope {
        kind: UPDATE_TYPE,
        payload,
    })?;
    Ok(Arc::from(json))
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    groups: RwLock<HashMap<String, HashMap<SinkId, SinkHandle>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `sink` to the group for `symbol`, creating the group if needed.
    ///
    /// A sink belongs to at most one group: subscribing it elsewhere moves it,
    /// and re-subscribing to the same group replaces the previous entry.
    /// Returns the normalized group key.
    pub fn subscribe(&self, symbol: &str, sink: SinkHandle) -> String {
        let key = normalize_symbol(symbol);
        let id = sink.id();
        let mut groups = self.groups.write();
        groups.retain(|other, members| {
            if *other != key && members.remove(&id).is_some() {
                debug!(from = %other, to = %key, sink = %id, "sink moved between groups");
            }
            !members.is_empty() || *other == key
        });
        let group = groups.entry(key.clone()).or_default();
        group.insert(id, sink);
        debug!(symbol = %key, members = group.len(), "sink subscribed");
        key
    }

    /// Remove a sink from its group. Unknown symbols or sinks are a no-op;
    /// empty groups are dropped. Returns whether anything was removed.
    pub fn unsubscribe(&self, symbol: &str, sink_id: SinkId) -> bool {
        let key = normalize_symbol(symbol);
        let mut groups = self.groups.write();
        let Some(group) = groups.get_mut(&key) else {
            return false;
        };
        let removed = group.remove(&sink_id).is_some();
        if group.is_empty() {
            groups.remove(&key);
        }
        if removed {
            debug!(symbol = %key, sink = %sink_id, "sink unsubscribed");
        }
        removed
    }

    /// Subscribe `sink` and hand back a guard that unsubscribes on drop.
    pub fn attach(self: &Arc<Self>, symbol: &str, sink: SinkHandle) -> Subscription {
        let key = self.subscribe(symbol, sink.clone());
        Subscription {
            registry: Arc::downgrade(self),
            symbol: key,
            sink,
        }
    }

    /// Deliver `payload` to every sink currently in the group for `symbol`.
    ///
    /// Returns the number of sinks the payload was queued for. A symbol with
    /// no subscribers is a silent no-op.
    pub fn publish(&self, symbol: &str, payload: &TickPayload) -> usize {
        let key = normalize_symbol(symbol);
        let members = self.members(&key);
        if members.is_empty() {
            return 0;
        }

        let frame = match encode_update(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(symbol = %key, error = %e, "failed to serialise tick payload");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for sink in &members {
            match sink.push(frame.clone()) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::DroppedOldest => {
                    delivered += 1;
                    debug!(symbol = %key, sink = %sink.id(), dropped = sink.dropped(), "sink lagging — oldest frame dropped");
                }
                PushOutcome::Disconnected => {
                    warn!(symbol = %key, sink = %sink.id(), "sink queue overflowed — disconnecting");
                    evicted.push(sink.id());
                }
                PushOutcome::Closed => evicted.push(sink.id()),
            }
        }

        for id in evicted {
            self.unsubscribe(&key, id);
        }
        delivered
    }

    /// Snapshot of the sinks in a group.
    pub fn members(&self, symbol: &str) -> Vec<SinkHandle> {
        let key = normalize_symbol(symbol);
        self.groups
            .read()
            .get(&key)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, symbol: &str) -> usize {
        let key = normalize_symbol(symbol);
        self.groups.read().get(&key).map_or(0, HashMap::len)
    }

    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }

    pub fn total_subscribers(&self) -> usize {
        self.groups.read().values().map(HashMap::len).sum()
    }
}

// =============================================================================
// Subscription guard
// =============================================================================

/// Membership of one sink in one ticker group, for the lifetime of a
/// connection.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<SubscriptionRegistry>,
    symbol: String,
    sink: SinkHandle,
}

impl Subscription {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn sink(&self) -> &SinkHandle {
        &self.sink
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.sink.close();
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(&self.symbol, self.sink.id());
            info!(
                symbol = %self.symbol,
                remaining = registry.subscriber_count(&self.symbol),
                "subscription released"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
