// =============================================================================
// Delivery Sink — bounded per-connection outbound queue
// =============================================================================
//
// Each connected client owns one queue. Publishers push pre-serialized frames
// without ever blocking; the connection task drains the queue onto the wire.
// When the queue is full the overflow policy decides between evicting the
// oldest frame and disconnecting the client, so one slow reader can never
// stall delivery to the rest of its group.
// =============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

/// Identity of a sink inside the registry.
pub type SinkId = Uuid;

/// What to do when a sink's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Close the sink; the registry removes it.
    Disconnect,
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DropOldest => write!(f, "drop_oldest"),
            Self::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Result of pushing one frame into a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest frame.
    DroppedOldest,
    /// The queue overflowed under [`OverflowPolicy::Disconnect`]; the sink is
    /// now closed.
    Disconnected,
    /// The sink was already closed.
    Closed,
}

impl PushOutcome {
    pub fn delivered(self) -> bool {
        matches!(self, Self::Queued | Self::DroppedOldest)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<Arc<str>>,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
struct SinkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

/// Cheap, cloneable handle to one delivery sink.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    id: SinkId,
    queue: Arc<SinkQueue>,
}

impl PartialEq for SinkHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl SinkHandle {
    /// Create a sink holding at most `capacity` undelivered frames (minimum 1).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            id: Uuid::new_v4(),
            queue: Arc::new(SinkQueue {
                state: Mutex::new(QueueState {
                    frames: VecDeque::with_capacity(capacity),
                    ..QueueState::default()
                }),
                notify: Notify::new(),
                capacity,
                policy,
            }),
        }
    }

    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Enqueue a frame without blocking.
    pub fn push(&self, frame: Arc<str>) -> PushOutcome {
        let outcome = {
            let mut state = self.queue.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            let mut outcome = PushOutcome::Queued;
            if state.frames.len() >= self.queue.capacity {
                match self.queue.policy {
                    OverflowPolicy::DropOldest => {
                        state.frames.pop_front();
                        state.dropped += 1;
                        outcome = PushOutcome::DroppedOldest;
                    }
                    OverflowPolicy::Disconnect => {
                        state.closed = true;
                        state.frames.clear();
                        outcome = PushOutcome::Disconnected;
                    }
                }
            }
            if outcome.delivered() {
                state.frames.push_back(frame);
            }
            outcome
        };

        self.queue.notify.notify_one();
        outcome
    }

    /// Pop the next frame if one is waiting.
    #[cfg(test)]
    pub fn try_recv(&self) -> Option<Arc<str>> {
        self.queue.state.lock().frames.pop_front()
    }

    /// Wait for the next frame. Returns `None` once the sink is closed and
    /// drained.
    ///
    /// Cancel-safe: a frame is only removed from the queue when it is
    /// returned.
    pub async fn recv(&self) -> Option<Arc<str>> {
        loop {
            {
                let mut state = self.queue.state.lock();
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            self.queue.notify.notified().await;
        }
    }

    /// Close the sink and wake a pending `recv`.
    pub fn close(&self) {
        self.queue.state.lock().closed = true;
        self.queue.notify.notify_one();
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.queue.state.lock().closed
    }

    /// Frames evicted by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.queue.state.lock().dropped
    }

    /// Frames waiting to be sent.
    pub fn queued(&self) -> usize {
        self.queue.state.lock().frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn frames_come_out_in_push_order() {
        let sink = SinkHandle::new(8, OverflowPolicy::DropOldest);
        for i in 0..5 {
            assert_eq!(sink.push(frame(&i.to_string())), PushOutcome::Queued);
        }
        let drained: Vec<String> = std::iter::from_fn(|| sink.try_recv())
            .map(|f| f.to_string())
            .collect();
        assert_eq!(drained, ["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn drop_oldest_keeps_newest_frames() {
        let sink = SinkHandle::new(2, OverflowPolicy::DropOldest);
        sink.push(frame("a"));
        sink.push(frame("b"));
        assert_eq!(sink.push(frame("c")), PushOutcome::DroppedOldest);

        assert_eq!(sink.dropped(), 1);
        assert_eq!(sink.try_recv().as_deref(), Some("b"));
        assert_eq!(sink.try_recv().as_deref(), Some("c"));
    }

    #[test]
    fn disconnect_policy_closes_on_overflow() {
        let sink = SinkHandle::new(1, OverflowPolicy::Disconnect);
        assert_eq!(sink.push(frame("a")), PushOutcome::Queued);
        assert_eq!(sink.push(frame("b")), PushOutcome::Disconnected);
        assert!(sink.is_closed());
        assert_eq!(sink.queued(), 0);
        assert_eq!(sink.push(frame("c")), PushOutcome::Closed);
    }

    #[tokio::test]
    async fn recv_wakes_on_push_from_another_task() {
        let sink = SinkHandle::new(4, OverflowPolicy::DropOldest);
        let producer = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.push(Arc::from("late"));
        });
        let got = tokio::time::timeout(Duration::from_secs(1), sink.recv())
            .await
            .expect("recv should wake");
        assert_eq!(got.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn close_unblocks_pending_recv() {
        let sink = SinkHandle::new(4, OverflowPolicy::DropOldest);
        let closer = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close();
        });
        let got = tokio::time::timeout(Duration::from_secs(1), sink.recv())
            .await
            .expect("close should unblock recv");
        assert!(got.is_none());
    }
}
