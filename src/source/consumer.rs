use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::trace;
use tokio::sync::Notify;
use tokio::time::timeout;

use super::{MediaItem, Source};

#[derive(Debug)]
struct ConsumerState {
    queue: VecDeque<MediaItem>,
    mw_waiting: bool,
    mw_min_msgs: usize,
    should_update_source_id: bool,
    closed: bool,
}

/// The queue half of a consumer, shared between the owning session and
/// the source's fan-out list.
#[derive(Debug)]
pub struct ConsumerShared {
    state: Mutex<ConsumerState>,
    cond: Notify,
}

impl ConsumerShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ConsumerState {
                queue: VecDeque::new(),
                mw_waiting: false,
                mw_min_msgs: 0,
                should_update_source_id: false,
                closed: false,
            }),
            cond: Notify::new(),
        })
    }

    /// Push one item, waking the waiter only once the queue crosses its
    /// requested threshold.
    pub fn enqueue(&self, item: MediaItem) {
        let mut state = self.state.lock().unwrap();
        state.queue.push_back(item);
        if state.mw_waiting && state.queue.len() > state.mw_min_msgs {
            state.mw_waiting = false;
            drop(state);
            self.cond.notify_one();
        }
    }

    pub fn mark_source_id_changed(&self) {
        self.state.lock().unwrap().should_update_source_id = true;
    }

    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        // notify_one leaves a permit, so a waiter that has not yet parked
        // still observes the close.
        self.cond.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A per-subscriber FIFO with condition-variable backpressure.
///
/// Owned by the session that created it; dropping it unregisters from the
/// source and, for the last consumer of an unpublished source, starts the
/// reaping clock.
#[derive(Debug)]
pub struct Consumer {
    source: Arc<Source>,
    shared: Arc<ConsumerShared>,
    /// The source id observed at the last dequeue that crossed a
    /// publisher change.
    current_source_id: u64,
}

impl Consumer {
    pub(super) fn new(source: Arc<Source>) -> Self {
        Self {
            current_source_id: source.source_id(),
            source,
            shared: ConsumerShared::new(),
        }
    }

    pub fn source(&self) -> &Arc<Source> {
        &self.source
    }

    pub(super) fn shared(&self) -> &Arc<ConsumerShared> {
        &self.shared
    }

    /// The publisher context this consumer last synchronized with.
    pub fn source_id(&self) -> u64 {
        self.current_source_id
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().unwrap().closed
    }

    /// Pop the next item in enqueue order. A pending source-id change is
    /// applied to this consumer's context first.
    pub fn dump_packet(&mut self) -> Option<MediaItem> {
        let mut state = self.shared.state.lock().unwrap();
        if state.should_update_source_id {
            state.should_update_source_id = false;
            drop(state);
            self.current_source_id = self.source.source_id();
            trace!("consumer follows source id {}", self.current_source_id);
            state = self.shared.state.lock().unwrap();
        }
        state.queue.pop_front()
    }

    /// Block until more than `min_msgs` items are queued, the consumer is
    /// closed, or `wait_timeout` elapses. Returns false on timeout.
    ///
    /// Spurious wakeups re-check the predicate and go back to sleep.
    pub async fn wait(&self, min_msgs: usize, wait_timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + wait_timeout;
        loop {
            {
                let mut state = self.shared.state.lock().unwrap();
                if state.queue.len() > min_msgs || state.closed {
                    state.mw_waiting = false;
                    return true;
                }
                state.mw_waiting = true;
                state.mw_min_msgs = min_msgs;
            }

            let notified = self.shared.cond.notified();
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or(Duration::ZERO);
            if remaining.is_zero() || timeout(remaining, notified).await.is_err() {
                let mut state = self.shared.state.lock().unwrap();
                state.mw_waiting = false;
                return false;
            }
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.source.on_consumer_destroy(&self.shared);
        self.shared.close();
    }
}
