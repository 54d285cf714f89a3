//! Batched, deduplicated change notification.
//!
//! Two states: immediate (default) and batched. In immediate mode every
//! published event is dispatched synchronously, followed by `StateChanged`.
//! Inside a batch, events are queued; `end_batch` delivers one event per
//! [`EventKind`] (first-seen order, last payload) and then a single
//! `StateChanged`.
//!
//! The mutex guards only the batch flag and the pending queue. It is never
//! held while a handler runs, so a handler that re-enters the store cannot
//! deadlock against its own thread.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::{EventBus, EventKind, StoreEvent, StoreObserver, SubscriptionId};

#[derive(Default)]
struct BatchQueue {
    active: bool,
    pending: Vec<StoreEvent>,
}

/// Change notifier sitting between the store and its subscribers.
#[derive(Default)]
pub struct ChangeNotifier {
    batch: Mutex<BatchQueue>,
    bus: EventBus,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter batch mode. Returns false (and logs) if a batch is already open;
    /// batches do not nest.
    pub fn begin_batch(&self) -> bool {
        let mut batch = self.batch.lock();
        if batch.active {
            tracing::warn!("begin_batch called while already batching, ignoring");
            return false;
        }
        batch.active = true;
        tracing::debug!("Batch started");
        true
    }

    /// Leave batch mode and flush the coalesced queue.
    ///
    /// Returns the number of events delivered (including the trailing
    /// `StateChanged`), or 0 when no batch was open.
    pub fn end_batch(&self) -> usize {
        self.end_batch_with(|_| {})
    }

    /// Like [`end_batch`](Self::end_batch), but lets the caller complete the
    /// coalesced events before they are delivered. `finalize` runs after the
    /// batch lock is released and is skipped when no batch was open.
    pub fn end_batch_with(&self, finalize: impl FnOnce(&mut [StoreEvent])) -> usize {
        let pending = {
            let mut batch = self.batch.lock();
            if !batch.active {
                tracing::warn!("end_batch called outside a batch, ignoring");
                return 0;
            }
            batch.active = false;
            std::mem::take(&mut batch.pending)
        };

        let queued = pending.len();
        let mut events = coalesce(pending);
        finalize(&mut events);
        tracing::debug!(queued, delivered = events.len(), "Batch ended, flushing");

        for event in &events {
            self.bus.dispatch(event);
        }
        self.bus.dispatch(&StoreEvent::StateChanged);
        events.len() + 1
    }

    pub fn is_batching(&self) -> bool {
        self.batch.lock().active
    }

    /// Number of events waiting for `end_batch`.
    pub fn pending_count(&self) -> usize {
        self.batch.lock().pending.len()
    }

    /// Queue `event` if batching, otherwise deliver it now followed by
    /// `StateChanged`.
    pub fn publish(&self, event: StoreEvent) {
        {
            let mut batch = self.batch.lock();
            if batch.active {
                if event.kind() != EventKind::StateChanged {
                    batch.pending.push(event);
                }
                return;
            }
        }

        if event.kind() != EventKind::StateChanged {
            self.bus.dispatch(&event);
        }
        self.bus.dispatch(&StoreEvent::StateChanged);
    }

    /// Publish the events of one mutation. Outside a batch they are delivered
    /// in order followed by a single `StateChanged`; an empty list emits
    /// nothing.
    pub fn publish_all(&self, events: Vec<StoreEvent>) {
        let events: Vec<StoreEvent> = events
            .into_iter()
            .filter(|e| e.kind() != EventKind::StateChanged)
            .collect();
        if events.is_empty() {
            return;
        }
        {
            let mut batch = self.batch.lock();
            if batch.active {
                batch.pending.extend(events);
                return;
            }
        }

        for event in &events {
            self.bus.dispatch(event);
        }
        self.bus.dispatch(&StoreEvent::StateChanged);
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe_all(handler)
    }

    pub fn subscribe_observer(&self, observer: Arc<dyn StoreObserver>) -> SubscriptionId {
        self.bus.subscribe_observer(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Drop queued events and leave batch mode without emitting anything.
    pub(crate) fn discard_batch(&self) {
        let mut batch = self.batch.lock();
        batch.active = false;
        batch.pending.clear();
    }
}

/// Keep one event per kind: the position of its first occurrence, the
/// payload of its last.
fn coalesce(pending: Vec<StoreEvent>) -> Vec<StoreEvent> {
    let mut coalesced: Vec<StoreEvent> = Vec::with_capacity(pending.len());
    for event in pending {
        match coalesced.iter_mut().find(|e| e.kind() == event.kind()) {
            Some(slot) => *slot = event,
            None => coalesced.push(event),
        }
    }
    coalesced
}
