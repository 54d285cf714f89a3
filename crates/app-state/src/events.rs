//! Outbound store notifications and the subscriber registry.
//!
//! Observers register per [`EventKind`] (or for everything) and receive
//! `&StoreEvent` values whose payloads are already copies of store data.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ct_common::{Point, ViewState};
use parking_lot::Mutex;

/// Snapshot of every curve, keyed by name.
pub type CurveMap = BTreeMap<String, Vec<Point>>;

/// A change notification emitted by the store.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    CurvesChanged(Arc<CurveMap>),
    /// `curve_name` is `None` when every curve's selection was cleared at once.
    SelectionChanged {
        indices: BTreeSet<usize>,
        curve_name: Option<String>,
    },
    ActiveCurveChanged(Option<String>),
    FrameChanged(i32),
    ViewChanged(ViewState),
    CurveVisibilityChanged {
        curve_name: String,
        visible: bool,
    },
    ImageFilesChanged(usize),
    /// Catch-all, always delivered after the specific events.
    StateChanged,
}

/// Payload-free identity of a [`StoreEvent`], used for subscriptions and
/// batch deduplication.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    CurvesChanged,
    SelectionChanged,
    ActiveCurveChanged,
    FrameChanged,
    ViewChanged,
    CurveVisibilityChanged,
    ImageFilesChanged,
    StateChanged,
}

impl StoreEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CurvesChanged(_) => EventKind::CurvesChanged,
            Self::SelectionChanged { .. } => EventKind::SelectionChanged,
            Self::ActiveCurveChanged(_) => EventKind::ActiveCurveChanged,
            Self::FrameChanged(_) => EventKind::FrameChanged,
            Self::ViewChanged(_) => EventKind::ViewChanged,
            Self::CurveVisibilityChanged { .. } => EventKind::CurveVisibilityChanged,
            Self::ImageFilesChanged(_) => EventKind::ImageFilesChanged,
            Self::StateChanged => EventKind::StateChanged,
        }
    }
}

/// Callback invoked for matching events.
pub type EventHandler = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Typed observer interface for UI collaborators.
///
/// Every method defaults to a no-op; implement only what the consumer needs.
pub trait StoreObserver: Send + Sync {
    fn curves_changed(&self, _curves: &CurveMap) {}
    fn selection_changed(&self, _indices: &BTreeSet<usize>, _curve_name: Option<&str>) {}
    fn active_curve_changed(&self, _name: Option<&str>) {}
    fn frame_changed(&self, _frame: i32) {}
    fn view_changed(&self, _view: &ViewState) {}
    fn curve_visibility_changed(&self, _curve_name: &str, _visible: bool) {}
    fn image_files_changed(&self, _count: usize) {}
    fn state_changed(&self) {}
}

/// Route an event to the matching [`StoreObserver`] method.
pub fn deliver(observer: &dyn StoreObserver, event: &StoreEvent) {
    match event {
        StoreEvent::CurvesChanged(curves) => observer.curves_changed(curves),
        StoreEvent::SelectionChanged {
            indices,
            curve_name,
        } => observer.selection_changed(indices, curve_name.as_deref()),
        StoreEvent::ActiveCurveChanged(name) => observer.active_curve_changed(name.as_deref()),
        StoreEvent::FrameChanged(frame) => observer.frame_changed(*frame),
        StoreEvent::ViewChanged(view) => observer.view_changed(view),
        StoreEvent::CurveVisibilityChanged {
            curve_name,
            visible,
        } => observer.curve_visibility_changed(curve_name, *visible),
        StoreEvent::ImageFilesChanged(count) => observer.image_files_changed(*count),
        StoreEvent::StateChanged => observer.state_changed(),
    }
}

struct Registration {
    id: SubscriptionId,
    /// `None` matches every kind.
    kind: Option<EventKind>,
    handler: EventHandler,
}

/// Subscriber registry with synchronous dispatch.
///
/// The registry lock is released before any handler runs, so handlers may
/// subscribe, unsubscribe, or re-enter the store.
pub struct EventBus {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            registrations: Mutex::new(Vec::new()),
        }
    }

    fn register(&self, kind: Option<EventKind>, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.lock().push(Registration { id, kind, handler });
        tracing::debug!(?id, ?kind, "Subscriber registered");
        id
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(handler))
    }

    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    pub fn subscribe_observer(&self, observer: Arc<dyn StoreObserver>) -> SubscriptionId {
        self.register(
            None,
            Arc::new(move |event: &StoreEvent| deliver(observer.as_ref(), event)),
        )
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registrations = self.registrations.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Deliver `event` to every matching handler, in registration order.
    pub fn dispatch(&self, event: &StoreEvent) {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .registrations
            .lock()
            .iter()
            .filter(|r| r.kind.map_or(true, |k| k == kind))
            .map(|r| Arc::clone(&r.handler))
            .collect();

        for handler in handlers {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &EventBus, kind: Option<EventKind>) -> Arc<Mutex<Vec<EventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = move |e: &StoreEvent| sink.lock().push(e.kind());
        match kind {
            Some(kind) => bus.subscribe(kind, handler),
            None => bus.subscribe_all(handler),
        };
        seen
    }

    #[test]
    fn kind_filter_applies() {
        let bus = EventBus::new();
        let frames = recorder(&bus, Some(EventKind::FrameChanged));
        let all = recorder(&bus, None);

        bus.dispatch(&StoreEvent::FrameChanged(3));
        bus.dispatch(&StoreEvent::StateChanged);

        assert_eq!(*frames.lock(), vec![EventKind::FrameChanged]);
        assert_eq!(
            *all.lock(),
            vec![EventKind::FrameChanged, EventKind::StateChanged]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe_all(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.dispatch(&StoreEvent::StateChanged);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.dispatch(&StoreEvent::StateChanged);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn handler_may_subscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(EventKind::StateChanged, move |_| {
            inner.subscribe_all(|_| {});
        });

        bus.dispatch(&StoreEvent::StateChanged);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[derive(Default)]
    struct FrameWatcher {
        frames: Mutex<Vec<i32>>,
    }

    impl StoreObserver for FrameWatcher {
        fn frame_changed(&self, frame: i32) {
            self.frames.lock().push(frame);
        }
    }

    #[test]
    fn observer_receives_typed_callbacks() {
        let bus = EventBus::new();
        let watcher = Arc::new(FrameWatcher::default());
        bus.subscribe_observer(watcher.clone());

        bus.dispatch(&StoreEvent::FrameChanged(12));
        bus.dispatch(&StoreEvent::ViewChanged(ViewState::default()));

        assert_eq!(*watcher.frames.lock(), vec![12]);
    }
}
