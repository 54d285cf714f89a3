//! `ct-app-state` -- Reactive state store for the curve-tracking editor.
//!
//! This crate provides:
//!
//! - **`CurveStore`**: single source of truth for curves, selection, active curve, frame and view.
//! - **`ChangeNotifier`**: immediate or batched, per-kind deduplicated change notifications.
//! - **`HistoryManager`**: bounded, compressed snapshot undo/redo with branch discard.
//! - **`SpatialIndex`**: grid-bucketed nearest-point and rectangle queries in screen space.
//! - **`StoreMailbox`**: the only way for worker threads to request store mutations.
//!
//! # Architecture
//!
//! ```text
//! CurveStore (owner thread only)
//! ├── curves: name -> Vec<Point>      (frame ordered)
//! ├── metadata / selection            (per curve)
//! ├── active curve, frame, view, image files
//! ├── ChangeNotifier                  (batch queue + EventBus)
//! └── SpatialIndex                    (rebuilt lazily per revision/view)
//!
//! HistoryManager                      (owned by the caller)
//! └── entries: VecDeque<HistoryEntry> (compressed snapshots + cursor)
//!
//! worker threads --StoreCommand--> StoreMailbox --apply_pending--> CurveStore
//! ```

pub mod compression;
pub mod error;
pub mod events;
pub mod history;
pub mod mailbox;
pub mod notifier;
pub mod selection;
pub mod snapshot;
pub mod spatial;
pub mod store;
pub mod thread_guard;

// Re-export primary types at crate root for convenience.
pub use compression::{CompressedSnapshot, SnapshotCodec, SnapshotEncoding};
pub use error::{HistoryError, HistoryResult, StoreError, StoreResult};
pub use events::{CurveMap, EventBus, EventKind, StoreEvent, StoreObserver, SubscriptionId};
pub use history::{HistoryEntry, HistoryManager, HistoryStats};
pub use mailbox::{MailboxSender, StoreCommand, StoreMailbox};
pub use notifier::ChangeNotifier;
pub use selection::SelectionState;
pub use snapshot::{StateSnapshot, StateSummary};
pub use spatial::{ScreenRect, SpatialIndex, SpatialStats};
pub use store::{BatchGuard, CurveStore};
pub use thread_guard::OwnerThread;
