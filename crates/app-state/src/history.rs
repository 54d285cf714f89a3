//! Snapshot-based undo/redo history with a cursor.
//!
//! Entries form one linear sequence; the cursor marks the current state and
//! everything after it is the redo branch.
//!
//! - Adding a snapshot identical to the current one is ignored.
//! - Adding after an undo discards the redo branch for good.
//! - The sequence is bounded; the oldest entry is evicted first and the
//!   cursor moves with it so relative undo/redo positions are preserved.
//! - Snapshots are stored compressed and decoded on `undo`/`redo`.
//!
//! # Usage
//!
//! ```ignore
//! let mut history = HistoryManager::new(&HistoryConfig::default());
//!
//! history.record(&store, Some("track_1"), "Nudge points")?;
//! // ... mutate the store ...
//! history.record(&store, Some("track_1"), "Nudge points")?;
//!
//! history.undo_into(&store, Some("track_1"))?;
//! ```

use std::collections::VecDeque;
use std::time::Instant;

use ct_common::{HistoryConfig, Point};

use crate::compression::{CompressedSnapshot, SnapshotCodec};
use crate::error::{HistoryResult, StoreResult};
use crate::store::CurveStore;

/// A single entry in the history sequence.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    /// Human-readable label (e.g. "Move point", "Delete curve").
    pub description: String,
    snapshot: CompressedSnapshot,
    /// When this entry was created.
    pub timestamp: Instant,
}

impl HistoryEntry {
    pub fn point_count(&self) -> usize {
        self.snapshot.point_count()
    }
}

/// Diagnostics for the history stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryStats {
    pub entry_count: usize,
    /// `None` when the history is empty.
    pub cursor: Option<usize>,
    pub max_size: usize,
    /// Estimated bytes held by entries (compressed payloads plus labels).
    pub memory_bytes: usize,
    /// What the same entries would take uncompressed.
    pub uncompressed_bytes: usize,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Bounded, compressed undo/redo stack of curve snapshots.
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    cursor: Option<usize>,
    max_size: usize,
    codec: SnapshotCodec,
}

impl HistoryManager {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            max_size: config.max_size.max(1),
            codec: SnapshotCodec::new(config),
        }
    }

    /// Push a snapshot of `points` as the new current state.
    ///
    /// Returns `Ok(false)` when the snapshot equals the current entry.
    pub fn add_to_history(&mut self, points: &[Point], description: &str) -> HistoryResult<bool> {
        let snapshot = self.codec.encode(points)?;

        if self.current_entry().is_some_and(|e| e.snapshot == snapshot) {
            tracing::debug!(description, "History add skipped: identical to current state");
            return Ok(false);
        }

        if let Some(cursor) = self.cursor {
            let discarded = self.entries.len() - (cursor + 1);
            if discarded > 0 {
                tracing::debug!(discarded, "Discarding redo branch");
            }
            self.entries.truncate(cursor + 1);
        }

        self.entries.push_back(HistoryEntry {
            description: description.to_string(),
            snapshot,
            timestamp: Instant::now(),
        });
        self.cursor = Some(self.entries.len() - 1);
        self.evict_overflow();

        tracing::debug!(
            description,
            points = points.len(),
            depth = self.entries.len(),
            "History entry added"
        );
        Ok(true)
    }

    /// Step back. Returns the snapshot now current, or `None` at the start.
    pub fn undo(&mut self) -> HistoryResult<Option<Vec<Point>>> {
        let Some(cursor) = self.cursor.filter(|&c| c > 0) else {
            return Ok(None);
        };
        let points = self.codec.decode(&self.entries[cursor - 1].snapshot)?;
        self.cursor = Some(cursor - 1);
        tracing::debug!(
            undone = %self.entries[cursor].description,
            cursor = cursor - 1,
            "Undo"
        );
        Ok(Some(points))
    }

    /// Step forward. Returns the snapshot now current, or `None` at the end.
    pub fn redo(&mut self) -> HistoryResult<Option<Vec<Point>>> {
        let Some(cursor) = self.cursor.filter(|&c| c + 1 < self.entries.len()) else {
            return Ok(None);
        };
        let points = self.codec.decode(&self.entries[cursor + 1].snapshot)?;
        self.cursor = Some(cursor + 1);
        tracing::debug!(
            redone = %self.entries[cursor + 1].description,
            cursor = cursor + 1,
            "Redo"
        );
        Ok(Some(points))
    }

    /// Decode the snapshot at the cursor.
    pub fn get_current_state(&self) -> HistoryResult<Option<Vec<Point>>> {
        self.current_entry()
            .map(|entry| self.codec.decode(&entry.snapshot))
            .transpose()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    pub fn clear_history(&mut self) {
        self.entries.clear();
        self.cursor = None;
        tracing::debug!("History cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Change the bound, evicting the oldest entries if needed.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
        self.evict_overflow();
    }

    /// Label of the entry that `undo` would leave.
    pub fn undo_description(&self) -> Option<&str> {
        self.can_undo()
            .then(|| self.current_entry().map(|e| e.description.as_str()))
            .flatten()
    }

    /// Label of the entry that `redo` would restore.
    pub fn redo_description(&self) -> Option<&str> {
        let next = self.cursor.filter(|_| self.can_redo())? + 1;
        self.entries.get(next).map(|e| e.description.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn stats(&self) -> HistoryStats {
        let memory_bytes = self
            .entries
            .iter()
            .map(|e| {
                std::mem::size_of::<HistoryEntry>() + e.snapshot.stored_len() + e.description.len()
            })
            .sum();
        let uncompressed_bytes = self.entries.iter().map(|e| e.snapshot.raw_len()).sum();
        HistoryStats {
            entry_count: self.entries.len(),
            cursor: self.cursor,
            max_size: self.max_size,
            memory_bytes,
            uncompressed_bytes,
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    fn current_entry(&self) -> Option<&HistoryEntry> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
            self.cursor = match self.cursor {
                Some(c) if c > 0 => Some(c - 1),
                _ if self.entries.is_empty() => None,
                _ => Some(0),
            };
        }
    }
}

/// Bridge between the history stack and a [`CurveStore`].
impl HistoryManager {
    /// Snapshot the store's copy of `curve` (active curve when `None`).
    pub fn record(
        &mut self,
        store: &CurveStore,
        curve: Option<&str>,
        description: &str,
    ) -> StoreResult<bool> {
        let points = store.get_curve_data(curve)?;
        Ok(self.add_to_history(&points, description)?)
    }

    /// Undo and write the restored snapshot back into the store.
    /// Returns false at the start of history.
    pub fn undo_into(&mut self, store: &CurveStore, curve: Option<&str>) -> StoreResult<bool> {
        let name = store.resolve_curve_name(curve)?;
        match self.undo()? {
            Some(points) => {
                store.set_curve_data(&name, &points, None)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Redo and write the restored snapshot back into the store.
    /// Returns false at the end of history.
    pub fn redo_into(&mut self, store: &CurveStore, curve: Option<&str>) -> StoreResult<bool> {
        let name = store.resolve_curve_name(curve)?;
        match self.redo()? {
            Some(points) => {
                store.set_curve_data(&name, &points, None)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
