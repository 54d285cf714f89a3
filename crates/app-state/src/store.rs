//! The curve store: single source of truth for curve data, selection, view
//! and frame.
//!
//! Every public method first checks that it runs on the owner thread, then
//! takes the data lock, mutates or copies, releases the lock, and only then
//! publishes notifications. Handlers are therefore free to call back into the
//! store. Nothing returned by a getter aliases stored data.
//!
//! Failure policy:
//! - caller misuse (`NoActiveCurve`) and thread violations return `Err`;
//! - bulk inputs (`set_curve_data`, `set_image_files`, `restore_snapshot`)
//!   are validated up front and rejected with `Err(Validation)` before
//!   anything changes;
//! - interactive edits on a stale index, an unknown curve or a frame that
//!   would break frame order log a warning and report the failure in `Ok`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ct_common::{
    first_unordered, CurveMetadata, Point, PointStatus, StoreConfig, ValidationError, ViewState,
};
use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::events::{CurveMap, EventKind, StoreEvent, StoreObserver, SubscriptionId};
use crate::notifier::ChangeNotifier;
use crate::selection::{clamped_range, SelectionState};
use crate::snapshot::{StateSnapshot, StateSummary};
use crate::spatial::{ScreenRect, SpatialIndex, SpatialStats};
use crate::thread_guard::OwnerThread;

/// Reject an image-file list that is too long or has blank entries.
pub(crate) fn validate_image_files(
    files: &[String],
    max: usize,
) -> Result<(), ValidationError> {
    if files.len() > max {
        return Err(ValidationError::TooManyImageFiles {
            count: files.len(),
            max,
        });
    }
    if let Some(index) = files.iter().position(|f| f.trim().is_empty()) {
        return Err(ValidationError::EmptyImageFile { index });
    }
    Ok(())
}

/// Reject points whose frames are not strictly ascending.
pub(crate) fn validate_frame_order(curve: &str, points: &[Point]) -> Result<(), ValidationError> {
    match first_unordered(points) {
        Some(index) => Err(ValidationError::UnorderedFrames {
            curve: curve.to_string(),
            index,
            frame: points[index].frame,
        }),
        None => Ok(()),
    }
}

struct StoreData {
    curves: CurveMap,
    metadata: BTreeMap<String, CurveMetadata>,
    selection: SelectionState,
    active_curve: Option<String>,
    current_frame: i32,
    view: ViewState,
    image_files: Vec<String>,
    /// Bumped on every curve-data change; keys the spatial index.
    revision: u64,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            curves: CurveMap::new(),
            metadata: BTreeMap::new(),
            selection: SelectionState::new(),
            active_curve: None,
            current_frame: 1,
            view: ViewState::default(),
            image_files: Vec::new(),
            revision: 0,
        }
    }
}

impl StoreData {
    fn resolve(&self, name: Option<&str>) -> StoreResult<String> {
        match name {
            Some(name) => Ok(name.to_string()),
            None => self.active_curve.clone().ok_or_else(|| {
                tracing::warn!("No curve name given and no active curve set");
                StoreError::NoActiveCurve
            }),
        }
    }

    fn len_of(&self, curve: &str) -> usize {
        self.curves.get(curve).map_or(0, Vec::len)
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// `CurvesChanged` with an empty payload, filled in by
    /// [`fill_curve_payloads`](Self::fill_curve_payloads) right before
    /// delivery. A batch copies the curves once, at flush.
    fn curves_changed() -> StoreEvent {
        StoreEvent::CurvesChanged(Arc::default())
    }

    fn fill_curve_payloads(&self, events: &mut [StoreEvent]) {
        let mut payload: Option<Arc<CurveMap>> = None;
        for event in events {
            if let StoreEvent::CurvesChanged(map) = event {
                let current = payload.get_or_insert_with(|| Arc::new(self.curves.clone()));
                *map = Arc::clone(current);
            }
        }
    }

    fn selection_changed(&self, curve: &str) -> StoreEvent {
        StoreEvent::SelectionChanged {
            indices: self.selection.get(curve),
            curve_name: Some(curve.to_string()),
        }
    }

    fn ensure_index(&self, index: &mut SpatialIndex, curve: &str) {
        if !index.is_valid_for(curve, self.revision, &self.view) {
            let points = self.curves.get(curve).map_or(&[][..], Vec::as_slice);
            index.rebuild(curve, self.revision, points, &self.view);
        }
    }

    /// Replace the selection after dropping out-of-range indices.
    fn replace_selection(
        &mut self,
        curve: &str,
        indices: BTreeSet<usize>,
        events: &mut Vec<StoreEvent>,
    ) -> bool {
        let len = self.len_of(curve);
        let requested = indices.len();
        let valid: BTreeSet<usize> = indices.into_iter().filter(|&i| i < len).collect();
        if valid.len() != requested {
            tracing::warn!(
                curve,
                dropped = requested - valid.len(),
                len,
                "Dropping out-of-range selection indices"
            );
        }
        if !self.selection.set(curve, valid) {
            return false;
        }
        events.push(self.selection_changed(curve));
        true
    }
}

/// Reactive store for tracking curves.
///
/// Bound to the thread that constructs it. The type is `Sync` so it can be
/// shared through an `Arc`, but every call from another thread is rejected
/// with [`StoreError::WrongThread`]. Workers hand data over through a
/// [`StoreMailbox`](crate::StoreMailbox) instead.
pub struct CurveStore {
    owner: OwnerThread,
    config: StoreConfig,
    data: Mutex<StoreData>,
    notifier: ChangeNotifier,
    spatial: Mutex<SpatialIndex>,
}

impl Default for CurveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CurveStore {
    /// Store with default configuration, owned by the calling thread.
    pub fn new() -> Self {
        Self::build(StoreConfig::default())
    }

    /// Store with a custom configuration, owned by the calling thread.
    pub fn with_config(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: StoreConfig) -> Self {
        let spatial = SpatialIndex::new(config.spatial.clone());
        let owner = OwnerThread::current();
        tracing::debug!(owner = ?owner.id(), "Curve store created");
        Self {
            owner,
            config,
            data: Mutex::new(StoreData::default()),
            notifier: ChangeNotifier::new(),
            spatial: Mutex::new(spatial),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn owner(&self) -> OwnerThread {
        self.owner
    }

    fn read<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&StoreData) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.owner.check(operation)?;
        let data = self.data.lock();
        f(&data)
    }

    /// Run `f` under the data lock, then publish whatever it queued.
    fn mutate<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut StoreData, &mut Vec<StoreEvent>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.owner.check(operation)?;
        let mut events = Vec::new();
        let result = {
            let mut data = self.data.lock();
            let result = f(&mut data, &mut events);
            if !self.notifier.is_batching() {
                data.fill_curve_payloads(&mut events);
            }
            result
        };
        self.notifier.publish_all(events);
        result
    }

    /// Close the open batch, filling curve payloads from the final state.
    fn finish_batch(&self) -> usize {
        self.notifier
            .end_batch_with(|events| self.data.lock().fill_curve_payloads(events))
    }

    // --- Curve data ---

    /// Name `name` resolves to: itself, or the active curve when `None`.
    pub fn resolve_curve_name(&self, name: Option<&str>) -> StoreResult<String> {
        self.read("resolve_curve_name", |data| data.resolve(name))
    }

    /// Copy of a curve's points. `None` means the active curve; with no
    /// active curve this is [`StoreError::NoActiveCurve`]. Unknown names
    /// yield an empty list.
    pub fn get_curve_data(&self, name: Option<&str>) -> StoreResult<Vec<Point>> {
        self.read("get_curve_data", |data| {
            let name = data.resolve(name)?;
            Ok(data.curves.get(&name).cloned().unwrap_or_default())
        })
    }

    /// Replace a curve wholesale, creating it if needed.
    ///
    /// `points` must have strictly ascending frames, otherwise nothing
    /// changes and the call fails with [`ValidationError::UnorderedFrames`].
    /// Selection indices past the new length are pruned. Metadata is only
    /// replaced when given; a new curve starts visible.
    pub fn set_curve_data(
        &self,
        name: &str,
        points: &[Point],
        metadata: Option<CurveMetadata>,
    ) -> StoreResult<()> {
        self.owner.check("set_curve_data")?;
        validate_frame_order(name, points)?;
        self.mutate("set_curve_data", |data, events| {
            data.curves.insert(name.to_string(), points.to_vec());
            data.touch();
            events.push(StoreData::curves_changed());

            let previous = data.metadata.get(name).map(|m| m.visible);
            let meta = data.metadata.entry(name.to_string()).or_default();
            if let Some(metadata) = metadata {
                *meta = metadata;
            }
            if previous.is_some_and(|visible| visible != meta.visible) {
                events.push(StoreEvent::CurveVisibilityChanged {
                    curve_name: name.to_string(),
                    visible: meta.visible,
                });
            }

            if data.selection.prune(name, points.len()) {
                events.push(data.selection_changed(name));
            }
            tracing::debug!(curve = name, points = points.len(), "Curve data set");
            Ok(())
        })
    }

    /// Replace the point at `index`. Returns false for an unknown curve, an
    /// out-of-range index, or a frame that does not fit between the
    /// neighbouring points.
    pub fn update_point(&self, name: &str, index: usize, point: Point) -> StoreResult<bool> {
        self.mutate("update_point", |data, events| {
            let Some(points) = data.curves.get_mut(name).filter(|p| index < p.len()) else {
                tracing::warn!(curve = name, index, "update_point: no such point");
                return Ok(false);
            };
            let after_previous = index == 0 || points[index - 1].frame < point.frame;
            let before_next = points
                .get(index + 1)
                .map_or(true, |next| point.frame < next.frame);
            if !(after_previous && before_next) {
                tracing::warn!(
                    curve = name,
                    index,
                    frame = point.frame,
                    "update_point: frame would break frame order"
                );
                return Ok(false);
            }
            points[index] = point;
            data.touch();
            events.push(StoreData::curves_changed());
            Ok(true)
        })
    }

    /// Append a point, creating the curve if needed. Returns its index, or
    /// `None` when its frame is not after the last point's frame; use
    /// [`insert_point`](Self::insert_point) to place a point mid-curve.
    pub fn add_point(&self, name: &str, point: Point) -> StoreResult<Option<usize>> {
        self.mutate("add_point", |data, events| {
            let last = data.curves.get(name).and_then(|p| p.last());
            if let Some(last) = last.filter(|last| last.frame >= point.frame) {
                tracing::warn!(
                    curve = name,
                    frame = point.frame,
                    last_frame = last.frame,
                    "add_point: frame does not follow the last point"
                );
                return Ok(None);
            }
            data.metadata.entry(name.to_string()).or_default();
            let points = data.curves.entry(name.to_string()).or_default();
            points.push(point);
            let index = points.len() - 1;
            data.touch();
            events.push(StoreData::curves_changed());
            tracing::debug!(curve = name, index, frame = point.frame, "Point added");
            Ok(Some(index))
        })
    }

    /// Insert a point in frame order, replacing any point on the same frame.
    /// Selected indices at or after the insert position move up by one.
    pub fn insert_point(&self, name: &str, point: Point) -> StoreResult<usize> {
        self.mutate("insert_point", |data, events| {
            data.metadata.entry(name.to_string()).or_default();
            let points = data.curves.entry(name.to_string()).or_default();
            let index = match points.binary_search_by_key(&point.frame, |p| p.frame) {
                Ok(existing) => {
                    points[existing] = point;
                    existing
                }
                Err(position) => {
                    points.insert(position, point);
                    if !data.selection.get(name).is_empty() {
                        data.selection.on_point_inserted(name, position);
                        events.push(data.selection_changed(name));
                    }
                    position
                }
            };
            data.touch();
            events.insert(0, StoreData::curves_changed());
            tracing::debug!(curve = name, index, frame = point.frame, "Point inserted");
            Ok(index)
        })
    }

    /// Remove the point at `index`, shifting later selected indices down.
    pub fn remove_point(&self, name: &str, index: usize) -> StoreResult<bool> {
        self.mutate("remove_point", |data, events| {
            let Some(points) = data.curves.get_mut(name).filter(|p| index < p.len()) else {
                tracing::warn!(curve = name, index, "remove_point: no such point");
                return Ok(false);
            };
            points.remove(index);
            data.touch();
            events.push(StoreData::curves_changed());

            let before = data.selection.get(name);
            data.selection.on_point_removed(name, index);
            if data.selection.get(name) != before {
                events.push(data.selection_changed(name));
            }
            tracing::debug!(curve = name, index, "Point removed");
            Ok(true)
        })
    }

    /// Change only the status of one point.
    pub fn set_point_status(
        &self,
        name: &str,
        index: usize,
        status: PointStatus,
    ) -> StoreResult<bool> {
        self.mutate("set_point_status", |data, events| {
            let Some(point) = data.curves.get_mut(name).and_then(|p| p.get_mut(index)) else {
                tracing::warn!(curve = name, index, %status, "set_point_status: no such point");
                return Ok(false);
            };
            if point.status == status {
                return Ok(true);
            }
            point.status = status;
            data.touch();
            events.push(StoreData::curves_changed());
            Ok(true)
        })
    }

    /// Remove a curve with its metadata and selection. Clears the active
    /// curve if it pointed here. Returns false if the curve did not exist.
    pub fn delete_curve(&self, name: &str) -> StoreResult<bool> {
        self.mutate("delete_curve", |data, events| {
            if data.curves.remove(name).is_none() {
                tracing::warn!(curve = name, "delete_curve: unknown curve");
                return Ok(false);
            }
            data.metadata.remove(name);
            data.touch();
            events.push(StoreData::curves_changed());

            if data.selection.clear_curve(name) {
                events.push(data.selection_changed(name));
            }
            if data.active_curve.as_deref() == Some(name) {
                data.active_curve = None;
                events.push(StoreEvent::ActiveCurveChanged(None));
            }
            tracing::debug!(curve = name, "Curve deleted");
            Ok(true)
        })
    }

    pub fn curve_names(&self) -> StoreResult<Vec<String>> {
        self.read("curve_names", |data| Ok(data.curves.keys().cloned().collect()))
    }

    pub fn has_curve(&self, name: &str) -> StoreResult<bool> {
        self.read("has_curve", |data| Ok(data.curves.contains_key(name)))
    }

    /// Copy of every curve.
    pub fn all_curves(&self) -> StoreResult<CurveMap> {
        self.read("all_curves", |data| Ok(data.curves.clone()))
    }

    // --- Metadata ---

    /// Metadata for `name`; defaults (visible) when none is stored.
    pub fn curve_metadata(&self, name: &str) -> StoreResult<CurveMetadata> {
        self.read("curve_metadata", |data| {
            Ok(data.metadata.get(name).cloned().unwrap_or_default())
        })
    }

    pub fn set_curve_metadata(&self, name: &str, metadata: CurveMetadata) -> StoreResult<bool> {
        self.mutate("set_curve_metadata", |data, events| {
            if !data.curves.contains_key(name) {
                tracing::warn!(curve = name, "set_curve_metadata: unknown curve");
                return Ok(false);
            }
            let visible = metadata.visible;
            let previous = data.metadata.insert(name.to_string(), metadata);
            if previous.map_or(true, |m| m.visible) != visible {
                events.push(StoreEvent::CurveVisibilityChanged {
                    curve_name: name.to_string(),
                    visible,
                });
            }
            Ok(true)
        })
    }

    pub fn set_curve_visibility(&self, name: &str, visible: bool) -> StoreResult<bool> {
        self.mutate("set_curve_visibility", |data, events| {
            if !data.curves.contains_key(name) {
                tracing::warn!(curve = name, "set_curve_visibility: unknown curve");
                return Ok(false);
            }
            let meta = data.metadata.entry(name.to_string()).or_default();
            if meta.visible != visible {
                meta.visible = visible;
                events.push(StoreEvent::CurveVisibilityChanged {
                    curve_name: name.to_string(),
                    visible,
                });
            }
            Ok(true)
        })
    }

    // --- Selection ---

    /// Copy of the selection of `name` (active curve when `None`).
    pub fn get_selection(&self, name: Option<&str>) -> StoreResult<BTreeSet<usize>> {
        self.read("get_selection", |data| {
            let name = data.resolve(name)?;
            Ok(data.selection.get(&name))
        })
    }

    /// Copy of every non-empty selection.
    pub fn all_selections(&self) -> StoreResult<BTreeMap<String, BTreeSet<usize>>> {
        self.read("all_selections", |data| Ok(data.selection.all()))
    }

    /// Replace the selection of `name`. Out-of-range indices are dropped.
    /// Returns false, and emits nothing, when the selection is unchanged.
    pub fn set_selection(
        &self,
        name: &str,
        indices: impl IntoIterator<Item = usize>,
    ) -> StoreResult<bool> {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        self.mutate("set_selection", |data, events| {
            Ok(data.replace_selection(name, indices, events))
        })
    }

    pub fn add_to_selection(&self, name: &str, index: usize) -> StoreResult<bool> {
        self.mutate("add_to_selection", |data, events| {
            if index >= data.len_of(name) {
                tracing::warn!(curve = name, index, "add_to_selection: index out of range");
                return Ok(false);
            }
            if !data.selection.insert(name, index) {
                return Ok(false);
            }
            events.push(data.selection_changed(name));
            Ok(true)
        })
    }

    pub fn remove_from_selection(&self, name: &str, index: usize) -> StoreResult<bool> {
        self.mutate("remove_from_selection", |data, events| {
            if !data.selection.remove(name, index) {
                return Ok(false);
            }
            events.push(data.selection_changed(name));
            Ok(true)
        })
    }

    /// Clear one curve's selection, or every selection when `name` is `None`.
    pub fn clear_selection(&self, name: Option<&str>) -> StoreResult<bool> {
        self.mutate("clear_selection", |data, events| match name {
            Some(name) => {
                if !data.selection.clear_curve(name) {
                    return Ok(false);
                }
                events.push(data.selection_changed(name));
                Ok(true)
            }
            None => {
                if !data.selection.clear_all() {
                    return Ok(false);
                }
                events.push(StoreEvent::SelectionChanged {
                    indices: BTreeSet::new(),
                    curve_name: None,
                });
                Ok(true)
            }
        })
    }

    pub fn select_all(&self, name: &str) -> StoreResult<bool> {
        self.mutate("select_all", |data, events| {
            let all = (0..data.len_of(name)).collect();
            Ok(data.replace_selection(name, all, events))
        })
    }

    /// Select the inclusive range `start..=end`, swapped if reversed and
    /// clamped to the curve.
    pub fn select_range(&self, name: &str, start: usize, end: usize) -> StoreResult<bool> {
        self.mutate("select_range", |data, events| {
            let range = clamped_range(start, end, data.len_of(name));
            Ok(data.replace_selection(name, range, events))
        })
    }

    /// Select one point, either alone or added to the current selection.
    /// Returns false for an out-of-range index.
    pub fn select_point_by_index(
        &self,
        name: &str,
        index: usize,
        additive: bool,
    ) -> StoreResult<bool> {
        self.mutate("select_point_by_index", |data, events| {
            if index >= data.len_of(name) {
                tracing::warn!(
                    curve = name,
                    index,
                    "select_point_by_index: index out of range"
                );
                return Ok(false);
            }
            let mut indices = if additive {
                data.selection.get(name)
            } else {
                BTreeSet::new()
            };
            indices.insert(index);
            data.replace_selection(name, indices, events);
            Ok(true)
        })
    }

    // --- Active curve, frame, view ---

    pub fn active_curve(&self) -> StoreResult<Option<String>> {
        self.read("active_curve", |data| Ok(data.active_curve.clone()))
    }

    pub fn set_active_curve(&self, name: Option<&str>) -> StoreResult<()> {
        self.mutate("set_active_curve", |data, events| {
            if data.active_curve.as_deref() == name {
                return Ok(());
            }
            if let Some(name) = name.filter(|n| !data.curves.contains_key(*n)) {
                tracing::debug!(curve = name, "Active curve set to a curve with no data yet");
            }
            data.active_curve = name.map(str::to_string);
            events.push(StoreEvent::ActiveCurveChanged(data.active_curve.clone()));
            Ok(())
        })
    }

    pub fn current_frame(&self) -> StoreResult<i32> {
        self.read("current_frame", |data| Ok(data.current_frame))
    }

    /// Set the current frame; values below 1 clamp to 1.
    pub fn set_current_frame(&self, frame: i32) -> StoreResult<()> {
        self.mutate("set_current_frame", |data, events| {
            let frame = frame.max(1);
            if data.current_frame != frame {
                data.current_frame = frame;
                events.push(StoreEvent::FrameChanged(frame));
            }
            Ok(())
        })
    }

    pub fn view_state(&self) -> StoreResult<ViewState> {
        self.read("view_state", |data| Ok(data.view))
    }

    pub fn set_view_state(&self, view: ViewState) -> StoreResult<()> {
        self.mutate("set_view_state", |data, events| {
            if data.view != view {
                data.view = view;
                events.push(StoreEvent::ViewChanged(view));
            }
            Ok(())
        })
    }

    // --- Image sequence ---

    pub fn image_files(&self) -> StoreResult<Vec<String>> {
        self.read("image_files", |data| Ok(data.image_files.clone()))
    }

    /// Replace the image-file list. Validated as a whole before anything
    /// changes.
    pub fn set_image_files(&self, files: Vec<String>) -> StoreResult<()> {
        self.owner.check("set_image_files")?;
        validate_image_files(&files, self.config.max_image_files)?;
        self.mutate("set_image_files", |data, events| {
            if data.image_files != files {
                data.image_files = files;
                events.push(StoreEvent::ImageFilesChanged(data.image_files.len()));
                tracing::debug!(count = data.image_files.len(), "Image files set");
            }
            Ok(())
        })
    }

    // --- Spatial queries ---

    /// Index of the point of `curve` nearest to a screen position, within
    /// `tolerance` pixels. Rebuilds the index if data or view changed.
    pub fn find_point_at(
        &self,
        curve: Option<&str>,
        screen_x: f64,
        screen_y: f64,
        tolerance: f64,
    ) -> StoreResult<Option<usize>> {
        self.read("find_point_at", |data| {
            let name = data.resolve(curve)?;
            let mut index = self.spatial.lock();
            data.ensure_index(&mut index, &name);
            Ok(index.find_point_at(screen_x, screen_y, tolerance))
        })
    }

    /// Points of `curve` inside a screen rectangle, without selecting them.
    pub fn points_in_rect(
        &self,
        curve: Option<&str>,
        rect: ScreenRect,
    ) -> StoreResult<BTreeSet<usize>> {
        self.read("points_in_rect", |data| {
            let name = data.resolve(curve)?;
            let mut index = self.spatial.lock();
            data.ensure_index(&mut index, &name);
            Ok(index.points_in_rect(rect))
        })
    }

    /// Select exactly the points of `curve` inside a screen rectangle and
    /// return them.
    pub fn select_points_in_rect(
        &self,
        curve: Option<&str>,
        rect: ScreenRect,
    ) -> StoreResult<BTreeSet<usize>> {
        self.mutate("select_points_in_rect", |data, events| {
            let name = data.resolve(curve)?;
            let found = {
                let mut index = self.spatial.lock();
                data.ensure_index(&mut index, &name);
                index.points_in_rect(rect)
            };
            data.replace_selection(&name, found.clone(), events);
            Ok(found)
        })
    }

    pub fn spatial_stats(&self) -> StoreResult<SpatialStats> {
        self.owner.check("spatial_stats")?;
        Ok(self.spatial.lock().stats())
    }

    // --- Batching and subscriptions ---

    pub fn begin_batch(&self) -> StoreResult<bool> {
        self.owner.check("begin_batch")?;
        Ok(self.notifier.begin_batch())
    }

    pub fn end_batch(&self) -> StoreResult<usize> {
        self.owner.check("end_batch")?;
        Ok(self.finish_batch())
    }

    pub fn is_batching(&self) -> StoreResult<bool> {
        self.owner.check("is_batching")?;
        Ok(self.notifier.is_batching())
    }

    /// Open a batch that ends when the returned guard is dropped, including
    /// during unwinding. Inside an already open batch the guard is inert.
    pub fn batch(&self) -> StoreResult<BatchGuard<'_>> {
        self.owner.check("batch")?;
        let owns_batch = !self.notifier.is_batching() && self.notifier.begin_batch();
        Ok(BatchGuard {
            store: self,
            owns_batch,
        })
    }

    /// Register a handler for one event kind.
    ///
    /// Subscription management is allowed from any thread: it only touches
    /// the handler registry, never store data. Handlers still run on the
    /// owner thread, inside the call that emitted the event.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe(kind, handler)
    }

    /// Register a handler for every event kind. Callable from any thread,
    /// like [`subscribe`](Self::subscribe).
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe_all(handler)
    }

    /// Callable from any thread, like [`subscribe`](Self::subscribe).
    pub fn subscribe_observer(&self, observer: Arc<dyn StoreObserver>) -> SubscriptionId {
        self.notifier.subscribe_observer(observer)
    }

    /// Callable from any thread, like [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    // --- Whole-state operations ---

    pub fn summary(&self) -> StoreResult<StateSummary> {
        self.read("summary", |data| {
            Ok(StateSummary {
                curve_count: data.curves.len(),
                total_points: data.curves.values().map(Vec::len).sum(),
                total_selected: data.selection.total_selected(),
                active_curve: data.active_curve.clone(),
                current_frame: data.current_frame,
                zoom: data.view.zoom(),
                batch_mode: self.notifier.is_batching(),
            })
        })
    }

    pub fn state_snapshot(&self) -> StoreResult<StateSnapshot> {
        self.read("state_snapshot", |data| {
            Ok(StateSnapshot {
                curves: data.curves.clone(),
                metadata: data.metadata.clone(),
                selections: data.selection.all(),
                active_curve: data.active_curve.clone(),
                current_frame: data.current_frame,
                view: data.view,
                image_files: data.image_files.clone(),
            })
        })
    }

    /// Replace the whole state with `snapshot`, inside one batch.
    ///
    /// The snapshot is validated first; on error nothing changes. Selection
    /// indices that do not fit their curve are dropped. Emits
    /// `SelectionChanged` for each curve whose selection differs from
    /// before, and `CurveVisibilityChanged` for each curve whose visibility
    /// does.
    pub fn restore_snapshot(&self, snapshot: &StateSnapshot) -> StoreResult<()> {
        self.owner.check("restore_snapshot")?;
        snapshot.validate(self.config.max_image_files)?;

        let _batch = self.batch()?;
        self.mutate("restore_snapshot", |data, events| {
            let previous_selection = data.selection.all();
            let previous_visibility: BTreeMap<String, bool> = data
                .metadata
                .iter()
                .map(|(name, meta)| (name.clone(), meta.visible))
                .collect();

            data.curves = snapshot.curves.clone();
            data.metadata = snapshot
                .curves
                .keys()
                .map(|name| {
                    let meta = snapshot.metadata.get(name).cloned().unwrap_or_default();
                    (name.clone(), meta)
                })
                .collect();
            data.selection = SelectionState::new();
            for (name, indices) in &snapshot.selections {
                data.replace_selection(name, indices.clone(), &mut Vec::new());
            }
            data.active_curve = snapshot.active_curve.clone();
            data.current_frame = snapshot.current_frame.max(1);
            data.view = snapshot.view;
            data.image_files = snapshot.image_files.clone();
            data.touch();

            events.push(StoreData::curves_changed());
            let restored_selection = data.selection.all();
            let selected_curves: BTreeSet<&String> = previous_selection
                .keys()
                .chain(restored_selection.keys())
                .collect();
            for name in selected_curves {
                if previous_selection.get(name) != restored_selection.get(name) {
                    events.push(data.selection_changed(name));
                }
            }
            for (name, meta) in &data.metadata {
                let was_visible = previous_visibility.get(name).copied().unwrap_or(true);
                if meta.visible != was_visible {
                    events.push(StoreEvent::CurveVisibilityChanged {
                        curve_name: name.clone(),
                        visible: meta.visible,
                    });
                }
            }
            events.push(StoreEvent::ActiveCurveChanged(data.active_curve.clone()));
            events.push(StoreEvent::FrameChanged(data.current_frame));
            events.push(StoreEvent::ViewChanged(data.view));
            events.push(StoreEvent::ImageFilesChanged(data.image_files.len()));
            tracing::info!(
                curves = data.curves.len(),
                frame = data.current_frame,
                "State restored from snapshot"
            );
            Ok(())
        })
    }

    /// Return to the freshly constructed state. Subscribers stay registered;
    /// a pending batch is dropped without emitting.
    pub fn reset(&self) -> StoreResult<()> {
        self.owner.check("reset")?;
        self.notifier.discard_batch();
        self.spatial.lock().invalidate();
        self.mutate("reset", |data, events| {
            let revision = data.revision;
            *data = StoreData::default();
            data.revision = revision.wrapping_add(1);

            events.push(StoreData::curves_changed());
            events.push(StoreEvent::SelectionChanged {
                indices: BTreeSet::new(),
                curve_name: None,
            });
            events.push(StoreEvent::ActiveCurveChanged(None));
            events.push(StoreEvent::FrameChanged(data.current_frame));
            events.push(StoreEvent::ViewChanged(data.view));
            events.push(StoreEvent::ImageFilesChanged(0));
            tracing::info!("Store reset");
            Ok(())
        })
    }
}

/// Scope guard returned by [`CurveStore::batch`].
#[must_use = "the batch ends as soon as the guard is dropped"]
pub struct BatchGuard<'a> {
    store: &'a CurveStore,
    owns_batch: bool,
}

impl BatchGuard<'_> {
    /// False when the guard joined a batch someone else opened.
    pub fn owns_batch(&self) -> bool {
        self.owns_batch
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if self.owns_batch {
            self.store.finish_batch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> CurveStore {
        let store = CurveStore::new();
        store
            .set_curve_data(
                "track_1",
                &[
                    Point::new(1, 10.0, 10.0),
                    Point::new(2, 20.0, 20.0),
                    Point::new(3, 30.0, 30.0),
                    Point::new(4, 40.0, 40.0),
                ],
                None,
            )
            .unwrap();
        store
    }

    fn kinds(store: &CurveStore) -> Arc<Mutex<Vec<EventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe_all(move |e| sink.lock().push(e.kind()));
        seen
    }

    #[test]
    fn no_name_without_active_curve_is_usage_error() {
        let store = make_store();
        assert!(matches!(
            store.get_curve_data(None),
            Err(StoreError::NoActiveCurve)
        ));
        store.set_active_curve(Some("track_1")).unwrap();
        assert_eq!(store.get_curve_data(None).unwrap().len(), 4);
    }

    #[test]
    fn unknown_curve_reads_empty() {
        let store = CurveStore::new();
        assert!(store.get_curve_data(Some("nope")).unwrap().is_empty());
    }

    #[test]
    fn new_curve_gets_visible_metadata() {
        let store = make_store();
        assert!(store.curve_metadata("track_1").unwrap().visible);
        assert!(store.set_curve_visibility("track_1", false).unwrap());
        assert!(!store.curve_metadata("track_1").unwrap().visible);
        assert!(!store.set_curve_visibility("missing", false).unwrap());
    }

    #[test]
    fn update_point_out_of_range_is_local_failure() {
        let store = make_store();
        assert!(!store.update_point("track_1", 99, Point::new(9, 0.0, 0.0)).unwrap());
        assert!(!store.update_point("missing", 0, Point::new(9, 0.0, 0.0)).unwrap());
        assert!(store.update_point("track_1", 0, Point::new(1, 5.0, 5.0)).unwrap());
        assert_eq!(store.get_curve_data(Some("track_1")).unwrap()[0].x, 5.0);
    }

    #[test]
    fn unordered_curve_data_is_rejected_whole() {
        let store = make_store();
        let seen = kinds(&store);

        let err = store
            .set_curve_data(
                "u",
                &[
                    Point::new(3, 0.0, 0.0),
                    Point::new(3, 1.0, 1.0),
                    Point::new(2, 2.0, 2.0),
                ],
                None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::UnorderedFrames { index: 1, frame: 3, .. })
        ));

        let backwards = [Point::new(2, 0.0, 0.0), Point::new(1, 0.0, 0.0)];
        assert!(store.set_curve_data("track_1", &backwards, None).is_err());

        assert!(!store.has_curve("u").unwrap());
        assert_eq!(store.get_curve_data(Some("track_1")).unwrap().len(), 4);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn add_point_refuses_frame_not_after_last() {
        let store = make_store();
        let seen = kinds(&store);

        assert_eq!(store.add_point("track_1", Point::new(1, 9.0, 9.0)).unwrap(), None);
        assert_eq!(store.add_point("track_1", Point::new(4, 9.0, 9.0)).unwrap(), None);
        assert!(seen.lock().is_empty());

        assert_eq!(store.add_point("track_1", Point::new(5, 9.0, 9.0)).unwrap(), Some(4));
        assert_eq!(store.add_point("fresh", Point::new(7, 0.0, 0.0)).unwrap(), Some(0));
        let points = store.get_curve_data(Some("track_1")).unwrap();
        assert!(ct_common::is_frame_ordered(&points));
        assert_eq!(points[0], Point::new(1, 10.0, 10.0));
    }

    #[test]
    fn update_point_refuses_frame_that_breaks_order() {
        let store = make_store();

        assert!(!store.update_point("track_1", 1, Point::new(1, 0.0, 0.0)).unwrap());
        assert!(!store.update_point("track_1", 1, Point::new(3, 0.0, 0.0)).unwrap());
        assert!(!store.update_point("track_1", 3, Point::new(2, 0.0, 0.0)).unwrap());
        assert_eq!(
            store.get_curve_data(Some("track_1")).unwrap()[1],
            Point::new(2, 20.0, 20.0)
        );

        assert!(store.update_point("track_1", 3, Point::new(9, 0.0, 0.0)).unwrap());
        assert!(store.update_point("track_1", 0, Point::new(-3, 0.0, 0.0)).unwrap());
        assert!(ct_common::is_frame_ordered(
            &store.get_curve_data(Some("track_1")).unwrap()
        ));
    }

    #[test]
    fn set_point_status_keeps_position() {
        let store = make_store();
        assert!(store.set_point_status("track_1", 2, PointStatus::Keyframe).unwrap());
        let point = store.get_curve_data(Some("track_1")).unwrap()[2];
        assert_eq!(point, Point::new(3, 30.0, 30.0).with_status(PointStatus::Keyframe));
        assert!(!store.set_point_status("track_1", 4, PointStatus::Keyframe).unwrap());
    }

    #[test]
    fn remove_point_reindexes_selection() {
        let store = make_store();
        store.set_selection("track_1", [1, 2, 3]).unwrap();
        assert!(store.remove_point("track_1", 1).unwrap());
        assert_eq!(
            store.get_selection(Some("track_1")).unwrap(),
            [1, 2].into_iter().collect()
        );
        assert!(!store.remove_point("track_1", 10).unwrap());
    }

    #[test]
    fn insert_point_keeps_frame_order_and_shifts_selection() {
        let store = make_store();
        store.delete_curve("track_1").unwrap();
        store
            .set_curve_data("t", &[Point::new(1, 0.0, 0.0), Point::new(5, 0.0, 0.0)], None)
            .unwrap();
        store.set_selection("t", [1]).unwrap();

        assert_eq!(store.insert_point("t", Point::new(3, 1.0, 1.0)).unwrap(), 1);
        assert_eq!(store.get_selection(Some("t")).unwrap(), [2].into_iter().collect());

        assert_eq!(store.insert_point("t", Point::new(3, 2.0, 2.0)).unwrap(), 1);
        let frames: Vec<i32> = store
            .get_curve_data(Some("t"))
            .unwrap()
            .iter()
            .map(|p| p.frame)
            .collect();
        assert_eq!(frames, vec![1, 3, 5]);
    }

    #[test]
    fn delete_active_curve_clears_it_and_emits() {
        let store = make_store();
        store.set_active_curve(Some("track_1")).unwrap();
        store.set_selection("track_1", [0]).unwrap();
        let seen = kinds(&store);

        assert!(store.delete_curve("track_1").unwrap());
        assert_eq!(store.active_curve().unwrap(), None);
        assert!(store.get_selection(Some("track_1")).unwrap().is_empty());
        assert_eq!(
            *seen.lock(),
            vec![
                EventKind::CurvesChanged,
                EventKind::SelectionChanged,
                EventKind::ActiveCurveChanged,
                EventKind::StateChanged,
            ]
        );
        assert!(!store.delete_curve("track_1").unwrap());
    }

    #[test]
    fn identical_selection_emits_nothing() {
        let store = make_store();
        store.set_selection("track_1", [0, 2]).unwrap();
        let seen = kinds(&store);

        assert!(!store.set_selection("track_1", [2, 0]).unwrap());
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn set_selection_drops_out_of_range() {
        let store = make_store();
        assert!(store.set_selection("track_1", [0, 3, 4, 100]).unwrap());
        assert_eq!(
            store.get_selection(Some("track_1")).unwrap(),
            [0, 3].into_iter().collect()
        );
    }

    #[test]
    fn select_range_swaps_and_clamps() {
        let store = make_store();
        store.select_range("track_1", 10, 2).unwrap();
        assert_eq!(
            store.get_selection(Some("track_1")).unwrap(),
            [2, 3].into_iter().collect()
        );
    }

    #[test]
    fn select_point_by_index_modes() {
        let store = make_store();
        assert!(store.select_point_by_index("track_1", 1, false).unwrap());
        assert!(store.select_point_by_index("track_1", 3, true).unwrap());
        assert_eq!(
            store.get_selection(Some("track_1")).unwrap(),
            [1, 3].into_iter().collect()
        );
        assert!(store.select_point_by_index("track_1", 0, false).unwrap());
        assert_eq!(store.get_selection(Some("track_1")).unwrap(), [0].into_iter().collect());
        assert!(!store.select_point_by_index("track_1", 4, false).unwrap());
    }

    #[test]
    fn clear_selection_all_reports_none_curve() {
        let store = make_store();
        store.select_all("track_1").unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(EventKind::SelectionChanged, move |e| sink.lock().push(e.clone()));

        assert!(store.clear_selection(None).unwrap());
        assert!(!store.clear_selection(None).unwrap());
        assert_eq!(
            *events.lock(),
            vec![StoreEvent::SelectionChanged {
                indices: BTreeSet::new(),
                curve_name: None
            }]
        );
    }

    #[test]
    fn frame_clamps_to_one() {
        let store = CurveStore::new();
        store.set_current_frame(-5).unwrap();
        assert_eq!(store.current_frame().unwrap(), 1);
        store.set_current_frame(42).unwrap();
        assert_eq!(store.current_frame().unwrap(), 42);
    }

    #[test]
    fn image_files_are_validated_all_or_nothing() {
        let mut config = StoreConfig::default();
        config.max_image_files = 2;
        let store = CurveStore::with_config(config).unwrap();
        store.set_image_files(vec!["a.png".into()]).unwrap();

        let err = store
            .set_image_files(vec!["a.png".into(), "b.png".into(), "c.png".into()])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::TooManyImageFiles { count: 3, max: 2 })
        ));
        assert_eq!(store.image_files().unwrap(), vec!["a.png".to_string()]);
    }

    #[test]
    fn spatial_queries_follow_data_and_view() {
        let store = make_store();
        let hit = |x, y| store.find_point_at(Some("track_1"), x, y, 2.0).unwrap();
        assert_eq!(hit(20.0, 20.0), Some(1));

        store.update_point("track_1", 1, Point::new(2, 200.0, 200.0)).unwrap();
        assert_eq!(hit(20.0, 20.0), None);

        let view = store.view_state().unwrap().with_zoom(2.0).unwrap();
        store.set_view_state(view).unwrap();
        assert_eq!(hit(400.0, 400.0), Some(1));
    }

    #[test]
    fn select_points_in_rect_selects_hits() {
        let store = make_store();
        let rect = ScreenRect::from_corners(15.0, 15.0, 35.0, 35.0);
        let found = store.select_points_in_rect(Some("track_1"), rect).unwrap();
        assert_eq!(found, [1, 2].into_iter().collect());
        assert_eq!(store.get_selection(Some("track_1")).unwrap(), found);
    }

    #[test]
    fn batch_guard_ends_batch_on_drop() {
        let store = make_store();
        let seen = kinds(&store);
        {
            let guard = store.batch().unwrap();
            assert!(guard.owns_batch());
            let inner = store.batch().unwrap();
            assert!(!inner.owns_batch());
            store.set_current_frame(3).unwrap();
            store.set_current_frame(4).unwrap();
        }
        assert!(!store.is_batching().unwrap());
        assert_eq!(*seen.lock(), vec![EventKind::FrameChanged, EventKind::StateChanged]);
    }

    #[test]
    fn summary_reports_counts() {
        let store = make_store();
        store.set_active_curve(Some("track_1")).unwrap();
        store.set_selection("track_1", [0, 1]).unwrap();
        let summary = store.summary().unwrap();
        assert_eq!(summary.curve_count, 1);
        assert_eq!(summary.total_points, 4);
        assert_eq!(summary.total_selected, 2);
        assert_eq!(summary.active_curve.as_deref(), Some("track_1"));
        assert_eq!(summary.zoom, 1.0);
        assert!(!summary.batch_mode);
    }

    #[test]
    fn snapshot_restore_replaces_state() {
        let store = make_store();
        store.set_selection("track_1", [3]).unwrap();
        store.set_current_frame(9).unwrap();
        let snapshot = store.state_snapshot().unwrap();

        store.reset().unwrap();
        assert!(store.curve_names().unwrap().is_empty());
        assert_eq!(store.current_frame().unwrap(), 1);

        store.restore_snapshot(&snapshot).unwrap();
        assert_eq!(store.state_snapshot().unwrap(), snapshot);
    }

    #[test]
    fn restore_reports_restored_selection_and_visibility() {
        let source = make_store();
        source.set_selection("track_1", [1]).unwrap();
        source.set_curve_visibility("track_1", false).unwrap();
        let snapshot = source.state_snapshot().unwrap();

        let store = CurveStore::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe_all(move |e| {
            if matches!(
                e.kind(),
                EventKind::SelectionChanged | EventKind::CurveVisibilityChanged
            ) {
                sink.lock().push(e.clone());
            }
        });

        store.restore_snapshot(&snapshot).unwrap();
        assert_eq!(
            *events.lock(),
            vec![
                StoreEvent::SelectionChanged {
                    indices: [1].into_iter().collect(),
                    curve_name: Some("track_1".into()),
                },
                StoreEvent::CurveVisibilityChanged {
                    curve_name: "track_1".into(),
                    visible: false,
                },
            ]
        );

        // Restoring the same state again changes neither.
        events.lock().clear();
        store.restore_snapshot(&snapshot).unwrap();
        assert!(events.lock().is_empty());
    }

    #[test]
    fn restore_reports_cleared_selection_per_curve() {
        let store = make_store();
        store.set_selection("track_1", [0, 2]).unwrap();
        let mut snapshot = store.state_snapshot().unwrap();
        snapshot.selections.clear();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(EventKind::SelectionChanged, move |e| sink.lock().push(e.clone()));

        store.restore_snapshot(&snapshot).unwrap();
        assert_eq!(
            *events.lock(),
            vec![StoreEvent::SelectionChanged {
                indices: BTreeSet::new(),
                curve_name: Some("track_1".into()),
            }]
        );
    }

    #[test]
    fn curve_payload_matches_state_at_delivery() {
        let store = make_store();
        let payloads = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&payloads);
        store.subscribe(EventKind::CurvesChanged, move |e| {
            if let StoreEvent::CurvesChanged(map) = e {
                sink.lock().push(map.get("track_1").map_or(0, Vec::len));
            }
        });

        store.remove_point("track_1", 0).unwrap();
        assert_eq!(*payloads.lock(), vec![3]);

        {
            let _batch = store.batch().unwrap();
            store.remove_point("track_1", 0).unwrap();
            store.add_point("track_1", Point::new(10, 0.0, 0.0)).unwrap();
            store.add_point("track_1", Point::new(11, 0.0, 0.0)).unwrap();
            store.set_current_frame(5).unwrap();
        }
        assert_eq!(*payloads.lock(), vec![3, 4]);
    }

    #[test]
    fn invalid_snapshot_changes_nothing() {
        let mut config = StoreConfig::default();
        config.max_image_files = 1;
        let store = CurveStore::with_config(config).unwrap();
        let mut snapshot = StateSnapshot::default();
        snapshot.curves.insert("x".into(), vec![Point::new(1, 0.0, 0.0)]);
        snapshot.image_files = vec!["a".into(), "b".into()];

        assert!(store.restore_snapshot(&snapshot).is_err());
        assert!(!store.has_curve("x").unwrap());
        assert!(!store.is_batching().unwrap());
    }
}
