//! Per-document editing session.
//!
//! The session owns the scene graph and every manager that derives state
//! from it. Pointer events flow Drag → Snap → graph (live preview); when a
//! gesture ends the net change is recorded in History as one command.
//! Keyboard events resolve through `ShortcutMap`.
//!
//! State changes never call back into the session: each entry point mutates,
//! re-resolves layout once, and requests a frame.

use crate::commands::{Command, CommandKind, GeometryChange, History, HistoryConfig, HistorySummary};
use crate::drag::{DragConfig, DragManager, DragMode, DragOutcome, NodeSnapshot, SnapFn};
use crate::input::{InputEvent, Modifiers};
use crate::selection::{SelectOptions, Selection};
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use crate::snap::{SnapConfig, SnapEngine, SnapGuide};
use frame_core::component::{ComponentPropertyValue, ComponentRegistry};
use frame_core::geometry::{Point, Rect, Size};
use frame_core::id::{ComponentId, NodeId};
use frame_core::import::{ImportError, import_json};
use frame_core::layout::{LayoutTree, ResolveConfig, resolve_layout};
use frame_core::model::{Geometry, SceneGraph, SceneNode, Subtree};
use frame_core::property::PropertyValue;
use frame_core::{apply_auto_layout_all, relayout_after_resize};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use thiserror::Error;

/// Screen pixels outside a selection corner that start a rotation.
const ROTATE_ZONE_PX: f32 = 16.0;
/// Offset applied to duplicated nodes.
const DUPLICATE_OFFSET: f32 = 10.0;
const MIN_ZOOM: f32 = 0.02;
const MAX_ZOOM: f32 = 256.0;

// ─── Viewport ────────────────────────────────────────────────────────────

/// Pan/zoom of the canvas. `screen = world * zoom + pan`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub pan_x: f32,
    pub pan_y: f32,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn screen_to_world(&self, sx: f32, sy: f32) -> Point {
        Point::new((sx - self.pan_x) / self.zoom, (sy - self.pan_y) / self.zoom)
    }

    pub fn world_to_screen(&self, wx: f32, wy: f32) -> Point {
        Point::new(wx * self.zoom + self.pan_x, wy * self.zoom + self.pan_y)
    }

    /// Zoom by `factor`, keeping the world point under screen `(sx, sy)` fixed.
    pub fn zoom_at(&mut self, factor: f32, sx: f32, sy: f32) {
        let anchor = self.screen_to_world(sx, sy);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.pan_x = sx - anchor.x * self.zoom;
        self.pan_y = sy - anchor.y * self.zoom;
    }
}

// ─── Frame scheduling ────────────────────────────────────────────────────

/// Coalesces repaint requests: any number of requests between two
/// `take` calls yield one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameScheduler {
    pending: bool,
    delivered: u64,
}

impl FrameScheduler {
    /// Returns true if this request scheduled a new frame.
    pub fn request(&mut self) -> bool {
        !std::mem::replace(&mut self.pending, true)
    }

    /// Consume the pending frame, if any.
    pub fn take(&mut self) -> bool {
        let had = std::mem::take(&mut self.pending);
        if had {
            self.delivered += 1;
        }
        had
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

// ─── Persistence ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("msgpack encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("json encode failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Plain serializable session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// One subtree per top-level node, in paint order.
    pub nodes: Vec<Subtree>,
    pub components: ComponentRegistry,
    pub selection: Vec<NodeId>,
    pub viewport: Viewport,
    pub history: HistorySummary,
}

impl SessionSnapshot {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ─── Session ─────────────────────────────────────────────────────────────

/// Sibling/parent rects and descendant geometry captured at gesture start.
#[derive(Debug, Clone, Default)]
struct GestureContext {
    siblings: Vec<Rect>,
    parent: Option<Rect>,
    /// Nodes below the dragged ones whose geometry may change as a side
    /// effect (constraints, auto layout).
    descendants: Vec<(NodeId, Geometry)>,
    press_target: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub resolve: ResolveConfig,
    pub snap: SnapConfig,
    pub drag: DragConfig,
    pub history: HistoryConfig,
}

pub struct Session {
    /// The scene graph (single source of truth).
    pub graph: SceneGraph,
    /// World-space layout derived from `graph`.
    pub layout: LayoutTree,
    pub selection: Selection,
    pub drag: DragManager,
    pub snap: SnapEngine,
    pub history: History,
    pub components: ComponentRegistry,
    pub viewport: Viewport,
    pub resolve_config: ResolveConfig,
    scheduler: FrameScheduler,
    guides: Vec<SnapGuide>,
    gesture: GestureContext,
    now_ms: u64,
}

impl Session {
    pub fn new(graph: SceneGraph, config: SessionConfig) -> Self {
        let mut session = Self {
            layout: resolve_layout(&graph, &config.resolve),
            graph,
            selection: Selection::new(),
            drag: DragManager::new(config.drag),
            snap: SnapEngine::new(config.snap),
            history: History::new(config.history),
            components: ComponentRegistry::new(),
            viewport: Viewport::default(),
            resolve_config: config.resolve,
            scheduler: FrameScheduler::default(),
            guides: Vec::new(),
            gesture: GestureContext::default(),
            now_ms: 0,
        };
        session.set_zoom(config.snap.zoom);
        session.relayout();
        session
    }

    /// Import a JSON node forest into a fresh session.
    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        Ok(Self::new(import_json(json)?, SessionConfig::default()))
    }

    /// Host clock in milliseconds; timestamps coalescable commands.
    pub fn set_time(&mut self, ms: u64) {
        self.now_ms = ms;
    }

    /// Re-run auto layout and world resolution after a mutation.
    pub fn relayout(&mut self) {
        apply_auto_layout_all(&mut self.graph);
        self.layout = resolve_layout(&self.graph, &self.resolve_config);
        self.selection.prune(&self.layout);
        self.request_frame();
    }

    pub fn request_frame(&mut self) -> bool {
        self.scheduler.request()
    }

    pub fn take_frame(&mut self) -> bool {
        self.scheduler.take()
    }

    pub fn frame_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Guides from the most recent snap, for the overlay.
    pub fn guides(&self) -> &[SnapGuide] {
        &self.guides
    }

    pub fn marquee(&self) -> Option<Rect> {
        self.drag.marquee_rect()
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.viewport.zoom = zoom;
        self.snap.config.zoom = zoom;
        self.drag.zoom = zoom;
        self.request_frame();
    }

    /// Selected ids without those whose ancestor is also selected.
    pub fn selection_roots(&self) -> Vec<NodeId> {
        let ids = self.selection.ids();
        ids.iter()
            .copied()
            .filter(|id| {
                !self
                    .graph
                    .ancestors(*id)
                    .iter()
                    .any(|a| ids.contains(a))
            })
            .collect()
    }

    // ─── Input routing ───────────────────────────────────────────────────

    /// Route one input event. Returns true if anything changed.
    pub fn handle_event(&mut self, event: &InputEvent) -> bool {
        match event {
            InputEvent::PointerDown { x, y, modifiers } => self.pointer_down(*x, *y, *modifiers),
            InputEvent::PointerMove { x, y, modifiers } => self.pointer_move(*x, *y, *modifiers),
            InputEvent::PointerUp { x, y, modifiers } => self.pointer_up(*x, *y, *modifiers),
            InputEvent::KeyDown { key, modifiers } => ShortcutMap::resolve_event(key, *modifiers)
                .is_some_and(|action| self.perform(action)),
            InputEvent::KeyUp { .. } => false,
        }
    }

    fn pointer_down(&mut self, x: f32, y: f32, modifiers: Modifiers) -> bool {
        self.guides.clear();
        if modifiers.space {
            // Temporary pan belongs to the host.
            return false;
        }
        if let Some(handle) = self.selection.handle_at(&self.layout, self.viewport.zoom, x, y) {
            return self.begin_gesture(DragMode::Resize { handle }, x, y, None);
        }
        if self.in_rotate_zone(x, y) {
            return self.begin_gesture(DragMode::Rotate, x, y, None);
        }

        let hit = if modifiers.ctrl_or_cmd {
            self.selection.deep_select_at(x, y, &self.layout)
        } else {
            self.selected_at(x, y)
                .or_else(|| self.selection.hit_test_top_level(&self.layout, x, y))
        };

        match hit {
            Some(id) => {
                if modifiers.shift {
                    self.selection.select(id, SelectOptions::TOGGLE, &self.layout);
                    if !self.selection.is_selected(id) {
                        self.request_frame();
                        return true;
                    }
                } else if !self.selection.is_selected(id) {
                    self.selection.select(id, SelectOptions::REPLACE, &self.layout);
                }
                self.begin_gesture(DragMode::Move, x, y, Some(id))
            }
            None => {
                if !modifiers.shift {
                    self.selection.clear();
                }
                self.begin_gesture(DragMode::Marquee, x, y, None)
            }
        }
    }

    /// Deepest currently-selected node under the point.
    fn selected_at(&self, x: f32, y: f32) -> Option<NodeId> {
        self.layout
            .nodes_at(x, y)
            .into_iter()
            .rev()
            .find(|n| self.selection.is_selected(n.id))
            .map(|n| n.id)
    }

    fn in_rotate_zone(&self, x: f32, y: f32) -> bool {
        let Some(bounds) = self.selection.bounds(&self.layout) else {
            return false;
        };
        if bounds.rect.contains(x, y) {
            return false;
        }
        let zone = ROTATE_ZONE_PX / self.viewport.zoom;
        let r = bounds.rect;
        [
            Point::new(r.x, r.y),
            Point::new(r.right(), r.y),
            Point::new(r.right(), r.bottom()),
            Point::new(r.x, r.bottom()),
        ]
        .iter()
        .any(|c| c.distance_to(Point::new(x, y)) <= zone)
    }

    fn begin_gesture(&mut self, mode: DragMode, x: f32, y: f32, press_target: Option<NodeId>) -> bool {
        let targets = if mode == DragMode::Marquee {
            Vec::new()
        } else {
            self.selection_roots()
        };
        let nodes: Vec<NodeSnapshot> = targets
            .iter()
            .filter_map(|id| NodeSnapshot::capture(&self.graph, &self.layout, *id))
            .collect();
        if !self.drag.begin(mode, x, y, nodes) {
            return false;
        }

        let mut context = GestureContext {
            press_target,
            ..GestureContext::default()
        };
        if let Some(first) = targets.first() {
            context.siblings = self
                .layout
                .sibling_rects(*first)
                .into_iter()
                .filter(|(id, _)| !targets.contains(id))
                .map(|(_, r)| r)
                .collect();
            context.parent = self
                .layout
                .parent_of(*first)
                .and_then(|p| self.layout.world_rect(p));
        }
        for id in &targets {
            for d in self.layout.descendants(*id) {
                if let Some(node) = self.graph.get_by_id(d.id) {
                    context.descendants.push((d.id, node.geometry));
                }
            }
        }
        self.gesture = context;
        self.request_frame();
        true
    }

    fn pointer_move(&mut self, x: f32, y: f32, modifiers: Modifiers) -> bool {
        if !self.drag.is_active() {
            let hover = self.layout.hit_test(x, y);
            if hover == self.selection.hover() {
                return false;
            }
            self.selection.set_hover(hover);
            self.request_frame();
            return true;
        }

        let guides = RefCell::new(Vec::new());
        let frame = {
            let engine = &self.snap;
            let context = &self.gesture;
            let snapper = |r: Rect| {
                let result = engine.snap(r, &context.siblings, context.parent);
                *guides.borrow_mut() = result.guides;
                Point::new(result.x, result.y)
            };
            let snap_fn: SnapFn<'_> = &snapper;
            self.drag.update(x, y, modifiers, Some(snap_fn))
        };
        self.guides = guides.into_inner();

        let Some(frame) = frame else {
            return false;
        };
        if frame.transforms.is_empty() {
            if frame.marquee.is_some() {
                self.request_frame();
                return true;
            }
            return false;
        }
        let resize = matches!(frame.mode, DragMode::Resize { .. });
        for t in &frame.transforms {
            let Some(node) = self.graph.get_by_id_mut(t.id) else {
                continue;
            };
            let previous = Size::new(node.geometry.width, node.geometry.height);
            node.geometry = t.geometry;
            if resize {
                relayout_after_resize(&mut self.graph, t.id, previous);
            }
        }
        self.relayout();
        true
    }

    fn pointer_up(&mut self, x: f32, y: f32, modifiers: Modifiers) -> bool {
        if !self.drag.is_active() {
            return false;
        }
        let mode = self.drag.mode();
        // Final frame first so the last pointer position is applied.
        self.pointer_move(x, y, modifiers);
        let outcome = self.drag.end(x, y, modifiers, None);
        self.guides.clear();
        let context = std::mem::take(&mut self.gesture);

        match outcome {
            DragOutcome::None => false,
            DragOutcome::Click { modifiers, .. } => {
                // Plain click inside a multi-selection narrows to the clicked node.
                if let Some(target) = context
                    .press_target
                    .filter(|t| !modifiers.shift && self.selection.len() > 1 && self.selection.is_selected(*t))
                {
                    self.selection.select(target, SelectOptions::REPLACE, &self.layout);
                }
                self.request_frame();
                true
            }
            DragOutcome::Marquee { rect, modifiers } => {
                self.selection.select_in_marquee(rect, modifiers.shift, &self.layout);
                self.request_frame();
                true
            }
            DragOutcome::Transformed { before, .. } => {
                let mut changes: Vec<GeometryChange> = before
                    .iter()
                    .map(|s| (s.id, s.local))
                    .chain(context.descendants.iter().copied())
                    .filter_map(|(id, before)| {
                        let after = self.graph.get_by_id(id)?.geometry;
                        (after != before).then_some(GeometryChange { id, before, after })
                    })
                    .collect();
                changes.dedup_by_key(|c| c.id);
                if changes.is_empty() {
                    return false;
                }
                let (kind, description) = match mode {
                    DragMode::Move => (CommandKind::Move { changes }, "Move"),
                    DragMode::Rotate => (CommandKind::Transform { changes }, "Rotate"),
                    _ => (CommandKind::Transform { changes }, "Resize"),
                };
                self.commit_geometry(kind, description, true);
                self.request_frame();
                true
            }
        }
    }

    /// Abort the active gesture and restore the geometry it started from.
    pub fn cancel_gesture(&mut self) -> bool {
        if !self.drag.is_active() {
            return false;
        }
        let snapshot = self.drag.cancel();
        let context = std::mem::take(&mut self.gesture);
        let restore = snapshot
            .iter()
            .map(|s| (s.id, s.local))
            .chain(context.descendants);
        for (id, geometry) in restore {
            if let Some(node) = self.graph.get_by_id_mut(id) {
                node.geometry = geometry;
            }
        }
        self.guides.clear();
        self.relayout();
        true
    }

    // ─── Shortcut actions ────────────────────────────────────────────────

    pub fn perform(&mut self, action: ShortcutAction) -> bool {
        log::debug!("shortcut {action:?}");
        let changed = match action {
            ShortcutAction::Undo => self.undo(),
            ShortcutAction::Redo => self.redo(),
            ShortcutAction::Delete => self.delete_selection(),
            ShortcutAction::SelectAll => self.selection.select_all(&self.layout) > 0,
            ShortcutAction::Duplicate => self.duplicate_selection(),
            ShortcutAction::Nudge { .. } => action
                .nudge_delta()
                .is_some_and(|(dx, dy)| self.nudge_selection(dx, dy)),
            ShortcutAction::ZoomIn => {
                self.set_zoom(self.viewport.zoom * 2.0);
                true
            }
            ShortcutAction::ZoomOut => {
                self.set_zoom(self.viewport.zoom / 2.0);
                true
            }
            ShortcutAction::ZoomReset => {
                self.set_zoom(1.0);
                true
            }
            ShortcutAction::SendBackward
            | ShortcutAction::BringForward
            | ShortcutAction::SendToBack
            | ShortcutAction::BringToFront => self.reorder_selection(action),
            ShortcutAction::Deselect => self.cancel_gesture() || self.selection.clear(),
        };
        if changed {
            self.request_frame();
        }
        changed
    }

    pub fn undo(&mut self) -> bool {
        if self.drag.is_active() {
            return false;
        }
        let undone = self.history.undo(&mut self.graph);
        if let Some(desc) = &undone {
            log::debug!("undo: {desc}");
            self.sync_overrides(false);
            self.relayout();
        }
        undone.is_some()
    }

    pub fn redo(&mut self) -> bool {
        if self.drag.is_active() {
            return false;
        }
        let redone = self.history.redo(&mut self.graph);
        if let Some(desc) = &redone {
            log::debug!("redo: {desc}");
            self.sync_overrides(true);
            self.relayout();
        }
        redone.is_some()
    }

    /// Bring instance override records in line with the entry just undone
    /// (`forward == false`) or redone.
    fn sync_overrides(&mut self, forward: bool) {
        let entry = if forward {
            self.history.peek_undo()
        } else {
            self.history.peek_redo()
        };
        let Some(entry) = entry else {
            return;
        };
        let mut updates: Vec<_> = entry
            .commands()
            .iter()
            .filter_map(|cmd| cmd.override_entry(forward))
            .collect();
        if !forward {
            updates.reverse();
        }
        for (instance, id, property, value) in updates {
            self.components.put_override(instance, id, property, value);
        }
    }

    /// Record a geometry edit at the current time. Changes to nodes inside
    /// attached instances also become overrides, grouped with the edit into
    /// one undo step. `applied` means the graph already shows the edit.
    fn commit_geometry(&mut self, kind: CommandKind, description: &str, applied: bool) {
        let overrides = match &kind {
            CommandKind::Move { changes } | CommandKind::Transform { changes } => {
                self.geometry_overrides(changes)
            }
            _ => Vec::new(),
        };
        let cmd = Command::new(kind, description).at(self.now_ms);
        let grouped = !overrides.is_empty();
        if grouped {
            self.history.begin_transaction(description);
        }
        if applied {
            self.history.record(cmd);
        } else {
            self.history.execute(&mut self.graph, cmd);
        }
        for cmd in overrides {
            self.store_override(&cmd);
            self.history.record(cmd);
        }
        if grouped {
            if let Err(err) = self.history.commit_transaction() {
                log::warn!("{description}: {err}");
            }
        }
    }

    /// Override commands for geometry changes on nodes inside instances.
    fn geometry_overrides(&self, changes: &[GeometryChange]) -> Vec<Command> {
        let mut out = Vec::new();
        for change in changes {
            let Some(instance) = self.components.owning_instance(&self.graph, change.id) else {
                continue;
            };
            if self.components.definition_node(instance, change.id).is_none() {
                log::warn!("{} is not overridable inside instance {instance}", change.id);
                continue;
            }
            let (b, a) = (change.before, change.after);
            let mut edits = Vec::new();
            // Rebuilds keep the instance root's own position.
            if change.id != instance && (b.x, b.y) != (a.x, a.y) {
                edits.push((
                    PropertyValue::Position { x: b.x, y: b.y },
                    PropertyValue::Position { x: a.x, y: a.y },
                ));
            }
            if (b.width, b.height) != (a.width, a.height) {
                edits.push((
                    PropertyValue::Size {
                        width: b.width,
                        height: b.height,
                    },
                    PropertyValue::Size {
                        width: a.width,
                        height: a.height,
                    },
                ));
            }
            if b.rotation != a.rotation {
                edits.push((PropertyValue::Rotation(b.rotation), PropertyValue::Rotation(a.rotation)));
            }
            for (before, after) in edits {
                let previous = self
                    .components
                    .override_value(instance, change.id, after.property())
                    .cloned();
                out.push(Command::new(
                    CommandKind::SetOverride {
                        instance,
                        id: change.id,
                        before,
                        after,
                        previous,
                    },
                    "Override",
                ));
            }
        }
        out
    }

    /// Apply the registry side of an override command in the forward direction.
    fn store_override(&mut self, cmd: &Command) {
        if let Some((instance, id, property, value)) = cmd.override_entry(true) {
            self.components.put_override(instance, id, property, value);
        }
    }

    /// Move the selection by a world offset as one coalescable command.
    pub fn nudge_selection(&mut self, dx: f32, dy: f32) -> bool {
        let changes: Vec<GeometryChange> = self
            .selection_roots()
            .into_iter()
            .filter_map(|id| {
                let before = self.graph.get_by_id(id)?.geometry;
                let after = Geometry {
                    x: before.x + dx,
                    y: before.y + dy,
                    ..before
                };
                Some(GeometryChange { id, before, after })
            })
            .collect();
        if changes.is_empty() {
            return false;
        }
        self.commit_geometry(CommandKind::Move { changes }, "Nudge", false);
        self.relayout();
        true
    }

    pub fn delete_selection(&mut self) -> bool {
        let commands: Vec<Command> = self
            .selection_roots()
            .into_iter()
            .filter_map(|id| Command::delete(&self.graph, id))
            .collect();
        if commands.is_empty() {
            return false;
        }
        self.history.begin_transaction("Delete");
        for cmd in commands {
            self.history.execute(&mut self.graph, cmd);
        }
        if let Err(err) = self.history.commit_transaction() {
            log::warn!("delete: {err}");
        }
        self.selection.clear();
        self.relayout();
        true
    }

    pub fn duplicate_selection(&mut self) -> bool {
        let targets = self.selection_roots();
        if targets.is_empty() {
            return false;
        }
        let mut created = Vec::new();
        self.history.begin_transaction("Duplicate");
        for id in targets {
            let Some(subtree) = self.graph.extract_subtree(id) else {
                continue;
            };
            let index = self
                .graph
                .index_of(id)
                .and_then(|idx| self.graph.position_in_parent(idx))
                .map_or(usize::MAX, |i| i + 1);
            let (mut copy, _) = subtree.with_fresh_ids();
            if let Some(root) = copy.root_mut() {
                root.geometry.x += DUPLICATE_OFFSET;
                root.geometry.y += DUPLICATE_OFFSET;
            }
            if let Some(root_id) = copy.root_id() {
                created.push(root_id);
            }
            let cmd = Command::new(
                CommandKind::Insert {
                    parent: self.graph.parent_id(id),
                    index,
                    subtree: copy,
                },
                "Duplicate",
            );
            self.history.execute(&mut self.graph, cmd);
        }
        if let Err(err) = self.history.commit_transaction() {
            log::warn!("duplicate: {err}");
        }
        self.relayout();
        self.selection.set(&created, &self.layout);
        !created.is_empty()
    }

    fn reorder_selection(&mut self, action: ShortcutAction) -> bool {
        let mut commands = Vec::new();
        for id in self.selection_roots() {
            let Some(idx) = self.graph.index_of(id) else {
                continue;
            };
            let Some(from) = self.graph.position_in_parent(idx) else {
                continue;
            };
            let last = self
                .graph
                .parent(idx)
                .map_or(0, |p| self.graph.children(p).len().saturating_sub(1));
            let to = match action {
                ShortcutAction::SendBackward => from.saturating_sub(1),
                ShortcutAction::BringForward => (from + 1).min(last),
                ShortcutAction::SendToBack => 0,
                _ => last,
            };
            if to != from {
                commands.push(Command::new(CommandKind::Reorder { id, from, to }, "Reorder"));
            }
        }
        if commands.is_empty() {
            return false;
        }
        self.history.begin_transaction("Reorder");
        for cmd in commands {
            self.history.execute(&mut self.graph, cmd);
        }
        if let Err(err) = self.history.commit_transaction() {
            log::warn!("reorder: {err}");
        }
        self.relayout();
        true
    }

    // ─── Programmatic edits ──────────────────────────────────────────────

    /// Insert a node under `parent` (`None` = page) as its last child.
    pub fn insert_node(&mut self, parent: Option<NodeId>, node: SceneNode) -> Option<NodeId> {
        let parent_idx = match parent {
            Some(p) => self.graph.index_of(p)?,
            None => self.graph.root,
        };
        let index = self.graph.children(parent_idx).len();
        let id = node.id;
        let cmd = Command::new(
            CommandKind::Insert {
                parent,
                index,
                subtree: Subtree::leaf(node),
            },
            "Insert",
        );
        self.history.execute(&mut self.graph, cmd);
        self.relayout();
        self.graph.contains(id).then_some(id)
    }

    /// Set one property through history. Rapid edits to the same property
    /// of the same node coalesce. Inside an attached instance the edit is
    /// recorded as an override; properties outside the overridable set are
    /// rejected there.
    pub fn set_property(&mut self, id: NodeId, value: PropertyValue) -> bool {
        let cmd = match self.components.owning_instance(&self.graph, id) {
            Some(instance) => {
                let property = value.property();
                if !property.is_overridable() {
                    log::warn!("set_property: {property:?} cannot be overridden inside instance {instance}");
                    return false;
                }
                Command::set_override(&self.graph, &self.components, instance, id, value)
            }
            None => Command::set_property(&self.graph, id, value),
        };
        let Some(cmd) = cmd else {
            log::warn!("set_property: nothing to set on {id}");
            return false;
        };
        let cmd = cmd.at(self.now_ms);
        self.store_override(&cmd);
        self.history.execute(&mut self.graph, cmd);
        self.relayout();
        true
    }

    // ─── Components ──────────────────────────────────────────────────────

    /// Turn the first selected node into a component definition.
    pub fn create_component_from_selection(&mut self, name: &str) -> Option<ComponentId> {
        let source = *self.selection.ids().first()?;
        self.components.create_component(&self.graph, source, name)
    }

    /// Place an instance and record its insertion.
    pub fn create_instance(
        &mut self,
        component: ComponentId,
        parent: Option<NodeId>,
        x: f32,
        y: f32,
    ) -> Option<NodeId> {
        let id = self
            .components
            .create_instance(&mut self.graph, component, parent, x, y)?;
        let subtree = self.graph.extract_subtree(id)?;
        let index = self
            .graph
            .index_of(id)
            .and_then(|idx| self.graph.position_in_parent(idx))
            .unwrap_or(0);
        self.history.record(Command::new(
            CommandKind::Insert {
                parent: self.graph.parent_id(id),
                index,
                subtree,
            },
            "Create instance",
        ));
        self.relayout();
        self.selection.set(&[id], &self.layout);
        Some(id)
    }

    /// Override a property of `target` (instance-side or definition-side id)
    /// inside `instance`, recorded in history.
    pub fn set_override(&mut self, instance: NodeId, target: NodeId, value: PropertyValue) -> bool {
        let scene_id = self
            .components
            .definition_node(instance, target)
            .and_then(|def| self.components.instance(instance)?.source_map.get(&def).copied());
        let Some(scene_id) = scene_id else {
            log::warn!("set_override: {target} is not part of instance {instance}");
            return false;
        };
        self.set_property(scene_id, value)
    }

    pub fn set_instance_property(
        &mut self,
        instance: NodeId,
        name: &str,
        value: ComponentPropertyValue,
    ) -> bool {
        let applied = self
            .components
            .set_instance_property(&mut self.graph, instance, name, value);
        if applied {
            self.relayout();
        }
        applied
    }

    /// Rebuild every attached instance after definition edits.
    pub fn update_all_instances(&mut self) -> usize {
        let rebuilt = self.components.update_all_instances(&mut self.graph);
        if rebuilt > 0 {
            self.relayout();
        }
        rebuilt
    }

    pub fn detach_instance(&mut self, instance: NodeId) -> bool {
        let detached = self.components.detach_instance(&mut self.graph, instance);
        if detached {
            self.relayout();
        }
        detached
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            nodes: self
                .graph
                .top_level()
                .iter()
                .filter_map(|idx| self.graph.extract_subtree(self.graph.node(*idx).id))
                .collect(),
            components: self.components.clone(),
            selection: self.selection.ids().to_vec(),
            viewport: self.viewport,
            history: self.history.summary(),
        }
    }

    /// Rebuild a session from a snapshot. History starts empty.
    pub fn restore(snapshot: SessionSnapshot, config: SessionConfig) -> Self {
        let mut graph = SceneGraph::new();
        let root = graph.root;
        for subtree in &snapshot.nodes {
            graph.insert_subtree(root, usize::MAX, subtree);
        }
        let mut session = Self::new(graph, config);
        session.components = snapshot.components;
        session.viewport = snapshot.viewport;
        session.set_zoom(snapshot.viewport.zoom);
        session.selection.set(&snapshot.selection, &session.layout);
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_coalesces_requests() {
        let mut s = FrameScheduler::default();
        assert!(s.request());
        assert!(!s.request());
        assert!(!s.request());
        assert!(s.take());
        assert!(!s.take());
        assert_eq!(s.delivered(), 1);
    }

    #[test]
    fn viewport_round_trips_points() {
        let mut v = Viewport::default();
        v.zoom_at(2.0, 100.0, 100.0);
        // The anchor stays under the cursor.
        let w = v.screen_to_world(100.0, 100.0);
        assert!((w.x - 100.0).abs() < 0.01 && (w.y - 100.0).abs() < 0.01);
        let s = v.world_to_screen(150.0, 50.0);
        assert!((s.x - 200.0).abs() < 0.01, "got {}", s.x);
        assert!((s.y - 0.0).abs() < 0.01, "got {}", s.y);
    }

    #[test]
    fn escape_cancels_before_deselecting() {
        let mut graph = SceneGraph::new();
        let root = graph.root;
        let id = NodeId::intern("sess_esc");
        graph.add_node(root, SceneNode::rectangle(id).with_geometry(0.0, 0.0, 40.0, 40.0));
        let mut session = Session::new(graph, SessionConfig::default());

        session.handle_event(&InputEvent::PointerDown {
            x: 10.0,
            y: 10.0,
            modifiers: Modifiers::NONE,
        });
        session.handle_event(&InputEvent::PointerMove {
            x: 60.0,
            y: 10.0,
            modifiers: Modifiers::NONE,
        });
        assert_eq!(session.graph.get_by_id(id).unwrap().geometry.x, 50.0);

        assert!(session.perform(ShortcutAction::Deselect));
        assert_eq!(session.graph.get_by_id(id).unwrap().geometry.x, 0.0);
        assert!(session.selection.is_selected(id));
        assert!(!session.history.can_undo());

        assert!(session.perform(ShortcutAction::Deselect));
        assert!(session.selection.is_empty());
    }
}
