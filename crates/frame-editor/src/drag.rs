//! Drag gesture state machine.
//!
//! `None → {Move | Resize | Rotate | Marquee} → None`. A gesture snapshots the
//! dragged nodes' geometry at pointer-down and recomputes every frame from
//! that snapshot, so frames never accumulate rounding drift. Nothing counts
//! until the pointer travels past the pixel threshold; a gesture that never
//! crosses it ends as a click.

use crate::input::Modifiers;
use crate::selection::HandlePosition;
use frame_core::geometry::{Axis, Point, Rect};
use frame_core::id::NodeId;
use frame_core::layout::LayoutTree;
use frame_core::model::{Geometry, SceneGraph};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragConfig {
    /// Screen pixels the pointer must travel before a gesture starts.
    pub threshold_px: f32,
    /// Shift-rotate step in degrees.
    pub rotation_step_deg: f32,
    /// Smallest width/height a resize may produce.
    pub min_size: f32,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            threshold_px: 3.0,
            rotation_step_deg: 15.0,
            min_size: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DragMode {
    None,
    Move,
    Resize { handle: HandlePosition },
    Rotate,
    Marquee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DragPhase {
    /// Below the threshold; nothing to apply yet.
    Pending,
    /// This frame crossed the threshold.
    Started,
    Dragging,
}

/// Geometry of one dragged node at gesture start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub local: Geometry,
    pub world: Rect,
}

impl NodeSnapshot {
    pub fn capture(graph: &SceneGraph, layout: &LayoutTree, id: NodeId) -> Option<Self> {
        Some(Self {
            id,
            local: graph.get_by_id(id)?.geometry,
            world: layout.world_rect(id)?,
        })
    }
}

/// New local geometry for one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeTransform {
    pub id: NodeId,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragFrame {
    pub phase: DragPhase,
    pub mode: DragMode,
    pub transforms: Vec<NodeTransform>,
    /// Normalized marquee rectangle (marquee mode only).
    pub marquee: Option<Rect>,
}

/// Result of ending a gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    /// No gesture was active.
    None,
    /// Threshold never crossed; nothing to record.
    Click { at: Point, modifiers: Modifiers },
    /// Geometry changed: start snapshot and final transforms.
    Transformed {
        mode: DragMode,
        before: Vec<NodeSnapshot>,
        after: Vec<NodeTransform>,
    },
    Marquee { rect: Rect, modifiers: Modifiers },
}

#[derive(Debug, Clone)]
struct DragState {
    mode: DragMode,
    origin: Point,
    current: Point,
    nodes: Vec<NodeSnapshot>,
    start_bounds: Rect,
    started: bool,
    axis_lock: Option<Axis>,
    last: Vec<NodeTransform>,
}

/// Snaps a proposed world rect (or a zero-size rect for a point) and
/// returns the corrected top-left.
pub type SnapFn<'a> = &'a dyn Fn(Rect) -> Point;

#[derive(Debug, Clone)]
pub struct DragManager {
    pub config: DragConfig,
    /// Viewport zoom; converts the pixel threshold to world units.
    pub zoom: f32,
    state: Option<DragState>,
}

impl Default for DragManager {
    fn default() -> Self {
        Self::new(DragConfig::default())
    }
}

impl DragManager {
    pub fn new(config: DragConfig) -> Self {
        Self {
            config,
            zoom: 1.0,
            state: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn mode(&self) -> DragMode {
        self.state.as_ref().map_or(DragMode::None, |s| s.mode)
    }

    pub fn has_started(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.started)
    }

    /// Ids being dragged.
    pub fn targets(&self) -> Vec<NodeId> {
        self.state
            .as_ref()
            .map(|s| s.nodes.iter().map(|n| n.id).collect())
            .unwrap_or_default()
    }

    /// Current marquee, once the gesture has started.
    pub fn marquee_rect(&self) -> Option<Rect> {
        let s = self.state.as_ref()?;
        (s.mode == DragMode::Marquee && s.started).then(|| Rect::from_corners(s.origin, s.current))
    }

    /// Start a gesture at world point `(x, y)`. Move/resize/rotate need at
    /// least one node; an already-active gesture is replaced.
    pub fn begin(&mut self, mode: DragMode, x: f32, y: f32, nodes: Vec<NodeSnapshot>) -> bool {
        if mode == DragMode::None {
            return false;
        }
        let bounds = Rect::union_all(nodes.iter().map(|n| n.world));
        let start_bounds = match (mode, bounds) {
            (DragMode::Marquee, b) => b.unwrap_or_default(),
            (_, Some(b)) => b,
            (_, None) => return false,
        };
        log::debug!("drag begin {mode:?} at ({x}, {y}) with {} node(s)", nodes.len());
        let origin = Point::new(x, y);
        self.state = Some(DragState {
            mode,
            origin,
            current: origin,
            nodes,
            start_bounds,
            started: false,
            axis_lock: None,
            last: Vec::new(),
        });
        true
    }

    /// Feed a pointer position. Returns `None` when no gesture is active.
    pub fn update(
        &mut self,
        x: f32,
        y: f32,
        modifiers: Modifiers,
        snap: Option<SnapFn<'_>>,
    ) -> Option<DragFrame> {
        let threshold = self.config.threshold_px / self.zoom.max(f32::EPSILON);
        let config = self.config;
        let state = self.state.as_mut()?;
        state.current = Point::new(x, y);

        let phase = if state.started {
            DragPhase::Dragging
        } else if state.origin.distance_to(state.current) >= threshold {
            state.started = true;
            DragPhase::Started
        } else {
            return Some(DragFrame {
                phase: DragPhase::Pending,
                mode: state.mode,
                transforms: Vec::new(),
                marquee: None,
            });
        };

        let transforms = match state.mode {
            DragMode::None => Vec::new(),
            DragMode::Move => move_nodes(state, modifiers, snap),
            DragMode::Resize { handle } => resize_nodes(state, handle, modifiers, snap, &config),
            DragMode::Rotate => rotate_nodes(state, modifiers, &config),
            DragMode::Marquee => Vec::new(),
        };
        state.last.clone_from(&transforms);
        let marquee = (state.mode == DragMode::Marquee)
            .then(|| Rect::from_corners(state.origin, state.current));
        log::trace!("drag {:?} {phase:?} → ({x}, {y})", state.mode);
        Some(DragFrame {
            phase,
            mode: state.mode,
            transforms,
            marquee,
        })
    }

    /// Finish the gesture at `(x, y)`. When the pointer hasn't moved since
    /// the last `update`, that frame (snapped as it was) is final and `snap`
    /// is not consulted.
    pub fn end(&mut self, x: f32, y: f32, modifiers: Modifiers, snap: Option<SnapFn<'_>>) -> DragOutcome {
        let Some(state) = self.state.as_ref() else {
            return DragOutcome::None;
        };
        if !state.started || state.current != Point::new(x, y) {
            self.update(x, y, modifiers, snap);
        }
        let Some(state) = self.state.take() else {
            return DragOutcome::None;
        };
        log::debug!("drag end {:?} (started: {})", state.mode, state.started);
        if !state.started {
            return DragOutcome::Click {
                at: state.origin,
                modifiers,
            };
        }
        match state.mode {
            DragMode::Marquee => DragOutcome::Marquee {
                rect: Rect::from_corners(state.origin, state.current),
                modifiers,
            },
            DragMode::None => DragOutcome::None,
            mode => DragOutcome::Transformed {
                mode,
                before: state.nodes,
                after: state.last,
            },
        }
    }

    /// Abort the gesture. Returns the start snapshot so the caller can
    /// restore live-applied geometry.
    pub fn cancel(&mut self) -> Vec<NodeSnapshot> {
        match self.state.take() {
            Some(state) => {
                log::debug!("drag cancelled ({:?})", state.mode);
                state.nodes
            }
            None => Vec::new(),
        }
    }
}

// ─── Move ────────────────────────────────────────────────────────────────

fn move_nodes(state: &mut DragState, modifiers: Modifiers, snap: Option<SnapFn<'_>>) -> Vec<NodeTransform> {
    let mut dx = state.current.x - state.origin.x;
    let mut dy = state.current.y - state.origin.y;

    if modifiers.shift {
        let axis = *state.axis_lock.get_or_insert(if dx.abs() >= dy.abs() {
            Axis::Horizontal
        } else {
            Axis::Vertical
        });
        match axis {
            Axis::Horizontal => dy = 0.0,
            Axis::Vertical => dx = 0.0,
        }
    }

    if let Some(snap) = snap {
        let proposed = state.start_bounds.translated(dx, dy);
        let snapped = snap(proposed);
        let locked = modifiers.shift.then_some(state.axis_lock).flatten();
        if locked != Some(Axis::Vertical) {
            dx += snapped.x - proposed.x;
        }
        if locked != Some(Axis::Horizontal) {
            dy += snapped.y - proposed.y;
        }
    }

    state
        .nodes
        .iter()
        .map(|n| NodeTransform {
            id: n.id,
            geometry: Geometry {
                x: n.local.x + dx,
                y: n.local.y + dy,
                ..n.local
            },
        })
        .collect()
}

// ─── Resize ──────────────────────────────────────────────────────────────

/// New selection bounds for a handle drag of `(dx, dy)` from `start`.
pub fn resize_bounds(
    start: Rect,
    handle: HandlePosition,
    dx: f32,
    dy: f32,
    modifiers: Modifiers,
    min_size: f32,
) -> Rect {
    let (hx, hy) = handle.direction();
    let (hx, hy) = (hx as f32, hy as f32);
    let (dx, dy) = if modifiers.alt { (dx * 2.0, dy * 2.0) } else { (dx, dy) };

    let mut w = start.width + hx * dx;
    let mut h = start.height + hy * dy;

    let aspect_edge_x = modifiers.shift && hx == 0.0;
    let aspect_edge_y = modifiers.shift && hy == 0.0;
    if modifiers.shift && start.width > 0.0 && start.height > 0.0 {
        let ratio = start.width / start.height;
        if handle.is_corner() {
            let sx = w / start.width;
            let sy = h / start.height;
            if (sx - 1.0).abs() >= (sy - 1.0).abs() {
                h = w / ratio;
            } else {
                w = h * ratio;
            }
        } else if hx != 0.0 {
            h = w / ratio;
        } else {
            w = h * ratio;
        }
    }

    let w = w.max(min_size);
    let h = h.max(min_size);
    let center = start.center();

    let place = |d: f32, start_pos: f32, start_extent: f32, extent: f32, centered: bool, mid: f32| {
        if modifiers.alt || centered {
            mid - extent / 2.0
        } else if d < 0.0 {
            start_pos + start_extent - extent
        } else {
            start_pos
        }
    };
    Rect::new(
        place(hx, start.x, start.width, w, aspect_edge_x, center.x),
        place(hy, start.y, start.height, h, aspect_edge_y, center.y),
        w,
        h,
    )
}

fn resize_nodes(
    state: &DragState,
    handle: HandlePosition,
    modifiers: Modifiers,
    snap: Option<SnapFn<'_>>,
    config: &DragConfig,
) -> Vec<NodeTransform> {
    let mut dx = state.current.x - state.origin.x;
    let mut dy = state.current.y - state.origin.y;
    if let Some(snap) = snap {
        let anchor = handle.anchor(&state.start_bounds);
        let proposed = Point::new(anchor.x + dx, anchor.y + dy);
        let snapped = snap(Rect::new(proposed.x, proposed.y, 0.0, 0.0));
        let (hx, hy) = handle.direction();
        if hx != 0 {
            dx += snapped.x - proposed.x;
        }
        if hy != 0 {
            dy += snapped.y - proposed.y;
        }
    }

    let b = state.start_bounds;
    let nb = resize_bounds(b, handle, dx, dy, modifiers, config.min_size);
    let sx = if b.width > 0.0 { nb.width / b.width } else { 1.0 };
    let sy = if b.height > 0.0 { nb.height / b.height } else { 1.0 };

    state
        .nodes
        .iter()
        .map(|n| {
            let wx = nb.x + (n.world.x - b.x) * sx;
            let wy = nb.y + (n.world.y - b.y) * sy;
            NodeTransform {
                id: n.id,
                geometry: Geometry {
                    x: n.local.x + (wx - n.world.x),
                    y: n.local.y + (wy - n.world.y),
                    width: (n.local.width * sx).max(config.min_size),
                    height: (n.local.height * sy).max(config.min_size),
                    rotation: n.local.rotation,
                },
            }
        })
        .collect()
}

// ─── Rotate ──────────────────────────────────────────────────────────────

/// Normalize degrees into (-180, 180].
pub fn normalize_degrees(deg: f32) -> f32 {
    let d = deg.rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

fn rotate_nodes(state: &DragState, modifiers: Modifiers, config: &DragConfig) -> Vec<NodeTransform> {
    let c = state.start_bounds.center();
    let a0 = (state.origin.y - c.y).atan2(state.origin.x - c.x);
    let a1 = (state.current.y - c.y).atan2(state.current.x - c.x);
    let mut delta = (a1 - a0).to_degrees();
    if modifiers.shift && config.rotation_step_deg > 0.0 {
        delta = (delta / config.rotation_step_deg).round() * config.rotation_step_deg;
    }
    let (sin, cos) = delta.to_radians().sin_cos();

    state
        .nodes
        .iter()
        .map(|n| {
            let nc = n.world.center();
            let (rx, ry) = (nc.x - c.x, nc.y - c.y);
            let new_cx = c.x + rx * cos - ry * sin;
            let new_cy = c.y + rx * sin + ry * cos;
            NodeTransform {
                id: n.id,
                geometry: Geometry {
                    x: n.local.x + (new_cx - nc.x),
                    y: n.local.y + (new_cy - nc.y),
                    rotation: normalize_degrees(n.local.rotation + delta),
                    ..n.local
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: &str, x: f32, y: f32, w: f32, h: f32) -> NodeSnapshot {
        NodeSnapshot {
            id: NodeId::intern(name),
            local: Geometry::new(x, y, w, h),
            world: Rect::new(x, y, w, h),
        }
    }

    fn manager() -> DragManager {
        DragManager::new(DragConfig::default())
    }

    #[test]
    fn below_threshold_is_click() {
        let mut d = manager();
        d.begin(DragMode::Move, 10.0, 10.0, vec![snapshot("dr_click", 0.0, 0.0, 50.0, 50.0)]);
        let f = d.update(11.0, 11.0, Modifiers::NONE, None).unwrap();
        assert_eq!(f.phase, DragPhase::Pending);
        assert!(f.transforms.is_empty());
        assert!(matches!(d.end(11.5, 10.0, Modifiers::NONE, None), DragOutcome::Click { .. }));
        assert!(!d.is_active());
    }

    #[test]
    fn move_applies_delta_to_local() {
        let mut d = manager();
        d.begin(DragMode::Move, 10.0, 10.0, vec![snapshot("dr_move", 5.0, 5.0, 50.0, 50.0)]);
        let f = d.update(30.0, 15.0, Modifiers::NONE, None).unwrap();
        assert_eq!(f.phase, DragPhase::Started);
        assert_eq!((f.transforms[0].geometry.x, f.transforms[0].geometry.y), (25.0, 10.0));
        let f = d.update(40.0, 40.0, Modifiers::NONE, None).unwrap();
        assert_eq!(f.phase, DragPhase::Dragging);
        assert_eq!((f.transforms[0].geometry.x, f.transforms[0].geometry.y), (35.0, 35.0));
    }

    #[test]
    fn shift_axis_lock_is_decided_once() {
        let mut d = manager();
        d.begin(DragMode::Move, 0.0, 0.0, vec![snapshot("dr_lock", 0.0, 0.0, 10.0, 10.0)]);
        let f = d.update(20.0, 5.0, Modifiers::SHIFT, None).unwrap();
        assert_eq!((f.transforms[0].geometry.x, f.transforms[0].geometry.y), (20.0, 0.0));
        // Now mostly vertical, but the lock stays horizontal.
        let f = d.update(21.0, 80.0, Modifiers::SHIFT, None).unwrap();
        assert_eq!((f.transforms[0].geometry.x, f.transforms[0].geometry.y), (21.0, 0.0));
    }

    #[test]
    fn resize_corner_floor_keeps_opposite_edge() {
        let b = Rect::new(100.0, 100.0, 50.0, 50.0);
        let r = resize_bounds(b, HandlePosition::TopLeft, 200.0, 200.0, Modifiers::NONE, 1.0);
        assert_eq!(r, Rect::new(149.0, 149.0, 1.0, 1.0));
    }

    #[test]
    fn resize_alt_scales_from_center() {
        let b = Rect::new(0.0, 0.0, 100.0, 100.0);
        let r = resize_bounds(b, HandlePosition::Right, 10.0, 0.0, Modifiers::ALT, 1.0);
        assert_eq!(r, Rect::new(-10.0, 0.0, 120.0, 100.0));
    }

    #[test]
    fn resize_shift_corner_keeps_ratio() {
        let b = Rect::new(0.0, 0.0, 200.0, 100.0);
        let r = resize_bounds(b, HandlePosition::BottomRight, 100.0, 10.0, Modifiers::SHIFT, 1.0);
        assert_eq!(r, Rect::new(0.0, 0.0, 300.0, 150.0));
    }

    #[test]
    fn resize_shift_edge_derives_perpendicular() {
        let b = Rect::new(0.0, 0.0, 200.0, 100.0);
        let r = resize_bounds(b, HandlePosition::Bottom, 0.0, 50.0, Modifiers::SHIFT, 1.0);
        // Height 150 → width 300, centered horizontally.
        assert_eq!(r, Rect::new(-50.0, 0.0, 300.0, 150.0));
    }

    #[test]
    fn resize_scales_every_node_within_bounds() {
        let mut d = manager();
        d.begin(
            DragMode::Resize {
                handle: HandlePosition::Right,
            },
            200.0,
            50.0,
            vec![
                snapshot("dr_rs_a", 0.0, 0.0, 100.0, 100.0),
                snapshot("dr_rs_b", 100.0, 0.0, 100.0, 100.0),
            ],
        );
        let f = d.update(400.0, 50.0, Modifiers::NONE, None).unwrap();
        let b = f.transforms[1].geometry;
        assert_eq!((b.x, b.width), (200.0, 200.0));
    }

    #[test]
    fn shrinking_a_group_floors_each_node() {
        let mut d = manager();
        d.begin(
            DragMode::Resize {
                handle: HandlePosition::Left,
            },
            0.0,
            50.0,
            vec![
                snapshot("dr_floor_a", 0.0, 0.0, 100.0, 100.0),
                snapshot("dr_floor_b", 100.0, 0.0, 2.0, 100.0),
            ],
        );
        let f = d.update(200.0, 50.0, Modifiers::NONE, None).unwrap();
        assert_eq!(f.transforms[0].geometry.width, 1.0);
        assert_eq!(f.transforms[1].geometry.width, 1.0);
        assert_eq!(f.transforms[1].geometry.height, 100.0);
    }

    #[test]
    fn end_keeps_the_last_snapped_frame() {
        let mut d = manager();
        d.begin(DragMode::Move, 10.0, 10.0, vec![snapshot("dr_end_snap", 0.0, 0.0, 50.0, 50.0)]);
        let to_twenty = |r: Rect| Point::new(20.0, r.y);
        let snap: SnapFn<'_> = &to_twenty;
        let f = d.update(33.0, 10.0, Modifiers::NONE, Some(snap)).unwrap();
        assert_eq!(f.transforms[0].geometry.x, 20.0);

        match d.end(33.0, 10.0, Modifiers::NONE, None) {
            DragOutcome::Transformed { after, .. } => assert_eq!(after[0].geometry.x, 20.0),
            other => panic!("expected transform, got {other:?}"),
        }
    }

    #[test]
    fn rotate_snaps_to_step() {
        let mut d = manager();
        d.begin(DragMode::Rotate, 100.0, 50.0, vec![snapshot("dr_rot", 0.0, 0.0, 100.0, 100.0)]);
        // From 0° (east of center) to roughly 50°.
        let a = 50f32.to_radians();
        let f = d
            .update(50.0 + 50.0 * a.cos(), 50.0 + 50.0 * a.sin(), Modifiers::SHIFT, None)
            .unwrap();
        let rot = f.transforms[0].geometry.rotation;
        assert!((rot - 45.0).abs() < 0.01, "expected 45°, got {rot}");
    }

    #[test]
    fn marquee_is_normalized() {
        let mut d = manager();
        d.begin(DragMode::Marquee, 50.0, 50.0, Vec::new());
        d.update(10.0, 20.0, Modifiers::NONE, None);
        assert_eq!(d.marquee_rect(), Some(Rect::new(10.0, 20.0, 40.0, 30.0)));
        match d.end(10.0, 20.0, Modifiers::NONE, None) {
            DragOutcome::Marquee { rect, .. } => assert_eq!(rect, Rect::new(10.0, 20.0, 40.0, 30.0)),
            other => panic!("expected marquee, got {other:?}"),
        }
    }

    #[test]
    fn cancel_returns_snapshot() {
        let mut d = manager();
        d.begin(DragMode::Move, 0.0, 0.0, vec![snapshot("dr_cancel", 3.0, 4.0, 10.0, 10.0)]);
        d.update(50.0, 50.0, Modifiers::NONE, None);
        let snap = d.cancel();
        assert_eq!(snap[0].local.x, 3.0);
        assert!(!d.is_active());
    }
}
