//! Selection state: selected ids, hover, combined bounds and resize handles.
//!
//! Bounds are always computed from the current `LayoutTree`, never cached.

use frame_core::geometry::{Point, Rect};
use frame_core::id::NodeId;
use frame_core::layout::LayoutTree;
use serde::{Deserialize, Serialize};

/// On-screen handle size in px; divided by zoom to get world size.
pub const HANDLE_SIZE: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectOptions {
    /// Add to the selection instead of replacing it.
    pub multi_select: bool,
    /// Remove the node if already selected.
    pub toggle: bool,
}

impl SelectOptions {
    pub const REPLACE: SelectOptions = SelectOptions {
        multi_select: false,
        toggle: false,
    };
    pub const ADD: SelectOptions = SelectOptions {
        multi_select: true,
        toggle: false,
    };
    pub const TOGGLE: SelectOptions = SelectOptions {
        multi_select: true,
        toggle: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SelectionRotation {
    /// Exactly one node selected: its rotation in degrees.
    Single(f32),
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionBounds {
    /// Union of the selected nodes' world rects.
    pub rect: Rect,
    pub rotation: SelectionRotation,
}

impl SelectionBounds {
    pub fn rotation_degrees(&self) -> f32 {
        match self.rotation {
            SelectionRotation::Single(r) => r,
            SelectionRotation::Mixed => 0.0,
        }
    }
}

/// The eight resize handles, clockwise from top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlePosition {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl HandlePosition {
    pub const ALL: [HandlePosition; 8] = [
        HandlePosition::TopLeft,
        HandlePosition::Top,
        HandlePosition::TopRight,
        HandlePosition::Right,
        HandlePosition::BottomRight,
        HandlePosition::Bottom,
        HandlePosition::BottomLeft,
        HandlePosition::Left,
    ];

    pub fn is_corner(self) -> bool {
        matches!(
            self,
            HandlePosition::TopLeft
                | HandlePosition::TopRight
                | HandlePosition::BottomRight
                | HandlePosition::BottomLeft
        )
    }

    /// Which edges the handle moves: -1 = left/top, 1 = right/bottom, 0 = none.
    pub fn direction(self) -> (i8, i8) {
        match self {
            HandlePosition::TopLeft => (-1, -1),
            HandlePosition::Top => (0, -1),
            HandlePosition::TopRight => (1, -1),
            HandlePosition::Right => (1, 0),
            HandlePosition::BottomRight => (1, 1),
            HandlePosition::Bottom => (0, 1),
            HandlePosition::BottomLeft => (-1, 1),
            HandlePosition::Left => (-1, 0),
        }
    }

    /// Point of `rect` this handle sits on.
    pub fn anchor(self, rect: &Rect) -> Point {
        let (dx, dy) = self.direction();
        let pick = |d: i8, start: f32, extent: f32| match d {
            -1 => start,
            0 => start + extent / 2.0,
            _ => start + extent,
        };
        Point::new(
            pick(dx, rect.x, rect.width),
            pick(dy, rect.y, rect.height),
        )
    }

    fn index(self) -> usize {
        HandlePosition::ALL
            .iter()
            .position(|h| *h == self)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorKind {
    NwseResize,
    NsResize,
    NeswResize,
    EwResize,
}

const BASE_CURSORS: [CursorKind; 8] = [
    CursorKind::NwseResize,
    CursorKind::NsResize,
    CursorKind::NeswResize,
    CursorKind::EwResize,
    CursorKind::NwseResize,
    CursorKind::NsResize,
    CursorKind::NeswResize,
    CursorKind::EwResize,
];

/// Cursor for a handle on a selection rotated by `rotation` degrees.
pub fn handle_cursor(handle: HandlePosition, rotation: f32) -> CursorKind {
    let steps = (rotation / 45.0).round() as i64;
    let i = (handle.index() as i64 + steps).rem_euclid(8) as usize;
    BASE_CURSORS[i]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    pub position: HandlePosition,
    pub center: Point,
    /// Hit area in world units.
    pub rect: Rect,
    pub cursor: CursorKind,
}

/// Selected ids (in selection order) plus the hovered node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    selected: Vec<NodeId>,
    hover: Option<NodeId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.selected
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn is_selected(&self, id: NodeId) -> bool {
        self.selected.contains(&id)
    }

    pub fn hover(&self) -> Option<NodeId> {
        self.hover
    }

    pub fn set_hover(&mut self, id: Option<NodeId>) {
        self.hover = id;
    }

    /// Select a node. Locked, hidden or unknown nodes are ignored.
    /// Returns true if the selection changed.
    pub fn select(&mut self, id: NodeId, options: SelectOptions, layout: &LayoutTree) -> bool {
        if !layout.get(id).is_some_and(|n| n.is_selectable()) {
            return false;
        }
        let present = self.is_selected(id);
        if options.toggle && present {
            self.selected.retain(|s| *s != id);
            return true;
        }
        if options.multi_select || options.toggle {
            if present {
                return false;
            }
            self.selected.push(id);
            return true;
        }
        if self.selected == [id] {
            return false;
        }
        self.selected.clear();
        self.selected.push(id);
        true
    }

    pub fn deselect(&mut self, id: NodeId) -> bool {
        let before = self.selected.len();
        self.selected.retain(|s| *s != id);
        before != self.selected.len()
    }

    pub fn clear(&mut self) -> bool {
        let had = !self.selected.is_empty();
        self.selected.clear();
        had
    }

    /// Replace the selection with an explicit list, filtered to selectable nodes.
    pub fn set(&mut self, ids: &[NodeId], layout: &LayoutTree) {
        self.selected.clear();
        for id in ids {
            if !self.selected.contains(id) && layout.get(*id).is_some_and(|n| n.is_selectable()) {
                self.selected.push(*id);
            }
        }
    }

    /// Select every selectable top-level node.
    pub fn select_all(&mut self, layout: &LayoutTree) -> usize {
        let roots = layout.roots.clone();
        self.set(&roots, layout);
        self.selected.len()
    }

    /// Drop ids that no longer resolve or became locked/hidden.
    pub fn prune(&mut self, layout: &LayoutTree) -> bool {
        let before = self.selected.len();
        self.selected
            .retain(|id| layout.get(*id).is_some_and(|n| n.is_selectable()));
        if self.hover.is_some_and(|h| !layout.contains(h)) {
            self.hover = None;
        }
        before != self.selected.len()
    }

    /// Union bounds of the selection, `None` when empty.
    pub fn bounds(&self, layout: &LayoutTree) -> Option<SelectionBounds> {
        let rect = Rect::union_all(self.selected.iter().filter_map(|id| layout.world_rect(*id)))?;
        let rotation = match self.selected.as_slice() {
            [only] => SelectionRotation::Single(layout.get(*only).map_or(0.0, |n| n.rotation)),
            _ => SelectionRotation::Mixed,
        };
        Some(SelectionBounds { rect, rotation })
    }

    /// The eight handles around the selection bounds, clockwise from
    /// top-left. `scale` is the viewport zoom.
    pub fn handle_positions(&self, layout: &LayoutTree, scale: f32) -> Vec<Handle> {
        let Some(bounds) = self.bounds(layout) else {
            return Vec::new();
        };
        let size = HANDLE_SIZE / scale.max(f32::EPSILON);
        let rotation = bounds.rotation_degrees();
        HandlePosition::ALL
            .iter()
            .map(|&position| {
                let center = position.anchor(&bounds.rect);
                Handle {
                    position,
                    center,
                    rect: Rect::new(center.x - size / 2.0, center.y - size / 2.0, size, size),
                    cursor: handle_cursor(position, rotation),
                }
            })
            .collect()
    }

    /// Handle under a world point, if any.
    pub fn handle_at(&self, layout: &LayoutTree, scale: f32, x: f32, y: f32) -> Option<HandlePosition> {
        self.handle_positions(layout, scale)
            .into_iter()
            .find(|h| h.rect.contains(x, y))
            .map(|h| h.position)
    }

    /// Topmost selectable node at a point.
    pub fn hit_test(&self, layout: &LayoutTree, x: f32, y: f32) -> Option<NodeId> {
        layout.hit_test(x, y)
    }

    /// Topmost node at a point, lifted to its top-level ancestor. This is
    /// what a plain click selects.
    pub fn hit_test_top_level(&self, layout: &LayoutTree, x: f32, y: f32) -> Option<NodeId> {
        let mut id = layout.hit_test(x, y)?;
        while let Some(parent) = layout.parent_of(id) {
            if !layout.get(parent).is_some_and(|n| n.is_selectable()) {
                break;
            }
            id = parent;
        }
        Some(id)
    }

    /// Select one level deeper under the point on each call, wrapping back
    /// to the shallowest candidate after the deepest.
    pub fn deep_select_at(&mut self, x: f32, y: f32, layout: &LayoutTree) -> Option<NodeId> {
        let mut candidates: Vec<_> = layout
            .nodes_at(x, y)
            .into_iter()
            .filter(|n| n.is_selectable())
            .collect();
        if candidates.is_empty() {
            return None;
        }
        // Deepest first; frontmost first within a depth.
        candidates.sort_by(|a, b| b.depth.cmp(&a.depth).then(b.z_index.cmp(&a.z_index)));

        let last = candidates.len() - 1;
        let current = match self.selected.as_slice() {
            [only] => candidates.iter().position(|n| n.id == *only),
            _ => None,
        };
        let pick = match current {
            None => last,
            Some(0) => last,
            Some(i) => i - 1,
        };
        let id = candidates[pick].id;
        self.selected.clear();
        self.selected.push(id);
        Some(id)
    }

    /// Select nodes touched by `rect`. Containers that fully enclose the
    /// marquee are descended into instead of selected. With `multi` the hits
    /// are added to the current selection.
    pub fn select_in_marquee(&mut self, rect: Rect, multi: bool, layout: &LayoutTree) -> usize {
        if !multi {
            self.selected.clear();
        }
        let mut hits = Vec::new();
        let mut stack: Vec<NodeId> = layout.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = layout.get(id) else {
                continue;
            };
            if !node.is_selectable() {
                continue;
            }
            let r = node.world_rect();
            if !r.intersects(&rect) {
                continue;
            }
            let encloses = r.x <= rect.x
                && r.y <= rect.y
                && r.right() >= rect.right()
                && r.bottom() >= rect.bottom();
            if encloses && !node.children.is_empty() {
                stack.extend(node.children.iter().rev().copied());
            } else {
                hits.push(id);
            }
        }
        let mut added = 0;
        for id in hits {
            if !self.selected.contains(&id) {
                self.selected.push(id);
                added += 1;
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_core::layout::{ResolveConfig, resolve_layout};
    use frame_core::model::*;

    fn scene() -> LayoutTree {
        let mut graph = SceneGraph::new();
        graph.add_node(
            graph.root,
            SceneNode::rectangle(NodeId::intern("sel_a")).with_geometry(0.0, 0.0, 100.0, 100.0),
        );
        graph.add_node(
            graph.root,
            SceneNode::rectangle(NodeId::intern("sel_b")).with_geometry(200.0, 0.0, 100.0, 100.0),
        );
        let mut locked =
            SceneNode::rectangle(NodeId::intern("sel_locked")).with_geometry(0.0, 200.0, 50.0, 50.0);
        locked.locked = true;
        graph.add_node(graph.root, locked);
        resolve_layout(&graph, &ResolveConfig::default())
    }

    #[test]
    fn union_bounds() {
        let layout = scene();
        let mut sel = Selection::new();
        sel.select(NodeId::intern("sel_a"), SelectOptions::REPLACE, &layout);
        sel.select(NodeId::intern("sel_b"), SelectOptions::ADD, &layout);
        let b = sel.bounds(&layout).unwrap();
        assert_eq!(b.rect, Rect::new(0.0, 0.0, 300.0, 100.0));
        assert_eq!(b.rotation, SelectionRotation::Mixed);
    }

    #[test]
    fn empty_selection_has_no_bounds() {
        let layout = scene();
        let sel = Selection::new();
        assert!(sel.bounds(&layout).is_none());
        assert!(sel.handle_positions(&layout, 1.0).is_empty());
    }

    #[test]
    fn locked_nodes_are_ignored() {
        let layout = scene();
        let mut sel = Selection::new();
        assert!(!sel.select(NodeId::intern("sel_locked"), SelectOptions::REPLACE, &layout));
        assert!(sel.is_empty());
        sel.select_in_marquee(Rect::new(-10.0, -10.0, 400.0, 400.0), false, &layout);
        assert_eq!(sel.ids(), &[NodeId::intern("sel_a"), NodeId::intern("sel_b")]);
    }

    #[test]
    fn toggle_removes() {
        let layout = scene();
        let mut sel = Selection::new();
        sel.select(NodeId::intern("sel_a"), SelectOptions::REPLACE, &layout);
        assert!(sel.select(NodeId::intern("sel_a"), SelectOptions::TOGGLE, &layout));
        assert!(sel.is_empty());
    }

    #[test]
    fn handles_scale_with_zoom() {
        let layout = scene();
        let mut sel = Selection::new();
        sel.select(NodeId::intern("sel_a"), SelectOptions::REPLACE, &layout);
        let handles = sel.handle_positions(&layout, 2.0);
        assert_eq!(handles.len(), 8);
        assert_eq!(handles[0].center, Point::new(0.0, 0.0));
        assert_eq!(handles[3].center, Point::new(100.0, 50.0));
        assert_eq!(handles[0].rect.width, 4.0);
        assert_eq!(handles[0].cursor, CursorKind::NwseResize);
    }

    #[test]
    fn cursor_rotates_in_45_degree_steps() {
        assert_eq!(handle_cursor(HandlePosition::Top, 0.0), CursorKind::NsResize);
        assert_eq!(handle_cursor(HandlePosition::Top, 45.0), CursorKind::NeswResize);
        assert_eq!(handle_cursor(HandlePosition::Top, 90.0), CursorKind::EwResize);
        assert_eq!(handle_cursor(HandlePosition::Top, -45.0), CursorKind::NwseResize);
        assert_eq!(handle_cursor(HandlePosition::Left, 20.0), CursorKind::EwResize);
    }
}
