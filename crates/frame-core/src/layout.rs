//! Layout resolver.
//!
//! Walks the scene graph depth-first and derives world-space geometry:
//! top-level nodes use their local position as world position, every other
//! node sits at `parent world + local`. A second pass applies main-axis
//! distribution and cross-axis alignment for auto-layout containers, moving
//! whole subtrees by the resulting offsets.
//!
//! The result is a `LayoutTree`, rebuilt from scratch on each pass and
//! read-only for consumers.

use crate::autolayout::{cross_offset, distribute_main_axis};
use crate::geometry::{Axis, Point, Rect, Size};
use crate::id::NodeId;
use crate::model::*;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What to do with local coordinates that look like leaked world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CorruptionPolicy {
    /// Report a `CoordinateWarning`, keep `parent + local`.
    #[default]
    Flag,
    /// Report, and use the local coordinates as world coordinates.
    TreatAsWorld,
}

/// How `Stretch` cross alignment is realized in derived geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StretchPolicy {
    /// Widen the derived cross extent to the container's inner extent.
    #[default]
    Resize,
    /// Keep the child's size and center it.
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolveConfig {
    pub corruption_policy: CorruptionPolicy,
    pub stretch: StretchPolicy,
}

/// A node whose local position falls outside the plausible range for its parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateWarning {
    pub id: NodeId,
    pub parent: NodeId,
    pub local: Point,
    pub parent_size: Size,
}

/// Derived per-node geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub local: Point,
    pub world_x: f32,
    pub world_y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    /// Paint order across the whole document (0 = back-most).
    pub z_index: usize,
    /// Top-level nodes are depth 0.
    pub depth: usize,
    /// Effective, inherited from ancestors.
    pub locked: bool,
    /// Effective, inherited from ancestors.
    pub visible: bool,
    /// One past the last descendant in `LayoutTree::nodes`.
    subtree_end: usize,
}

impl LayoutNode {
    pub fn world_rect(&self) -> Rect {
        Rect::new(self.world_x, self.world_y, self.width, self.height)
    }

    pub fn is_selectable(&self) -> bool {
        self.visible && !self.locked
    }
}

/// Output of a resolve pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutTree {
    /// Depth-first, parent-before-children, paint order.
    pub nodes: Vec<LayoutNode>,
    pub roots: Vec<NodeId>,
    pub warnings: Vec<CoordinateWarning>,
    index: HashMap<NodeId, usize>,
    parents: HashMap<NodeId, NodeId>,
}

impl LayoutTree {
    pub fn get(&self, id: NodeId) -> Option<&LayoutNode> {
        self.index.get(&id).map(|i| &self.nodes[*i])
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    pub fn world_rect(&self, id: NodeId) -> Option<Rect> {
        self.get(id).map(LayoutNode::world_rect)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayoutNode> {
        self.nodes.iter()
    }

    /// The node's descendants, depth-first.
    pub fn descendants(&self, id: NodeId) -> &[LayoutNode] {
        match self.index.get(&id) {
            Some(&i) => &self.nodes[i + 1..self.nodes[i].subtree_end],
            None => &[],
        }
    }

    /// World rects of a node's siblings (excluding itself).
    pub fn sibling_rects(&self, id: NodeId) -> Vec<(NodeId, Rect)> {
        let siblings: &[NodeId] = match self.parent_of(id) {
            Some(p) => self.get(p).map(|n| n.children.as_slice()).unwrap_or(&[]),
            None => &self.roots,
        };
        siblings
            .iter()
            .filter(|s| **s != id)
            .filter_map(|s| self.world_rect(*s).map(|r| (*s, r)))
            .collect()
    }

    /// Every visible node whose world rect contains the point, in paint order.
    pub fn nodes_at(&self, x: f32, y: f32) -> Vec<&LayoutNode> {
        self.nodes
            .iter()
            .filter(|n| n.visible && n.world_rect().contains(x, y))
            .collect()
    }

    /// Topmost selectable node at a point.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<NodeId> {
        self.nodes
            .iter()
            .rev()
            .find(|n| n.is_selectable() && n.world_rect().contains(x, y))
            .map(|n| n.id)
    }

    fn shift_subtree(&mut self, i: usize, dx: f32, dy: f32) {
        let end = self.nodes[i].subtree_end;
        for n in &mut self.nodes[i..end] {
            n.world_x += dx;
            n.world_y += dy;
        }
    }
}

/// Resolve world geometry for the whole document.
pub fn resolve_layout(graph: &SceneGraph, config: &ResolveConfig) -> LayoutTree {
    let mut tree = LayoutTree::default();
    for &root in graph.top_level() {
        tree.roots.push(graph.node(root).id);
        resolve_node(graph, root, None, 0, &mut tree, config);
    }
    align_containers(graph, &mut tree, config);

    if !tree.warnings.is_empty() {
        log::warn!(
            "layout: {} node(s) with suspicious local coordinates",
            tree.warnings.len()
        );
    }
    tree
}

fn resolve_node(
    graph: &SceneGraph,
    idx: NodeIndex,
    parent: Option<usize>,
    depth: usize,
    tree: &mut LayoutTree,
    config: &ResolveConfig,
) {
    let node = graph.node(idx);
    let geo = node.geometry;
    let local = Point::new(geo.x, geo.y);

    let (world_x, world_y, locked, visible, parent_id) = match parent {
        None => (geo.x, geo.y, node.locked, node.visible, None),
        Some(p) => {
            let pn = &tree.nodes[p];
            let parent_size = Size::new(pn.width, pn.height);
            let (mut wx, mut wy) = (pn.world_x + geo.x, pn.world_y + geo.y);
            if looks_corrupted(local, parent_size) {
                log::warn!(
                    "layout: {} local ({}, {}) outside parent {} ({}×{})",
                    node.id,
                    geo.x,
                    geo.y,
                    pn.id,
                    pn.width,
                    pn.height
                );
                tree.warnings.push(CoordinateWarning {
                    id: node.id,
                    parent: pn.id,
                    local,
                    parent_size,
                });
                if config.corruption_policy == CorruptionPolicy::TreatAsWorld {
                    wx = geo.x;
                    wy = geo.y;
                }
            }
            (
                wx,
                wy,
                pn.locked || node.locked,
                pn.visible && node.visible,
                Some(pn.id),
            )
        }
    };

    let i = tree.nodes.len();
    tree.index.insert(node.id, i);
    if let Some(pid) = parent_id {
        tree.parents.insert(node.id, pid);
    }
    tree.nodes.push(LayoutNode {
        id: node.id,
        parent: parent_id,
        children: graph
            .children(idx)
            .iter()
            .map(|c| graph.node(*c).id)
            .collect(),
        local,
        world_x,
        world_y,
        width: geo.width,
        height: geo.height,
        rotation: geo.rotation,
        z_index: i,
        depth,
        locked,
        visible,
        subtree_end: i + 1,
    });

    for &child in graph.children(idx) {
        resolve_node(graph, child, Some(i), depth + 1, tree, config);
    }
    tree.nodes[i].subtree_end = tree.nodes.len();
}

/// Local offset larger than twice the parent extent, or negative by more
/// than the parent extent.
fn looks_corrupted(local: Point, parent: Size) -> bool {
    let axis_bad = |v: f32, extent: f32| v > 2.0 * extent || v < -extent;
    (parent.width > 0.0 && axis_bad(local.x, parent.width))
        || (parent.height > 0.0 && axis_bad(local.y, parent.height))
}

/// Second pass: distribute and align flow children of every auto-layout
/// container, parents first so offsets cascade downward.
fn align_containers(graph: &SceneGraph, tree: &mut LayoutTree, config: &ResolveConfig) {
    for i in 0..tree.nodes.len() {
        let id = tree.nodes[i].id;
        let Some(node) = graph.get_by_id(id) else {
            continue;
        };
        let Some(layout) = node.kind.auto_layout().copied() else {
            continue;
        };
        let Some(main) = layout.mode.axis() else {
            continue;
        };
        // Wrapped containers are positioned by the engine.
        if layout.wrap {
            continue;
        }
        align_children(graph, tree, i, &layout, main, config);
    }
}

fn align_children(
    graph: &SceneGraph,
    tree: &mut LayoutTree,
    i: usize,
    layout: &AutoLayout,
    main: Axis,
    config: &ResolveConfig,
) {
    let cross = main.cross();
    let container = tree.nodes[i].world_rect();
    let pad = layout.padding;

    let flow: Vec<usize> = tree.nodes[i]
        .children
        .iter()
        .filter(|c| {
            graph
                .get_by_id(**c)
                .is_some_and(|n| n.child_layout.positioning == Positioning::Auto)
        })
        .filter_map(|c| tree.index.get(c).copied())
        .collect();
    if flow.is_empty() {
        return;
    }

    let extent = |n: &LayoutNode, axis: Axis| match axis {
        Axis::Horizontal => n.width,
        Axis::Vertical => n.height,
    };
    let used: f32 = flow.iter().map(|c| extent(&tree.nodes[*c], main)).sum::<f32>()
        + layout.item_spacing * (flow.len() - 1) as f32;
    let inner_main = container.extent(main) - pad.total(main);
    let inner_cross = container.extent(cross) - pad.total(cross);
    let (lead, step) = distribute_main_axis(
        inner_main - used,
        flow.len(),
        layout.item_spacing,
        layout.primary_align,
    );

    let mut cursor = container.start(main) + pad.leading(main) + lead;
    for c in flow {
        let stretch = layout.counter_align == CrossAxisAlign::Stretch;
        if stretch && config.stretch == StretchPolicy::Resize {
            match cross {
                Axis::Horizontal => tree.nodes[c].width = inner_cross,
                Axis::Vertical => tree.nodes[c].height = inner_cross,
            }
        }
        let child = &tree.nodes[c];
        let align = if stretch && config.stretch == StretchPolicy::Center {
            CrossAxisAlign::Center
        } else {
            layout.counter_align
        };
        let target_main = cursor;
        let target_cross = container.start(cross)
            + pad.leading(cross)
            + cross_offset(inner_cross, extent(child, cross), align);
        let (tx, ty) = match main {
            Axis::Horizontal => (target_main, target_cross),
            Axis::Vertical => (target_cross, target_main),
        };
        let (dx, dy) = (tx - child.world_x, ty - child.world_y);
        cursor += extent(child, main) + step;
        if dx != 0.0 || dy != 0.0 {
            tree.shift_subtree(c, dx, dy);
        }
    }
}
