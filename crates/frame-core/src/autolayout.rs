//! Auto-layout engine.
//!
//! Computes child bounds inside a flex-like container: fixed/hug/fill sizing,
//! main-axis distribution, cross-axis alignment, padding, gaps, wrapping and
//! constraint placement of absolutely-positioned children.
//!
//! All returned rectangles are local to the container's origin.

use crate::geometry::{Axis, Point, Rect, Size};
use crate::id::NodeId;
use crate::model::*;
use petgraph::graph::NodeIndex;

/// The container being laid out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutContainer {
    pub config: AutoLayout,
    /// Current size. Used as-is on FIXED axes.
    pub size: Size,
    /// Size before the edit that triggered this pass. Drives constraint
    /// deltas for absolute children; `None` means unchanged.
    pub previous_size: Option<Size>,
}

/// One child as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutChild {
    pub id: NodeId,
    /// Current local position (only read for absolute children).
    pub position: Point,
    /// Own size; for HUG children this is their already-computed content size.
    pub size: Size,
    pub layout: ChildLayout,
}

impl LayoutChild {
    pub fn from_node(node: &SceneNode) -> Self {
        Self {
            id: node.id,
            position: Point::new(node.geometry.x, node.geometry.y),
            size: Size::new(node.geometry.width, node.geometry.height),
            layout: node.child_layout,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutResult {
    /// Bounds per child, in input order.
    pub bounds: Vec<(NodeId, Rect)>,
    pub container_size: Size,
    /// False when the container has no auto-layout (mode NONE).
    pub applied: bool,
}

impl LayoutResult {
    pub fn bounds_of(&self, id: NodeId) -> Option<Rect> {
        self.bounds.iter().find(|(i, _)| *i == id).map(|(_, r)| *r)
    }
}

// ─── Distribution ────────────────────────────────────────────────────────

/// Leading offset and effective gap for `count` items sharing `remaining`
/// free main-axis space. The space-* modes fall back to packing at the start
/// when there is no free space to share.
pub fn distribute_main_axis(
    remaining: f32,
    count: usize,
    gap: f32,
    align: MainAxisAlign,
) -> (f32, f32) {
    let n = count as f32;
    match align {
        MainAxisAlign::Min => (0.0, gap),
        MainAxisAlign::Center => (remaining / 2.0, gap),
        MainAxisAlign::Max => (remaining, gap),
        MainAxisAlign::SpaceBetween if count > 1 && remaining > 0.0 => {
            (0.0, gap + remaining / (n - 1.0))
        }
        MainAxisAlign::SpaceAround if count > 0 && remaining > 0.0 => {
            let each = remaining / n;
            (each / 2.0, gap + each)
        }
        MainAxisAlign::SpaceEvenly if count > 0 && remaining > 0.0 => {
            let each = remaining / (n + 1.0);
            (each, gap + each)
        }
        MainAxisAlign::SpaceBetween | MainAxisAlign::SpaceAround | MainAxisAlign::SpaceEvenly => {
            (0.0, gap)
        }
    }
}

/// Offset of an item of `extent` inside a slot of `available` on the cross axis.
pub fn cross_offset(available: f32, extent: f32, align: CrossAxisAlign) -> f32 {
    match align {
        CrossAxisAlign::Min | CrossAxisAlign::Stretch => 0.0,
        CrossAxisAlign::Center => (available - extent) / 2.0,
        CrossAxisAlign::Max => available - extent,
    }
}

// ─── Constraints ─────────────────────────────────────────────────────────

/// Place a child by its constraints against a container resized from
/// `previous` to `current`.
pub fn apply_constraints(child: &LayoutChild, previous: Size, current: Size) -> Rect {
    let resolve = |axis: Axis| -> (f32, f32) {
        let start = match axis {
            Axis::Horizontal => child.position.x,
            Axis::Vertical => child.position.y,
        };
        let extent = child.size.along(axis);
        let before = previous.along(axis);
        let after = current.along(axis);
        let delta = after - before;
        match child.layout.constraints.along(axis) {
            ConstraintKind::Min => (start, extent),
            ConstraintKind::Max => (start + delta, extent),
            ConstraintKind::Center => (start + delta / 2.0, extent),
            ConstraintKind::Stretch => (start, (extent + delta).max(0.0)),
            ConstraintKind::Scale => {
                let ratio = if before > 0.0 { after / before } else { 1.0 };
                (start * ratio, extent * ratio)
            }
        }
    };
    let (x, width) = resolve(Axis::Horizontal);
    let (y, height) = resolve(Axis::Vertical);
    Rect::new(x, y, width, height)
}

// ─── Engine ──────────────────────────────────────────────────────────────

/// A flow item after main-axis sizing.
#[derive(Debug, Clone, Copy)]
struct FlowItem {
    slot: usize,
    main: f32,
    cross: f32,
    fill_cross: bool,
}

/// Lay out `children` inside `container`.
pub fn apply_layout(container: &LayoutContainer, children: &[LayoutChild]) -> LayoutResult {
    let config = &container.config;
    let Some(main) = config.mode.axis() else {
        return LayoutResult {
            bounds: Vec::new(),
            container_size: container.size,
            applied: false,
        };
    };
    let cross = main.cross();
    let pad = config.padding;
    let hug_main = config.primary_sizing == AxisSizing::Hug;
    let hug_cross = config.counter_sizing == AxisSizing::Hug;
    let gap = config.item_spacing;

    let flow: Vec<usize> = (0..children.len())
        .filter(|i| children[*i].layout.positioning == Positioning::Auto)
        .collect();

    let available_main = (container.size.along(main) - pad.total(main)).max(0.0);
    let available_cross = (container.size.along(cross) - pad.total(cross)).max(0.0);
    let wrap = config.wrap && !hug_main;

    // Main-axis extents. FILL only distributes on a bounded main axis and
    // outside wrap mode; otherwise the child keeps its own size.
    let fill_main = |c: &LayoutChild| {
        c.layout.sizing(main) == ChildSizing::Fill && !hug_main && !wrap
    };
    let fixed_total: f32 = flow
        .iter()
        .map(|i| &children[*i])
        .filter(|c| !fill_main(c))
        .map(|c| c.size.along(main))
        .sum();
    let fill_count = flow.iter().filter(|i| fill_main(&children[**i])).count();
    let gaps = gap * flow.len().saturating_sub(1) as f32;
    let per_fill = if fill_count > 0 {
        (available_main - fixed_total - gaps).max(0.0) / fill_count as f32
    } else {
        0.0
    };

    let items: Vec<FlowItem> = flow
        .iter()
        .map(|&slot| {
            let c = &children[slot];
            let raw_main = if fill_main(c) {
                per_fill
            } else {
                c.size.along(main)
            };
            FlowItem {
                slot,
                main: c.layout.limits.clamp(main, raw_main),
                cross: c.size.along(cross),
                fill_cross: c.layout.sizing(cross) == ChildSizing::Fill
                    || config.counter_align == CrossAxisAlign::Stretch,
            }
        })
        .collect();

    // Break into lines.
    let mut lines: Vec<Vec<FlowItem>> = Vec::new();
    if wrap {
        let mut line: Vec<FlowItem> = Vec::new();
        let mut used = 0.0;
        for item in items {
            let needed = if line.is_empty() { item.main } else { used + gap + item.main };
            if !line.is_empty() && needed > available_main {
                lines.push(std::mem::take(&mut line));
                used = item.main;
            } else {
                used = needed;
            }
            line.push(item);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    } else {
        lines.push(items);
    }

    // Line thickness on the cross axis. A single unwrapped line on a fixed
    // cross axis spans the whole inner cross extent.
    let own_cross_max = |line: &[FlowItem]| {
        line.iter()
            .filter(|it| !it.fill_cross)
            .map(|it| it.cross)
            .fold(0.0f32, f32::max)
    };
    let thickness: Vec<f32> = lines
        .iter()
        .map(|line| {
            if !wrap && !hug_cross {
                available_cross
            } else {
                let t = own_cross_max(line);
                if t > 0.0 {
                    t
                } else {
                    line.iter().map(|it| it.cross).fold(0.0f32, f32::max)
                }
            }
        })
        .collect();

    // Container size.
    let content_main = lines
        .iter()
        .map(|line| {
            line.iter().map(|it| it.main).sum::<f32>()
                + gap * line.len().saturating_sub(1) as f32
        })
        .fold(0.0f32, f32::max);
    let content_cross = thickness.iter().sum::<f32>()
        + config.counter_axis_spacing * lines.len().saturating_sub(1) as f32;

    let final_main = if hug_main {
        content_main + pad.total(main)
    } else {
        container.size.along(main)
    };
    let final_cross = if hug_cross {
        content_cross + pad.total(cross)
    } else {
        container.size.along(cross)
    };
    let container_size = match main {
        Axis::Horizontal => Size::new(final_main, final_cross),
        Axis::Vertical => Size::new(final_cross, final_main),
    };
    let inner_main = final_main - pad.total(main);

    // Position.
    let mut placed: Vec<Option<Rect>> = vec![None; children.len()];
    let mut line_start = pad.leading(cross);
    for (line, line_thickness) in lines.iter().zip(&thickness) {
        let used: f32 = line.iter().map(|it| it.main).sum::<f32>()
            + gap * line.len().saturating_sub(1) as f32;
        let (lead, step) =
            distribute_main_axis(inner_main - used, line.len(), gap, config.primary_align);
        let mut cursor = pad.leading(main) + lead;
        for item in line {
            let c = &children[item.slot];
            let cross_extent = if item.fill_cross {
                *line_thickness
            } else {
                item.cross
            };
            let cross_extent = c.layout.limits.clamp(cross, cross_extent);
            let cross_pos = line_start
                + cross_offset(*line_thickness, cross_extent, config.counter_align);
            placed[item.slot] = Some(match main {
                Axis::Horizontal => Rect::new(cursor, cross_pos, item.main, cross_extent),
                Axis::Vertical => Rect::new(cross_pos, cursor, cross_extent, item.main),
            });
            cursor += item.main + step;
        }
        line_start += line_thickness + config.counter_axis_spacing;
    }

    // Absolute children follow their constraints against the final size.
    let previous = container.previous_size.unwrap_or(container_size);
    for (i, c) in children.iter().enumerate() {
        if c.layout.positioning == Positioning::Absolute {
            placed[i] = Some(apply_constraints(c, previous, container_size));
        }
    }

    let bounds = children
        .iter()
        .zip(placed)
        .filter_map(|(c, r)| r.map(|r| (c.id, r)))
        .collect();

    log::trace!(
        "auto-layout {:?}: {} children → {}×{}",
        config.mode,
        children.len(),
        container_size.width,
        container_size.height
    );

    LayoutResult {
        bounds,
        container_size,
        applied: true,
    }
}

// ─── Scene integration ───────────────────────────────────────────────────

/// Run the engine over every auto-layout container in the subtree rooted at
/// `id` (inclusive), children before parents, and write the resulting
/// geometry back into the graph. Returns the number of containers laid out.
pub fn apply_auto_layout_recursive(graph: &mut SceneGraph, id: NodeId) -> usize {
    let Some(idx) = graph.index_of(id) else {
        return 0;
    };
    layout_subtree(graph, idx)
}

/// Apply auto-layout to every top-level subtree.
pub fn apply_auto_layout_all(graph: &mut SceneGraph) -> usize {
    let roots: Vec<NodeIndex> = graph.top_level().to_vec();
    roots.into_iter().map(|r| layout_subtree(graph, r)).sum()
}

/// Re-place children after a container was resized from `previous`.
/// Auto-layout containers rerun the engine; free containers apply each
/// child's constraints.
pub fn relayout_after_resize(graph: &mut SceneGraph, id: NodeId, previous: Size) -> bool {
    let Some(idx) = graph.index_of(id) else {
        return false;
    };
    let node = graph.node(idx);
    let current = Size::new(node.geometry.width, node.geometry.height);
    let has_auto = node
        .kind
        .auto_layout()
        .is_some_and(|l| l.mode != LayoutMode::None);
    let constrains_children =
        node.kind.can_have_children() && !matches!(node.kind, NodeKind::Group);

    if has_auto {
        apply_node(graph, idx, Some(previous));
    } else if constrains_children {
        let children: Vec<NodeIndex> = graph.children(idx).to_vec();
        for child in children {
            let lc = LayoutChild::from_node(graph.node(child));
            let r = apply_constraints(&lc, previous, current);
            write_rect(&mut graph.graph[child], r);
        }
    } else {
        return false;
    }
    let children: Vec<NodeIndex> = graph.children(idx).to_vec();
    for child in children {
        layout_subtree(graph, child);
    }
    true
}

fn layout_subtree(graph: &mut SceneGraph, idx: NodeIndex) -> usize {
    let children: Vec<NodeIndex> = graph.children(idx).to_vec();
    let mut count: usize = children.iter().map(|c| layout_subtree(graph, *c)).sum();
    if apply_node(graph, idx, None) {
        count += 1;
    }
    count
}

/// Lay out one container's direct children. FILL/STRETCH children whose size
/// changed get their own children re-laid out.
fn apply_node(graph: &mut SceneGraph, idx: NodeIndex, previous: Option<Size>) -> bool {
    let node = graph.node(idx);
    let Some(config) = node.kind.auto_layout().copied() else {
        return false;
    };
    if config.mode == LayoutMode::None {
        return false;
    }
    let child_idx: Vec<NodeIndex> = graph.children(idx).to_vec();
    let children: Vec<LayoutChild> = child_idx
        .iter()
        .map(|c| LayoutChild::from_node(graph.node(*c)))
        .collect();
    let container = LayoutContainer {
        config,
        size: Size::new(node.geometry.width, node.geometry.height),
        previous_size: previous,
    };
    let result = apply_layout(&container, &children);

    let geo = &mut graph.graph[idx].geometry;
    geo.width = result.container_size.width;
    geo.height = result.container_size.height;

    let mut resized = Vec::new();
    for (c_idx, (before, (_, rect))) in child_idx.iter().zip(children.iter().zip(&result.bounds)) {
        if (before.size.width - rect.width).abs() > f32::EPSILON
            || (before.size.height - rect.height).abs() > f32::EPSILON
        {
            resized.push(*c_idx);
        }
        write_rect(&mut graph.graph[*c_idx], *rect);
    }
    for c in resized {
        let children: Vec<NodeIndex> = graph.children(c).to_vec();
        if !children.is_empty() {
            apply_node(graph, c, None);
        }
    }
    true
}

fn write_rect(node: &mut SceneNode, r: Rect) {
    node.geometry.x = r.x;
    node.geometry.y = r.y;
    node.geometry.width = r.width;
    node.geometry.height = r.height;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(name: &str, w: f32, h: f32) -> LayoutChild {
        LayoutChild {
            id: NodeId::intern(name),
            position: Point::default(),
            size: Size::new(w, h),
            layout: ChildLayout::default(),
        }
    }

    fn container(config: AutoLayout, w: f32, h: f32) -> LayoutContainer {
        LayoutContainer {
            config,
            size: Size::new(w, h),
            previous_size: None,
        }
    }

    #[test]
    fn mode_none_is_not_applied() {
        let result = apply_layout(
            &container(AutoLayout::default(), 100.0, 100.0),
            &[child("none_a", 10.0, 10.0)],
        );
        assert!(!result.applied);
        assert!(result.bounds.is_empty());
    }

    #[test]
    fn space_between_three_items() {
        let config = AutoLayout {
            primary_align: MainAxisAlign::SpaceBetween,
            ..AutoLayout::horizontal()
        };
        let kids = [
            child("sb_a", 50.0, 50.0),
            child("sb_b", 50.0, 50.0),
            child("sb_c", 50.0, 50.0),
        ];
        let result = apply_layout(&container(config, 400.0, 50.0), &kids);
        let xs: Vec<f32> = result.bounds.iter().map(|(_, r)| r.x).collect();
        assert_eq!(xs, vec![0.0, 175.0, 350.0]);
    }

    #[test]
    fn space_between_single_child_packs_at_start() {
        let config = AutoLayout {
            primary_align: MainAxisAlign::SpaceBetween,
            padding: Padding::uniform(5.0),
            ..AutoLayout::horizontal()
        };
        let result = apply_layout(&container(config, 400.0, 50.0), &[child("sb1", 50.0, 20.0)]);
        assert_eq!(result.bounds[0].1.x, 5.0);
    }

    #[test]
    fn hug_both_axes() {
        let config = AutoLayout {
            primary_sizing: AxisSizing::Hug,
            counter_sizing: AxisSizing::Hug,
            padding: Padding::uniform(10.0),
            item_spacing: 10.0,
            ..AutoLayout::horizontal()
        };
        let result = apply_layout(
            &container(config, 0.0, 0.0),
            &[child("hug_a", 50.0, 80.0), child("hug_b", 50.0, 50.0)],
        );
        assert_eq!(result.container_size, Size::new(130.0, 100.0));
        assert_eq!(result.bounds[1].1, Rect::new(70.0, 10.0, 50.0, 50.0));
    }

    #[test]
    fn fill_distributes_leftover() {
        let config = AutoLayout {
            item_spacing: 10.0,
            ..AutoLayout::horizontal()
        };
        let mut a = child("fill_a", 0.0, 20.0);
        a.layout.horizontal_sizing = ChildSizing::Fill;
        let mut b = child("fill_b", 0.0, 20.0);
        b.layout.horizontal_sizing = ChildSizing::Fill;
        let fixed = child("fill_fixed", 100.0, 20.0);
        let result = apply_layout(&container(config, 320.0, 20.0), &[a, fixed, b]);
        // (320 - 100 - 20) / 2
        assert_eq!(result.bounds[0].1.width, 100.0);
        assert_eq!(result.bounds[2].1.width, 100.0);
        assert_eq!(result.bounds[2].1.x, 220.0);
    }

    #[test]
    fn fill_with_no_space_is_zero() {
        let mut a = child("nofill_a", 0.0, 20.0);
        a.layout.horizontal_sizing = ChildSizing::Fill;
        let mut b = child("nofill_b", 0.0, 20.0);
        b.layout.horizontal_sizing = ChildSizing::Fill;
        let result = apply_layout(&container(AutoLayout::horizontal(), 0.0, 20.0), &[a, b]);
        assert!(result.bounds.iter().all(|(_, r)| r.width == 0.0));
    }

    #[test]
    fn min_max_applied_after_fill() {
        let mut a = child("mm_a", 0.0, 20.0);
        a.layout.horizontal_sizing = ChildSizing::Fill;
        a.layout.limits.max_width = Some(60.0);
        let mut b = child("mm_b", 0.0, 20.0);
        b.layout.horizontal_sizing = ChildSizing::Fill;
        let result = apply_layout(&container(AutoLayout::horizontal(), 200.0, 20.0), &[a, b]);
        // No redistribution: b keeps its even share.
        assert_eq!(result.bounds[0].1.width, 60.0);
        assert_eq!(result.bounds[1].1.width, 100.0);
    }

    #[test]
    fn stretch_cross_axis() {
        let config = AutoLayout {
            counter_align: CrossAxisAlign::Stretch,
            padding: Padding::uniform(4.0),
            ..AutoLayout::vertical()
        };
        let result = apply_layout(&container(config, 100.0, 200.0), &[child("st_a", 10.0, 10.0)]);
        assert_eq!(result.bounds[0].1, Rect::new(4.0, 4.0, 92.0, 10.0));
    }

    #[test]
    fn absolute_child_follows_max_constraint() {
        let mut badge = child("abs_badge", 10.0, 10.0);
        badge.position = Point::new(90.0, 0.0);
        badge.layout.positioning = Positioning::Absolute;
        badge.layout.constraints.horizontal = ConstraintKind::Max;
        let c = LayoutContainer {
            config: AutoLayout::horizontal(),
            size: Size::new(150.0, 50.0),
            previous_size: Some(Size::new(100.0, 50.0)),
        };
        let result = apply_layout(&c, &[child("abs_flow", 20.0, 20.0), badge]);
        assert_eq!(result.bounds_of(NodeId::intern("abs_badge")).unwrap().x, 140.0);
        assert_eq!(result.bounds_of(NodeId::intern("abs_flow")).unwrap().x, 0.0);
    }

    #[test]
    fn wrap_breaks_lines() {
        let config = AutoLayout {
            wrap: true,
            item_spacing: 10.0,
            counter_axis_spacing: 5.0,
            counter_sizing: AxisSizing::Hug,
            ..AutoLayout::horizontal()
        };
        let kids = [
            child("wr_a", 40.0, 20.0),
            child("wr_b", 40.0, 30.0),
            child("wr_c", 40.0, 20.0),
        ];
        let result = apply_layout(&container(config, 100.0, 0.0), &kids);
        let c = result.bounds_of(NodeId::intern("wr_c")).unwrap();
        assert_eq!((c.x, c.y), (0.0, 35.0));
        assert_eq!(result.container_size.height, 55.0);
    }

    #[test]
    fn distribution_modes() {
        assert_eq!(distribute_main_axis(90.0, 3, 0.0, MainAxisAlign::SpaceAround), (15.0, 30.0));
        assert_eq!(distribute_main_axis(80.0, 3, 0.0, MainAxisAlign::SpaceEvenly), (20.0, 20.0));
        assert_eq!(distribute_main_axis(-10.0, 3, 4.0, MainAxisAlign::SpaceEvenly), (0.0, 4.0));
        assert_eq!(distribute_main_axis(60.0, 2, 0.0, MainAxisAlign::Center), (30.0, 0.0));
    }

    #[test]
    fn recursive_writes_back_hug_sizes() {
        let mut graph = SceneGraph::new();
        let outer_cfg = AutoLayout {
            primary_sizing: AxisSizing::Hug,
            counter_sizing: AxisSizing::Hug,
            item_spacing: 10.0,
            ..AutoLayout::vertical()
        };
        let inner_cfg = AutoLayout {
            primary_sizing: AxisSizing::Hug,
            counter_sizing: AxisSizing::Hug,
            ..AutoLayout::horizontal()
        };
        let outer = graph.add_node(graph.root, SceneNode::frame(NodeId::intern("rec_outer"), outer_cfg));
        let inner = graph.add_node(outer, SceneNode::frame(NodeId::intern("rec_inner"), inner_cfg));
        graph.add_node(
            inner,
            SceneNode::rectangle(NodeId::intern("rec_leaf")).with_geometry(0.0, 0.0, 30.0, 40.0),
        );
        graph.add_node(
            outer,
            SceneNode::rectangle(NodeId::intern("rec_tail")).with_geometry(0.0, 0.0, 60.0, 10.0),
        );

        let laid_out = apply_auto_layout_recursive(&mut graph, NodeId::intern("rec_outer"));
        assert_eq!(laid_out, 2);
        let outer = graph.get_by_id(NodeId::intern("rec_outer")).unwrap();
        assert_eq!((outer.geometry.width, outer.geometry.height), (60.0, 60.0));
        let tail = graph.get_by_id(NodeId::intern("rec_tail")).unwrap();
        assert_eq!(tail.geometry.y, 50.0);
    }
}
