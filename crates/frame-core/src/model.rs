//! Core scene-graph data model.
//!
//! The document is a tree of `SceneNode` records stored in a stable arena
//! (`StableDiGraph`) and addressed by `NodeId`. Edges go parent → child and are
//! the ownership relation; per-parent `child_order` lists carry paint order.
//! A hidden `Root` node (the page) owns the top-level nodes.
//!
//! Geometry on a node is always *local*: relative to the parent's origin.
//! World geometry is derived by the layout resolver and never stored here.

use crate::geometry::{Axis, Rect};
use crate::id::{ComponentId, NodeId};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

// ─── Colors & Paint ──────────────────────────────────────────────────────

/// RGBA color. Stored as 4 × f32 [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let bytes = hex.as_bytes();
        let channel = |i: usize| -> Option<f32> {
            let v = hex_val(bytes[i])? << 4 | hex_val(bytes[i + 1])?;
            Some(v as f32 / 255.0)
        };
        match bytes.len() {
            6 => Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, 1.0)),
            8 => Some(Self::rgba(
                channel(0)?,
                channel(2)?,
                channel(4)?,
                channel(6)?,
            )),
            _ => None,
        }
    }

    /// Emit as `#RRGGBB`, or `#RRGGBBAA` when not fully opaque.
    pub fn to_hex(&self) -> String {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let (r, g, b, a) = (q(self.r), q(self.g), q(self.b), q(self.a));
        if a == 255 {
            format!("#{r:02X}{g:02X}{b:02X}")
        } else {
            format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }
}

/// A gradient stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f32, // 0.0 .. 1.0
    pub color: Color,
}

/// How an image paint fits its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageScaleMode {
    #[default]
    Fill,
    Fit,
    Tile,
    Stretch,
}

/// Fill or stroke paint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Paint {
    Solid(Color),
    LinearGradient {
        angle: f32, // degrees
        stops: Vec<GradientStop>,
    },
    RadialGradient {
        stops: Vec<GradientStop>,
    },
    /// Image fill; the bytes are fetched by the host, the core only keeps the reference.
    Image {
        image_ref: String,
        scale_mode: ImageScaleMode,
    },
}

// ─── Stroke ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub paint: Paint,
    pub width: f32,
    pub align: StrokeAlign,
    pub cap: StrokeCap,
    pub join: StrokeJoin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrokeAlign {
    #[default]
    Inside,
    Center,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrokeCap {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrokeJoin {
    Miter,
    Round,
    Bevel,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            paint: Paint::Solid(Color::BLACK),
            width: 1.0,
            align: StrokeAlign::Inside,
            cap: StrokeCap::Butt,
            join: StrokeJoin::Miter,
        }
    }
}

// ─── Effects ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub offset_x: f32,
    pub offset_y: f32,
    pub blur: f32,
    pub spread: f32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    DropShadow(Shadow),
    InnerShadow(Shadow),
    LayerBlur { radius: f32 },
    BackgroundBlur { radius: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    PassThrough,
    #[default]
    Normal,
    Darken,
    Multiply,
    ColorBurn,
    Lighten,
    Screen,
    ColorDodge,
    Overlay,
    SoftLight,
    HardLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

/// Per-corner radii, clockwise from top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CornerRadii {
    pub top_left: f32,
    pub top_right: f32,
    pub bottom_right: f32,
    pub bottom_left: f32,
}

impl CornerRadii {
    pub const fn uniform(r: f32) -> Self {
        Self {
            top_left: r,
            top_right: r,
            bottom_right: r,
            bottom_left: r,
        }
    }

    pub fn is_uniform(&self) -> bool {
        self.top_left == self.top_right
            && self.top_right == self.bottom_right
            && self.bottom_right == self.bottom_left
    }
}

// ─── Styling ─────────────────────────────────────────────────────────────

/// Paint attributes shared by every visible node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub fills: SmallVec<[Paint; 1]>,
    pub strokes: SmallVec<[Stroke; 1]>,
    pub corner_radius: CornerRadii,
    pub effects: SmallVec<[Effect; 1]>,
    pub opacity: f32,
    pub blend_mode: BlendMode,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fills: SmallVec::new(),
            strokes: SmallVec::new(),
            corner_radius: CornerRadii::default(),
            effects: SmallVec::new(),
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
        }
    }
}

// ─── Font / Text ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    pub family: String,
    pub weight: u16, // 100..900
    pub size: f32,
    /// Line height in px; `None` = font default.
    pub line_height: Option<f32>,
    pub letter_spacing: f32,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: "Inter".into(),
            weight: 400,
            size: 14.0,
            line_height: None,
            letter_spacing: 0.0,
        }
    }
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justified,
}

/// Vertical text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextVAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextData {
    pub characters: String,
    pub font: FontSpec,
    pub align: TextAlign,
    pub valign: TextVAlign,
}

// ─── Path data ───────────────────────────────────────────────────────────

/// A single path command (SVG-like but simplified).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathCmd {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    QuadTo(f32, f32, f32, f32),            // control, end
    CubicTo(f32, f32, f32, f32, f32, f32), // c1, c2, end
    Close,
}

// ─── Auto-layout (container side) ────────────────────────────────────────

/// Container layout mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayoutMode {
    /// Free positioning; children keep their own x/y.
    #[default]
    None,
    Horizontal,
    Vertical,
}

impl LayoutMode {
    /// The main axis, `None` for free layout.
    pub fn axis(self) -> Option<Axis> {
        match self {
            LayoutMode::None => None,
            LayoutMode::Horizontal => Some(Axis::Horizontal),
            LayoutMode::Vertical => Some(Axis::Vertical),
        }
    }
}

/// Container sizing on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AxisSizing {
    #[default]
    Fixed,
    Hug,
}

/// Main-axis distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MainAxisAlign {
    #[default]
    Min,
    Center,
    Max,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

/// Cross-axis alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CrossAxisAlign {
    #[default]
    Min,
    Center,
    Max,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Padding {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Padding {
    pub const fn uniform(p: f32) -> Self {
        Self {
            top: p,
            right: p,
            bottom: p,
            left: p,
        }
    }

    /// Leading padding on `axis` (left / top).
    pub fn leading(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Horizontal => self.left,
            Axis::Vertical => self.top,
        }
    }

    /// Trailing padding on `axis` (right / bottom).
    pub fn trailing(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Horizontal => self.right,
            Axis::Vertical => self.bottom,
        }
    }

    pub fn total(&self, axis: Axis) -> f32 {
        self.leading(axis) + self.trailing(axis)
    }
}

/// Auto-layout configuration carried by container nodes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AutoLayout {
    pub mode: LayoutMode,
    pub primary_sizing: AxisSizing,
    pub counter_sizing: AxisSizing,
    pub primary_align: MainAxisAlign,
    pub counter_align: CrossAxisAlign,
    pub padding: Padding,
    /// Gap between items along the main axis.
    pub item_spacing: f32,
    /// Gap between wrapped lines.
    pub counter_axis_spacing: f32,
    pub wrap: bool,
}

impl AutoLayout {
    pub fn horizontal() -> Self {
        Self {
            mode: LayoutMode::Horizontal,
            ..Default::default()
        }
    }

    pub fn vertical() -> Self {
        Self {
            mode: LayoutMode::Vertical,
            ..Default::default()
        }
    }

    /// Sizing mode for the given absolute axis.
    pub fn sizing(&self, axis: Axis) -> AxisSizing {
        match self.mode.axis() {
            Some(main) if main == axis => self.primary_sizing,
            Some(_) => self.counter_sizing,
            None => AxisSizing::Fixed,
        }
    }
}

// ─── Auto-layout (child side) ────────────────────────────────────────────

/// How a child sizes itself on one axis inside an auto-layout parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChildSizing {
    #[default]
    Fixed,
    Hug,
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Positioning {
    /// Participates in the parent's flow.
    #[default]
    Auto,
    /// Excluded from flow; placed by `Constraints` against the parent box.
    Absolute,
}

/// Pinning rule for one axis of an absolutely-positioned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConstraintKind {
    #[default]
    Min,
    Center,
    Max,
    Stretch,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Constraints {
    pub horizontal: ConstraintKind,
    pub vertical: ConstraintKind,
}

impl Constraints {
    pub fn along(&self, axis: Axis) -> ConstraintKind {
        match axis {
            Axis::Horizontal => self.horizontal,
            Axis::Vertical => self.vertical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SizeLimits {
    pub min_width: Option<f32>,
    pub max_width: Option<f32>,
    pub min_height: Option<f32>,
    pub max_height: Option<f32>,
}

impl SizeLimits {
    /// Clamp `value` on `axis`; `max` applies before `min` so `min` wins a conflict.
    pub fn clamp(&self, axis: Axis, value: f32) -> f32 {
        let (min, max) = match axis {
            Axis::Horizontal => (self.min_width, self.max_width),
            Axis::Vertical => (self.min_height, self.max_height),
        };
        let mut v = value;
        if let Some(max) = max {
            v = v.min(max);
        }
        if let Some(min) = min {
            v = v.max(min);
        }
        v
    }
}

/// Per-child participation in the parent's auto-layout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChildLayout {
    pub horizontal_sizing: ChildSizing,
    pub vertical_sizing: ChildSizing,
    pub positioning: Positioning,
    pub constraints: Constraints,
    pub limits: SizeLimits,
}

impl ChildLayout {
    pub fn sizing(&self, axis: Axis) -> ChildSizing {
        match axis {
            Axis::Horizontal => self.horizontal_sizing,
            Axis::Vertical => self.vertical_sizing,
        }
    }
}

// ─── Scene Graph Nodes ───────────────────────────────────────────────────

/// Local geometry. `x`/`y` are relative to the parent's origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Degrees, clockwise.
    pub rotation: f32,
}

impl Geometry {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            rotation: 0.0,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// The node kinds. Kind-specific data lives on the variant; shared geometry
/// and style live on `SceneNode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Hidden page root owning the top-level nodes.
    Root,

    /// Visible container with optional clipping and auto-layout.
    Frame { clip: bool, layout: AutoLayout },

    /// Plain grouping; never lays out its children.
    Group,

    Rectangle,

    Ellipse,

    Text(TextData),

    Vector { paths: Vec<PathCmd> },

    /// Root of a component definition subtree.
    Component {
        component: ComponentId,
        clip: bool,
        layout: AutoLayout,
    },

    /// Root of a linked instance of a component.
    Instance {
        component: ComponentId,
        clip: bool,
        layout: AutoLayout,
    },
}

impl NodeKind {
    /// Short lowercase tag (`frame`, `text`, ...), used for id prefixes and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Frame { .. } => "frame",
            NodeKind::Group => "group",
            NodeKind::Rectangle => "rectangle",
            NodeKind::Ellipse => "ellipse",
            NodeKind::Text(_) => "text",
            NodeKind::Vector { .. } => "vector",
            NodeKind::Component { .. } => "component",
            NodeKind::Instance { .. } => "instance",
        }
    }

    /// Auto-layout configuration for container kinds.
    pub fn auto_layout(&self) -> Option<&AutoLayout> {
        match self {
            NodeKind::Frame { layout, .. }
            | NodeKind::Component { layout, .. }
            | NodeKind::Instance { layout, .. } => Some(layout),
            _ => None,
        }
    }

    pub fn auto_layout_mut(&mut self) -> Option<&mut AutoLayout> {
        match self {
            NodeKind::Frame { layout, .. }
            | NodeKind::Component { layout, .. }
            | NodeKind::Instance { layout, .. } => Some(layout),
            _ => None,
        }
    }

    pub fn can_have_children(&self) -> bool {
        matches!(
            self,
            NodeKind::Root
                | NodeKind::Frame { .. }
                | NodeKind::Group
                | NodeKind::Component { .. }
                | NodeKind::Instance { .. }
        )
    }
}

/// A single node in the scene graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: NodeId,

    /// Layer name shown in the UI.
    pub name: String,

    pub kind: NodeKind,

    pub geometry: Geometry,

    pub style: Style,

    /// How this node participates in its parent's auto-layout.
    pub child_layout: ChildLayout,

    /// Locked nodes cannot be selected.
    pub locked: bool,

    /// Hidden nodes cannot be selected.
    pub visible: bool,
}

impl SceneNode {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            name: id.as_str().to_string(),
            kind,
            geometry: Geometry::default(),
            style: Style::default(),
            child_layout: ChildLayout::default(),
            locked: false,
            visible: true,
        }
    }

    /// Builder-style geometry setter.
    pub fn with_geometry(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.geometry = Geometry {
            x,
            y,
            width,
            height,
            rotation: self.geometry.rotation,
        };
        self
    }

    /// A frame with the given auto-layout.
    pub fn frame(id: NodeId, layout: AutoLayout) -> Self {
        Self::new(id, NodeKind::Frame { clip: false, layout })
    }

    pub fn rectangle(id: NodeId) -> Self {
        Self::new(id, NodeKind::Rectangle)
    }

    pub fn text(id: NodeId, characters: &str) -> Self {
        Self::new(
            id,
            NodeKind::Text(TextData {
                characters: characters.to_string(),
                ..Default::default()
            }),
        )
    }

    /// Whether selection may target this node.
    pub fn is_selectable(&self) -> bool {
        self.visible && !self.locked && !matches!(self.kind, NodeKind::Root)
    }
}

// ─── Subtrees ────────────────────────────────────────────────────────────

/// One record of a detached subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtreeNode {
    pub node: SceneNode,
    /// Parent within the subtree; `None` for the subtree root.
    pub parent: Option<NodeId>,
}

/// A flat, parent-first copy of a node and its descendants. Sibling order is
/// list order. Used for clipboard, delete/undo and component definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtree {
    pub nodes: Vec<SubtreeNode>,
}

impl Subtree {
    /// A single-node subtree.
    pub fn leaf(node: SceneNode) -> Self {
        Self {
            nodes: vec![SubtreeNode { node, parent: None }],
        }
    }

    pub fn root(&self) -> Option<&SceneNode> {
        self.nodes.first().map(|n| &n.node)
    }

    pub fn root_mut(&mut self) -> Option<&mut SceneNode> {
        self.nodes.first_mut().map(|n| &mut n.node)
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root().map(|n| n.id)
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.node.id == id).map(|n| &n.node)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.node.id == id)
            .map(|n| &mut n.node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|n| n.node.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Copy with every id replaced through `assign`, relinking parents.
    /// Returns the copy plus the old → new id map.
    pub fn relabeled(
        &self,
        mut assign: impl FnMut(&SceneNode) -> NodeId,
    ) -> (Subtree, HashMap<NodeId, NodeId>) {
        let mut map = HashMap::with_capacity(self.nodes.len());
        for entry in &self.nodes {
            map.insert(entry.node.id, assign(&entry.node));
        }
        let nodes = self
            .nodes
            .iter()
            .map(|entry| {
                let mut node = entry.node.clone();
                node.id = map[&entry.node.id];
                SubtreeNode {
                    node,
                    parent: entry.parent.and_then(|p| map.get(&p).copied()),
                }
            })
            .collect();
        (Subtree { nodes }, map)
    }

    /// Copy with freshly generated ids (prefixed by each node's kind tag).
    pub fn with_fresh_ids(&self) -> (Subtree, HashMap<NodeId, NodeId>) {
        self.relabeled(|node| NodeId::with_prefix(node.kind.tag()))
    }
}

// ─── Scene Graph ─────────────────────────────────────────────────────────

/// The complete document: an arena of `SceneNode` values.
/// Id of the hidden page root. The `::` prefix is reserved: imported and
/// generated ids never start with it.
pub const PAGE_ROOT_ID: &str = "::page";

#[derive(Debug, Clone)]
pub struct SceneGraph {
    /// The underlying directed graph; edges are parent → child.
    pub graph: StableDiGraph<SceneNode, ()>,

    /// The page root.
    pub root: NodeIndex,

    /// Index from NodeId → NodeIndex for fast lookup.
    pub id_index: HashMap<NodeId, NodeIndex>,

    /// Ordered children per parent (paint order: first = back-most).
    child_order: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl SceneGraph {
    /// Create a new empty scene graph with a page root.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let root_id = NodeId::intern(PAGE_ROOT_ID);
        let root = graph.add_node(SceneNode::new(root_id, NodeKind::Root));

        let mut id_index = HashMap::new();
        id_index.insert(root_id, root);

        Self {
            graph,
            root,
            id_index,
            child_order: HashMap::new(),
        }
    }

    /// Id of the page root.
    pub fn page_id(&self) -> NodeId {
        self.graph[self.root].id
    }

    /// Number of nodes, excluding the page root.
    pub fn len(&self) -> usize {
        self.graph.node_count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a node as the last (front-most) child of `parent`.
    pub fn add_node(&mut self, parent: NodeIndex, node: SceneNode) -> NodeIndex {
        let at = self.children(parent).len();
        self.insert_node(parent, at, node)
    }

    /// Insert a node at position `index` among `parent`'s children
    /// (clamped to the end).
    pub fn insert_node(&mut self, parent: NodeIndex, index: usize, node: SceneNode) -> NodeIndex {
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.graph.add_edge(parent, idx, ());
        self.id_index.insert(id, idx);
        let order = self.child_order.entry(parent).or_default();
        let at = index.min(order.len());
        order.insert(at, idx);
        idx
    }

    /// Look up a node by id.
    pub fn get_by_id(&self, id: NodeId) -> Option<&SceneNode> {
        self.id_index.get(&id).map(|idx| &self.graph[*idx])
    }

    /// Look up a node mutably by id.
    pub fn get_by_id_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.id_index
            .get(&id)
            .copied()
            .map(|idx| &mut self.graph[idx])
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.id_index.contains_key(&id)
    }

    /// Get the index for a NodeId.
    pub fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.id_index.get(&id).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &SceneNode {
        &self.graph[idx]
    }

    /// Get the parent index of a node.
    pub fn parent(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .next()
    }

    /// Parent id of a node; `None` for top-level nodes and unknown ids.
    pub fn parent_id(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(self.index_of(id)?)?;
        if parent == self.root {
            None
        } else {
            Some(self.graph[parent].id)
        }
    }

    /// Children in paint order.
    pub fn children(&self, idx: NodeIndex) -> &[NodeIndex] {
        self.child_order.get(&idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        match self.index_of(id) {
            Some(idx) => self
                .children(idx)
                .iter()
                .map(|c| self.graph[*c].id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Top-level nodes (children of the page root).
    pub fn top_level(&self) -> &[NodeIndex] {
        self.children(self.root)
    }

    /// Position of a node within its parent's child list.
    pub fn position_in_parent(&self, idx: NodeIndex) -> Option<usize> {
        let parent = self.parent(idx)?;
        self.children(parent).iter().position(|c| *c == idx)
    }

    /// Tree depth; top-level nodes are depth 0.
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        let mut idx = self.index_of(id)?;
        let mut depth = 0;
        while let Some(parent) = self.parent(idx) {
            if parent == self.root {
                return Some(depth);
            }
            depth += 1;
            idx = parent;
        }
        // Only the page root itself has no parent.
        None
    }

    /// Ancestors from nearest to farthest, excluding the page root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(mut idx) = self.index_of(id) else {
            return out;
        };
        while let Some(parent) = self.parent(idx) {
            if parent == self.root {
                break;
            }
            out.push(self.graph[parent].id);
            idx = parent;
        }
        out
    }

    /// Check if `ancestor_id` is a parent/grandparent/etc. of `descendant_id`.
    pub fn is_ancestor_of(&self, ancestor_id: NodeId, descendant_id: NodeId) -> bool {
        if ancestor_id == descendant_id {
            return false;
        }
        let Some(ancestor) = self.index_of(ancestor_id) else {
            return false;
        };
        if ancestor == self.root {
            return self.contains(descendant_id);
        }
        self.ancestors(descendant_id).contains(&ancestor_id)
    }

    /// Depth-first, parent-before-children traversal below `idx` (exclusive).
    pub fn descendants(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeIndex> = self.children(idx).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Every node except the page root, in paint order.
    pub fn iter_paint_order(&self) -> impl Iterator<Item = &SceneNode> + '_ {
        self.descendants(self.root)
            .into_iter()
            .map(move |idx| &self.graph[idx])
    }

    /// Move `child` under `new_parent` at `index` (clamped). Refuses to create
    /// cycles; returns false in that case or when either node is unknown.
    pub fn reparent_node(&mut self, child: NodeIndex, new_parent: NodeIndex, index: usize) -> bool {
        if child == new_parent || child == self.root {
            return false;
        }
        if self.descendants(child).contains(&new_parent) {
            return false;
        }
        if let Some(old_parent) = self.parent(child) {
            if let Some(edge) = self.graph.find_edge(old_parent, child) {
                self.graph.remove_edge(edge);
            }
            if let Some(order) = self.child_order.get_mut(&old_parent) {
                order.retain(|c| *c != child);
            }
        }
        self.graph.add_edge(new_parent, child, ());
        let order = self.child_order.entry(new_parent).or_default();
        let at = index.min(order.len());
        order.insert(at, child);
        true
    }

    /// Move a child one step backward in z-order (swap with previous sibling).
    /// Returns true if the z-order changed.
    pub fn send_backward(&mut self, child: NodeIndex) -> bool {
        match self.position_in_parent(child) {
            Some(pos) if pos > 0 => self.move_within_parent(child, pos - 1),
            _ => false,
        }
    }

    /// Move a child one step forward in z-order (swap with next sibling).
    /// Returns true if the z-order changed.
    pub fn bring_forward(&mut self, child: NodeIndex) -> bool {
        let Some(parent) = self.parent(child) else {
            return false;
        };
        let last = self.children(parent).len().saturating_sub(1);
        match self.position_in_parent(child) {
            Some(pos) if pos < last => self.move_within_parent(child, pos + 1),
            _ => false,
        }
    }

    /// Move a child to the back of z-order (first child).
    pub fn send_to_back(&mut self, child: NodeIndex) -> bool {
        match self.position_in_parent(child) {
            Some(pos) if pos > 0 => self.move_within_parent(child, 0),
            _ => false,
        }
    }

    /// Move a child to the front of z-order (last child).
    pub fn bring_to_front(&mut self, child: NodeIndex) -> bool {
        let Some(parent) = self.parent(child) else {
            return false;
        };
        let last = self.children(parent).len().saturating_sub(1);
        match self.position_in_parent(child) {
            Some(pos) if pos < last => self.move_within_parent(child, last),
            _ => false,
        }
    }

    /// Move `child` to position `to` among its siblings.
    pub fn move_within_parent(&mut self, child: NodeIndex, to: usize) -> bool {
        let Some(parent) = self.parent(child) else {
            return false;
        };
        let Some(order) = self.child_order.get_mut(&parent) else {
            return false;
        };
        let Some(from) = order.iter().position(|c| *c == child) else {
            return false;
        };
        let to = to.min(order.len() - 1);
        if from == to {
            return false;
        }
        let moved = order.remove(from);
        order.insert(to, moved);
        true
    }

    /// Copy a node and its descendants out of the graph without removing them.
    pub fn extract_subtree(&self, id: NodeId) -> Option<Subtree> {
        let idx = self.index_of(id)?;
        if idx == self.root {
            return None;
        }
        let mut nodes = vec![SubtreeNode {
            node: self.graph[idx].clone(),
            parent: None,
        }];
        for d in self.descendants(idx) {
            let parent = self.parent(d).map(|p| self.graph[p].id);
            nodes.push(SubtreeNode {
                node: self.graph[d].clone(),
                parent,
            });
        }
        Some(Subtree { nodes })
    }

    /// Remove a node and all its descendants. Returns the removed subtree.
    pub fn remove_subtree(&mut self, id: NodeId) -> Option<Subtree> {
        let subtree = self.extract_subtree(id)?;
        let idx = self.index_of(id)?;
        if let Some(order) = self
            .parent(idx)
            .and_then(|parent| self.child_order.get_mut(&parent))
        {
            order.retain(|c| *c != idx);
        }
        let mut doomed = self.descendants(idx);
        doomed.push(idx);
        for d in doomed.into_iter().rev() {
            self.child_order.remove(&d);
            if let Some(removed) = self.graph.remove_node(d) {
                self.id_index.remove(&removed.id);
            }
        }
        Some(subtree)
    }

    /// Insert a subtree under `parent` at `index`. Nodes whose ids already
    /// exist are skipped (with a warning) along with their descendants.
    /// Returns the index of the inserted root.
    pub fn insert_subtree(
        &mut self,
        parent: NodeIndex,
        index: usize,
        subtree: &Subtree,
    ) -> Option<NodeIndex> {
        let mut root_idx = None;
        for entry in &subtree.nodes {
            if self.contains(entry.node.id) {
                log::warn!("insert_subtree: {} already present, skipping", entry.node.id);
                continue;
            }
            match entry.parent {
                None => {
                    root_idx = Some(self.insert_node(parent, index, entry.node.clone()));
                }
                Some(p) => {
                    let Some(p_idx) = self.index_of(p) else {
                        continue;
                    };
                    self.add_node(p_idx, entry.node.clone());
                }
            }
        }
        root_idx
    }

    /// Rebuild the `id_index` (needed after deserialization).
    pub fn rebuild_index(&mut self) {
        self.id_index.clear();
        for idx in self.graph.node_indices() {
            let id = self.graph[idx].id;
            self.id_index.insert(id, idx);
        }
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(name: &str, x: f32, y: f32, w: f32, h: f32) -> SceneNode {
        SceneNode::rectangle(NodeId::intern(name)).with_geometry(x, y, w, h)
    }

    #[test]
    fn scene_graph_basics() {
        let mut sg = SceneGraph::new();
        let idx = sg.add_node(sg.root, rect("box1", 0.0, 0.0, 100.0, 50.0));

        assert!(sg.get_by_id(NodeId::intern("box1")).is_some());
        assert_eq!(sg.children(sg.root).len(), 1);
        assert_eq!(sg.children(sg.root)[0], idx);
        assert_eq!(sg.len(), 1);
    }

    #[test]
    fn color_hex_roundtrip() {
        let c = Color::from_hex("#6C5CE7").unwrap();
        assert_eq!(c.to_hex(), "#6C5CE7");

        let c2 = Color::from_hex("#FF000080").unwrap();
        assert!((c2.a - 128.0 / 255.0).abs() < 0.01);
        assert_eq!(c2.to_hex().len(), 9);
        assert!(Color::from_hex("#12").is_none());
    }

    #[test]
    fn insert_respects_index() {
        let mut sg = SceneGraph::new();
        sg.add_node(sg.root, rect("ins_a", 0.0, 0.0, 1.0, 1.0));
        sg.add_node(sg.root, rect("ins_c", 0.0, 0.0, 1.0, 1.0));
        sg.insert_node(sg.root, 1, rect("ins_b", 0.0, 0.0, 1.0, 1.0));
        let names: Vec<&str> = sg
            .top_level()
            .iter()
            .map(|i| sg.node(*i).id.as_str())
            .collect();
        assert_eq!(names, vec!["ins_a", "ins_b", "ins_c"]);
    }

    #[test]
    fn z_order_moves() {
        let mut sg = SceneGraph::new();
        let a = sg.add_node(sg.root, rect("z_a", 0.0, 0.0, 1.0, 1.0));
        let b = sg.add_node(sg.root, rect("z_b", 0.0, 0.0, 1.0, 1.0));
        let c = sg.add_node(sg.root, rect("z_c", 0.0, 0.0, 1.0, 1.0));

        assert!(sg.bring_to_front(a));
        assert_eq!(sg.top_level(), &[b, c, a]);
        assert!(!sg.bring_forward(a), "already at front");
        assert!(sg.send_backward(a));
        assert_eq!(sg.top_level(), &[b, a, c]);
        assert!(sg.send_to_back(c));
        assert_eq!(sg.top_level(), &[c, b, a]);
    }

    #[test]
    fn test_is_ancestor_of() {
        let mut sg = SceneGraph::new();
        let group_id = NodeId::intern("grp");
        let rect_id = NodeId::intern("r1");
        let other_id = NodeId::intern("other");

        let group_idx = sg.add_node(sg.root, SceneNode::new(group_id, NodeKind::Group));
        sg.add_node(group_idx, rect("r1", 0.0, 0.0, 10.0, 10.0));
        sg.add_node(sg.root, rect("other", 0.0, 0.0, 5.0, 5.0));

        assert!(sg.is_ancestor_of(group_id, rect_id));
        assert!(sg.is_ancestor_of(sg.page_id(), rect_id));
        assert!(!sg.is_ancestor_of(rect_id, group_id));
        assert!(!sg.is_ancestor_of(group_id, group_id));
        assert!(!sg.is_ancestor_of(other_id, rect_id));
        assert_eq!(sg.depth(rect_id), Some(1));
        assert_eq!(sg.depth(group_id), Some(0));
        assert_eq!(sg.parent_id(rect_id), Some(group_id));
        assert_eq!(sg.parent_id(group_id), None);
    }

    #[test]
    fn remove_and_reinsert_subtree() {
        let mut sg = SceneGraph::new();
        let frame = sg.add_node(
            sg.root,
            SceneNode::frame(NodeId::intern("rm_frame"), AutoLayout::default()),
        );
        sg.add_node(frame, rect("rm_child_a", 0.0, 0.0, 1.0, 1.0));
        sg.add_node(frame, rect("rm_child_b", 0.0, 0.0, 1.0, 1.0));

        let removed = sg.remove_subtree(NodeId::intern("rm_frame")).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(sg.is_empty());
        assert!(sg.get_by_id(NodeId::intern("rm_child_a")).is_none());

        let root = sg.insert_subtree(sg.root, 0, &removed).unwrap();
        assert_eq!(
            sg.child_ids(sg.node(root).id),
            vec![NodeId::intern("rm_child_a"), NodeId::intern("rm_child_b")]
        );
    }

    #[test]
    fn reparent_refuses_cycles() {
        let mut sg = SceneGraph::new();
        let outer = sg.add_node(sg.root, SceneNode::new(NodeId::intern("cy_outer"), NodeKind::Group));
        let inner = sg.add_node(outer, SceneNode::new(NodeId::intern("cy_inner"), NodeKind::Group));
        assert!(!sg.reparent_node(outer, inner, 0));
        assert!(sg.reparent_node(inner, sg.root, 0));
        assert_eq!(sg.top_level(), &[inner, outer]);
    }

    #[test]
    fn fresh_ids_relink_parents() {
        let mut sg = SceneGraph::new();
        let frame = sg.add_node(
            sg.root,
            SceneNode::frame(NodeId::intern("fi_frame"), AutoLayout::default()),
        );
        sg.add_node(frame, rect("fi_child", 0.0, 0.0, 1.0, 1.0));
        let subtree = sg.extract_subtree(NodeId::intern("fi_frame")).unwrap();
        let (copy, map) = subtree.with_fresh_ids();

        let new_root = map[&NodeId::intern("fi_frame")];
        assert_ne!(new_root, NodeId::intern("fi_frame"));
        assert_eq!(copy.nodes[1].parent, Some(new_root));
    }
}
