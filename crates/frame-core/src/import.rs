//! Node-forest ingestion.
//!
//! Hosts hand the core a JSON forest of raw nodes (camelCase keys, Figma-like
//! enum spellings). Ingestion converts it into a `SceneGraph`, deriving local
//! coordinates from `absoluteBoundingBox` when `x`/`y` are absent.

use crate::geometry::Rect;
use crate::id::{ComponentId, NodeId};
use crate::model::*;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid node JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate node id `{0}`")]
    DuplicateId(String),
    #[error("node id `{0}` uses the reserved `::` prefix")]
    ReservedId(String),
    #[error("node `{id}` has unknown type `{kind}`")]
    UnknownKind { id: String, kind: String },
    #[error("node `{id}` is a {kind} without a componentId")]
    MissingComponent { id: String, kind: String },
    #[error("node `{id}` has invalid color `{value}`")]
    InvalidColor { id: String, value: String },
}

// ─── Raw shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RawBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGradientStop {
    pub position: f32,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPaint {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub gradient_angle: f32,
    #[serde(default)]
    pub gradient_stops: Vec<RawGradientStop>,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub scale_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEffect {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub radius: f32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
    #[serde(default)]
    pub spread: f32,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTextStyle {
    pub font_family: Option<String>,
    pub font_weight: Option<u16>,
    pub font_size: Option<f32>,
    pub line_height_px: Option<f32>,
    #[serde(default)]
    pub letter_spacing: f32,
    pub text_align_horizontal: Option<String>,
    pub text_align_vertical: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RawConstraints {
    #[serde(default)]
    pub horizontal: Option<RawConstraint>,
    #[serde(default)]
    pub vertical: Option<RawConstraint>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawConstraint {
    #[serde(alias = "LEFT", alias = "TOP")]
    Min,
    Center,
    #[serde(alias = "RIGHT", alias = "BOTTOM")]
    Max,
    #[serde(alias = "LEFT_RIGHT", alias = "TOP_BOTTOM")]
    Stretch,
    Scale,
}

/// One node of the host's input forest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,

    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    #[serde(default)]
    pub rotation: f32,
    pub absolute_bounding_box: Option<RawBox>,

    #[serde(default)]
    pub children: Vec<RawNode>,

    #[serde(default)]
    pub fills: Vec<RawPaint>,
    #[serde(default)]
    pub strokes: Vec<RawPaint>,
    pub stroke_weight: Option<f32>,
    pub corner_radius: Option<f32>,
    pub rectangle_corner_radii: Option<[f32; 4]>,
    #[serde(default)]
    pub effects: Vec<RawEffect>,
    pub opacity: Option<f32>,
    pub blend_mode: Option<String>,

    pub characters: Option<String>,
    pub style: Option<RawTextStyle>,

    pub layout_mode: Option<String>,
    pub primary_axis_sizing_mode: Option<String>,
    pub counter_axis_sizing_mode: Option<String>,
    pub primary_axis_align_items: Option<String>,
    pub counter_axis_align_items: Option<String>,
    #[serde(default)]
    pub padding_top: f32,
    #[serde(default)]
    pub padding_right: f32,
    #[serde(default)]
    pub padding_bottom: f32,
    #[serde(default)]
    pub padding_left: f32,
    #[serde(default)]
    pub item_spacing: f32,
    #[serde(default)]
    pub counter_axis_spacing: f32,
    pub layout_wrap: Option<String>,
    #[serde(default)]
    pub clips_content: bool,

    pub layout_sizing_horizontal: Option<String>,
    pub layout_sizing_vertical: Option<String>,
    pub layout_positioning: Option<String>,
    pub constraints: Option<RawConstraints>,
    pub min_width: Option<f32>,
    pub max_width: Option<f32>,
    pub min_height: Option<f32>,
    pub max_height: Option<f32>,

    #[serde(default)]
    pub locked: bool,
    pub visible: Option<bool>,

    pub component_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawForest {
    Many(Vec<RawNode>),
    One(Box<RawNode>),
}

// ─── Entry points ────────────────────────────────────────────────────────

const RESERVED_ID_PREFIX: &str = "::";

/// Parse a JSON node forest (an array of nodes, or a single node).
pub fn import_json(json: &str) -> Result<SceneGraph, ImportError> {
    let forest = match serde_json::from_str::<RawForest>(json)? {
        RawForest::Many(nodes) => nodes,
        RawForest::One(node) => vec![*node],
    };
    import_forest(&forest)
}

/// Build a scene graph from already-deserialized raw nodes. Roots are placed
/// under the page in input order.
pub fn import_forest(roots: &[RawNode]) -> Result<SceneGraph, ImportError> {
    let mut graph = SceneGraph::new();
    let mut seen = HashSet::new();
    let page = graph.root;
    for raw in roots {
        import_node(&mut graph, page, raw, None, &mut seen)?;
    }
    log::debug!("imported {} nodes", graph.len());
    Ok(graph)
}

/// `parent_world` is the parent's absolute box if known; `None` for roots.
fn import_node(
    graph: &mut SceneGraph,
    parent: NodeIndex,
    raw: &RawNode,
    parent_world: Option<Rect>,
    seen: &mut HashSet<String>,
) -> Result<(), ImportError> {
    if raw.id.starts_with(RESERVED_ID_PREFIX) {
        return Err(ImportError::ReservedId(raw.id.clone()));
    }
    if !seen.insert(raw.id.clone()) {
        return Err(ImportError::DuplicateId(raw.id.clone()));
    }

    let node = convert(raw, parent_world)?;
    let world = match raw.absolute_bounding_box {
        Some(abs) => Rect::new(abs.x, abs.y, abs.width, abs.height),
        None => {
            let origin = parent_world.map(|p| (p.x, p.y)).unwrap_or((0.0, 0.0));
            node.geometry.rect().translated(origin.0, origin.1)
        }
    };

    let idx = graph.add_node(parent, node);
    for child in &raw.children {
        import_node(graph, idx, child, Some(world), seen)?;
    }
    Ok(())
}

fn convert(raw: &RawNode, parent_world: Option<Rect>) -> Result<SceneNode, ImportError> {
    let id = NodeId::intern(&raw.id);
    let kind = convert_kind(raw)?;
    let mut node = SceneNode::new(id, kind);
    if let Some(name) = &raw.name {
        node.name.clone_from(name);
    }

    let abs = raw.absolute_bounding_box;
    let (px, py) = parent_world.map(|p| (p.x, p.y)).unwrap_or((0.0, 0.0));
    node.geometry = Geometry {
        x: raw.x.or(abs.map(|a| a.x - px)).unwrap_or(0.0),
        y: raw.y.or(abs.map(|a| a.y - py)).unwrap_or(0.0),
        width: raw.width.or(abs.map(|a| a.width)).unwrap_or(0.0),
        height: raw.height.or(abs.map(|a| a.height)).unwrap_or(0.0),
        rotation: raw.rotation,
    };

    node.style = convert_style(raw)?;
    node.child_layout = convert_child_layout(raw);
    node.locked = raw.locked;
    node.visible = raw.visible.unwrap_or(true);
    Ok(node)
}

fn convert_kind(raw: &RawNode) -> Result<NodeKind, ImportError> {
    let tag = raw.kind.to_ascii_uppercase();
    let layout = convert_auto_layout(raw);
    let clip = raw.clips_content;
    let component = || {
        raw.component_id
            .as_deref()
            .map(ComponentId::intern)
            .ok_or_else(|| ImportError::MissingComponent {
                id: raw.id.clone(),
                kind: raw.kind.clone(),
            })
    };
    Ok(match tag.as_str() {
        "FRAME" => NodeKind::Frame { clip, layout },
        "GROUP" => NodeKind::Group,
        "RECTANGLE" => NodeKind::Rectangle,
        "ELLIPSE" => NodeKind::Ellipse,
        "TEXT" => NodeKind::Text(convert_text(raw)),
        "VECTOR" => NodeKind::Vector { paths: Vec::new() },
        "COMPONENT" => NodeKind::Component {
            component: component()?,
            clip,
            layout,
        },
        "INSTANCE" => NodeKind::Instance {
            component: component()?,
            clip,
            layout,
        },
        _ => {
            return Err(ImportError::UnknownKind {
                id: raw.id.clone(),
                kind: raw.kind.clone(),
            });
        }
    })
}

fn convert_text(raw: &RawNode) -> TextData {
    let style = raw.style.clone().unwrap_or_default();
    let defaults = FontSpec::default();
    TextData {
        characters: raw.characters.clone().unwrap_or_default(),
        font: FontSpec {
            family: style.font_family.unwrap_or(defaults.family),
            weight: style.font_weight.unwrap_or(defaults.weight),
            size: style.font_size.unwrap_or(defaults.size),
            line_height: style.line_height_px,
            letter_spacing: style.letter_spacing,
        },
        align: match style.text_align_horizontal.as_deref() {
            Some("CENTER") => TextAlign::Center,
            Some("RIGHT") => TextAlign::Right,
            Some("JUSTIFIED") => TextAlign::Justified,
            _ => TextAlign::Left,
        },
        valign: match style.text_align_vertical.as_deref() {
            Some("CENTER") => TextVAlign::Middle,
            Some("BOTTOM") => TextVAlign::Bottom,
            _ => TextVAlign::Top,
        },
    }
}

fn convert_auto_layout(raw: &RawNode) -> AutoLayout {
    let sizing = |s: Option<&str>| match s {
        Some("AUTO") | Some("HUG") => AxisSizing::Hug,
        _ => AxisSizing::Fixed,
    };
    AutoLayout {
        mode: match raw.layout_mode.as_deref() {
            Some("HORIZONTAL") => LayoutMode::Horizontal,
            Some("VERTICAL") => LayoutMode::Vertical,
            _ => LayoutMode::None,
        },
        primary_sizing: sizing(raw.primary_axis_sizing_mode.as_deref()),
        counter_sizing: sizing(raw.counter_axis_sizing_mode.as_deref()),
        primary_align: match raw.primary_axis_align_items.as_deref() {
            Some("CENTER") => MainAxisAlign::Center,
            Some("MAX") => MainAxisAlign::Max,
            Some("SPACE_BETWEEN") => MainAxisAlign::SpaceBetween,
            Some("SPACE_AROUND") => MainAxisAlign::SpaceAround,
            Some("SPACE_EVENLY") => MainAxisAlign::SpaceEvenly,
            _ => MainAxisAlign::Min,
        },
        counter_align: match raw.counter_axis_align_items.as_deref() {
            Some("CENTER") => CrossAxisAlign::Center,
            Some("MAX") => CrossAxisAlign::Max,
            Some("STRETCH") => CrossAxisAlign::Stretch,
            _ => CrossAxisAlign::Min,
        },
        padding: Padding {
            top: raw.padding_top,
            right: raw.padding_right,
            bottom: raw.padding_bottom,
            left: raw.padding_left,
        },
        item_spacing: raw.item_spacing,
        counter_axis_spacing: raw.counter_axis_spacing,
        wrap: raw.layout_wrap.as_deref() == Some("WRAP"),
    }
}

fn convert_child_layout(raw: &RawNode) -> ChildLayout {
    let sizing = |s: Option<&str>| match s {
        Some("HUG") => ChildSizing::Hug,
        Some("FILL") => ChildSizing::Fill,
        _ => ChildSizing::Fixed,
    };
    let constraint = |c: Option<RawConstraint>| match c {
        Some(RawConstraint::Center) => ConstraintKind::Center,
        Some(RawConstraint::Max) => ConstraintKind::Max,
        Some(RawConstraint::Stretch) => ConstraintKind::Stretch,
        Some(RawConstraint::Scale) => ConstraintKind::Scale,
        Some(RawConstraint::Min) | None => ConstraintKind::Min,
    };
    let constraints = raw.constraints.unwrap_or_default();
    ChildLayout {
        horizontal_sizing: sizing(raw.layout_sizing_horizontal.as_deref()),
        vertical_sizing: sizing(raw.layout_sizing_vertical.as_deref()),
        positioning: match raw.layout_positioning.as_deref() {
            Some("ABSOLUTE") => Positioning::Absolute,
            _ => Positioning::Auto,
        },
        constraints: Constraints {
            horizontal: constraint(constraints.horizontal),
            vertical: constraint(constraints.vertical),
        },
        limits: SizeLimits {
            min_width: raw.min_width,
            max_width: raw.max_width,
            min_height: raw.min_height,
            max_height: raw.max_height,
        },
    }
}

// ─── Style ───────────────────────────────────────────────────────────────

fn parse_color(id: &str, value: &str, opacity: Option<f32>) -> Result<Color, ImportError> {
    let mut color = Color::from_hex(value).ok_or_else(|| ImportError::InvalidColor {
        id: id.to_string(),
        value: value.to_string(),
    })?;
    if let Some(o) = opacity {
        color.a *= o;
    }
    Ok(color)
}

fn convert_paint(id: &str, raw: &RawPaint) -> Result<Option<Paint>, ImportError> {
    let stops = || -> Result<Vec<GradientStop>, ImportError> {
        raw.gradient_stops
            .iter()
            .map(|s| {
                Ok(GradientStop {
                    offset: s.position,
                    color: parse_color(id, &s.color, None)?,
                })
            })
            .collect()
    };
    Ok(Some(match raw.kind.as_str() {
        "SOLID" => {
            let hex = raw.color.as_deref().unwrap_or("#000000");
            Paint::Solid(parse_color(id, hex, raw.opacity)?)
        }
        "GRADIENT_LINEAR" => Paint::LinearGradient {
            angle: raw.gradient_angle,
            stops: stops()?,
        },
        "GRADIENT_RADIAL" => Paint::RadialGradient { stops: stops()? },
        "IMAGE" => Paint::Image {
            image_ref: raw.image_ref.clone().unwrap_or_default(),
            scale_mode: match raw.scale_mode.as_deref() {
                Some("FIT") => ImageScaleMode::Fit,
                Some("TILE") => ImageScaleMode::Tile,
                Some("STRETCH") => ImageScaleMode::Stretch,
                _ => ImageScaleMode::Fill,
            },
        },
        other => {
            log::warn!("node {id}: skipping unsupported paint type {other}");
            return Ok(None);
        }
    }))
}

fn convert_effect(id: &str, raw: &RawEffect) -> Result<Option<Effect>, ImportError> {
    let shadow = || -> Result<Shadow, ImportError> {
        Ok(Shadow {
            offset_x: raw.offset_x,
            offset_y: raw.offset_y,
            blur: raw.radius,
            spread: raw.spread,
            color: match &raw.color {
                Some(c) => parse_color(id, c, None)?,
                None => Color::rgba(0.0, 0.0, 0.0, 0.25),
            },
        })
    };
    Ok(Some(match raw.kind.as_str() {
        "DROP_SHADOW" => Effect::DropShadow(shadow()?),
        "INNER_SHADOW" => Effect::InnerShadow(shadow()?),
        "LAYER_BLUR" => Effect::LayerBlur { radius: raw.radius },
        "BACKGROUND_BLUR" => Effect::BackgroundBlur { radius: raw.radius },
        other => {
            log::warn!("node {id}: skipping unsupported effect type {other}");
            return Ok(None);
        }
    }))
}

fn convert_blend_mode(value: Option<&str>) -> BlendMode {
    match value {
        Some("PASS_THROUGH") => BlendMode::PassThrough,
        Some("DARKEN") => BlendMode::Darken,
        Some("MULTIPLY") => BlendMode::Multiply,
        Some("COLOR_BURN") => BlendMode::ColorBurn,
        Some("LIGHTEN") => BlendMode::Lighten,
        Some("SCREEN") => BlendMode::Screen,
        Some("COLOR_DODGE") => BlendMode::ColorDodge,
        Some("OVERLAY") => BlendMode::Overlay,
        Some("SOFT_LIGHT") => BlendMode::SoftLight,
        Some("HARD_LIGHT") => BlendMode::HardLight,
        Some("DIFFERENCE") => BlendMode::Difference,
        Some("EXCLUSION") => BlendMode::Exclusion,
        Some("HUE") => BlendMode::Hue,
        Some("SATURATION") => BlendMode::Saturation,
        Some("COLOR") => BlendMode::Color,
        Some("LUMINOSITY") => BlendMode::Luminosity,
        _ => BlendMode::Normal,
    }
}

fn convert_style(raw: &RawNode) -> Result<Style, ImportError> {
    let id = raw.id.as_str();
    let mut fills = SmallVec::new();
    for p in &raw.fills {
        fills.extend(convert_paint(id, p)?);
    }
    let mut strokes = SmallVec::new();
    for p in &raw.strokes {
        if let Some(paint) = convert_paint(id, p)? {
            strokes.push(Stroke {
                paint,
                width: raw.stroke_weight.unwrap_or(1.0),
                ..Default::default()
            });
        }
    }
    let mut effects = SmallVec::new();
    for e in &raw.effects {
        effects.extend(convert_effect(id, e)?);
    }
    let corner_radius = match (raw.rectangle_corner_radii, raw.corner_radius) {
        (Some([tl, tr, br, bl]), _) => CornerRadii {
            top_left: tl,
            top_right: tr,
            bottom_right: br,
            bottom_left: bl,
        },
        (None, Some(r)) => CornerRadii::uniform(r),
        (None, None) => CornerRadii::default(),
    };
    Ok(Style {
        fills,
        strokes,
        corner_radius,
        effects,
        opacity: raw.opacity.unwrap_or(1.0).clamp(0.0, 1.0),
        blend_mode: convert_blend_mode(raw.blend_mode.as_deref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_nested_frame() {
        let json = r##"[{
            "id": "imp_card", "type": "FRAME", "x": 10, "y": 20, "width": 200, "height": 100,
            "layoutMode": "VERTICAL", "itemSpacing": 8, "paddingTop": 4,
            "fills": [{ "type": "SOLID", "color": "#FF0000" }],
            "children": [
                { "id": "imp_title", "type": "TEXT", "x": 0, "y": 0, "width": 50, "height": 20,
                  "characters": "Hi", "style": { "fontSize": 18 } }
            ]
        }]"##;
        let graph = import_json(json).unwrap();
        let card = graph.get_by_id(NodeId::intern("imp_card")).unwrap();
        assert_eq!(card.geometry.x, 10.0);
        assert_eq!(card.style.fills.len(), 1);
        let layout = card.kind.auto_layout().unwrap();
        assert_eq!(layout.mode, LayoutMode::Vertical);
        assert_eq!(layout.item_spacing, 8.0);

        let title = graph.get_by_id(NodeId::intern("imp_title")).unwrap();
        match &title.kind {
            NodeKind::Text(t) => {
                assert_eq!(t.characters, "Hi");
                assert_eq!(t.font.size, 18.0);
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert_eq!(
            graph.parent_id(NodeId::intern("imp_title")),
            Some(NodeId::intern("imp_card"))
        );
    }

    #[test]
    fn local_derived_from_absolute_box() {
        let json = r#"{
            "id": "abs_parent", "type": "FRAME",
            "absoluteBoundingBox": { "x": 100, "y": 100, "width": 300, "height": 300 },
            "children": [{
                "id": "abs_child", "type": "RECTANGLE",
                "absoluteBoundingBox": { "x": 130, "y": 150, "width": 40, "height": 40 }
            }]
        }"#;
        let graph = import_json(json).unwrap();
        let child = graph.get_by_id(NodeId::intern("abs_child")).unwrap();
        assert_eq!(child.geometry.x, 30.0);
        assert_eq!(child.geometry.y, 50.0);
        assert_eq!(child.geometry.width, 40.0);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let json = r#"[
            { "id": "dup", "type": "RECTANGLE" },
            { "id": "dup", "type": "ELLIPSE" }
        ]"#;
        assert!(matches!(import_json(json), Err(ImportError::DuplicateId(id)) if id == "dup"));
    }

    #[test]
    fn node_named_root_is_an_ordinary_frame() {
        let json = r#"[
            { "id": "root", "type": "FRAME", "width": 200, "height": 200 },
            { "id": "beside_root", "type": "RECTANGLE", "x": 300 }
        ]"#;
        let graph = import_json(json).unwrap();
        let user_root = NodeId::intern("root");
        let other = NodeId::intern("beside_root");
        assert_ne!(graph.page_id(), user_root);
        assert_eq!(graph.len(), 2);
        assert!(!graph.is_ancestor_of(user_root, other));
        assert!(graph.is_ancestor_of(graph.page_id(), other));
        assert_eq!(graph.parent_id(user_root), None);
    }

    #[test]
    fn reserved_prefix_rejected() {
        let json = r#"{ "id": "::page", "type": "FRAME" }"#;
        assert!(matches!(import_json(json), Err(ImportError::ReservedId(id)) if id == "::page"));
    }

    #[test]
    fn unknown_kind_rejected() {
        let json = r#"{ "id": "weird", "type": "STAR" }"#;
        assert!(matches!(
            import_json(json),
            Err(ImportError::UnknownKind { .. })
        ));
    }

    #[test]
    fn instance_requires_component() {
        let json = r#"{ "id": "lonely_inst", "type": "INSTANCE" }"#;
        assert!(matches!(
            import_json(json),
            Err(ImportError::MissingComponent { .. })
        ));
    }
}
