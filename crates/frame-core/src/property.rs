//! Typed node properties.
//!
//! A `PropertyValue` is a property tag plus its payload. Values can be read
//! from and applied to a `SceneNode`; the same values are carried by
//! component overrides and by undoable property edits.

use crate::model::{AutoLayout, BlendMode, CornerRadii, Effect, NodeKind, Paint, SceneNode, Stroke};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Property tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    Characters,
    Fills,
    Strokes,
    Opacity,
    Visible,
    Effects,
    CornerRadius,
    Position,
    Size,
    Rotation,
    Name,
    Locked,
    BlendMode,
    AutoLayout,
}

impl Property {
    /// Whether instances may override this property.
    pub fn is_overridable(self) -> bool {
        matches!(
            self,
            Property::Characters
                | Property::Fills
                | Property::Strokes
                | Property::Opacity
                | Property::Visible
                | Property::Effects
                | Property::CornerRadius
                | Property::Position
                | Property::Size
                | Property::Rotation
        )
    }
}

/// A property together with its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Characters(String),
    Fills(SmallVec<[Paint; 1]>),
    Strokes(SmallVec<[Stroke; 1]>),
    Opacity(f32),
    Visible(bool),
    Effects(SmallVec<[Effect; 1]>),
    CornerRadius(CornerRadii),
    Position { x: f32, y: f32 },
    Size { width: f32, height: f32 },
    Rotation(f32),
    Name(String),
    Locked(bool),
    BlendMode(BlendMode),
    AutoLayout(AutoLayout),
}

impl PropertyValue {
    pub fn property(&self) -> Property {
        match self {
            PropertyValue::Characters(_) => Property::Characters,
            PropertyValue::Fills(_) => Property::Fills,
            PropertyValue::Strokes(_) => Property::Strokes,
            PropertyValue::Opacity(_) => Property::Opacity,
            PropertyValue::Visible(_) => Property::Visible,
            PropertyValue::Effects(_) => Property::Effects,
            PropertyValue::CornerRadius(_) => Property::CornerRadius,
            PropertyValue::Position { .. } => Property::Position,
            PropertyValue::Size { .. } => Property::Size,
            PropertyValue::Rotation(_) => Property::Rotation,
            PropertyValue::Name(_) => Property::Name,
            PropertyValue::Locked(_) => Property::Locked,
            PropertyValue::BlendMode(_) => Property::BlendMode,
            PropertyValue::AutoLayout(_) => Property::AutoLayout,
        }
    }

    /// Read the current value of `property` from a node. `None` when the
    /// node's kind does not carry it (characters on a rectangle, etc).
    pub fn read(node: &SceneNode, property: Property) -> Option<PropertyValue> {
        let style = &node.style;
        let geo = &node.geometry;
        Some(match property {
            Property::Characters => match &node.kind {
                NodeKind::Text(text) => PropertyValue::Characters(text.characters.clone()),
                _ => return None,
            },
            Property::Fills => PropertyValue::Fills(style.fills.clone()),
            Property::Strokes => PropertyValue::Strokes(style.strokes.clone()),
            Property::Opacity => PropertyValue::Opacity(style.opacity),
            Property::Visible => PropertyValue::Visible(node.visible),
            Property::Effects => PropertyValue::Effects(style.effects.clone()),
            Property::CornerRadius => PropertyValue::CornerRadius(style.corner_radius),
            Property::Position => PropertyValue::Position { x: geo.x, y: geo.y },
            Property::Size => PropertyValue::Size {
                width: geo.width,
                height: geo.height,
            },
            Property::Rotation => PropertyValue::Rotation(geo.rotation),
            Property::Name => PropertyValue::Name(node.name.clone()),
            Property::Locked => PropertyValue::Locked(node.locked),
            Property::BlendMode => PropertyValue::BlendMode(style.blend_mode),
            Property::AutoLayout => PropertyValue::AutoLayout(*node.kind.auto_layout()?),
        })
    }

    /// Write this value into a node. Returns false when the node's kind
    /// cannot hold it.
    pub fn apply(&self, node: &mut SceneNode) -> bool {
        match self {
            PropertyValue::Characters(s) => match &mut node.kind {
                NodeKind::Text(text) => text.characters.clone_from(s),
                _ => return false,
            },
            PropertyValue::Fills(f) => node.style.fills = f.clone(),
            PropertyValue::Strokes(s) => node.style.strokes = s.clone(),
            PropertyValue::Opacity(o) => node.style.opacity = o.clamp(0.0, 1.0),
            PropertyValue::Visible(v) => node.visible = *v,
            PropertyValue::Effects(e) => node.style.effects = e.clone(),
            PropertyValue::CornerRadius(r) => node.style.corner_radius = *r,
            PropertyValue::Position { x, y } => {
                node.geometry.x = *x;
                node.geometry.y = *y;
            }
            PropertyValue::Size { width, height } => {
                node.geometry.width = width.max(0.0);
                node.geometry.height = height.max(0.0);
            }
            PropertyValue::Rotation(r) => node.geometry.rotation = *r,
            PropertyValue::Name(n) => node.name.clone_from(n),
            PropertyValue::Locked(l) => node.locked = *l,
            PropertyValue::BlendMode(b) => node.style.blend_mode = *b,
            PropertyValue::AutoLayout(layout) => match node.kind.auto_layout_mut() {
                Some(slot) => *slot = *layout,
                None => return false,
            },
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;
    use crate::model::Color;
    use smallvec::smallvec;

    #[test]
    fn read_apply_text() {
        let mut node = SceneNode::text(NodeId::intern("prop_label"), "Hello");
        assert_eq!(
            PropertyValue::read(&node, Property::Characters),
            Some(PropertyValue::Characters("Hello".into()))
        );
        assert!(PropertyValue::Characters("Bye".into()).apply(&mut node));
        assert_eq!(
            PropertyValue::read(&node, Property::Characters),
            Some(PropertyValue::Characters("Bye".into()))
        );
    }

    #[test]
    fn characters_on_rectangle_is_rejected() {
        let mut node = SceneNode::rectangle(NodeId::intern("prop_rect"));
        assert_eq!(PropertyValue::read(&node, Property::Characters), None);
        assert!(!PropertyValue::Characters("x".into()).apply(&mut node));
    }

    #[test]
    fn fills_roundtrip_through_node() {
        let mut node = SceneNode::rectangle(NodeId::intern("prop_fill"));
        let red = Paint::Solid(Color::rgba(1.0, 0.0, 0.0, 1.0));
        let value = PropertyValue::Fills(smallvec![red]);
        assert!(value.apply(&mut node));
        assert_eq!(PropertyValue::read(&node, Property::Fills), Some(value));
    }

    #[test]
    fn allow_list() {
        assert!(Property::Characters.is_overridable());
        assert!(Property::Rotation.is_overridable());
        assert!(!Property::Name.is_overridable());
        assert!(!Property::AutoLayout.is_overridable());
        assert!(!Property::Locked.is_overridable());
    }

    #[test]
    fn opacity_is_clamped() {
        let mut node = SceneNode::rectangle(NodeId::intern("prop_opacity"));
        PropertyValue::Opacity(3.0).apply(&mut node);
        assert_eq!(node.style.opacity, 1.0);
    }
}
