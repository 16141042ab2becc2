pub mod autolayout;
pub mod component;
pub mod geometry;
pub mod id;
pub mod import;
pub mod layout;
pub mod model;
pub mod property;

pub use autolayout::{
    LayoutChild, LayoutContainer, LayoutResult, apply_auto_layout_all,
    apply_auto_layout_recursive, apply_layout, relayout_after_resize,
};
pub use component::{
    ComponentDefinition, ComponentPropertyKind, ComponentPropertyValue, ComponentRegistry,
    InstanceRecord, Override, PropertyDefinition,
};
pub use geometry::{Axis, Point, Rect, Size};
pub use id::{ComponentId, NodeId, VariantSetId};
pub use import::{ImportError, RawNode, import_forest, import_json};
pub use layout::{
    CoordinateWarning, CorruptionPolicy, LayoutNode, LayoutTree, ResolveConfig, StretchPolicy,
    resolve_layout,
};
pub use model::*;
pub use property::{Property, PropertyValue};

// Re-export petgraph types so downstream crates don't need a direct dependency
pub use petgraph::graph::NodeIndex;
