//! Integration tests: component definitions, instances and overrides
//! against an imported document.

use frame_core::component::{ComponentPropertyValue, ComponentRegistry, PropertyDefinition};
use frame_core::id::NodeId;
use frame_core::import::import_json;
use frame_core::layout::{ResolveConfig, resolve_layout};
use frame_core::model::*;
use frame_core::property::PropertyValue;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

const CARD: &str = r##"[
  {
    "id": "src_card", "type": "FRAME", "name": "Card",
    "x": 0, "y": 0, "width": 200, "height": 120,
    "layoutMode": "VERTICAL", "itemSpacing": 8,
    "paddingTop": 12, "paddingLeft": 12, "paddingRight": 12, "paddingBottom": 12,
    "children": [
      { "id": "src_title", "type": "TEXT", "name": "title", "width": 120, "height": 20, "characters": "Title" },
      { "id": "src_badge", "type": "RECTANGLE", "name": "badge", "width": 16, "height": 16,
        "fills": [{ "type": "SOLID", "color": "#00B894" }] }
    ]
  },
  { "id": "board", "type": "FRAME", "x": 400, "y": 0, "width": 600, "height": 600 }
]"##;

fn setup() -> (SceneGraph, ComponentRegistry, frame_core::ComponentId) {
    let graph = import_json(CARD).unwrap();
    let mut registry = ComponentRegistry::new();
    let card = registry
        .create_component(&graph, NodeId::intern("src_card"), "Card")
        .unwrap();
    (graph, registry, card)
}

fn child_named(graph: &SceneGraph, parent: NodeId, name: &str) -> NodeId {
    graph
        .child_ids(parent)
        .into_iter()
        .find(|c| graph.get_by_id(*c).unwrap().name == name)
        .unwrap_or_else(|| panic!("no child named {name}"))
}

#[test]
fn instances_resolve_inside_their_parent() {
    let (mut graph, mut registry, card) = setup();
    let inst = registry
        .create_instance(&mut graph, card, Some(NodeId::intern("board")), 20.0, 30.0)
        .unwrap();
    assert_eq!(graph.parent_id(inst), Some(NodeId::intern("board")));

    let tree = resolve_layout(&graph, &ResolveConfig::default());
    let title = child_named(&graph, inst, "title");
    let badge = child_named(&graph, inst, "badge");
    // board (400, 0) + instance (20, 30) + padding 12, stacked with gap 8
    assert_eq!(tree.world_rect(title).unwrap().x, 432.0);
    assert_eq!(tree.world_rect(title).unwrap().y, 42.0);
    assert_eq!(tree.world_rect(badge).unwrap().y, 70.0);
}

#[test]
fn later_override_wins_across_rebuilds() {
    let (mut graph, mut registry, card) = setup();
    let inst = registry.create_instance(&mut graph, card, None, 0.0, 0.0).unwrap();
    let badge = child_named(&graph, inst, "badge");

    assert!(registry.set_override(&mut graph, inst, badge, PropertyValue::Opacity(0.5)));
    assert!(registry.set_override(&mut graph, inst, badge, PropertyValue::Visible(false)));
    assert!(registry.set_override(&mut graph, inst, badge, PropertyValue::Opacity(0.25)));

    registry.update_all_instances(&mut graph);
    let node = graph.get_by_id(badge).unwrap();
    assert_eq!(node.style.opacity, 0.25);
    assert!(!node.visible);
    assert_eq!(registry.instance(inst).unwrap().overrides.len(), 2);
}

#[test]
fn every_instance_follows_definition_edits() {
    let (mut graph, mut registry, card) = setup();
    let a = registry.create_instance(&mut graph, card, None, 0.0, 300.0).unwrap();
    let b = registry.create_instance(&mut graph, card, None, 250.0, 300.0).unwrap();
    let a_title = child_named(&graph, a, "title");
    registry.set_override(&mut graph, a, a_title, PropertyValue::Characters("Custom".into()));

    let def = registry.definition_mut(card).unwrap();
    for entry in &mut def.subtree.nodes {
        if let NodeKind::Text(text) = &mut entry.node.kind {
            text.characters = "Renamed".into();
        }
    }
    assert_eq!(registry.update_instances_of(&mut graph, card), 2);

    let text = |id: NodeId| match &graph.get_by_id(id).unwrap().kind {
        NodeKind::Text(t) => t.characters.clone(),
        _ => String::new(),
    };
    assert_eq!(text(a_title), "Custom");
    assert_eq!(text(child_named(&graph, b, "title")), "Renamed");
    assert_eq!(graph.get_by_id(b).unwrap().geometry.x, 250.0);
}

#[test]
fn boolean_property_toggles_target_visibility() {
    let (mut graph, mut registry, card) = setup();
    let def_badge = registry
        .definition(card)
        .unwrap()
        .subtree
        .nodes
        .iter()
        .find(|n| n.node.name == "badge")
        .unwrap()
        .node
        .id;
    registry.add_property(
        card,
        PropertyDefinition {
            name: "Show badge".into(),
            default: ComponentPropertyValue::Boolean(true),
            target: Some(def_badge),
        },
    );
    let inst = registry.create_instance(&mut graph, card, None, 0.0, 0.0).unwrap();
    let badge = child_named(&graph, inst, "badge");
    assert!(graph.get_by_id(badge).unwrap().visible);

    assert!(registry.set_instance_property(
        &mut graph,
        inst,
        "Show badge",
        ComponentPropertyValue::Boolean(false)
    ));
    assert!(!graph.get_by_id(badge).unwrap().visible);
}

#[test]
fn variant_property_switches_sibling() {
    let (mut graph, mut registry, card) = setup();
    let compact = registry
        .create_component(&graph, NodeId::intern("src_card"), "Card")
        .unwrap();
    registry
        .definition_mut(compact)
        .unwrap()
        .subtree
        .root_mut()
        .unwrap()
        .geometry
        .height = 60.0;
    registry.create_variant_set(
        "Card",
        vec![
            (card, BTreeMap::from([("size".into(), "regular".into())])),
            (compact, BTreeMap::from([("size".into(), "compact".into())])),
        ],
    );

    let inst = registry.create_instance(&mut graph, card, None, 5.0, 5.0).unwrap();
    assert!(registry.set_instance_property(
        &mut graph,
        inst,
        "size",
        ComponentPropertyValue::Variant("compact".into())
    ));
    assert_eq!(registry.instance(inst).unwrap().component, compact);
    assert_eq!(graph.get_by_id(inst).unwrap().geometry.height, 60.0);
    assert_eq!(registry.instances_of(card), Vec::<NodeId>::new());
    assert_eq!(registry.instances_of(compact), vec![inst]);

    // No such variant: nothing changes.
    assert!(!registry.switch_variant_by_value(&mut graph, inst, "size", "huge"));
}

#[test]
fn source_node_is_untouched_by_component_creation() {
    let (graph, registry, card) = setup();
    let src = graph.get_by_id(NodeId::intern("src_card")).unwrap();
    assert!(matches!(src.kind, NodeKind::Frame { .. }));
    let def = registry.definition(card).unwrap();
    assert_eq!(def.subtree.len(), 3);
    assert!(!def.subtree.contains(NodeId::intern("src_card")));
}
