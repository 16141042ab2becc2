//! Components, instances, variants and overrides.
//!
//! A definition owns an off-canvas `Subtree`. An instance is a copy of that
//! subtree placed in the scene; its node ids are derived from the instance
//! root id and the definition node id, so rebuilding an instance reproduces
//! the same ids. The rendered instance is always
//! `definition ⊕ property values ⊕ overrides` (in that order).

use crate::id::{ComponentId, NodeId, VariantSetId};
use crate::model::*;
use crate::property::{Property, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ─── Schema ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentPropertyKind {
    Text,
    Boolean,
    InstanceSwap,
    Variant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentPropertyValue {
    Text(String),
    Boolean(bool),
    InstanceSwap(ComponentId),
    Variant(String),
}

impl ComponentPropertyValue {
    pub fn kind(&self) -> ComponentPropertyKind {
        match self {
            ComponentPropertyValue::Text(_) => ComponentPropertyKind::Text,
            ComponentPropertyValue::Boolean(_) => ComponentPropertyKind::Boolean,
            ComponentPropertyValue::InstanceSwap(_) => ComponentPropertyKind::InstanceSwap,
            ComponentPropertyValue::Variant(_) => ComponentPropertyKind::Variant,
        }
    }
}

/// One entry of a definition's property schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    pub default: ComponentPropertyValue,
    /// Definition-side node the property drives: text → characters,
    /// boolean → visibility, instance-swap → the swapped node.
    pub target: Option<NodeId>,
}

/// Membership of a definition in a variant set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantMembership {
    pub set: VariantSetId,
    /// Variant property → value, e.g. `state = hover`.
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub id: ComponentId,
    pub name: String,
    pub subtree: Subtree,
    pub properties: Vec<PropertyDefinition>,
    pub variant: Option<VariantMembership>,
}

impl ComponentDefinition {
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// `name` path from the subtree root down to `id`, used to match nodes
    /// across sibling variants.
    fn name_path(&self, id: NodeId) -> Option<Vec<String>> {
        let mut path = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let entry = self.subtree.nodes.iter().find(|n| n.node.id == c)?;
            path.push(entry.node.name.clone());
            cur = entry.parent;
        }
        path.reverse();
        Some(path)
    }

    fn find_by_name_path(&self, path: &[String]) -> Option<NodeId> {
        self.subtree
            .nodes
            .iter()
            .map(|n| n.node.id)
            .find(|id| self.name_path(*id).as_deref() == Some(path))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSet {
    pub id: VariantSetId,
    pub name: String,
    pub members: Vec<ComponentId>,
}

// ─── Instances ───────────────────────────────────────────────────────────

/// A property change recorded against one definition-side node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    pub target: NodeId,
    pub value: PropertyValue,
}

impl Override {
    pub fn property(&self) -> Property {
        self.value.property()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Root node of the instance in the scene.
    pub root: NodeId,
    pub component: ComponentId,
    /// Applied in order; later entries win.
    pub overrides: Vec<Override>,
    pub property_values: BTreeMap<String, ComponentPropertyValue>,
    /// Definition node → instance node.
    pub source_map: HashMap<NodeId, NodeId>,
    /// Detached instances are plain frames; the record is kept for history.
    pub detached: bool,
}

impl InstanceRecord {
    /// Definition-side id for an instance-side (or already definition-side) id.
    fn definition_node(&self, id: NodeId) -> Option<NodeId> {
        if self.source_map.contains_key(&id) {
            return Some(id);
        }
        self.source_map
            .iter()
            .find(|(_, inst)| **inst == id)
            .map(|(def, _)| *def)
    }
}

fn instance_node_id(root: NodeId, def_node: NodeId) -> NodeId {
    NodeId::intern(&format!("{}:{}", root.as_str(), def_node.as_str()))
}

// ─── Registry ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentRegistry {
    definitions: HashMap<ComponentId, ComponentDefinition>,
    variant_sets: HashMap<VariantSetId, VariantSet>,
    instances: HashMap<NodeId, InstanceRecord>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definition(&self, id: ComponentId) -> Option<&ComponentDefinition> {
        self.definitions.get(&id)
    }

    pub fn definition_mut(&mut self, id: ComponentId) -> Option<&mut ComponentDefinition> {
        self.definitions.get_mut(&id)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ComponentDefinition> {
        self.definitions.values()
    }

    pub fn variant_set(&self, id: VariantSetId) -> Option<&VariantSet> {
        self.variant_sets.get(&id)
    }

    pub fn instance(&self, root: NodeId) -> Option<&InstanceRecord> {
        self.instances.get(&root)
    }

    /// Whether `id` is the root of an attached instance.
    pub fn is_instance(&self, id: NodeId) -> bool {
        self.instances.get(&id).is_some_and(|r| !r.detached)
    }

    /// Attached instance roots of a component, sorted by id.
    pub fn instances_of(&self, component: ComponentId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .instances
            .values()
            .filter(|r| r.component == component && !r.detached)
            .map(|r| r.root)
            .collect();
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        out
    }

    /// Register a definition from a scene node. The node's subtree is copied
    /// off-canvas with fresh ids; the scene is not modified. Non-container
    /// roots are wrapped in a component frame of the same size.
    pub fn create_component(
        &mut self,
        graph: &SceneGraph,
        source: NodeId,
        name: &str,
    ) -> Option<ComponentId> {
        let Some(subtree) = graph.extract_subtree(source) else {
            log::warn!("create_component: unknown node {source}");
            return None;
        };
        let id = ComponentId::with_prefix("component");
        let (mut subtree, _) = subtree.with_fresh_ids();
        let root = subtree.root_mut()?;
        let (clip, layout) = match &root.kind {
            NodeKind::Frame { clip, layout }
            | NodeKind::Component { clip, layout, .. }
            | NodeKind::Instance { clip, layout, .. } => (Some(*clip), *layout),
            _ => (None, AutoLayout::default()),
        };
        match clip {
            Some(clip) => {
                root.kind = NodeKind::Component {
                    component: id,
                    clip,
                    layout,
                };
                root.name = name.to_string();
                root.geometry.x = 0.0;
                root.geometry.y = 0.0;
            }
            None => {
                let geo = root.geometry;
                root.geometry.x = 0.0;
                root.geometry.y = 0.0;
                let mut wrapper = SceneNode::new(
                    NodeId::with_prefix("component"),
                    NodeKind::Component {
                        component: id,
                        clip: false,
                        layout: AutoLayout::default(),
                    },
                )
                .with_geometry(0.0, 0.0, geo.width, geo.height);
                wrapper.name = name.to_string();
                let wrapper_id = wrapper.id;
                if let Some(first) = subtree.nodes.first_mut() {
                    first.parent = Some(wrapper_id);
                }
                subtree.nodes.insert(
                    0,
                    SubtreeNode {
                        node: wrapper,
                        parent: None,
                    },
                );
            }
        }
        self.register(id, name, subtree);
        Some(id)
    }

    /// Register an already-built definition subtree under a new id.
    pub fn define_component(&mut self, name: &str, subtree: Subtree) -> Option<ComponentId> {
        if subtree.is_empty() {
            log::warn!("define_component: empty subtree for {name}");
            return None;
        }
        let id = ComponentId::with_prefix("component");
        let mut subtree = subtree;
        if let Some(root) = subtree.root_mut() {
            let layout = root.kind.auto_layout().copied().unwrap_or_default();
            root.kind = NodeKind::Component {
                component: id,
                clip: false,
                layout,
            };
        }
        self.register(id, name, subtree);
        Some(id)
    }

    fn register(&mut self, id: ComponentId, name: &str, subtree: Subtree) {
        log::debug!("registered component {id} ({name}, {} nodes)", subtree.len());
        self.definitions.insert(
            id,
            ComponentDefinition {
                id,
                name: name.to_string(),
                subtree,
                properties: Vec::new(),
                variant: None,
            },
        );
    }

    /// Add a property to a definition's schema. A target must exist in the
    /// definition subtree.
    pub fn add_property(&mut self, component: ComponentId, property: PropertyDefinition) -> bool {
        let Some(def) = self.definitions.get_mut(&component) else {
            log::warn!("add_property: unknown component {component}");
            return false;
        };
        if let Some(target) = property.target.filter(|t| !def.subtree.contains(*t)) {
            log::warn!("add_property: {target} is not part of {component}");
            return false;
        }
        def.properties.retain(|p| p.name != property.name);
        def.properties.push(property);
        true
    }

    /// Group definitions into a variant set. Each member carries its variant
    /// values (`property = value`).
    pub fn create_variant_set(
        &mut self,
        name: &str,
        members: Vec<(ComponentId, BTreeMap<String, String>)>,
    ) -> Option<VariantSetId> {
        if let Some((missing, _)) = members
            .iter()
            .find(|(c, _)| !self.definitions.contains_key(c))
        {
            log::warn!("create_variant_set: unknown component {missing}");
            return None;
        }
        let set = VariantSetId::with_prefix("variants");
        for (component, values) in &members {
            if let Some(def) = self.definitions.get_mut(component) {
                def.variant = Some(VariantMembership {
                    set,
                    values: values.clone(),
                });
            }
        }
        self.variant_sets.insert(
            set,
            VariantSet {
                id: set,
                name: name.to_string(),
                members: members.into_iter().map(|(c, _)| c).collect(),
            },
        );
        Some(set)
    }

    /// Place an instance of `component` under `parent` (the page when
    /// `None`) at local `(x, y)`. Returns the instance root id.
    pub fn create_instance(
        &mut self,
        graph: &mut SceneGraph,
        component: ComponentId,
        parent: Option<NodeId>,
        x: f32,
        y: f32,
    ) -> Option<NodeId> {
        let Some(def) = self.definitions.get(&component) else {
            log::warn!("create_instance: unknown component {component}");
            return None;
        };
        let parent_idx = match parent {
            Some(p) => match graph.index_of(p) {
                Some(idx) if graph.node(idx).kind.can_have_children() => idx,
                _ => {
                    log::warn!("create_instance: {p} cannot hold children");
                    return None;
                }
            },
            None => graph.root,
        };
        let root = NodeId::with_prefix("instance");
        let property_values = def
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect();
        let mut record = InstanceRecord {
            root,
            component,
            overrides: Vec::new(),
            property_values,
            source_map: HashMap::new(),
            detached: false,
        };
        let subtree = self.build(&mut record, x, y)?;
        graph.insert_subtree(parent_idx, usize::MAX, &subtree)?;
        log::debug!("created instance {root} of {component}");
        self.instances.insert(root, record);
        Some(root)
    }

    /// Materialize `definition ⊕ property values ⊕ overrides` for a record,
    /// refreshing its source map.
    fn build(&self, record: &mut InstanceRecord, x: f32, y: f32) -> Option<Subtree> {
        let def = self.definitions.get(&record.component)?;
        let root_def = def.subtree.root_id()?;
        let root = record.root;
        let (mut subtree, map) = def.subtree.relabeled(|n| {
            if n.id == root_def {
                root
            } else {
                instance_node_id(root, n.id)
            }
        });

        if let Some(node) = subtree.root_mut() {
            let (clip, layout) = match &node.kind {
                NodeKind::Component { clip, layout, .. } => (*clip, *layout),
                other => (false, other.auto_layout().copied().unwrap_or_default()),
            };
            node.kind = NodeKind::Instance {
                component: record.component,
                clip,
                layout,
            };
        }

        for prop in &def.properties {
            let Some(target) = prop.target.and_then(|t| map.get(&t).copied()) else {
                continue;
            };
            let value = record.property_values.get(&prop.name).unwrap_or(&prop.default);
            match value {
                ComponentPropertyValue::Text(text) => {
                    if let Some(node) = subtree.get_mut(target) {
                        PropertyValue::Characters(text.clone()).apply(node);
                    }
                }
                ComponentPropertyValue::Boolean(visible) => {
                    if let Some(node) = subtree.get_mut(target) {
                        node.visible = *visible;
                    }
                }
                ComponentPropertyValue::InstanceSwap(swap) => {
                    self.swap_nested(&mut subtree, target, *swap);
                }
                ComponentPropertyValue::Variant(_) => {}
            }
        }

        for ov in &record.overrides {
            let Some(target) = map.get(&ov.target) else {
                continue;
            };
            if let Some(node) = subtree.get_mut(*target) {
                ov.value.apply(node);
            }
        }

        if let Some(node) = subtree.root_mut() {
            node.geometry.x = x;
            node.geometry.y = y;
        }
        record.source_map = map;
        Some(subtree)
    }

    /// Replace the node `target` (and its descendants) with an instance of
    /// `swap`, keeping the target's id and position.
    fn swap_nested(&self, subtree: &mut Subtree, target: NodeId, swap: ComponentId) {
        let Some(def) = self.definitions.get(&swap) else {
            log::warn!("instance swap: unknown component {swap}");
            return;
        };
        let Some(pos) = subtree.nodes.iter().position(|n| n.node.id == target) else {
            return;
        };
        let Some(def_root) = def.subtree.root_id() else {
            return;
        };
        let old = subtree.nodes[pos].clone();

        // Drop the old target and its descendants.
        let mut doomed = vec![target];
        let mut i = 0;
        while i < doomed.len() {
            let cur = doomed[i];
            doomed.extend(
                subtree
                    .nodes
                    .iter()
                    .filter(|n| n.parent == Some(cur))
                    .map(|n| n.node.id),
            );
            i += 1;
        }
        subtree.nodes.retain(|n| !doomed.contains(&n.node.id));

        let (mut swapped, _) = def.subtree.relabeled(|n| {
            if n.id == def_root {
                target
            } else {
                instance_node_id(target, n.id)
            }
        });
        if let Some(first) = swapped.nodes.first_mut() {
            first.parent = old.parent;
            first.node.geometry.x = old.node.geometry.x;
            first.node.geometry.y = old.node.geometry.y;
            let (clip, layout) = match &first.node.kind {
                NodeKind::Component { clip, layout, .. } => (*clip, *layout),
                _ => (false, AutoLayout::default()),
            };
            first.node.kind = NodeKind::Instance {
                component: swap,
                clip,
                layout,
            };
        }
        let at = pos.min(subtree.nodes.len());
        for (k, entry) in swapped.nodes.into_iter().enumerate() {
            subtree.nodes.insert(at + k, entry);
        }
    }

    /// Replace an instance's scene subtree with a fresh build, keeping its
    /// parent, sibling index and root position.
    fn rebuild(&mut self, graph: &mut SceneGraph, root: NodeId) -> bool {
        let Some(idx) = graph.index_of(root) else {
            return false;
        };
        let Some(parent) = graph.parent(idx) else {
            return false;
        };
        let index = graph.position_in_parent(idx).unwrap_or(usize::MAX);
        let geo = graph.node(idx).geometry;
        let Some(mut record) = self.instances.remove(&root) else {
            return false;
        };
        let built = self.build(&mut record, geo.x, geo.y);
        self.instances.insert(root, record);
        let Some(subtree) = built else {
            log::warn!("rebuild: definition missing for instance {root}");
            return false;
        };
        graph.remove_subtree(root);
        graph.insert_subtree(parent, index, &subtree).is_some()
    }

    /// Rebuild every attached instance from its current definition.
    /// Returns the number of instances rebuilt.
    pub fn update_all_instances(&mut self, graph: &mut SceneGraph) -> usize {
        let mut roots: Vec<NodeId> = self
            .instances
            .values()
            .filter(|r| !r.detached)
            .map(|r| r.root)
            .collect();
        roots.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        let rebuilt = roots
            .into_iter()
            .filter(|r| self.rebuild(graph, *r))
            .count();
        log::debug!("update_all_instances: rebuilt {rebuilt}");
        rebuilt
    }

    /// Rebuild the attached instances of one component.
    pub fn update_instances_of(&mut self, graph: &mut SceneGraph, component: ComponentId) -> usize {
        self.instances_of(component)
            .into_iter()
            .filter(|r| self.rebuild(graph, *r))
            .count()
    }

    /// Nearest attached instance whose root is `id` or one of its ancestors.
    pub fn owning_instance(&self, graph: &SceneGraph, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(graph.ancestors(id))
            .find(|a| self.is_instance(*a))
    }

    /// Definition-side node behind `target` in an attached instance.
    pub fn definition_node(&self, instance: NodeId, target: NodeId) -> Option<NodeId> {
        self.instances
            .get(&instance)
            .filter(|r| !r.detached)
            .and_then(|r| r.definition_node(target))
    }

    /// Current override of `property` on `target`, if any.
    pub fn override_value(
        &self,
        instance: NodeId,
        target: NodeId,
        property: Property,
    ) -> Option<&PropertyValue> {
        let record = self.instances.get(&instance)?;
        let def_node = record.definition_node(target)?;
        record
            .overrides
            .iter()
            .rev()
            .find(|o| o.target == def_node && o.property() == property)
            .map(|o| &o.value)
    }

    /// Store (`Some`) or drop (`None`) the override of `property` on
    /// `target` without touching the scene.
    pub fn put_override(
        &mut self,
        instance: NodeId,
        target: NodeId,
        property: Property,
        value: Option<PropertyValue>,
    ) -> bool {
        let Some(record) = self.instances.get_mut(&instance).filter(|r| !r.detached) else {
            return false;
        };
        let Some(def_node) = record.definition_node(target) else {
            return false;
        };
        record
            .overrides
            .retain(|o| !(o.target == def_node && o.property() == property));
        if let Some(value) = value.filter(|v| v.property() == property) {
            record.overrides.push(Override {
                target: def_node,
                value,
            });
        }
        true
    }

    /// Record and apply an override on a node inside an instance. `target`
    /// may be the instance-side or definition-side node id. Properties
    /// outside the overridable set are rejected with a warning.
    pub fn set_override(
        &mut self,
        graph: &mut SceneGraph,
        instance: NodeId,
        target: NodeId,
        value: PropertyValue,
    ) -> bool {
        let property = value.property();
        if !property.is_overridable() {
            log::warn!("set_override: {property:?} cannot be overridden");
            return false;
        }
        let Some(record) = self.instances.get(&instance).filter(|r| !r.detached) else {
            log::warn!("set_override: {instance} is not an attached instance");
            return false;
        };
        let Some(def_node) = record.definition_node(target) else {
            log::warn!("set_override: {target} is not part of instance {instance}");
            return false;
        };
        let Some(scene_id) = record.source_map.get(&def_node).copied() else {
            return false;
        };
        let Some(node) = graph.get_by_id_mut(scene_id) else {
            return false;
        };
        if !value.apply(node) {
            log::warn!("set_override: {property:?} does not apply to {scene_id}");
            return false;
        }
        self.put_override(instance, def_node, property, Some(value))
    }

    /// Drop all overrides of an instance and rebuild it.
    pub fn reset_overrides(&mut self, graph: &mut SceneGraph, instance: NodeId) -> bool {
        match self.instances.get_mut(&instance) {
            Some(record) if !record.detached => record.overrides.clear(),
            _ => return false,
        }
        self.rebuild(graph, instance)
    }

    /// Set a schema property on an instance and rebuild it. Variant values
    /// switch to the matching sibling variant.
    pub fn set_instance_property(
        &mut self,
        graph: &mut SceneGraph,
        instance: NodeId,
        name: &str,
        value: ComponentPropertyValue,
    ) -> bool {
        let Some(record) = self.instances.get(&instance).filter(|r| !r.detached) else {
            return false;
        };
        if let ComponentPropertyValue::Variant(v) = &value {
            let v = v.clone();
            return self.switch_variant_by_value(graph, instance, name, &v);
        }
        let Some(def) = self.definitions.get(&record.component) else {
            return false;
        };
        let Some(prop) = def.property(name) else {
            log::warn!("set_instance_property: {} has no property {name}", def.name);
            return false;
        };
        if prop.default.kind() != value.kind() {
            log::warn!(
                "set_instance_property: {name} expects {:?}, got {:?}",
                prop.default.kind(),
                value.kind()
            );
            return false;
        }
        if let Some(record) = self.instances.get_mut(&instance) {
            record.property_values.insert(name.to_string(), value);
        }
        self.rebuild(graph, instance)
    }

    /// Switch an instance to another member of its variant set, keeping
    /// position and overrides. Overrides are carried to nodes with the same
    /// name path in the new variant; unmatched ones are dropped.
    pub fn switch_variant(
        &mut self,
        graph: &mut SceneGraph,
        instance: NodeId,
        target: ComponentId,
    ) -> bool {
        let Some(record) = self.instances.get(&instance).filter(|r| !r.detached) else {
            return false;
        };
        if record.component == target {
            return false;
        }
        let (Some(from), Some(to)) = (
            self.definitions.get(&record.component),
            self.definitions.get(&target),
        ) else {
            log::warn!("switch_variant: unknown component");
            return false;
        };
        let same_set = match (&from.variant, &to.variant) {
            (Some(a), Some(b)) => a.set == b.set,
            _ => false,
        };
        if !same_set {
            log::warn!("switch_variant: {} and {} are not variants of one set", from.id, to.id);
            return false;
        }

        let overrides: Vec<Override> = record
            .overrides
            .iter()
            .filter_map(|o| {
                let path = from.name_path(o.target)?;
                match to.find_by_name_path(&path) {
                    Some(t) => Some(Override {
                        target: t,
                        value: o.value.clone(),
                    }),
                    None => {
                        log::debug!("switch_variant: dropping override on {}", o.target);
                        None
                    }
                }
            })
            .collect();
        let mut values = record.property_values.clone();
        for p in &to.properties {
            values.entry(p.name.clone()).or_insert_with(|| p.default.clone());
        }

        if let Some(record) = self.instances.get_mut(&instance) {
            record.component = target;
            record.overrides = overrides;
            record.property_values = values;
        }
        self.rebuild(graph, instance)
    }

    /// Switch to the sibling variant whose values equal the current ones
    /// with `property` set to `value`.
    pub fn switch_variant_by_value(
        &mut self,
        graph: &mut SceneGraph,
        instance: NodeId,
        property: &str,
        value: &str,
    ) -> bool {
        let Some(membership) = self
            .instances
            .get(&instance)
            .and_then(|r| self.definitions.get(&r.component))
            .and_then(|d| d.variant.clone())
        else {
            return false;
        };
        let mut wanted = membership.values.clone();
        wanted.insert(property.to_string(), value.to_string());
        let Some(target) = self.variant_sets.get(&membership.set).and_then(|set| {
            set.members.iter().copied().find(|m| {
                self.definitions
                    .get(m)
                    .and_then(|d| d.variant.as_ref())
                    .is_some_and(|v| v.values == wanted)
            })
        }) else {
            log::warn!("switch_variant_by_value: no variant with {property}={value}");
            return false;
        };
        self.switch_variant(graph, instance, target)
    }

    /// Turn an instance into a plain frame. One-way: the record is kept
    /// only as detached.
    pub fn detach_instance(&mut self, graph: &mut SceneGraph, instance: NodeId) -> bool {
        let Some(record) = self.instances.get_mut(&instance).filter(|r| !r.detached) else {
            return false;
        };
        let Some(node) = graph.get_by_id_mut(instance) else {
            return false;
        };
        if let NodeKind::Instance { clip, layout, .. } = node.kind {
            node.kind = NodeKind::Frame { clip, layout };
        }
        record.detached = true;
        record.overrides.clear();
        log::debug!("detached instance {instance}");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Button: frame with a label text, registered as a component.
    fn button(graph: &mut SceneGraph, registry: &mut ComponentRegistry, tag: &str) -> ComponentId {
        let frame_id = NodeId::intern(&format!("{tag}_btn"));
        let frame = graph.add_node(
            graph.root,
            SceneNode::frame(frame_id, AutoLayout::default()).with_geometry(0.0, 0.0, 120.0, 40.0),
        );
        let mut label = SceneNode::text(NodeId::intern(&format!("{tag}_label")), "OK")
            .with_geometry(10.0, 10.0, 100.0, 20.0);
        label.name = "label".into();
        graph.add_node(frame, label);
        registry.create_component(graph, frame_id, "Button").unwrap()
    }

    fn label_of(graph: &SceneGraph, instance: NodeId) -> String {
        let child = graph.child_ids(instance)[0];
        match &graph.get_by_id(child).unwrap().kind {
            NodeKind::Text(t) => t.characters.clone(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn instance_copies_definition() {
        let mut graph = SceneGraph::new();
        let mut reg = ComponentRegistry::new();
        let c = button(&mut graph, &mut reg, "ic");
        let inst = reg.create_instance(&mut graph, c, None, 300.0, 50.0).unwrap();

        let node = graph.get_by_id(inst).unwrap();
        assert!(matches!(node.kind, NodeKind::Instance { component, .. } if component == c));
        assert_eq!((node.geometry.x, node.geometry.y), (300.0, 50.0));
        assert_eq!(label_of(&graph, inst), "OK");
        assert!(reg.is_instance(inst));
        assert_eq!(reg.instances_of(c), vec![inst]);
    }

    #[test]
    fn disallowed_override_is_noop() {
        let mut graph = SceneGraph::new();
        let mut reg = ComponentRegistry::new();
        let c = button(&mut graph, &mut reg, "dis");
        let inst = reg.create_instance(&mut graph, c, None, 0.0, 0.0).unwrap();
        assert!(!reg.set_override(&mut graph, inst, inst, PropertyValue::Name("x".into())));
        assert!(reg.instance(inst).unwrap().overrides.is_empty());
    }

    #[test]
    fn overrides_survive_definition_update() {
        let mut graph = SceneGraph::new();
        let mut reg = ComponentRegistry::new();
        let c = button(&mut graph, &mut reg, "upd");
        let inst = reg.create_instance(&mut graph, c, None, 0.0, 0.0).unwrap();
        let label = graph.child_ids(inst)[0];

        assert!(reg.set_override(&mut graph, inst, label, PropertyValue::Characters("Buy".into())));
        assert!(reg.set_override(&mut graph, inst, label, PropertyValue::Characters("Buy now".into())));
        assert_eq!(reg.instance(inst).unwrap().overrides.len(), 1);

        // Move the instance, then change the definition's size.
        graph.get_by_id_mut(inst).unwrap().geometry.x = 42.0;
        reg.definition_mut(c).unwrap().subtree.root_mut().unwrap().geometry.width = 200.0;
        assert_eq!(reg.update_all_instances(&mut graph), 1);

        let node = graph.get_by_id(inst).unwrap();
        assert_eq!(node.geometry.x, 42.0);
        assert_eq!(node.geometry.width, 200.0);
        assert_eq!(label_of(&graph, inst), "Buy now");
        assert_eq!(graph.child_ids(inst)[0], label, "instance ids are stable across rebuilds");
    }

    #[test]
    fn owning_instance_and_put_override() {
        let mut graph = SceneGraph::new();
        let mut reg = ComponentRegistry::new();
        let c = button(&mut graph, &mut reg, "own");
        let inst = reg.create_instance(&mut graph, c, None, 0.0, 0.0).unwrap();
        let label = graph.child_ids(inst)[0];

        assert_eq!(reg.owning_instance(&graph, label), Some(inst));
        assert_eq!(reg.owning_instance(&graph, inst), Some(inst));
        assert_eq!(reg.owning_instance(&graph, NodeId::intern("own_btn")), None);

        let size = PropertyValue::Size {
            width: 80.0,
            height: 12.0,
        };
        assert!(reg.put_override(inst, label, Property::Size, Some(size.clone())));
        assert_eq!(reg.override_value(inst, label, Property::Size), Some(&size));
        // Bookkeeping only: the scene is untouched until a rebuild.
        assert_eq!(graph.get_by_id(label).unwrap().geometry.width, 100.0);
        reg.update_all_instances(&mut graph);
        assert_eq!(graph.get_by_id(label).unwrap().geometry.width, 80.0);

        assert!(reg.put_override(inst, label, Property::Size, None));
        assert_eq!(reg.override_value(inst, label, Property::Size), None);
        reg.update_all_instances(&mut graph);
        assert_eq!(graph.get_by_id(label).unwrap().geometry.width, 100.0);
    }

    #[test]
    fn detach_is_irreversible() {
        let mut graph = SceneGraph::new();
        let mut reg = ComponentRegistry::new();
        let c = button(&mut graph, &mut reg, "det");
        let inst = reg.create_instance(&mut graph, c, None, 0.0, 0.0).unwrap();

        assert!(reg.detach_instance(&mut graph, inst));
        assert!(!reg.is_instance(inst));
        assert!(matches!(graph.get_by_id(inst).unwrap().kind, NodeKind::Frame { .. }));

        reg.definition_mut(c).unwrap().subtree.root_mut().unwrap().geometry.width = 999.0;
        assert_eq!(reg.update_all_instances(&mut graph), 0);
        assert_eq!(graph.get_by_id(inst).unwrap().geometry.width, 120.0);
        assert!(!reg.detach_instance(&mut graph, inst));
    }

    #[test]
    fn text_property_binding() {
        let mut graph = SceneGraph::new();
        let mut reg = ComponentRegistry::new();
        let c = button(&mut graph, &mut reg, "tp");
        let def_label = reg.definition(c).unwrap().subtree.nodes[1].node.id;
        assert!(reg.add_property(
            c,
            PropertyDefinition {
                name: "Label".into(),
                default: ComponentPropertyValue::Text("Default".into()),
                target: Some(def_label),
            }
        ));
        let inst = reg.create_instance(&mut graph, c, None, 0.0, 0.0).unwrap();
        assert_eq!(label_of(&graph, inst), "Default");

        assert!(reg.set_instance_property(
            &mut graph,
            inst,
            "Label",
            ComponentPropertyValue::Text("Save".into())
        ));
        assert_eq!(label_of(&graph, inst), "Save");
        assert!(!reg.set_instance_property(
            &mut graph,
            inst,
            "Label",
            ComponentPropertyValue::Boolean(true)
        ));
    }

    #[test]
    fn switch_variant_keeps_position_and_overrides() {
        let mut graph = SceneGraph::new();
        let mut reg = ComponentRegistry::new();
        let primary = button(&mut graph, &mut reg, "var_primary");
        let secondary = button(&mut graph, &mut reg, "var_secondary");
        reg.definition_mut(secondary)
            .unwrap()
            .subtree
            .root_mut()
            .unwrap()
            .geometry
            .height = 32.0;
        let set = reg.create_variant_set(
            "Button",
            vec![
                (primary, BTreeMap::from([("kind".to_string(), "primary".to_string())])),
                (secondary, BTreeMap::from([("kind".to_string(), "secondary".to_string())])),
            ],
        );
        assert!(set.is_some());

        let inst = reg.create_instance(&mut graph, primary, None, 10.0, 20.0).unwrap();
        let label = graph.child_ids(inst)[0];
        reg.set_override(&mut graph, inst, label, PropertyValue::Characters("Go".into()));

        assert!(reg.switch_variant_by_value(&mut graph, inst, "kind", "secondary"));
        let node = graph.get_by_id(inst).unwrap();
        assert!(matches!(node.kind, NodeKind::Instance { component, .. } if component == secondary));
        assert_eq!((node.geometry.x, node.geometry.y, node.geometry.height), (10.0, 20.0, 32.0));
        assert_eq!(label_of(&graph, inst), "Go");
    }

    #[test]
    fn switch_outside_variant_set_is_rejected() {
        let mut graph = SceneGraph::new();
        let mut reg = ComponentRegistry::new();
        let a = button(&mut graph, &mut reg, "nv_a");
        let b = button(&mut graph, &mut reg, "nv_b");
        let inst = reg.create_instance(&mut graph, a, None, 0.0, 0.0).unwrap();
        assert!(!reg.switch_variant(&mut graph, inst, b));
    }
}
