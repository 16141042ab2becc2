//! Undo/Redo history.
//!
//! Every mutation is a `Command` carrying its own before/after payload, so
//! undo never has to recompute an inverse from live state. Commands are
//! pushed to the undo stack; rapid repeats of the same edit (moves, resizes,
//! property tweaks) within the coalesce window merge into the top entry.
//!
//! Transactions group several commands into one atomic undo step. They nest:
//! only the outermost commit pushes.

use frame_core::component::ComponentRegistry;
use frame_core::id::NodeId;
use frame_core::model::{Geometry, SceneGraph, Subtree};
use frame_core::property::{Property, PropertyValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryChange {
    pub id: NodeId,
    pub before: Geometry,
    pub after: Geometry,
}

/// What a command does. Each kind carries enough state to run both ways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Translate nodes (only `x`/`y` differ between before and after).
    Move { changes: Vec<GeometryChange> },
    /// Resize/rotate/free-form geometry edit.
    Transform { changes: Vec<GeometryChange> },
    SetProperty {
        id: NodeId,
        before: PropertyValue,
        after: PropertyValue,
    },
    /// Property edit on a node inside an attached instance. Besides the
    /// scene value it carries the instance's override entry before the
    /// edit (`previous`); the edit itself becomes the override.
    SetOverride {
        instance: NodeId,
        id: NodeId,
        before: PropertyValue,
        after: PropertyValue,
        previous: Option<PropertyValue>,
    },
    /// Insert `subtree` under `parent` (`None` = page root) at `index`.
    Insert {
        parent: Option<NodeId>,
        index: usize,
        subtree: Subtree,
    },
    /// Remove the subtree; undo reinserts it at the same place.
    Delete {
        parent: Option<NodeId>,
        index: usize,
        subtree: Subtree,
    },
    /// Z-order change within the current parent.
    Reorder { id: NodeId, from: usize, to: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub description: String,
    /// Milliseconds on the host clock. Commands without a timestamp never merge.
    pub at: Option<u64>,
}

impl Command {
    pub fn new(kind: CommandKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            at: None,
        }
    }

    pub fn at(mut self, ms: u64) -> Self {
        self.at = Some(ms);
        self
    }

    /// Set a property, capturing the current value as `before`.
    /// `None` when the node is missing or doesn't carry the property.
    pub fn set_property(graph: &SceneGraph, id: NodeId, after: PropertyValue) -> Option<Self> {
        let node = graph.get_by_id(id)?;
        let before = PropertyValue::read(node, after.property())?;
        let description = format!("Set {:?}", after.property());
        Some(Self::new(CommandKind::SetProperty { id, before, after }, description))
    }

    /// Override a property on a node inside `instance`, capturing the scene
    /// value and the current override entry. `None` when the node is not
    /// part of the instance or doesn't carry the property.
    pub fn set_override(
        graph: &SceneGraph,
        components: &ComponentRegistry,
        instance: NodeId,
        id: NodeId,
        after: PropertyValue,
    ) -> Option<Self> {
        components.definition_node(instance, id)?;
        let property = after.property();
        let before = PropertyValue::read(graph.get_by_id(id)?, property)?;
        let previous = components.override_value(instance, id, property).cloned();
        Some(Self::new(
            CommandKind::SetOverride {
                instance,
                id,
                before,
                after,
                previous,
            },
            format!("Override {property:?}"),
        ))
    }

    /// Registry side of an override command: the override entry to store
    /// on `(instance, node, property)` after running in the given direction.
    pub fn override_entry(
        &self,
        forward: bool,
    ) -> Option<(NodeId, NodeId, Property, Option<PropertyValue>)> {
        match &self.kind {
            CommandKind::SetOverride {
                instance,
                id,
                after,
                previous,
                ..
            } => {
                let value = if forward { Some(after.clone()) } else { previous.clone() };
                Some((*instance, *id, after.property(), value))
            }
            _ => None,
        }
    }

    /// Delete a node, capturing its subtree and position.
    pub fn delete(graph: &SceneGraph, id: NodeId) -> Option<Self> {
        let idx = graph.index_of(id)?;
        let subtree = graph.extract_subtree(id)?;
        let index = graph.position_in_parent(idx)?;
        let parent = graph.parent_id(id);
        Some(Self::new(
            CommandKind::Delete {
                parent,
                index,
                subtree,
            },
            "Delete",
        ))
    }

    /// Apply the forward direction.
    pub fn execute(&self, graph: &mut SceneGraph) -> bool {
        self.run(graph, true)
    }

    /// Apply the reverse direction.
    pub fn undo(&self, graph: &mut SceneGraph) -> bool {
        self.run(graph, false)
    }

    fn run(&self, graph: &mut SceneGraph, forward: bool) -> bool {
        match &self.kind {
            CommandKind::Move { changes } | CommandKind::Transform { changes } => {
                let mut touched = false;
                for change in changes {
                    if let Some(node) = graph.get_by_id_mut(change.id) {
                        node.geometry = if forward { change.after } else { change.before };
                        touched = true;
                    }
                }
                touched
            }
            CommandKind::SetProperty { id, before, after }
            | CommandKind::SetOverride {
                id, before, after, ..
            } => {
                let value = if forward { after } else { before };
                graph.get_by_id_mut(*id).is_some_and(|node| value.apply(node))
            }
            CommandKind::Insert {
                parent,
                index,
                subtree,
            } => {
                if forward {
                    insert(graph, *parent, *index, subtree)
                } else {
                    remove(graph, subtree)
                }
            }
            CommandKind::Delete {
                parent,
                index,
                subtree,
            } => {
                if forward {
                    remove(graph, subtree)
                } else {
                    insert(graph, *parent, *index, subtree)
                }
            }
            CommandKind::Reorder { id, from, to } => graph
                .index_of(*id)
                .is_some_and(|idx| graph.move_within_parent(idx, if forward { *to } else { *from })),
        }
    }

    /// Fold `next` into `self` when both touch the same target within the
    /// window. The merged command keeps our `before` and takes `next`'s `after`.
    pub fn merge(&mut self, next: &Command, window_ms: u64) -> bool {
        let (Some(t0), Some(t1)) = (self.at, next.at) else {
            return false;
        };
        if t1 < t0 || t1 - t0 > window_ms {
            return false;
        }
        let merged = match (&mut self.kind, &next.kind) {
            (CommandKind::Move { changes: a }, CommandKind::Move { changes: b })
            | (CommandKind::Transform { changes: a }, CommandKind::Transform { changes: b }) => {
                let same = a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id == y.id);
                if same {
                    for (x, y) in a.iter_mut().zip(b) {
                        x.after = y.after;
                    }
                }
                same
            }
            (
                CommandKind::SetProperty {
                    id: a_id,
                    after: a_after,
                    ..
                },
                CommandKind::SetProperty {
                    id: b_id,
                    after: b_after,
                    ..
                },
            ) => {
                let same = a_id == b_id && a_after.property() == b_after.property();
                if same {
                    *a_after = b_after.clone();
                }
                same
            }
            (
                CommandKind::SetOverride {
                    instance: a_inst,
                    id: a_id,
                    after: a_after,
                    ..
                },
                CommandKind::SetOverride {
                    instance: b_inst,
                    id: b_id,
                    after: b_after,
                    ..
                },
            ) => {
                let same =
                    a_inst == b_inst && a_id == b_id && a_after.property() == b_after.property();
                if same {
                    *a_after = b_after.clone();
                }
                same
            }
            _ => false,
        };
        if merged {
            self.at = next.at;
        }
        merged
    }
}

fn insert(graph: &mut SceneGraph, parent: Option<NodeId>, index: usize, subtree: &Subtree) -> bool {
    let parent_idx = match parent {
        Some(id) => match graph.index_of(id) {
            Some(idx) => idx,
            None => return false,
        },
        None => graph.root,
    };
    graph.insert_subtree(parent_idx, index, subtree).is_some()
}

fn remove(graph: &mut SceneGraph, subtree: &Subtree) -> bool {
    subtree
        .root_id()
        .and_then(|id| graph.remove_subtree(id))
        .is_some()
}

// ─── Stack entries ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryEntry {
    Single(Command),
    Transaction {
        description: String,
        commands: Vec<Command>,
    },
}

impl HistoryEntry {
    pub fn description(&self) -> &str {
        match self {
            HistoryEntry::Single(cmd) => &cmd.description,
            HistoryEntry::Transaction { description, .. } => description,
        }
    }

    /// Commands in execution order.
    pub fn commands(&self) -> &[Command] {
        match self {
            HistoryEntry::Single(cmd) => std::slice::from_ref(cmd),
            HistoryEntry::Transaction { commands, .. } => commands,
        }
    }

    fn redo(&self, graph: &mut SceneGraph) {
        match self {
            HistoryEntry::Single(cmd) => {
                cmd.execute(graph);
            }
            HistoryEntry::Transaction { commands, .. } => {
                for cmd in commands {
                    cmd.execute(graph);
                }
            }
        }
    }

    fn undo(&self, graph: &mut SceneGraph) {
        match self {
            HistoryEntry::Single(cmd) => {
                cmd.undo(graph);
            }
            HistoryEntry::Transaction { commands, .. } => {
                for cmd in commands.iter().rev() {
                    cmd.undo(graph);
                }
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("no transaction is open")]
    NoOpenTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum undo depth. Redo entries are never trimmed.
    pub capacity: usize,
    pub coalesce_window_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            coalesce_window_ms: 500,
        }
    }
}

/// Serializable view of the stacks, newest last.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistorySummary {
    pub undo: Vec<String>,
    pub redo: Vec<String>,
}

#[derive(Debug, Clone)]
struct OpenTransaction {
    description: String,
    commands: Vec<Command>,
}

/// Undo/redo stacks with coalescing, transactions and pause.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub config: HistoryConfig,
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    open: Option<OpenTransaction>,
    /// Transaction nesting depth (0 = none open).
    depth: usize,
    /// Pause nesting depth (0 = recording).
    paused: usize,
}

impl History {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Run `cmd` and record it.
    pub fn execute(&mut self, graph: &mut SceneGraph, cmd: Command) {
        cmd.execute(graph);
        self.record(cmd);
    }

    /// Record a command whose effect is already in the graph (live drag
    /// previews, component instantiation).
    pub fn record(&mut self, cmd: Command) {
        if self.paused > 0 {
            return;
        }
        if let Some(open) = self.open.as_mut() {
            open.commands.push(cmd);
            return;
        }

        let window = self.config.coalesce_window_ms;
        if self.redo_stack.is_empty() {
            if let Some(HistoryEntry::Single(top)) = self.undo_stack.last_mut() {
                if top.merge(&cmd, window) {
                    log::trace!("coalesced '{}'", cmd.description);
                    return;
                }
            }
        }
        self.push(HistoryEntry::Single(cmd));
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);
        if self.undo_stack.len() > self.config.capacity {
            let excess = self.undo_stack.len() - self.config.capacity;
            self.undo_stack.drain(..excess);
        }
        self.redo_stack.clear();
    }

    /// Undo the newest entry. Refused while a transaction is open.
    pub fn undo(&mut self, graph: &mut SceneGraph) -> Option<String> {
        if self.open.is_some() {
            log::warn!("undo ignored: transaction still open");
            return None;
        }
        let entry = self.undo_stack.pop()?;
        entry.undo(graph);
        let desc = entry.description().to_string();
        self.redo_stack.push(entry);
        Some(desc)
    }

    pub fn redo(&mut self, graph: &mut SceneGraph) -> Option<String> {
        if self.open.is_some() {
            log::warn!("redo ignored: transaction still open");
            return None;
        }
        let entry = self.redo_stack.pop()?;
        entry.redo(graph);
        let desc = entry.description().to_string();
        self.undo_stack.push(entry);
        Some(desc)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(HistoryEntry::description)
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(HistoryEntry::description)
    }

    /// Entry the next undo would revert (the last one executed or redone).
    pub fn peek_undo(&self) -> Option<&HistoryEntry> {
        self.undo_stack.last()
    }

    /// Entry the next redo would replay (the last one undone).
    pub fn peek_redo(&self) -> Option<&HistoryEntry> {
        self.redo_stack.last()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Drop both stacks and any open transaction (e.g. after loading a new document).
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open = None;
        self.depth = 0;
    }

    // ─── Transactions ────────────────────────────────────────────────────

    /// Open a transaction. Nested calls only bump the depth; the outermost
    /// description wins.
    pub fn begin_transaction(&mut self, description: impl Into<String>) {
        if self.depth == 0 {
            let description = description.into();
            log::debug!("transaction open: {description}");
            self.open = Some(OpenTransaction {
                description,
                commands: Vec::new(),
            });
        }
        self.depth += 1;
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Close one level. The outermost commit pushes the transaction if it
    /// recorded anything; returns whether an entry was pushed.
    pub fn commit_transaction(&mut self) -> Result<bool, HistoryError> {
        if self.depth == 0 {
            return Err(HistoryError::NoOpenTransaction);
        }
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(false);
        }
        let Some(open) = self.open.take() else {
            return Err(HistoryError::NoOpenTransaction);
        };
        log::debug!(
            "transaction commit: {} ({} command(s))",
            open.description,
            open.commands.len()
        );
        if open.commands.is_empty() {
            return Ok(false);
        }
        self.push(HistoryEntry::Transaction {
            description: open.description,
            commands: open.commands,
        });
        Ok(true)
    }

    /// Abort the whole open transaction (all nesting levels), undoing its
    /// commands in reverse. Returns how many were reverted.
    pub fn rollback_transaction(&mut self, graph: &mut SceneGraph) -> Result<usize, HistoryError> {
        let open = self.open.take().ok_or(HistoryError::NoOpenTransaction)?;
        self.depth = 0;
        for cmd in open.commands.iter().rev() {
            cmd.undo(graph);
        }
        log::debug!(
            "transaction rollback: {} ({} command(s))",
            open.description,
            open.commands.len()
        );
        Ok(open.commands.len())
    }

    // ─── Pause ───────────────────────────────────────────────────────────

    /// Stop recording. Commands still execute. Nests with `resume`.
    pub fn pause(&mut self) {
        self.paused += 1;
    }

    pub fn resume(&mut self) {
        self.paused = self.paused.saturating_sub(1);
    }

    pub fn is_paused(&self) -> bool {
        self.paused > 0
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            undo: self
                .undo_stack
                .iter()
                .map(|e| e.description().to_string())
                .collect(),
            redo: self
                .redo_stack
                .iter()
                .map(|e| e.description().to_string())
                .collect(),
        }
    }
}
