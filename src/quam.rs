use crate::error::QuamError;
use crate::node::{Key, Node, NodeId, NodeKind, Value};
use crate::reference::{Reference, Step};
use crate::resolve;
use crate::schema::{ClassRegistry, FieldSpec, FieldType};
use crate::serialise::{self, InstantiateOptions};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// A configuration graph: an arena of nodes plus the root they hang from.
#[derive(Debug, Clone)]
pub struct Quam {
    registry: Arc<ClassRegistry>,
    nodes: HashMap<NodeId, Node>,
    next_node_id: NodeId,
    root: Option<NodeId>,
}

impl Quam {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            nodes: HashMap::new(),
            next_node_id: 1,
            root: None,
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<ClassRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of nodes in the arena, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, QuamError> {
        self.nodes.get(&id).ok_or(QuamError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, QuamError> {
        self.nodes.get_mut(&id).ok_or(QuamError::NodeNotFound(id))
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        self.nodes.insert(id, Node::new(id, kind));
        id
    }

    /// Create a component. Missing optional fields get their declared defaults,
    /// missing required fields are an error.
    pub fn create<K, I>(&mut self, class: &str, fields: I) -> Result<NodeId, QuamError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        self.registry.check(class)?;
        let specs = self.registry.fields(class)?;
        let dynamic = self.registry.is_dynamic(class);

        let supplied: Vec<(String, Value)> = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for spec in &specs {
            if spec.is_required() && !supplied.iter().any(|(k, _)| *k == spec.name) {
                return Err(QuamError::MissingRequiredField {
                    class: class.to_string(),
                    field: spec.name.clone(),
                });
            }
        }
        if !dynamic {
            if let Some((k, _)) = supplied.iter().find(|(k, _)| !specs.iter().any(|s| s.name == *k)) {
                return Err(QuamError::UnknownField {
                    class: class.to_string(),
                    field: k.clone(),
                });
            }
        }

        for (_, value) in &supplied {
            if let Some(child) = value.as_node() {
                self.check_attach(child, None)?;
            }
        }

        let first_new = self.next_node_id;
        match self.build_component(class, &specs, supplied) {
            Ok(id) => Ok(id),
            Err(e) => {
                self.discard_from(first_new);
                Err(e)
            }
        }
    }

    fn build_component(
        &mut self,
        class: &str,
        specs: &[FieldSpec],
        supplied: Vec<(String, Value)>,
    ) -> Result<NodeId, QuamError> {
        let mut defaults = Vec::new();
        for spec in specs {
            if supplied.iter().any(|(k, _)| *k == spec.name) {
                continue;
            }
            if let Some(default) = spec.default_value() {
                defaults.push((spec.name.clone(), self.materialize(default, &spec.ty)?));
            }
        }

        let id = self.alloc(NodeKind::Component {
            class: class.to_string(),
        });
        for (k, v) in defaults.into_iter().chain(supplied) {
            self.set(id, k, v)?;
        }
        Ok(id)
    }

    /// Drop every node allocated at or after `first`, unlinking survivors from them.
    fn discard_from(&mut self, first: NodeId) {
        self.nodes.retain(|id, _| *id < first);
        for node in self.nodes.values_mut() {
            if node.parent.is_some_and(|p| p >= first) {
                node.parent = None;
            }
        }
        debug!(first, "discarded partially built nodes");
    }

    /// Create a component and make it the graph root.
    pub fn create_root<K, I>(&mut self, class: &str, fields: I) -> Result<NodeId, QuamError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let id = self.create(class, fields)?;
        self.set_root(id)?;
        Ok(id)
    }

    pub fn set_root(&mut self, id: NodeId) -> Result<(), QuamError> {
        let node = self.node(id)?;
        if node.parent.is_some() {
            return Err(QuamError::Invariant(format!(
                "node {} has a parent and cannot be the root",
                id
            )));
        }
        if let Some(previous) = self.root.filter(|r| *r != id) {
            debug!(previous, root = id, "replacing graph root");
        }
        self.root = Some(id);
        Ok(())
    }

    pub fn create_list(&mut self, element: FieldType, items: Vec<Value>) -> Result<NodeId, QuamError> {
        let id = self.alloc(NodeKind::List { element });
        for item in items {
            self.push(id, item)?;
        }
        Ok(id)
    }

    pub fn create_dict<K: Into<String>>(
        &mut self,
        element: FieldType,
        entries: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<NodeId, QuamError> {
        let id = self.alloc(NodeKind::Dict { element });
        for (k, v) in entries {
            let key: String = k.into();
            self.set(id, key, v)?;
        }
        Ok(id)
    }

    /// Turn plain JSON into a value of this graph, creating container nodes for
    /// arrays and objects.
    pub fn materialize(&mut self, json: &JsonValue, ty: &FieldType) -> Result<Value, QuamError> {
        serialise::from_dict(self, json, ty, &InstantiateOptions::lenient())
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, QuamError> {
        Ok(self.node(id)?.parent)
    }

    /// Root used to resolve absolute references from `id`.
    ///
    /// Walks the parent chain; a node that is not attached below the root falls
    /// back to the graph root.
    pub fn get_root(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        while let Some(parent) = self.nodes.get(&current).and_then(|n| n.parent) {
            current = parent;
        }
        if Some(current) == self.root {
            return self.root;
        }
        if let Some(root) = self.root {
            warn!(
                node = id,
                "component is not attached to the root, using the graph root"
            );
            return Some(root);
        }
        None
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Root and cycle checks for storing `child` below `owner`.
    fn check_attach(&self, child: NodeId, owner: Option<NodeId>) -> Result<(), QuamError> {
        self.node(child)?;
        if Some(child) == self.root {
            return Err(QuamError::Invariant(format!(
                "root node {} cannot be stored inside another node",
                child
            )));
        }
        if let Some(owner) = owner.filter(|o| self.is_ancestor_or_self(child, *o)) {
            return Err(QuamError::Invariant(format!(
                "attaching node {} to node {} would create a cycle",
                child, owner
            )));
        }
        Ok(())
    }

    /// Link `child` to `owner`, which now stores it at `slot`.
    ///
    /// A node has one parent and sits in one slot, so any other slot still
    /// holding it is cleared: list elements and dict entries are dropped,
    /// component fields become null.
    fn attach(&mut self, child: NodeId, owner: NodeId, slot: &str) -> Result<(), QuamError> {
        let previous = self.node(child)?.parent;
        self.node_mut(child)?.parent = Some(owner);
        if let Some(previous) = previous {
            if previous != owner {
                debug!(child, previous, owner, "re-parenting node");
            }
            let keep = (previous == owner).then_some(slot);
            self.release_slots(previous, child, keep)?;
        }
        Ok(())
    }

    fn release_slots(&mut self, owner: NodeId, child: NodeId, keep: Option<&str>) -> Result<(), QuamError> {
        let holds = |v: &Value| v.as_node() == Some(child);
        let node = self.node_mut(owner)?;
        match node.kind {
            NodeKind::List { .. } => {
                let keep = keep.and_then(|k| k.parse::<usize>().ok());
                let items = std::mem::take(&mut node.items);
                node.items = items
                    .into_iter()
                    .enumerate()
                    .filter(|(i, v)| Some(*i) == keep || !holds(v))
                    .map(|(_, v)| v)
                    .collect();
                node.reindex_references();
            }
            NodeKind::Dict { .. } => {
                node.fields.retain(|k, v| Some(k.as_str()) == keep || !holds(v));
            }
            NodeKind::Component { .. } => {
                for (k, v) in node.fields.iter_mut() {
                    if Some(k.as_str()) != keep && holds(v) {
                        *v = Value::Null;
                    }
                }
            }
        }
        Ok(())
    }

    /// Clear the parent link of a node that was overwritten in `owner`.
    fn orphan(&mut self, displaced: Option<Value>, owner: NodeId, kept: Option<NodeId>) {
        let Some(old) = displaced.and_then(|v| v.as_node()).filter(|o| Some(*o) != kept) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&old).filter(|n| n.parent == Some(owner)) {
            node.parent = None;
        }
    }

    pub fn get_raw(&self, id: NodeId, key: impl Into<Key>) -> Result<Value, QuamError> {
        let key = key.into();
        self.node(id)?
            .slot(&key)
            .cloned()
            .ok_or_else(|| QuamError::KeyNotFound {
                node: id,
                key: key.to_string(),
            })
    }

    /// Read a slot, resolving it when it holds a reference.
    pub fn get(&self, id: NodeId, key: impl Into<Key>) -> Result<Value, QuamError> {
        self.get_at_depth(id, &key.into(), 0)
    }

    pub(crate) fn get_at_depth(&self, id: NodeId, key: &Key, depth: usize) -> Result<Value, QuamError> {
        let raw = self.get_raw(id, key.clone())?;
        match raw.as_reference() {
            Some(reference) => {
                resolve::resolve_at_depth(self, id, reference, self.get_root(id), depth)
            }
            None => Ok(raw),
        }
    }

    pub fn set(&mut self, id: NodeId, key: impl Into<Key>, value: Value) -> Result<(), QuamError> {
        let key = key.into();
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Component { class } => {
                let name = key.slot_name();
                if !self.registry.is_dynamic(class) && self.registry.field(class, &name)?.is_none() {
                    return Err(QuamError::UnknownField {
                        class: class.clone(),
                        field: name,
                    });
                }
            }
            NodeKind::List { .. } => {
                if key.as_index().and_then(|i| node.list_index(i)).is_none() {
                    return Err(QuamError::KeyNotFound {
                        node: id,
                        key: key.to_string(),
                    });
                }
            }
            NodeKind::Dict { .. } => {}
        }

        let child = value.as_node();
        if let Some(child) = child {
            self.check_attach(child, Some(id))?;
        }

        let node = self.node_mut(id)?;
        let (slot, displaced) = if node.is_list() {
            let idx = key
                .as_index()
                .and_then(|i| node.list_index(i))
                .ok_or_else(|| QuamError::Invariant("list index vanished".to_string()))?;
            node.record_reference(idx.to_string(), &value);
            (idx.to_string(), Some(std::mem::replace(&mut node.items[idx], value)))
        } else {
            let name = key.slot_name();
            node.record_reference(name.clone(), &value);
            let displaced = node.fields.insert(name.clone(), value);
            (name, displaced)
        };
        self.orphan(displaced, id, child);
        if let Some(child) = child {
            self.attach(child, id, &slot)?;
        }
        Ok(())
    }

    fn list_mut(&mut self, id: NodeId) -> Result<&mut Node, QuamError> {
        let node = self.node_mut(id)?;
        if !node.is_list() {
            return Err(QuamError::NotAContainer(id));
        }
        Ok(node)
    }

    pub fn push(&mut self, list: NodeId, value: Value) -> Result<(), QuamError> {
        self.list_mut(list)?;
        let child = value.as_node();
        if let Some(child) = child {
            self.check_attach(child, Some(list))?;
        }
        let node = self.list_mut(list)?;
        let idx = node.items.len();
        node.record_reference(idx.to_string(), &value);
        node.items.push(value);
        if let Some(child) = child {
            self.attach(child, list, &idx.to_string())?;
        }
        Ok(())
    }

    pub fn insert(&mut self, list: NodeId, index: usize, value: Value) -> Result<(), QuamError> {
        let len = self.list_mut(list)?.items.len();
        if index > len {
            return Err(QuamError::KeyNotFound {
                node: list,
                key: index.to_string(),
            });
        }
        let child = value.as_node();
        if let Some(child) = child {
            self.check_attach(child, Some(list))?;
        }
        let node = self.list_mut(list)?;
        node.items.insert(index, value);
        node.reindex_references();
        if let Some(child) = child {
            self.attach(child, list, &index.to_string())?;
        }
        Ok(())
    }

    /// Remove a list element or dict entry, returning its raw value.
    pub fn remove(&mut self, id: NodeId, key: impl Into<Key>) -> Result<Value, QuamError> {
        let key = key.into();
        let node = self.node_mut(id)?;
        if node.is_component() {
            return Err(QuamError::NotAContainer(id));
        }
        let removed = if node.is_list() {
            let value = key
                .as_index()
                .and_then(|i| node.list_index(i))
                .map(|i| node.items.remove(i));
            node.reindex_references();
            value
        } else {
            let name = key.slot_name();
            node.references.remove(&name);
            node.fields.remove(&name)
        };
        let removed = removed.ok_or_else(|| QuamError::KeyNotFound {
            node: id,
            key: key.to_string(),
        })?;
        if let Some(child) = removed.as_node() {
            if let Some(child_node) = self.nodes.get_mut(&child).filter(|n| n.parent == Some(id)) {
                child_node.parent = None;
            }
        }
        Ok(removed)
    }

    pub fn len(&self, id: NodeId) -> Result<usize, QuamError> {
        Ok(self.node(id)?.len())
    }

    pub fn is_empty(&self, id: NodeId) -> Result<bool, QuamError> {
        Ok(self.node(id)?.is_empty())
    }

    /// Field names, dict keys, or list indices of a node.
    pub fn keys(&self, id: NodeId) -> Result<Vec<Key>, QuamError> {
        let node = self.node(id)?;
        if node.is_list() {
            Ok((0..node.items.len()).map(Key::from).collect())
        } else {
            Ok(node.fields.keys().map(Key::from).collect())
        }
    }

    /// All slot values of a node, each resolved.
    pub fn values(&self, id: NodeId) -> Result<Vec<Value>, QuamError> {
        self.keys(id)?.into_iter().map(|k| self.get(id, k)).collect()
    }

    /// List membership compares resolved elements; dict membership checks keys.
    pub fn contains(&self, id: NodeId, value: &Value) -> Result<bool, QuamError> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::List { .. } => Ok(self.values(id)?.iter().any(|v| v == value)),
            NodeKind::Dict { .. } => Ok(matches!(value, Value::Str(k) if node.fields.contains_key(k))),
            NodeKind::Component { .. } => Err(QuamError::NotAContainer(id)),
        }
    }

    pub fn contains_key(&self, id: NodeId, key: impl Into<Key>) -> Result<bool, QuamError> {
        Ok(self.node(id)?.slot(&key.into()).is_some())
    }

    /// Per-node table of slots currently holding a reference string.
    pub fn references(&self, id: NodeId) -> Result<&BTreeMap<String, String>, QuamError> {
        Ok(&self.node(id)?.references)
    }

    pub fn is_reference_field(&self, id: NodeId, key: impl Into<Key>) -> Result<bool, QuamError> {
        let node = self.node(id)?;
        let key = key.into();
        let slot = match (&node.kind, key.as_index()) {
            (NodeKind::List { .. }, Some(i)) => node.list_index(i).map(|i| i.to_string()),
            _ => Some(key.slot_name()),
        };
        Ok(slot.is_some_and(|s| node.references.contains_key(&s)))
    }

    fn key_of(&self, parent: NodeId, child: NodeId) -> Result<Step, QuamError> {
        let node = self.node(parent)?;
        let missing = || {
            QuamError::Invariant(format!(
                "node {} is not stored in its parent {}",
                child, parent
            ))
        };
        if node.is_list() {
            let idx = node
                .items
                .iter()
                .position(|v| v.as_node() == Some(child))
                .ok_or_else(missing)?;
            return Ok(Step::Item(idx.to_string()));
        }
        let (name, _) = node
            .fields
            .iter()
            .find(|(_, v)| v.as_node() == Some(child))
            .ok_or_else(missing)?;
        let segment = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if node.is_component() || segment {
            Ok(Step::Attr(name.clone()))
        } else {
            Ok(Step::Item(name.clone()))
        }
    }

    /// Absolute reference string that resolves to `id`.
    pub fn reference_of(&self, id: NodeId) -> Result<String, QuamError> {
        let mut steps = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            steps.push(self.key_of(parent, current)?);
            current = parent;
        }
        if Some(current) != self.root {
            return Err(QuamError::Invariant(format!(
                "node {} is not attached to the root",
                id
            )));
        }
        steps.reverse();
        Ok(Reference::absolute(steps).to_string())
    }

    /// Assign `value` at the location the reference in `id[key]` points to.
    pub fn set_at_reference(&mut self, id: NodeId, key: impl Into<Key>, value: Value) -> Result<(), QuamError> {
        let key = key.into();
        let raw = self.get_raw(id, key.clone())?;
        let Some(raw_reference) = raw.as_reference() else {
            return Err(QuamError::InvalidInput(format!(
                "cannot set at reference because {} is not a reference",
                key
            )));
        };
        let parsed = Reference::parse(raw_reference)?;
        let (owner_reference, last) = parsed.split_last().ok_or_else(|| {
            QuamError::invalid_reference(raw_reference, "reference has no attribute to set")
        })?;

        let owner = resolve::resolve_parsed(self, id, raw_reference, &owner_reference, self.get_root(id), 0)?;
        let owner = owner.as_node().ok_or_else(|| {
            QuamError::invalid_reference(raw_reference, "reference does not point into a node")
        })?;
        let target_key = Key::Name(last.key().unwrap_or_default().to_string());

        if self.is_reference_field(owner, target_key.clone())? {
            self.set_at_reference(owner, target_key, value)
        } else {
            self.set(owner, target_key, value)
        }
    }

    /// Every component reachable from `start` through stored (not referenced) values.
    pub fn iterate_components(&self, start: NodeId) -> Result<Vec<NodeId>, QuamError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.node(id)?;
            if node.is_component() {
                out.push(id);
            }
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }
        Ok(out)
    }

    pub fn summary(&self, id: NodeId) -> Result<String, QuamError> {
        let mut out = String::new();
        let title = if Some(id) == self.root {
            "QUAM:".to_string()
        } else {
            format!("{}:", self.node(id)?.kind.label())
        };
        self.write_summary(&mut out, id, &title, 0)?;
        Ok(out)
    }

    fn write_summary(&self, out: &mut String, id: NodeId, title: &str, indent: usize) -> Result<(), QuamError> {
        let node = self.node(id)?;
        let pad = " ".repeat(indent);
        if node.is_empty() {
            out.push_str(&format!("{}{} Empty\n", pad, title));
            return Ok(());
        }
        out.push_str(&format!("{}{}\n", pad, title));
        for key in self.keys(id)? {
            let raw = self.get_raw(id, key.clone())?;
            match raw {
                Value::Node(child) => {
                    let label = self.node(child)?.kind.label();
                    self.write_summary(out, child, &format!("{}: {}", key, label), indent + 2)?;
                }
                other => out.push_str(&format!("{}  {}: {}\n", pad, key, other)),
            }
        }
        Ok(())
    }

    pub fn to_dict(&self, include_defaults: bool) -> Result<JsonValue, QuamError> {
        let root = self
            .root
            .ok_or_else(|| QuamError::Invariant("graph has no root".to_string()))?;
        serialise::to_dict(self, root, include_defaults)
    }

    pub fn from_dict(
        registry: Arc<ClassRegistry>,
        root_class: Option<&str>,
        data: &JsonValue,
    ) -> Result<Self, QuamError> {
        serialise::load_root(registry, root_class, data, &InstantiateOptions::default())
    }
}
