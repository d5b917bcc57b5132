use crate::reference;
use crate::schema::FieldType;
use std::collections::BTreeMap;
use std::fmt;

pub type NodeId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Node(NodeId),
}

impl Value {
    /// The raw reference string, if this value is one.
    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Value::Str(s) if reference::is_reference(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.as_reference().is_some()
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Node(_) => "node",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "\"{}\"", v),
            Value::Node(id) => write!(f, "<node {}>", id),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Address of a slot inside a node: a field or dict key, or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(i64),
}

impl Key {
    pub(crate) fn slot_name(&self) -> String {
        match self {
            Key::Name(name) => name.clone(),
            Key::Index(i) => i.to_string(),
        }
    }

    pub(crate) fn as_index(&self) -> Option<i64> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(name) => name.parse().ok(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{}", name),
            Key::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Name(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Name(v)
    }
}

impl From<&String> for Key {
    fn from(v: &String) -> Self {
        Key::Name(v.clone())
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Index(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Index(v as i64)
    }
}

impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Key::Index(v as i64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Component { class: String },
    List { element: FieldType },
    Dict { element: FieldType },
}

impl NodeKind {
    pub fn label(&self) -> String {
        match self {
            NodeKind::Component { class } => class.rsplit('.').next().unwrap_or(class).to_string(),
            NodeKind::List { .. } => "QuamList".to_string(),
            NodeKind::Dict { .. } => "QuamDict".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Component fields and dict entries.
    pub fields: BTreeMap<String, Value>,
    /// List elements.
    pub items: Vec<Value>,
    /// Slot name -> raw reference string, for every slot currently holding a reference.
    pub references: BTreeMap<String, String>,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            parent: None,
            fields: BTreeMap::new(),
            items: Vec::new(),
            references: BTreeMap::new(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, NodeKind::List { .. })
    }

    pub fn is_component(&self) -> bool {
        matches!(self.kind, NodeKind::Component { .. })
    }

    pub fn class(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Component { class } => Some(class),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        if self.is_list() {
            self.items.len()
        } else {
            self.fields.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn list_index(&self, index: i64) -> Option<usize> {
        let len = self.items.len() as i64;
        let idx = if index < 0 { len + index } else { index };
        (0..len).contains(&idx).then_some(idx as usize)
    }

    pub(crate) fn slot(&self, key: &Key) -> Option<&Value> {
        if self.is_list() {
            let idx = self.list_index(key.as_index()?)?;
            self.items.get(idx)
        } else {
            self.fields.get(&key.slot_name())
        }
    }

    pub(crate) fn record_reference(&mut self, slot: String, value: &Value) {
        match value.as_reference() {
            Some(r) => {
                self.references.insert(slot, r.to_string());
            }
            None => {
                self.references.remove(&slot);
            }
        }
    }

    pub(crate) fn reindex_references(&mut self) {
        self.references = self
            .items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_reference().map(|r| (i.to_string(), r.to_string())))
            .collect();
    }

    /// Raw child node ids stored directly in this node, in slot order.
    pub fn children(&self) -> Vec<NodeId> {
        if self.is_list() {
            self.items.iter().filter_map(Value::as_node).collect()
        } else {
            self.fields.values().filter_map(Value::as_node).collect()
        }
    }
}
