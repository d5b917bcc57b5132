//! Conversion between a node graph and plain JSON documents.
//!
//! `to_dict` emits raw slot values, so reference strings are written verbatim.
//! Components whose runtime class differs from the declared field type carry a
//! `"__class__"` tag; the root always does. `from_dict` reverses this, leaving
//! reference strings unresolved in raw storage.

use crate::error::QuamError;
use crate::node::{NodeId, NodeKind, Value};
use crate::quam::Quam;
use crate::reference;
use crate::schema::{ClassRegistry, FieldType};
use serde_json::{Map, Number, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

pub const CLASS_KEY: &str = "__class__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstantiateOptions {
    /// Check primitive values against their declared field types.
    pub validate_type: bool,
    /// Reject keys that are not declared fields of the class.
    pub fix_attrs: bool,
}

impl Default for InstantiateOptions {
    fn default() -> Self {
        Self {
            validate_type: true,
            fix_attrs: true,
        }
    }
}

impl InstantiateOptions {
    pub fn lenient() -> Self {
        Self {
            validate_type: false,
            fix_attrs: false,
        }
    }
}

pub fn to_dict(quam: &Quam, node: NodeId, include_defaults: bool) -> Result<JsonValue, QuamError> {
    let is_root = quam.root() == Some(node);
    node_to_json(quam, node, &FieldType::Any, include_defaults, is_root)
}

pub fn value_to_json(
    quam: &Quam,
    value: &Value,
    declared: &FieldType,
    include_defaults: bool,
) -> Result<JsonValue, QuamError> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Bool(v) => Ok(JsonValue::Bool(*v)),
        Value::Int(v) => Ok(JsonValue::from(*v)),
        Value::Float(v) => Number::from_f64(*v)
            .map(JsonValue::Number)
            .ok_or_else(|| QuamError::Unserializable(format!("non-finite float {}", v))),
        Value::Str(v) => Ok(JsonValue::String(v.clone())),
        Value::Node(id) => node_to_json(quam, *id, declared, include_defaults, false),
    }
}

fn node_to_json(
    quam: &Quam,
    id: NodeId,
    declared: &FieldType,
    include_defaults: bool,
    is_root: bool,
) -> Result<JsonValue, QuamError> {
    let node = quam
        .node(id)
        .map_err(|_| QuamError::Unserializable(format!("dangling node {}", id)))?;

    match &node.kind {
        NodeKind::List { element } => node
            .items
            .iter()
            .map(|v| value_to_json(quam, v, element, include_defaults))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        NodeKind::Dict { element } => {
            let mut map = Map::new();
            for (k, v) in &node.fields {
                map.insert(k.clone(), value_to_json(quam, v, element, include_defaults)?);
            }
            Ok(JsonValue::Object(map))
        }
        NodeKind::Component { class } => {
            let specs = quam.registry().fields(class)?;
            let mut map = Map::new();
            for (name, raw) in &node.fields {
                let spec = specs.iter().find(|s| s.name == *name);
                let ty = spec.map(|s| &s.ty).unwrap_or(&FieldType::Any);
                let json = value_to_json(quam, raw, ty, include_defaults)?;
                let is_default = spec
                    .and_then(|s| s.default_value())
                    .is_some_and(|d| json_eq(d, &json));
                if include_defaults || !is_default {
                    map.insert(name.clone(), json);
                }
            }
            if is_root || declared.declared_class() != Some(class.as_str()) {
                map.insert(CLASS_KEY.to_string(), JsonValue::String(class.clone()));
            }
            Ok(JsonValue::Object(map))
        }
    }
}

/// Structural equality where numbers compare by value, so `1` equals `1.0`.
pub fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (JsonValue::Array(xs), JsonValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (JsonValue::Object(xs), JsonValue::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Build a graph from a document. The root class comes from the document's
/// `"__class__"` tag, falling back to `root_class`.
pub fn load_root(
    registry: Arc<ClassRegistry>,
    root_class: Option<&str>,
    data: &JsonValue,
    options: &InstantiateOptions,
) -> Result<Quam, QuamError> {
    let mut quam = Quam::new(registry);
    let declared = match root_class {
        Some(class) => FieldType::component(class),
        None => FieldType::Any,
    };
    let JsonValue::Object(map) = data else {
        return Err(QuamError::MalformedDocument(
            "top-level document must be an object".to_string(),
        ));
    };
    let root = instantiate_component(&mut quam, map, &declared, options)?;
    quam.set_root(root)?;
    Ok(quam)
}

/// Reconstruct a value of the declared type inside `quam`.
pub fn from_dict(
    quam: &mut Quam,
    data: &JsonValue,
    declared: &FieldType,
    options: &InstantiateOptions,
) -> Result<Value, QuamError> {
    value_from_json(quam, data, declared, options, "value")
}

fn mismatch(field: &str, expected: &FieldType, found: &JsonValue) -> QuamError {
    let found = match found {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "str",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "dict",
    };
    QuamError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn number_value(n: &Number) -> Value {
    match n.as_i64() {
        Some(i) => Value::Int(i),
        None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

fn value_from_json(
    quam: &mut Quam,
    data: &JsonValue,
    declared: &FieldType,
    options: &InstantiateOptions,
    field: &str,
) -> Result<Value, QuamError> {
    if let JsonValue::String(s) = data {
        if reference::is_reference(s) {
            return Ok(Value::Str(s.clone()));
        }
    }

    let ty = declared.inner();
    if data.is_null() {
        if options.validate_type && !matches!(declared, FieldType::Optional(_) | FieldType::Any) {
            return Err(mismatch(field, declared, data));
        }
        return Ok(Value::Null);
    }

    match (ty, data) {
        (FieldType::Component(_), JsonValue::Object(map)) => {
            Ok(Value::Node(instantiate_component(quam, map, ty, options)?))
        }
        (FieldType::Any, JsonValue::Object(map)) if map.contains_key(CLASS_KEY) => {
            Ok(Value::Node(instantiate_component(quam, map, ty, options)?))
        }
        (FieldType::List(element), JsonValue::Array(items)) => {
            instantiate_list(quam, items, element, options, field)
        }
        (FieldType::Any, JsonValue::Array(items)) => {
            instantiate_list(quam, items, &FieldType::Any, options, field)
        }
        (FieldType::Dict(element), JsonValue::Object(map)) => {
            instantiate_dict(quam, map, element, options, field)
        }
        (FieldType::Any, JsonValue::Object(map)) => {
            instantiate_dict(quam, map, &FieldType::Any, options, field)
        }
        (_, JsonValue::Bool(v)) if matches!(ty, FieldType::Any | FieldType::Bool) => Ok(Value::Bool(*v)),
        (_, JsonValue::Number(n)) if matches!(ty, FieldType::Any) => Ok(number_value(n)),
        (FieldType::Int, JsonValue::Number(n)) if n.is_i64() => Ok(number_value(n)),
        (FieldType::Float, JsonValue::Number(n)) => Ok(Value::Float(n.as_f64().unwrap_or(f64::NAN))),
        (_, JsonValue::String(s)) if matches!(ty, FieldType::Any | FieldType::Str) => Ok(Value::Str(s.clone())),
        _ if options.validate_type => Err(mismatch(field, declared, data)),
        _ => from_dict(quam, data, &FieldType::Any, options),
    }
}

fn instantiate_list(
    quam: &mut Quam,
    items: &[JsonValue],
    element: &FieldType,
    options: &InstantiateOptions,
    field: &str,
) -> Result<Value, QuamError> {
    let values = items
        .iter()
        .enumerate()
        .map(|(i, item)| value_from_json(quam, item, element, options, &format!("{}[{}]", field, i)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Node(quam.create_list(element.clone(), values)?))
}

fn instantiate_dict(
    quam: &mut Quam,
    map: &Map<String, JsonValue>,
    element: &FieldType,
    options: &InstantiateOptions,
    field: &str,
) -> Result<Value, QuamError> {
    let mut entries = Vec::with_capacity(map.len());
    for (k, v) in map {
        let value = value_from_json(quam, v, element, options, &format!("{}.{}", field, k))?;
        entries.push((k.clone(), value));
    }
    Ok(Value::Node(quam.create_dict(element.clone(), entries)?))
}

fn instantiate_component(
    quam: &mut Quam,
    map: &Map<String, JsonValue>,
    declared: &FieldType,
    options: &InstantiateOptions,
) -> Result<NodeId, QuamError> {
    let class = match map.get(CLASS_KEY) {
        Some(JsonValue::String(class)) => class.clone(),
        Some(other) => return Err(mismatch(CLASS_KEY, &FieldType::Str, other)),
        None => declared
            .declared_class()
            .map(str::to_string)
            .ok_or_else(|| {
                QuamError::MalformedDocument(format!(
                    "cannot determine the class of an object without \"{}\"",
                    CLASS_KEY
                ))
            })?,
    };

    let registry = quam.shared_registry();
    registry.check(&class)?;
    if let Some(expected) = declared.declared_class() {
        if options.validate_type && !registry.is_dynamic(&class) && !registry.is_subclass(&class, expected) {
            return Err(QuamError::TypeMismatch {
                field: CLASS_KEY.to_string(),
                expected: expected.to_string(),
                found: class,
            });
        }
    }

    let specs = registry.fields(&class)?;
    let dynamic = registry.is_dynamic(&class);
    let mut values = Vec::with_capacity(map.len());
    for (key, raw) in map {
        if key == CLASS_KEY {
            continue;
        }
        let value = match specs.iter().find(|s| s.name == *key) {
            Some(spec) => value_from_json(quam, raw, &spec.ty, options, key)?,
            None if dynamic => value_from_json(quam, raw, &FieldType::Any, options, key)?,
            None if !options.fix_attrs => {
                warn!(class = %class, field = %key, "dropping undeclared field");
                continue;
            }
            None => {
                return Err(QuamError::UnknownField {
                    class: class.clone(),
                    field: key.clone(),
                });
            }
        };
        values.push((key.clone(), value));
    }
    quam.create(&class, values)
}

fn write_canonical(buf: &mut Vec<u8>, value: &JsonValue) {
    match value {
        JsonValue::Null => buf.push(0x00),
        JsonValue::Bool(v) => {
            buf.push(0x01);
            buf.push(if *v { 0x01 } else { 0x00 });
        }
        JsonValue::Number(n) => {
            buf.push(0x02);
            let text = n.to_string();
            buf.extend_from_slice(&(text.len() as u64).to_be_bytes());
            buf.extend_from_slice(text.as_bytes());
        }
        JsonValue::String(s) => {
            buf.push(0x03);
            buf.extend_from_slice(&(s.len() as u64).to_be_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        JsonValue::Array(items) => {
            buf.push(0x04);
            buf.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                write_canonical(buf, item);
            }
        }
        JsonValue::Object(map) => {
            buf.push(0x05);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            buf.extend_from_slice(&(keys.len() as u64).to_be_bytes());
            for key in keys {
                buf.extend_from_slice(&(key.len() as u64).to_be_bytes());
                buf.extend_from_slice(key.as_bytes());
                if let Some(v) = map.get(key) {
                    write_canonical(buf, v);
                }
            }
        }
    }
}

/// SHA-256 over a canonical encoding of the document; independent of key order.
pub fn fingerprint(document: &JsonValue) -> [u8; 32] {
    let mut bytes = Vec::new();
    write_canonical(&mut bytes, document);
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn fingerprint_hex(document: &JsonValue) -> String {
    fingerprint(document)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
