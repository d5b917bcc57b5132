use crate::error::QuamError;
use crate::node::{Key, NodeId, NodeKind, Value};
use crate::quam::Quam;
use crate::reference::{self, Reference, Step};
use tracing::trace;

/// Nesting limit for references that point at other references.
pub const MAX_REFERENCE_DEPTH: usize = 64;

/// Resolve `reference` as seen from `origin`. Absolute references start at `root`.
///
/// Nothing is cached; every call walks the live graph again.
pub fn resolve(
    quam: &Quam,
    origin: NodeId,
    reference: &str,
    root: Option<NodeId>,
) -> Result<Value, QuamError> {
    resolve_at_depth(quam, origin, reference, root, 0)
}

/// Resolve against the root the origin itself belongs to.
pub fn resolve_reference(quam: &Quam, origin: NodeId, reference: &str) -> Result<Value, QuamError> {
    resolve(quam, origin, reference, quam.get_root(origin))
}

pub(crate) fn resolve_at_depth(
    quam: &Quam,
    origin: NodeId,
    raw: &str,
    root: Option<NodeId>,
    depth: usize,
) -> Result<Value, QuamError> {
    if !reference::is_reference(raw) {
        return Err(QuamError::invalid_reference(raw, "not a reference"));
    }
    let parsed = Reference::parse(raw)?;
    resolve_parsed(quam, origin, raw, &parsed, root, depth)
}

pub(crate) fn resolve_parsed(
    quam: &Quam,
    origin: NodeId,
    raw: &str,
    parsed: &Reference,
    root: Option<NodeId>,
    depth: usize,
) -> Result<Value, QuamError> {
    if depth >= MAX_REFERENCE_DEPTH {
        return Err(QuamError::invalid_reference(
            raw,
            "reference nesting too deep, probably a reference cycle",
        ));
    }
    trace!(origin, reference = raw, "resolving reference");

    let mut current = if parsed.absolute {
        let root = root.ok_or_else(|| QuamError::invalid_reference(raw, "no root to resolve from"))?;
        Value::Node(root)
    } else {
        Value::Node(origin)
    };

    for step in &parsed.steps {
        current = match step {
            Step::Current => current,
            Step::Parent => {
                let id = expect_node(raw, &current)?;
                let parent = quam
                    .parent(id)
                    .map_err(|e| QuamError::invalid_reference(raw, e.to_string()))?;
                Value::Node(parent.ok_or_else(|| {
                    QuamError::invalid_reference(raw, format!("node {} has no parent", id))
                })?)
            }
            Step::Attr(name) => lookup(quam, raw, &current, name, false, depth)?,
            Step::Item(key) => lookup(quam, raw, &current, key, true, depth)?,
        };
    }
    Ok(current)
}

fn expect_node(raw: &str, value: &Value) -> Result<NodeId, QuamError> {
    value.as_node().ok_or_else(|| {
        QuamError::invalid_reference(raw, format!("value {} has no attributes", value))
    })
}

fn lookup(
    quam: &Quam,
    raw: &str,
    current: &Value,
    name: &str,
    item: bool,
    depth: usize,
) -> Result<Value, QuamError> {
    let id = expect_node(raw, current)?;
    let node = quam
        .node(id)
        .map_err(|e| QuamError::invalid_reference(raw, e.to_string()))?;

    let key = match &node.kind {
        NodeKind::Component { class } if item => {
            return Err(QuamError::invalid_reference(
                raw,
                format!("{} does not support item lookup ['{}']", class, name),
            ));
        }
        NodeKind::List { .. } => match name.parse::<i64>() {
            Ok(i) => Key::Index(i),
            Err(_) => {
                return Err(QuamError::invalid_reference(
                    raw,
                    format!("list index '{}' is not an integer", name),
                ));
            }
        },
        _ => Key::Name(name.to_string()),
    };

    quam.get_at_depth(id, &key, depth + 1).map_err(|e| match e {
        QuamError::InvalidReference { .. } => e,
        other => QuamError::invalid_reference(raw, other.to_string()),
    })
}
