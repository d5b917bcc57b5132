#![allow(dead_code)]

use quam::{ClassRegistry, ClassSpec, FieldType, NodeId, Quam, Value};
use serde_json::json;
use std::sync::Arc;

pub const ROOT: &str = "lab.Root";
pub const TRANSMON: &str = "lab.Transmon";
pub const RESONATOR: &str = "lab.Resonator";
pub const PULSE: &str = "lab.Pulse";
pub const GAUSSIAN: &str = "lab.GaussianPulse";

pub fn registry() -> Arc<ClassRegistry> {
    let registry = ClassRegistry::new()
        .with(
            ClassSpec::new(PULSE)
                .optional("amplitude", FieldType::Float, json!(0.1))
                .optional("length", FieldType::Int, json!(100)),
        )
        .and_then(|r| {
            r.with(
                ClassSpec::new(GAUSSIAN)
                    .extends(PULSE)
                    .required("sigma", FieldType::Float)
                    .required("length", FieldType::Int),
            )
        })
        .and_then(|r| {
            r.with(
                ClassSpec::new(RESONATOR)
                    .optional("frequency", FieldType::Float, json!(7.0e9))
                    .optional("depletion_time", FieldType::Int, json!(1000)),
            )
        })
        .and_then(|r| {
            r.with(
                ClassSpec::new(TRANSMON)
                    .required("id", FieldType::Str)
                    .optional("frequency", FieldType::Float, json!(5.0e9))
                    .optional("anharmonicity", FieldType::Float, json!(-2.0e8))
                    .optional("xy", FieldType::optional(FieldType::component(PULSE)), json!(null))
                    .optional(
                        "resonator",
                        FieldType::optional(FieldType::component(RESONATOR)),
                        json!(null),
                    ),
            )
        })
        .and_then(|r| {
            r.with(
                ClassSpec::new(ROOT)
                    .optional("name", FieldType::Str, json!("lab"))
                    .optional("qubits", FieldType::list(FieldType::component(TRANSMON)), json!([]))
                    .optional("wiring", FieldType::dict(FieldType::Any), json!({})),
            )
        })
        .expect("fixture registry is valid");
    Arc::new(registry)
}

pub fn lenient() -> Arc<ClassRegistry> {
    Arc::new(ClassRegistry::lenient())
}

pub fn no_fields() -> Vec<(&'static str, Value)> {
    Vec::new()
}

pub fn node(value: Value) -> NodeId {
    value.as_node().expect("value is a node")
}

/// Root with two transmons; the first has a resonator and an xy pulse.
pub struct Lab {
    pub quam: Quam,
    pub root: NodeId,
    pub qubits: NodeId,
    pub wiring: NodeId,
    pub q0: NodeId,
    pub q1: NodeId,
    pub pulse: NodeId,
    pub resonator: NodeId,
}

pub fn lab() -> Result<Lab, quam::QuamError> {
    let mut quam = Quam::new(registry());
    let pulse = quam.create(PULSE, [("amplitude", Value::Float(0.2))])?;
    let resonator = quam.create(RESONATOR, no_fields())?;
    let q0 = quam.create(
        TRANSMON,
        [
            ("id", Value::from("q0")),
            ("frequency", Value::Float(6.0e9)),
            ("xy", Value::Node(pulse)),
            ("resonator", Value::Node(resonator)),
        ],
    )?;
    let q1 = quam.create(TRANSMON, [("id", Value::from("q1"))])?;
    let root = quam.create_root(ROOT, no_fields())?;
    let qubits = node(quam.get(root, "qubits")?);
    quam.push(qubits, Value::Node(q0))?;
    quam.push(qubits, Value::Node(q1))?;
    let wiring = node(quam.get(root, "wiring")?);
    quam.set(wiring, "f", Value::Float(6.5e9))?;

    Ok(Lab {
        quam,
        root,
        qubits,
        wiring,
        q0,
        q1,
        pulse,
        resonator,
    })
}
