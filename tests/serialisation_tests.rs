mod common;

use common::{GAUSSIAN, ROOT, lab, lenient, node, registry};
use quam::serialise::{self, CLASS_KEY, InstantiateOptions};
use quam::{Quam, QuamError, Value};
use serde_json::json;

#[test]
fn to_dict_elides_defaults_and_tags_the_root() -> Result<(), Box<dyn std::error::Error>> {
    let lab = lab()?;
    let document = lab.quam.to_dict(false)?;

    assert_eq!(
        document,
        json!({
            "__class__": ROOT,
            "qubits": [
                {"id": "q0", "frequency": 6.0e9, "xy": {"amplitude": 0.2}, "resonator": {}},
                {"id": "q1"}
            ],
            "wiring": {"f": 6.5e9}
        })
    );
    Ok(())
}

#[test]
fn include_defaults_emits_every_field() -> Result<(), Box<dyn std::error::Error>> {
    let lab = lab()?;
    let document = lab.quam.to_dict(true)?;

    assert_eq!(document["name"], json!("lab"));
    assert_eq!(document["qubits"][1]["frequency"], json!(5.0e9));
    assert_eq!(document["qubits"][1]["xy"], json!(null));
    assert_eq!(document["qubits"][0]["resonator"]["depletion_time"], json!(1000));
    assert!(document["qubits"][0].get(CLASS_KEY).is_none());
    Ok(())
}

#[test]
fn references_are_written_verbatim() -> Result<(), Box<dyn std::error::Error>> {
    let mut lab = lab()?;
    lab.quam.set(lab.q1, "frequency", Value::from(":wiring.f"))?;
    lab.quam.set(lab.resonator, "frequency", Value::from(":../frequency"))?;

    let document = lab.quam.to_dict(false)?;
    assert_eq!(document["qubits"][1]["frequency"], json!(":wiring.f"));
    assert_eq!(
        document["qubits"][0]["resonator"]["frequency"],
        json!(":../frequency")
    );
    Ok(())
}

#[test]
fn round_trip_reproduces_the_graph() -> Result<(), Box<dyn std::error::Error>> {
    let lab = lab()?;
    let full = lab.quam.to_dict(true)?;
    let elided = lab.quam.to_dict(false)?;

    let from_full = Quam::from_dict(registry(), None, &full)?;
    assert_eq!(from_full.to_dict(true)?, full);

    let from_elided = Quam::from_dict(registry(), Some(ROOT), &elided)?;
    assert_eq!(from_elided.to_dict(true)?, full);
    assert_eq!(from_elided.to_dict(false)?, elided);
    Ok(())
}

#[test]
fn loaded_references_resolve_lazily() -> Result<(), Box<dyn std::error::Error>> {
    let mut lab = lab()?;
    lab.quam.set(lab.q1, "frequency", Value::from(":wiring.f"))?;
    let document = lab.quam.to_dict(false)?;

    let mut loaded = Quam::from_dict(registry(), None, &document)?;
    let root = loaded.root().ok_or("no root")?;
    let qubits = node(loaded.get(root, "qubits")?);
    let q1 = node(loaded.get(qubits, 1)?);
    let wiring = node(loaded.get(root, "wiring")?);

    assert_eq!(loaded.get_raw(q1, "frequency")?, Value::from(":wiring.f"));
    assert_eq!(loaded.get(q1, "frequency")?, Value::Float(6.5e9));

    loaded.set(wiring, "f", Value::Float(7.5e9))?;
    assert_eq!(loaded.get(q1, "frequency")?, Value::Float(7.5e9));
    Ok(())
}

#[test]
fn subclasses_carry_a_class_tag() -> Result<(), Box<dyn std::error::Error>> {
    let mut lab = lab()?;
    let gaussian = lab.quam.create(
        GAUSSIAN,
        [("sigma", Value::Float(4.0)), ("length", Value::Int(40))],
    )?;
    lab.quam.set(lab.q1, "xy", Value::Node(gaussian))?;

    let document = lab.quam.to_dict(false)?;
    assert_eq!(
        document["qubits"][1]["xy"],
        json!({"__class__": GAUSSIAN, "sigma": 4.0, "length": 40})
    );

    let loaded = Quam::from_dict(registry(), None, &document)?;
    let root = loaded.root().ok_or("no root")?;
    let qubits = node(loaded.get(root, "qubits")?);
    let q1 = node(loaded.get(qubits, 1)?);
    let xy = node(loaded.get(q1, "xy")?);
    assert_eq!(loaded.node(xy)?.class(), Some(GAUSSIAN));
    assert_eq!(loaded.get(xy, "length")?, Value::Int(40));
    Ok(())
}

#[test]
fn unserialisable_values_fail() -> Result<(), Box<dyn std::error::Error>> {
    let mut lab = lab()?;
    lab.quam.set(lab.pulse, "amplitude", Value::Float(f64::NAN))?;
    assert!(matches!(
        lab.quam.to_dict(false),
        Err(QuamError::Unserializable(_))
    ));
    Ok(())
}

#[test]
fn unknown_class_tags_fail() {
    let document = json!({"__class__": "lab.Missing"});
    assert!(matches!(
        Quam::from_dict(registry(), None, &document),
        Err(QuamError::UnknownClass(ref class)) if class == "lab.Missing"
    ));

    let untagged = json!({"name": "x"});
    assert!(matches!(
        Quam::from_dict(registry(), None, &untagged),
        Err(QuamError::MalformedDocument(_))
    ));
}

#[test]
fn missing_required_fields_fail_on_load() {
    let document = json!({"__class__": ROOT, "qubits": [{"frequency": 1.0}]});
    assert!(matches!(
        Quam::from_dict(registry(), None, &document),
        Err(QuamError::MissingRequiredField { ref field, .. }) if field == "id"
    ));
}

#[test]
fn instantiate_options_control_validation() -> Result<(), Box<dyn std::error::Error>> {
    let wrong_type = json!({"__class__": ROOT, "name": 3});
    assert!(matches!(
        Quam::from_dict(registry(), None, &wrong_type),
        Err(QuamError::TypeMismatch { .. })
    ));
    let lenient_options = InstantiateOptions::lenient();
    let loaded = serialise::load_root(registry(), None, &wrong_type, &lenient_options)?;
    let root = loaded.root().ok_or("no root")?;
    assert_eq!(loaded.get(root, "name")?, Value::Int(3));

    let extra_key = json!({"__class__": ROOT, "colour": "blue"});
    assert!(matches!(
        Quam::from_dict(registry(), None, &extra_key),
        Err(QuamError::UnknownField { .. })
    ));
    let loaded = serialise::load_root(registry(), None, &extra_key, &lenient_options)?;
    let root = loaded.root().ok_or("no root")?;
    assert!(!loaded.contains_key(root, "colour")?);

    let wrong_subclass = json!({"__class__": ROOT, "qubits": [{"__class__": GAUSSIAN, "sigma": 1.0, "length": 4}]});
    assert!(matches!(
        Quam::from_dict(registry(), None, &wrong_subclass),
        Err(QuamError::TypeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn lenient_registry_loads_arbitrary_documents() -> Result<(), Box<dyn std::error::Error>> {
    let document = json!({
        "__class__": "anything.Root",
        "values": [1, 2.5, ":./0"],
        "nested": {"__class__": "anything.Child", "flag": true},
        "plain": {"k": null}
    });
    let loaded = serialise::load_root(lenient(), None, &document, &InstantiateOptions::lenient())?;
    let root = loaded.root().ok_or("no root")?;

    let values = node(loaded.get(root, "values")?);
    assert_eq!(loaded.get(values, 2)?, Value::Int(1));
    let nested = node(loaded.get(root, "nested")?);
    assert_eq!(loaded.node(nested)?.class(), Some("anything.Child"));
    assert_eq!(loaded.to_dict(true)?, document);
    Ok(())
}

#[test]
fn numbers_compare_by_value_for_default_elision() {
    assert!(serialise::json_eq(&json!(1), &json!(1.0)));
    assert!(serialise::json_eq(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
    assert!(!serialise::json_eq(&json!(1), &json!("1")));
}

#[test]
fn fingerprint_ignores_key_order_only() -> Result<(), Box<dyn std::error::Error>> {
    let a: serde_json::Value = serde_json::from_str(r#"{"a": 1, "b": [true, null]}"#)?;
    let b: serde_json::Value = serde_json::from_str(r#"{"b": [true, null], "a": 1}"#)?;
    let c = json!({"a": 2, "b": [true, null]});

    assert_eq!(serialise::fingerprint(&a), serialise::fingerprint(&b));
    assert_ne!(serialise::fingerprint(&a), serialise::fingerprint(&c));
    assert_eq!(serialise::fingerprint_hex(&a).len(), 64);
    Ok(())
}
