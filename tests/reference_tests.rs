use quam::QuamError;
use quam::reference::{
    DEFAULT_SPLITTERS, Reference, Step, is_absolute_reference, is_reference, split_next_attribute,
};

#[test]
fn classifies_reference_strings() {
    assert!(is_reference(":a"));
    assert!(is_reference(":"));
    assert!(!is_reference("a:b"));
    assert!(!is_reference(""));

    assert!(is_absolute_reference(":a.b"));
    assert!(is_absolute_reference(":/a[0]"));
    assert!(!is_absolute_reference(":./a"));
    assert!(!is_absolute_reference(":../a"));
    assert!(!is_absolute_reference("a.b"));
}

#[test]
fn split_uses_earliest_splitter() {
    assert_eq!(split_next_attribute("a.b[0]", &DEFAULT_SPLITTERS), ("a", ".b[0]"));
    assert_eq!(split_next_attribute("a[0].b", &DEFAULT_SPLITTERS), ("a", "[0].b"));
    assert_eq!(split_next_attribute("abc", &DEFAULT_SPLITTERS), ("abc", ""));
    assert_eq!(split_next_attribute(".b", &DEFAULT_SPLITTERS), ("", ".b"));
    assert_eq!(split_next_attribute("a.b", &['[']), ("a.b", ""));
}

#[test]
fn parses_relative_path() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Reference::parse(":../x.y['k'][0]")?;
    assert!(!parsed.absolute);
    assert_eq!(
        parsed.steps,
        vec![
            Step::Parent,
            Step::Attr("x".to_string()),
            Step::Attr("y".to_string()),
            Step::Item("k".to_string()),
            Step::Item("0".to_string()),
        ]
    );

    let parsed = Reference::parse(":../../")?;
    assert_eq!(parsed.steps, vec![Step::Parent, Step::Parent]);
    Ok(())
}

#[test]
fn parses_absolute_path_with_optional_slash() -> Result<(), Box<dyn std::error::Error>> {
    let plain = Reference::parse(":a[0]")?;
    let slashed = Reference::parse(":/a[0]")?;
    assert!(plain.absolute);
    assert_eq!(plain, slashed);
    assert_eq!(
        plain.steps,
        vec![Step::Attr("a".to_string()), Step::Item("0".to_string())]
    );

    let root = Reference::parse(":")?;
    assert!(root.absolute);
    assert!(root.steps.is_empty());
    Ok(())
}

#[test]
fn rejects_malformed_references() {
    for bad in ["a.b", ":a b", ":a[0", ":a-b", ":./x.$y"] {
        assert!(
            matches!(Reference::parse(bad), Err(QuamError::InvalidReference { .. })),
            "{} should be rejected",
            bad
        );
    }
}

#[test]
fn displays_canonical_form() -> Result<(), Box<dyn std::error::Error>> {
    for s in [":qubits[0].xy", ":wiring['q-1'].port", ":../resonator.xy", ":./frequency", ":"] {
        assert_eq!(Reference::parse(s)?.to_string(), s);
    }
    assert_eq!(Reference::parse(":/a[0]")?.to_string(), ":a[0]");
    assert_eq!(Reference::parse(":a[\"k\"]")?.to_string(), ":a['k']");
    Ok(())
}

#[test]
fn split_last_separates_owner_and_key() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Reference::parse(":qubits[0].frequency")?;
    let (owner, last) = parsed.split_last().ok_or("no last step")?;
    assert_eq!(owner.to_string(), ":qubits[0]");
    assert_eq!(last, Step::Attr("frequency".to_string()));

    assert!(Reference::parse(":../")?.split_last().is_none());
    Ok(())
}
