use quam::QuamError;
use quam::config::{CONFIG_VERSION, DEFAULT_FILENAME, DEFAULT_FOLDERNAME, QuamConfig, SerialiserConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn reads_a_versioned_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = QuamConfig::from_json(
        r#"{"quam": {"version": 3, "state_path": "/data/state", "include_defaults_in_save": true}}"#,
    )?;
    assert_eq!(config.version, Some(CONFIG_VERSION));
    assert_eq!(config.state_path, Some(PathBuf::from("/data/state")));

    let serialiser = SerialiserConfig::from_quam_config(&config);
    assert!(serialiser.include_defaults);
    assert_eq!(serialiser.state_path, Some(PathBuf::from("/data/state")));
    assert_eq!(serialiser.default_filename, DEFAULT_FILENAME);
    assert_eq!(serialiser.default_foldername, DEFAULT_FOLDERNAME);
    Ok(())
}

#[test]
fn version_is_required_and_checked() {
    let missing = QuamConfig::from_json(r#"{"quam": {}}"#).unwrap_err();
    assert!(matches!(
        missing.downcast_ref::<QuamError>(),
        Some(QuamError::MissingConfigVersion)
    ));

    let old = QuamConfig::from_json(r#"{"quam": {"version": 2}}"#).unwrap_err();
    assert!(matches!(
        old.downcast_ref::<QuamError>(),
        Some(QuamError::UnsupportedConfigVersion(2))
    ));

    assert!(QuamConfig::from_json(r#"{"other": {}}"#).is_err());
}

#[test]
fn loads_config_from_disk() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("quam_config.json");
    fs::write(&path, r#"{"quam": {"version": 3}}"#)?;

    let config = QuamConfig::load(&path)?;
    assert_eq!(config, QuamConfig::default());

    assert!(QuamConfig::load(&dir.path().join("missing.json")).is_err());
    Ok(())
}
