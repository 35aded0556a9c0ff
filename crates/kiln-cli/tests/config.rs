use kiln_cli::{ConfigError, SandboxConfig};
use kiln_types::Effect;

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("kiln.json");
    std::fs::write(
        &path,
        r#"{ "max_call_depth": 64, "max_source_size": 4096, "allow": ["time"] }"#,
    )
    .expect("write config");

    let config = SandboxConfig::load(&path).expect("load");
    assert_eq!(config.max_call_depth, 64);
    assert_eq!(config.max_source_size, 4096);
    assert_eq!(config.allow, vec![Effect::Time]);
    assert!(config.allowed().contains(Effect::Time));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let err = SandboxConfig::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.json"));
}

#[test]
fn unknown_effect_is_rejected() {
    let err = SandboxConfig::from_json(r#"{ "allow": ["net"] }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Json(_)));
}

#[test]
fn empty_object_is_default() {
    assert_eq!(
        SandboxConfig::from_json("{}").expect("parse"),
        SandboxConfig::default()
    );
}
