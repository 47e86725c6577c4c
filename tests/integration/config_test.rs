use std::path::PathBuf;

use futbolin_messaging::{ConfigError, MessagingConfig, PropertiesConfig, CONFIG_PATH_VARIABLE};

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/application.properties")
}

fn load_fixture() -> PropertiesConfig {
    let path = fixture_path();
    PropertiesConfig::load_from(path.to_str()).expect("Failed to load fixture properties")
}

#[test]
fn test_string_value_from_file() {
    assert_eq!(load_fixture().get_string("an.example").as_deref(), Some("1"));
}

#[test]
fn test_integer_value_from_file() {
    assert_eq!(load_fixture().get_integer("an.example"), Some(1));
}

#[test]
fn test_missing_value_is_none() {
    assert!(load_fixture().get_string("another.example").is_none());
}

#[test]
fn test_non_numeric_value_is_none() {
    let config = load_fixture();

    assert_eq!(config.get_string("an.invalid.number").as_deref(), Some("one"));
    assert_eq!(config.get_integer("an.invalid.number"), None);
}

#[test]
fn test_source_is_remembered() {
    assert_eq!(load_fixture().source(), Some(&fixture_path()));
}

#[test]
fn test_missing_file_fails() {
    let err = PropertiesConfig::load_from(Some("foo")).unwrap_err();

    assert!(matches!(err, ConfigError::Unreadable { .. }));
    assert!(err.to_string().contains("foo could not be read"));
}

#[test]
fn test_load_from_environment() {
    // The only test touching the variable
    std::env::set_var(CONFIG_PATH_VARIABLE, fixture_path());

    let config = PropertiesConfig::load().expect("Failed to load configuration from environment");

    assert_eq!(config.get_string("an.example").as_deref(), Some("1"));
}

#[test]
fn test_messaging_config_from_file() {
    let config = MessagingConfig::from_properties(&load_fixture()).unwrap();

    assert_eq!(config, MessagingConfig::new("localhost", 5672, "guest", "guest"));
}
