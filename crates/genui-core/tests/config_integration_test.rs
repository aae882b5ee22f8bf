use genui_core::{ConfigError, ConfigManager, StoppingRuleKind};
use secrecy::ExposeSecret;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn clear_env() {
    for key in [
        "GENUI_PROVIDER_URL",
        "GENUI_API_KEY",
        "OPENROUTER_API_KEY",
        "GENUI_MODEL",
        "GENUI_MODEL_CODING",
        "GENUI_MAX_ITERATIONS",
        "GENUI_TARGET_SCORE",
        "GENUI_LOG_LEVEL",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_load_from_explicit_path() {
    clear_env();
    let file = write_config(
        r#"
        [provider]
        url = "http://localhost:1234/v1"

        [refinement]
        max_iterations = 2
        target_score = 90.0
        stopping_rule = "target-only"

        [storage]
        namespace = "pricing"
        "#,
    );

    let manager = ConfigManager::from_path(file.path()).unwrap();
    let config = manager.config();
    assert_eq!(manager.config_path(), Some(file.path()));
    assert_eq!(config.provider.url, "http://localhost:1234/v1");
    assert_eq!(config.refinement.max_iterations, 2);
    assert_eq!(config.refinement.stopping_rule, StoppingRuleKind::TargetOnly);
    assert_eq!(config.storage.namespace, "pricing");
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let file = write_config(
        r#"
        [models]
        coding = "file/coder"
        "#,
    );

    std::env::set_var("GENUI_MODEL_CODING", "env/coder");
    std::env::set_var("GENUI_MAX_ITERATIONS", "7");
    std::env::set_var("OPENROUTER_API_KEY", "sk-from-env");

    let config = ConfigManager::from_path(file.path()).unwrap().into_config();
    clear_env();

    assert_eq!(config.models.coding, "env/coder");
    assert_eq!(config.refinement.max_iterations, 7);
    assert_eq!(
        config.provider.api_key.as_ref().map(|k| k.expose_secret().to_string()),
        Some("sk-from-env".to_string())
    );
}

#[test]
#[serial]
fn test_uniform_model_override() {
    clear_env();
    let file = write_config("");
    std::env::set_var("GENUI_MODEL", "local/one-model");

    let config = ConfigManager::from_path(file.path()).unwrap().into_config();
    clear_env();

    assert_eq!(config.models.requirement_analysis, "local/one-model");
    assert_eq!(config.models.validation, "local/one-model");
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    clear_env();
    let file = write_config(
        r#"
        [gateway]
        max_attempts = 0
        "#,
    );
    let err = ConfigManager::from_path(file.path()).err().unwrap();
    assert!(matches!(err, ConfigError::ValidationError(_)));

    let missing = std::path::Path::new("/definitely/not/here.toml");
    assert!(matches!(
        ConfigManager::from_path(missing),
        Err(ConfigError::NotFound(_))
    ));
}

#[test]
#[serial]
fn test_default_config_round_trips_through_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    ConfigManager::create_default_config(&path).unwrap();

    let config = ConfigManager::from_path(&path).unwrap().into_config();
    assert_eq!(config.refinement.target_score, 92.0);
    assert_eq!(config.server.port, 8787);
}
