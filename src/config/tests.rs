use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
#[serial]
fn config_dir_honours_env_override() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    // SAFETY: serialized with every other test touching this variable
    unsafe { std::env::set_var(HOME_ENV_VAR, temp_dir.path()) };

    let dir = get_config_dir().expect("should resolve config dir");
    assert_eq!(dir, temp_dir.path());

    let config = Config::load().expect("should load defaults from override dir");
    assert_eq!(config.get_base_dir(), temp_dir.path());

    // SAFETY: see above
    unsafe { std::env::remove_var(HOME_ENV_VAR) };
}

#[test]
fn config_file_persistence() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_path = temp_dir.path().join("config.toml");

    let original_config = Config {
        ollama: OllamaConfig {
            protocol: "https".to_string(),
            host: "test-host".to_string(),
            port: 8080,
            embedding_model: "test-model".to_string(),
            chat_model: "test-chat".to_string(),
            batch_size: 32,
            timeout_seconds: 30,
            retry_attempts: 2,
        },
        ..Config::default()
    };

    let toml_content = toml::to_string_pretty(&original_config)
        .expect("config should convert to toml string successfully");
    fs::write(&config_path, toml_content).expect("should write to config_path successfully");

    let content =
        fs::read_to_string(&config_path).expect("should read from config_path successfully");
    let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

    assert_eq!(original_config, loaded_config);
}

#[test]
fn invalid_toml_handling() {
    let invalid_toml = r#"
        [ollama
        host = "localhost"
        port = "invalid_port"
    "#;

    let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
    assert!(result.is_err());
}

#[test]
fn lexicon_can_be_extended_from_toml() {
    let toml_str = r#"
        [language]
        non_english_routing = "passthrough"

        [[language.lexicon]]
        term = "khurumjari"
        kind = "word"

        [[language.lexicon]]
        term = "eigi"
        kind = "prefix"
    "#;

    let config: Config = toml::from_str(toml_str).expect("should parse language section");
    assert_eq!(config.language.lexicon.len(), 2);
    assert_eq!(config.language.lexicon[0].term, "khurumjari");
    assert_eq!(
        config.language.non_english_routing,
        crate::language::NonEnglishRouting::Passthrough
    );
    assert!(config.validate().is_ok());
}
