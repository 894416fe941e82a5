// Configuration management module
// TOML settings, validation, and the interactive setup flow

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, HOME_ENV_VAR, LanguageConfig, OllamaConfig, RetrievalConfig,
    SessionConfig, TranslationConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
