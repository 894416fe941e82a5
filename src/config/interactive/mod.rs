
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, OllamaConfig, TranslationConfig};
use crate::document::chunking::ChunkingPolicy;
use crate::embeddings::ollama::OllamaClient;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 PDF QA Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for embeddings and answers.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Translation Service").bold().yellow());
    eprintln!("English ⇄ Manipuri translation endpoint (IndicTrans2-compatible).");
    eprintln!();

    configure_translation(&mut config.translation)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    configure_retrieval(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before indexing.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  Embedding Model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    eprintln!("  Chat Model: {}", style(&config.ollama.chat_model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Translation:").bold().yellow());
    match config.translation.endpoint_url() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Chunking: {}", style(config.chunking.policy).cyan());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Lexicon Entries: {}",
        style(config.language.lexicon.len()).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    let config = Config::load().or_else(|_| {
        Config::config_dir()
            .map(|base_dir| Config {
                base_dir,
                ..Config::default()
            })
            .context("Failed to determine config directory")
    })?;

    if config.config_file_path().exists() {
        eprintln!("{}", style("Found existing configuration.").green());
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
    }

    Ok(config)
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(ollama.chat_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_chat_model(chat_model)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_translation(translation: &mut TranslationConfig) -> Result<()> {
    let host: String = Input::new()
        .with_prompt("Translation host")
        .default(translation.host.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Translation port")
        .default(translation.port)
        .interact_text()?;

    let path: String = Input::new()
        .with_prompt("Translate endpoint path")
        .default(translation.path.clone())
        .interact_text()?;

    let candidate = TranslationConfig {
        host,
        port,
        path,
        ..translation.clone()
    };
    candidate.validate()?;
    *translation = candidate;

    Ok(())
}

fn configure_retrieval(config: &mut Config) -> Result<()> {
    let policies = [
        ChunkingPolicy::LayoutLines,
        ChunkingPolicy::LayoutSpans,
        ChunkingPolicy::WordWindow,
    ];
    let labels: Vec<String> = policies.iter().map(ToString::to_string).collect();
    let default_index = policies
        .iter()
        .position(|p| *p == config.chunking.policy)
        .unwrap_or(0);

    let policy_index = Select::new()
        .with_prompt("Chunking policy")
        .default(default_index)
        .items(&labels)
        .interact()?;
    config.chunking.policy = policies[policy_index];

    config.retrieval.top_k = Input::new()
        .with_prompt("Chunks retrieved per question")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 100")
            }
        })
        .interact_text()?;

    Ok(())
}

fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Value cannot be empty")
    } else {
        Ok(())
    }
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    OllamaClient::new(ollama)
        .map(|client| client.with_retry_attempts(1).ping().is_ok())
        .unwrap_or(false)
}
