use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::composer::{CodeRequest, CodeResponse, MetricsReport, RequestKind};
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::language::transliterate::{Script, transliterate};
use crate::pipeline::{AskResponse, Pipeline};
use crate::session::generate_session_id;

const CHUNK_PREVIEW_CHARS: usize = 160;

async fn load_pipeline() -> Result<Pipeline> {
    let config = Config::load().context("Failed to load configuration")?;
    Pipeline::from_config(config)
        .await
        .context("Failed to start pipeline")
}

fn spinner(message: &str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Extract, chunk and index a PDF, under a fresh session id when none is given
#[inline]
pub async fn ingest_pdf(pdf: &Path, session_id: Option<&str>) -> Result<()> {
    let pipeline = load_pipeline().await?;
    let session_id = session_id.map_or_else(generate_session_id, str::to_string);
    ingest_with(&pipeline, pdf, &session_id).await
}

async fn ingest_with(pipeline: &Pipeline, pdf: &Path, session_id: &str) -> Result<()> {
    let bar = spinner(&format!("Indexing {}", pdf.display()));
    let result = pipeline.ingest_pdf(pdf, session_id).await;
    bar.finish_and_clear();

    let report = result.with_context(|| format!("Failed to index {}", pdf.display()))?;
    info!(
        "Indexed {} chunks from {} pages for session {}",
        report.chunk_count, report.page_count, report.session_id
    );

    eprintln!(
        "{} Indexed {} ({} pages, {} chunks) as session {}",
        style("✓").green(),
        style(&report.metadata.title).cyan(),
        report.page_count,
        report.chunk_count,
        style(&report.session_id).bold()
    );
    eprintln!("  Author: {}", report.metadata.author);
    Ok(())
}

/// Answer one question. With `pdf`, the document is (re)indexed first.
#[inline]
pub async fn ask(session_id: &str, question: &str, pdf: Option<&Path>, json: bool) -> Result<()> {
    let pipeline = load_pipeline().await?;
    if let Some(pdf) = pdf {
        ingest_with(&pipeline, pdf, session_id).await?;
    }

    let bar = spinner("Thinking");
    let result = pipeline.ask(question, session_id).await;
    bar.finish_and_clear();
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_answer(&response);
    }
    Ok(())
}

fn print_answer(response: &AskResponse) {
    println!("{}", response.answer.en);
    if let Some(mni) = &response.answer.mni {
        println!();
        println!("{} {}", style("mni:").bold().yellow(), mni);
    }

    if response.chunks.is_empty() {
        return;
    }
    println!();
    println!("{}", style("Retrieved chunks:").dim());
    for chunk in &response.chunks {
        let preview: String = chunk.text.chars().take(CHUNK_PREVIEW_CHARS).collect();
        match chunk.page_num {
            Some(page) => println!("  Page {}: {}", page, style(preview).dim()),
            None => println!("  {}", style(preview).dim()),
        }
    }
}

/// Summarize a whole PDF
#[inline]
pub async fn summarize_pdf(pdf: &Path) -> Result<()> {
    let pipeline = load_pipeline().await?;

    let bar = spinner(&format!("Summarizing {}", pdf.display()));
    let result = pipeline.summarize(pdf).await;
    bar.finish_and_clear();
    let response = result.with_context(|| format!("Failed to summarize {}", pdf.display()))?;

    eprintln!(
        "{} by {}",
        style(&response.metadata.title).bold().cyan(),
        response.metadata.author
    );
    println!("{}", response.summary);
    Ok(())
}

/// Generate, explain or optimize code in a session's conversation
#[inline]
pub async fn assist_code(session_id: &str, prompt: &str, kind: RequestKind, json: bool) -> Result<()> {
    let pipeline = load_pipeline().await?;

    let bar = spinner(&format!("Running {} request", kind));
    let result = pipeline
        .assist_code(session_id, CodeRequest::new(prompt, kind))
        .await;
    bar.finish_and_clear();
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_code(&response);
    }
    Ok(())
}

fn print_code(response: &CodeResponse) {
    println!("{}", response.code);

    if let Some(reason) = &response.reason {
        println!();
        println!("{}", style("Why it is better:").bold().yellow());
        println!("{}", reason);
    }

    match &response.metrics {
        Some(MetricsReport::Parsed(metrics)) => {
            println!();
            println!("{}", style("Metrics:").bold().yellow());
            // Metrics are plain serde types; pretty JSON is the readable form
            if let Ok(pretty) = serde_json::to_string_pretty(metrics) {
                println!("{}", pretty);
            }
        }
        Some(MetricsReport::Error { error }) => {
            println!();
            println!("{} {}", style("Metrics:").bold().yellow(), style(error).red());
        }
        None => {}
    }
}

/// Convert text between Romanized Manipuri and Meetei Mayek, no services needed
#[inline]
pub fn transliterate_text(text: &str, to: Script) -> Result<()> {
    let from = match to {
        Script::Roman => Script::MeeteiMayek,
        Script::MeeteiMayek => Script::Roman,
    };
    println!("{}", transliterate(text, from, to));
    Ok(())
}

/// Drop a session's history and index
#[inline]
pub async fn clear_session(session_id: &str) -> Result<()> {
    let pipeline = load_pipeline().await?;

    if pipeline.clear_session(session_id).await? {
        eprintln!("{} Cleared session {}", style("✓").green(), style(session_id).bold());
    } else {
        eprintln!("No session named {}", style(session_id).bold());
    }
    Ok(())
}

/// Multi-turn conversation over one document, history kept for the whole run
#[inline]
pub async fn chat(session_id: &str, pdf: Option<&Path>) -> Result<()> {
    let pipeline = load_pipeline().await?;
    if let Some(pdf) = pdf {
        ingest_with(&pipeline, pdf, session_id).await?;
    }

    eprintln!(
        "{}",
        style("Ask in English or Manipuri. Type 'exit' to quit, 'clear' to reset history.").dim()
    );

    loop {
        let question: String = Input::new()
            .with_prompt(style("you").bold().to_string())
            .allow_empty(true)
            .interact_text()?;
        let question = question.trim();

        match question {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                pipeline.reset_history(session_id)?;
                eprintln!("{}", style("History cleared").dim());
                continue;
            }
            _ => {}
        }

        let bar = spinner("Thinking");
        let result = pipeline.ask(question, session_id).await;
        bar.finish_and_clear();

        match result {
            Ok(response) => print_answer(&response),
            Err(e) if e.is_retryable() => {
                warn!("Retryable failure in chat: {}", e);
                eprintln!("{} {} (try again)", style("!").yellow(), e);
            }
            Err(e) => eprintln!("{} {}", style("✗").red(), e),
        }
        println!();
    }

    Ok(())
}

/// Connectivity of the model and translation services, and the indexed sessions on disk
#[inline]
pub fn show_status() -> Result<()> {
    let base_dir = Config::config_dir().unwrap_or_default();
    let (config, load_error) = status_config(Config::load(), base_dir);

    eprintln!("{}", style("📊 PDF QA Status").bold().cyan());
    eprintln!();

    if let Some(error) = load_error {
        warn!("Configuration could not be loaded: {}", error);
        eprintln!("{}", style("Configuration:").bold().yellow());
        eprintln!("  {} {}", style("✗").red(), error);
        eprintln!("  Showing defaults below. Run 'pdf-qa config' to fix it.");
        eprintln!();
    }

    eprintln!("{}", style("Ollama:").bold().yellow());
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            let models = [
                config.ollama.embedding_model.as_str(),
                config.ollama.chat_model.as_str(),
            ];
            match client.health_check(&models) {
                Ok(()) => eprintln!(
                    "  {} Connected ({}:{})",
                    style("✓").green(),
                    config.ollama.host,
                    config.ollama.port
                ),
                Err(e) => eprintln!("  {} Unhealthy: {:#}", style("⚠").yellow(), e),
            }
            if let Ok(available) = client.list_models() {
                eprintln!(
                    "  Models: {}",
                    available.iter().map(|m| m.name.as_str()).join(", ")
                );
            }
        }
        Err(e) => eprintln!("  {} {:#}", style("✗").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Translation:").bold().yellow());
    match config.translation.endpoint_url() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  {} {}", style("✗").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Indexed sessions:").bold().yellow());
    let sessions = indexed_sessions(&config.index_dir());
    if sessions.is_empty() {
        eprintln!("  None yet. Use 'pdf-qa ingest <pdf>' to add one.");
    } else {
        for session in sessions {
            eprintln!("  {}", session);
        }
    }

    Ok(())
}

/// The loaded configuration, or the defaults plus the reason loading failed
fn status_config(loaded: Result<Config>, base_dir: PathBuf) -> (Config, Option<String>) {
    match loaded {
        Ok(config) => (config, None),
        Err(e) => (
            Config {
                base_dir,
                ..Config::default()
            },
            Some(format!("{:#}", e)),
        ),
    }
}

fn indexed_sessions(index_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(index_dir) else {
        return Vec::new();
    };

    let mut sessions: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix(".chunks.json"))
                .map(str::to_string)
        })
        .collect();
    sessions.sort();
    sessions
}
