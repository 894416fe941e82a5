use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_qa::commands::{
    ask, assist_code, chat, clear_session, ingest_pdf, show_status, summarize_pdf,
    transliterate_text,
};
use pdf_qa::composer::RequestKind;
use pdf_qa::config::{run_interactive_config, show_config};
use pdf_qa::language::transliterate::Script;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-qa")]
#[command(about = "Ask questions about PDF documents in English or Manipuri")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Ollama and translation services
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Extract and index a PDF under a session id
    Ingest {
        /// Path to the PDF file
        pdf: PathBuf,
        /// Session id the document is indexed under; a new one is generated if omitted
        #[arg(long)]
        session: Option<String>,
    },
    /// Ask one question about an indexed document
    Ask {
        /// Session id of the indexed document
        session: String,
        /// The question, in English or Manipuri
        question: String,
        /// Index this PDF before asking
        #[arg(long)]
        pdf: Option<PathBuf>,
        /// Print the full answer payload as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize a whole PDF
    Summary {
        /// Path to the PDF file
        pdf: PathBuf,
    },
    /// Generate, explain or optimize code
    Code {
        /// Session id for the conversation
        session: String,
        /// The request or the code to work on
        prompt: String,
        /// Explain the given code
        #[arg(long, conflicts_with = "optimize")]
        explain: bool,
        /// Optimize the given code and estimate its complexity
        #[arg(long)]
        optimize: bool,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert between Romanized Manipuri and Meetei Mayek
    Transliterate {
        /// Text to convert
        text: String,
        /// Target script
        #[arg(long, value_enum, default_value_t = TargetScript::Meetei)]
        to: TargetScript,
    },
    /// Drop a session's history and index
    Clear {
        /// Session id to clear
        session: String,
    },
    /// Interactive multi-turn chat about a document
    Chat {
        /// Session id of the indexed document
        session: String,
        /// Index this PDF before chatting
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// Show service connectivity and indexed sessions
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetScript {
    Roman,
    Meetei,
}

impl From<TargetScript> for Script {
    fn from(target: TargetScript) -> Self {
        match target {
            TargetScript::Roman => Self::Roman,
            TargetScript::Meetei => Self::MeeteiMayek,
        }
    }
}

fn request_kind(explain: bool, optimize: bool) -> RequestKind {
    if explain {
        RequestKind::Explain
    } else if optimize {
        RequestKind::Optimize
    } else {
        RequestKind::Generate
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { pdf, session } => {
            ingest_pdf(&pdf, session.as_deref()).await?;
        }
        Commands::Ask {
            session,
            question,
            pdf,
            json,
        } => {
            ask(&session, &question, pdf.as_deref(), json).await?;
        }
        Commands::Summary { pdf } => {
            summarize_pdf(&pdf).await?;
        }
        Commands::Code {
            session,
            prompt,
            explain,
            optimize,
            json,
        } => {
            assist_code(&session, &prompt, request_kind(explain, optimize), json).await?;
        }
        Commands::Transliterate { text, to } => {
            transliterate_text(&text, to.into())?;
        }
        Commands::Clear { session } => {
            clear_session(&session).await?;
        }
        Commands::Chat { session, pdf } => {
            chat(&session, pdf.as_deref()).await?;
        }
        Commands::Status => {
            show_status()?;
        }
    }

    Ok(())
}
