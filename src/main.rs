use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{error, info};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use doc_chat::config::RagConfig;
use doc_chat::document::Document;
use doc_chat::gemini::{GeminiClient, GeminiConfig};
use doc_chat::session::Session;

/// Chat with a document: answers are grounded in the document's own text
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Document to upload (supports text and PDF)
    #[arg(long, conflicts_with = "text", required_unless_present = "text")]
    file: Option<PathBuf>,

    /// Text to chat about, instead of a file
    #[arg(long)]
    text: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Passages retrieved per question
    #[arg(long)]
    top_k: Option<usize>,

    /// Answer randomness, between 0 and 1
    #[arg(long)]
    temperature: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let config = load_config(&args)?;
    let gemini_config = GeminiConfig::from_env().context("Missing GEMINI_API_KEY")?;
    let gemini = Arc::new(
        GeminiClient::new(gemini_config, &config).context("Failed to initialize Gemini client")?,
    );

    info!("Using Gemini API at {}", gemini.config().base_url);

    let mut session =
        Session::new(config, gemini.clone(), gemini).context("Invalid configuration")?;
    info!(
        "Embedding model: {}, chat model: {}",
        session.config().embedding_model,
        session.config().chat_model
    );

    let document = match (&args.file, &args.text) {
        (Some(path), _) => {
            info!("Processing file: {}", path.display());
            Document::from_file(path).context("Failed to process document")?
        }
        (None, Some(text)) => Document::from_text("pasted-text", text).context("No text provided")?,
        (None, None) => anyhow::bail!("Provide a document with --file or --text"),
    };

    info!("Document type: {}", document.mime_type);
    info!("Content extracted: {}...", document.preview(100));

    session
        .ingest(&document)
        .await
        .context("Failed to index document")?;

    run_chat_loop(&session).await.context("Error in chat loop")?;

    Ok(())
}

/// Defaults, then the optional JSON file, then environment, then flags
fn load_config(args: &Args) -> Result<RagConfig> {
    let config = match &args.config {
        Some(path) => RagConfig::from_file(path)?,
        None => RagConfig::default(),
    };
    let mut config = config.with_env_overrides()?;

    if let Some(top_k) = args.top_k {
        config.top_k = top_k;
    }
    if let Some(temperature) = args.temperature {
        config.temperature = temperature;
    }

    Ok(config)
}

/// Read questions from stdin until `exit`, printing each answer
async fn run_chat_loop(session: &Session) -> Result<()> {
    for turn in session.history() {
        println!("{}", turn);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buffer = String::new();

    loop {
        print!("\nYour question: ");
        stdout.flush()?;

        buffer.clear();
        if stdin.read_line(&mut buffer)? == 0 {
            break;
        }

        let question = buffer.trim();

        let outcome = match question {
            "" => continue,
            q if q.eq_ignore_ascii_case("exit") => {
                println!("Goodbye!");
                break;
            }
            "/history" => {
                for turn in session.history() {
                    println!("{}", turn);
                }
                continue;
            }
            "/retry" => session.retry().await,
            q => session.ask(q).await,
        };

        match outcome {
            Ok(answer) => println!("\nassistant: {}", answer),
            Err(e) => {
                error!("{}", e);
                println!("\n{}", e.user_message());
                if e.unanswered_question().is_some() && e.is_retryable() {
                    println!("Type /retry to ask again.");
                }
            }
        }
    }

    Ok(())
}
