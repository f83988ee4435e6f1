//! `newsdesk ask` — Run conversation turns through the router.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use newsdesk_agent::{Orchestrator, PolicyTable, TitleGenerator, TurnStream};
use newsdesk_config::AppConfig;
use newsdesk_core::{ConversationTurn, EnvelopeReader, ProtocolEnvelope, RetrievedArticle, Role, Segment};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

pub struct AskOptions {
    pub message: Option<String>,
    pub history: Option<PathBuf>,
    pub raw: bool,
    pub title: bool,
}

pub async fn run(options: AskOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early so the error is clear
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    NEWSDESK_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = newsdesk_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;
    let index = newsdesk_index::build_from_config(&config.index)
        .map_err(|e| format!("Failed to open vector index: {e}"))?;
    let orchestrator = Orchestrator::new(provider.clone(), index, &config)?;
    let titles = options.title.then(|| {
        TitleGenerator::new(
            provider,
            &config.agent.title_model,
            Arc::new(PolicyTable::builtin()),
        )
    });

    let history = match (options.message, &options.history) {
        (Some(message), _) => Some(vec![ConversationTurn::user(message)]),
        (None, Some(path)) => Some(load_history(path)?),
        (None, None) => None,
    };

    match history {
        Some(history) => {
            if let Some(titles) = &titles {
                print_title(titles, &history).await?;
            }
            render(orchestrator.run(history), options.raw).await?;
        }
        None => interactive(&orchestrator, titles.as_ref(), options.raw).await?,
    }

    Ok(())
}

/// Read a caller-supplied history. Policy (system) turns are not accepted.
fn load_history(path: &Path) -> Result<Vec<ConversationTurn>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let history: Vec<ConversationTurn> = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid history in {}: {e}", path.display()))?;

    if history.is_empty() {
        return Err(format!("{} holds no turns", path.display()).into());
    }
    if history.iter().any(|t| t.role == Role::System) {
        return Err("History may only contain user and assistant turns".into());
    }
    debug!(path = %path.display(), turns = history.len(), "Loaded conversation history");
    Ok(history)
}

async fn print_title(
    titles: &TitleGenerator,
    history: &[ConversationTurn],
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(first) = history.iter().find(|t| t.role == Role::User) {
        let title = titles.generate(&first.content).await?;
        eprintln!("  Title: {title}\n");
    }
    Ok(())
}

/// Interactive session. The history grows with each turn; assistant turns
/// hold the raw envelope stream, as a persisting caller would store it.
async fn interactive(
    orchestrator: &Orchestrator,
    titles: Option<&TitleGenerator>,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  NewsDesk — Interactive Mode");
    println!("  Type your question and press Enter. Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut history: Vec<ConversationTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if line.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }

        history.push(ConversationTurn::user(line));
        if history.len() == 1 {
            if let Some(titles) = titles {
                print_title(titles, &history).await?;
            }
        }

        match render(orchestrator.run(history.clone()), raw).await {
            Ok(wire) if !wire.is_empty() => history.push(ConversationTurn::assistant(wire)),
            Ok(_) => {}
            Err(e) => {
                eprintln!("  [Error] {e}");
                history.pop();
            }
        }

        println!();
        print!("  You > ");
        std::io::stdout().flush()?;
    }

    Ok(())
}

/// Print a turn as it streams in and return the raw wire text.
async fn render(mut stream: TurnStream, raw: bool) -> Result<String, Box<dyn std::error::Error>> {
    let mut wire = String::new();
    let mut reader = EnvelopeReader::new();
    let mut stdout = std::io::stdout();

    while let Some(item) = stream.next().await {
        let chunk = item?;
        wire.push_str(&chunk);

        if raw {
            write!(stdout, "{chunk}")?;
        } else {
            for segment in reader.push(&chunk) {
                let Segment::Object(object) = segment else {
                    continue;
                };
                match ProtocolEnvelope::from_json(&object)? {
                    ProtocolEnvelope::Status { results } => write!(stdout, "{results}")?,
                    ProtocolEnvelope::Articles { results, note } => {
                        print_articles(&mut stdout, &results, note.as_deref())?
                    }
                }
            }
        }
        stdout.flush()?;
    }

    writeln!(stdout)?;
    Ok(wire)
}

fn print_articles(
    out: &mut impl Write,
    articles: &[RetrievedArticle],
    note: Option<&str>,
) -> std::io::Result<()> {
    if let Some(note) = note {
        writeln!(out, "  {note}")?;
    }
    if articles.is_empty() {
        writeln!(out, "  (no articles)")?;
    }
    for (i, article) in articles.iter().enumerate() {
        writeln!(out, "  {}. {} ({:.2})", i + 1, article.title, article.score)?;
        if !article.article_type.is_empty() || !article.publish_date.is_empty() {
            writeln!(out, "     {} {}", article.article_type, article.publish_date)?;
        }
        if !article.link.is_empty() {
            writeln!(out, "     {}", article.link)?;
        }
    }
    Ok(())
}
