//! Command-line front end for Sidekick.

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};
use sidekick_rs::config::SidekickConfig;
use sidekick_rs::core::{ChatEngine, Session, SessionStore, StagedFileCache, TurnResult};
use sidekick_rs::imagegen::{DiffusionClient, GenerationParams};
use sidekick_rs::llm::{ProviderCatalog, build_provider};
use sidekick_rs::protocol::{EventPayload, Role};
use sidekick_rs::{SidekickApp, load_config};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use uuid::Uuid;

/// Command-line options for the Sidekick client.
#[derive(Parser)]
#[command(name = "sidekick", version, about = "Chat assistant with web search and file attachments")]
struct Cli {
    /// Optional path to a sidekick.json5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Provider id to use instead of the configured current provider
    #[arg(long, global = true)]
    provider: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat
    Chat {
        /// Continue the most recently active conversation
        #[arg(long, conflicts_with = "session")]
        resume: bool,
        /// Continue a specific conversation
        #[arg(long)]
        session: Option<Uuid>,
    },
    /// Send one message and print the reply
    Ask {
        prompt: String,
        /// File to attach (repeatable)
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
        /// Conversation to continue; a new one is created otherwise
        #[arg(long)]
        session: Option<Uuid>,
    },
    /// Manage stored conversations
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    /// List configured providers
    Providers,
    /// Generate an image with the local diffusion service
    Imagine {
        prompt: Option<String>,
        /// Checkpoint to switch to before generating
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        seed: Option<i64>,
        #[arg(long)]
        steps: Option<u32>,
        #[arg(long)]
        negative: Option<String>,
        /// List installed checkpoints and exit
        #[arg(long)]
        list_models: bool,
    },
    /// Manage files staged with the provider
    Files {
        #[command(subcommand)]
        command: FilesCommand,
    },
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// List conversations, newest activity first
    List,
    /// Print a conversation
    Show { id: Uuid },
    /// Change a conversation title
    Rename { id: Uuid, title: String },
    /// Delete a conversation, or one message of it
    Delete {
        id: Uuid,
        /// Index of a single message to delete
        #[arg(long)]
        message: Option<usize>,
    },
    /// Delete every conversation
    Clear,
}

#[derive(Subcommand)]
enum FilesCommand {
    /// List staged files
    List,
    /// Drop expired staged files and delete their remote copies
    Cleanup,
}

/// Supported slash commands in interactive chat.
#[derive(Debug, PartialEq)]
enum SlashCommand {
    New,
    Attach(PathBuf),
    Sessions,
    Exit,
}

/// Entry point for the Sidekick CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sidekick_rs::init_logging();

    let cli = Cli::parse();
    info!(
        "starting cli (config_set={}, provider_set={})",
        cli.config.is_some(),
        cli.provider.is_some()
    );
    let config = load_config(cli.config.as_deref())?;
    let provider = cli.provider.as_deref();

    match cli.command {
        Command::Chat { resume, session } => {
            let app = SidekickApp::build(config, provider)?;
            run_chat(&app, resume, session).await
        }
        Command::Ask {
            prompt,
            attachments,
            session,
        } => {
            let app = SidekickApp::build(config, provider)?;
            let session_id = match session {
                Some(id) => id,
                None => app.sessions.create_session(None)?,
            };
            stream_turn(&app.engine, session_id, prompt, attachments).await?;
            Ok(())
        }
        Command::Sessions { command } => {
            let sessions = SessionStore::from_config(&config.sessions)
                .context("failed to open session store")?;
            run_sessions(&sessions, command)
        }
        Command::Providers => {
            print_providers(&config, provider);
            Ok(())
        }
        Command::Imagine {
            prompt,
            model,
            width,
            height,
            seed,
            steps,
            negative,
            list_models,
        } => {
            let client = DiffusionClient::from_config(&config.imagegen)?;
            client
                .check_connection()
                .await
                .context("image service is not running")?;
            if list_models {
                for model in client.list_models().await? {
                    println!("{}\t{}", model.model_name, model.title);
                }
                return Ok(());
            }
            let Some(prompt) = prompt else {
                bail!("a prompt is required unless --list-models is set");
            };
            let mut params = GenerationParams::from_config(&config.imagegen, prompt);
            if let Some(model) = model {
                params = params.with_model(model);
            }
            if width.is_some() || height.is_some() {
                let (width, height) = (
                    width.unwrap_or(params.width),
                    height.unwrap_or(params.height),
                );
                params = params.with_size(width, height);
            }
            if let Some(seed) = seed {
                params = params.with_seed(seed);
            }
            if let Some(steps) = steps {
                params = params.with_steps(steps);
            }
            if let Some(negative) = negative {
                params = params.with_negative_prompt(negative);
            }
            let path = client
                .generate_with_progress(&params, |progress| {
                    eprint!("\rgenerating... {:>3.0}%", progress.progress * 100.0);
                })
                .await?;
            eprintln!();
            println!("{}", path.display());
            Ok(())
        }
        Command::Files { command } => run_files(&config, provider, command).await,
    }
}

async fn run_chat(app: &SidekickApp, resume: bool, session: Option<Uuid>) -> anyhow::Result<()> {
    let mut session_id = match (session, resume) {
        (Some(id), _) => {
            let session = app.sessions.resume_session(id)?;
            print_history(&session);
            id
        }
        (None, true) => match app.sessions.latest_session()? {
            Some(session) => {
                print_history(&session);
                session.id
            }
            None => app.sessions.create_session(None)?,
        },
        (None, false) => app.sessions.create_session(None)?,
    };
    println!(
        "session {session_id} ({} / {}). /attach <path>, /new, /sessions, /exit",
        app.engine.provider().id(),
        app.engine.provider().model()
    );

    let mut pending: Vec<PathBuf> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match parse_slash_command(input) {
            Ok(Some(SlashCommand::Exit)) => break,
            Ok(Some(SlashCommand::New)) => {
                session_id = app.sessions.create_session(None)?;
                pending.clear();
                println!("new session {session_id}");
            }
            Ok(Some(SlashCommand::Attach(path))) => {
                println!("attached {} (sent with the next message)", path.display());
                pending.push(path);
            }
            Ok(Some(SlashCommand::Sessions)) => {
                for summary in app.sessions.list_sessions()? {
                    let marker = if summary.id == session_id { "*" } else { " " };
                    println!(
                        "{marker} {}  {}  {}",
                        summary.id,
                        summary.updated_at.format("%Y-%m-%d %H:%M"),
                        display_title(&summary.title)
                    );
                }
            }
            Ok(None) => {
                let attachments = std::mem::take(&mut pending);
                if let Err(err) =
                    stream_turn(&app.engine, session_id, input.to_string(), attachments).await
                {
                    eprintln!("error: {err:#}");
                }
            }
            Err(message) => eprintln!("{message}"),
        }
    }
    Ok(())
}

/// Run a turn, printing deltas and notices as they arrive.
async fn stream_turn(
    engine: &ChatEngine,
    session_id: Uuid,
    input: String,
    attachments: Vec<PathBuf>,
) -> anyhow::Result<TurnResult> {
    let mut turn = engine.send_stream(session_id, input, attachments);
    let mut streamed = false;
    let mut stdout = std::io::stdout();
    while let Some(event) = turn.events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!("turn events lagged: {err}");
                continue;
            }
        };
        match event.payload {
            EventPayload::AttachmentStaged {
                display_name,
                remote_uri,
                ..
            } => eprintln!("[staged {display_name} -> {remote_uri}]"),
            EventPayload::ToolCallStarted {
                tool_name,
                arguments,
                ..
            } => eprintln!("[tool {tool_name} {arguments}]"),
            EventPayload::ToolCallFinished { success, .. } if !success => {
                eprintln!("[tool failed]")
            }
            EventPayload::AgentMessageDelta { delta, .. } => {
                streamed = true;
                print!("{delta}");
                stdout.flush()?;
            }
            EventPayload::TurnCompleted { message, .. } => {
                if streamed {
                    println!();
                } else {
                    println!("{message}");
                }
            }
            _ => {}
        }
    }
    let result = turn.finish().await.context("turn failed")?;
    if let Some(title) = &result.title {
        eprintln!("[title: {title}]");
    }
    Ok(result)
}

fn run_sessions(sessions: &SessionStore, command: SessionsCommand) -> anyhow::Result<()> {
    match command {
        SessionsCommand::List => {
            for summary in sessions.list_sessions()? {
                println!(
                    "{}  {}  {:>4} msgs  {}",
                    summary.id,
                    summary.updated_at.format("%Y-%m-%d %H:%M"),
                    summary.message_count,
                    display_title(&summary.title)
                );
            }
        }
        SessionsCommand::Show { id } => print_history(&sessions.resume_session(id)?),
        SessionsCommand::Rename { id, title } => {
            sessions.rename_session(id, &title)?;
            println!("renamed {id}");
        }
        SessionsCommand::Delete { id, message } => match message {
            Some(index) => {
                let removed = sessions.delete_message(id, index)?;
                println!("deleted {} message {index}", removed.role.as_str());
            }
            None => {
                if !sessions.delete_session(id)? {
                    bail!("unknown session: {id}");
                }
                println!("deleted {id}");
            }
        },
        SessionsCommand::Clear => {
            let removed = sessions.clear()?;
            println!("deleted {removed} sessions");
        }
    }
    Ok(())
}

fn print_providers(config: &SidekickConfig, selected: Option<&str>) {
    let catalog = ProviderCatalog::from_config(config);
    for info in &catalog.providers {
        let current = match selected {
            Some(id) => id == info.id,
            None => info.current,
        };
        println!(
            "{} {:<10} {:<20} {:<24} ctx={:<8} key={} proxy={}",
            if current { "*" } else { " " },
            info.id,
            info.display_name,
            info.model,
            info.context_limit,
            info.masked_key
                .clone()
                .unwrap_or_else(|| format!("unset (${})", info.api_key_env)),
            info.use_proxy
        );
    }
}

async fn run_files(
    config: &SidekickConfig,
    provider: Option<&str>,
    command: FilesCommand,
) -> anyhow::Result<()> {
    let cache = StagedFileCache::from_config(&config.attachments)
        .context("failed to open staged file cache")?;
    match command {
        FilesCommand::List => {
            let now = Utc::now();
            for entry in cache.entries() {
                let state = if entry.expires_at <= now {
                    "expired"
                } else {
                    "active"
                };
                println!(
                    "{:<8} {:<10} {:<24} {}  {}",
                    state,
                    entry.provider,
                    entry.name,
                    entry.expires_at.format("%Y-%m-%d %H:%M"),
                    entry.display_name
                );
            }
        }
        FilesCommand::Cleanup => {
            let id = provider.unwrap_or(&config.providers.current);
            let provider = match build_provider(config, id) {
                Ok(provider) => Some(provider),
                Err(err) => {
                    warn!("remote copies will not be deleted (provider={id}): {err}");
                    None
                }
            };
            let removed = cache
                .cleanup_expired(provider.as_deref(), Utc::now())
                .await;
            println!("removed {} expired files", removed.len());
        }
    }
    Ok(())
}

fn print_history(session: &Session) {
    println!("# {} ({})", display_title(&session.title), session.id);
    for (index, message) in session.messages.iter().enumerate() {
        let stamp = message.created_at.format("%Y-%m-%d %H:%M:%S");
        match message.role {
            Role::Tool => {
                let name = message
                    .tool_result
                    .as_ref()
                    .map(|result| result.name.as_str())
                    .unwrap_or("tool");
                println!("[{index}] {stamp} tool {name}: {}", clip(&message.content, 200));
            }
            role => {
                for call in &message.tool_calls {
                    println!("[{index}] {stamp} call {} {}", call.name, call.arguments);
                }
                if !message.content.is_empty() {
                    println!("[{index}] {stamp} {}: {}", role.as_str(), message.content);
                }
                for attachment in &message.attachments {
                    println!(
                        "      attachment {} ({})",
                        attachment.display_name, attachment.mime_type
                    );
                }
            }
        }
    }
}

fn display_title(title: &str) -> &str {
    if title.is_empty() { "(untitled)" } else { title }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push_str("...");
    clipped
}

fn parse_slash_command(input: &str) -> Result<Option<SlashCommand>, String> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return Ok(None);
    }
    let mut parts = trimmed[1..].splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();
    match command {
        "new" => Ok(Some(SlashCommand::New)),
        "sessions" => Ok(Some(SlashCommand::Sessions)),
        "exit" | "quit" => Ok(Some(SlashCommand::Exit)),
        "attach" => {
            if rest.is_empty() {
                return Err("usage: /attach <path>".to_string());
            }
            Ok(Some(SlashCommand::Attach(PathBuf::from(rest))))
        }
        other => Err(format!("unknown command: /{other}")),
    }
}
