//! CLI entry point for the docqa document assistant.
//!
//! Every invocation is one event against a session persisted on disk: the
//! session is loaded, the command is applied, and the result is saved
//! before the process exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use docqa_core::config::{DocQaConfig, MergeMode};
use docqa_core::events::{IngestResult, UploadedFile};
use docqa_core::{DocQaError, Organization, Phase, QueryError, SessionId, Turn};
use docqa_ingest::PlainTextExtractor;
use docqa_session::FileSessionStore;

use docqa_assistant::{LocalIndexEngine, Orchestrator, StaticCredentials};

type App = Orchestrator<LocalIndexEngine, PlainTextExtractor>;

const WELCOME: &str = "Welcome! You can now ask any questions regarding the uploaded documents.";

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about your uploaded documents")]
struct Cli {
    /// Session to act on.
    #[arg(short, long, default_value = "default", global = true)]
    session: String,

    /// Config file prefix (default: docqa).
    #[arg(short, long, default_value = "docqa", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with the configured credentials.
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Log out and clear the session.
    Logout,
    /// Select the organization portal: pedagogy, al-fayhaa.
    Org { organization: String },
    /// Upload documents and build the knowledge base.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// per-file or single-combined (default: from config).
        #[arg(long)]
        merge_mode: Option<String>,
    },
    /// Ask a single question.
    Ask {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Interactive question loop on stdin.
    Chat,
    /// Print the conversation so far.
    Transcript,
    /// Print the session state.
    Status,
    /// Clear the session.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let session_id = SessionId::parse(&cli.session)?;

    let store = FileSessionStore::new(&config.session.store_dir)?;
    let engine = LocalIndexEngine::new(&config.engine.index_dir, config.engine.max_passages)?;
    let app: Arc<App> = Arc::new(
        Orchestrator::new(
            Arc::new(store),
            StaticCredentials::from_config(&config.auth),
            engine,
            PlainTextExtractor,
            &config.ingest,
        )
        .with_default_organization(config.organization),
    );

    let build_limit = config.engine.build_timeout_secs.map(Duration::from_secs);
    let query_limit = config.engine.query_timeout_secs.map(Duration::from_secs);

    match cli.command {
        Command::Login { username, password } => {
            app.login(&session_id, &username, &password)?;
            println!("Login successful");
            print_banner(app.status(&session_id)?.organization);
        }
        Command::Logout => {
            app.logout(&session_id)?;
            println!("Logged out");
        }
        Command::Org { organization } => {
            let organization: Organization =
                organization.parse().map_err(anyhow::Error::msg)?;
            app.select_organization(&session_id, organization)?;
            print_banner(organization);
        }
        Command::Upload { files, merge_mode } => {
            let merge_mode = match merge_mode {
                Some(raw) => raw.parse::<MergeMode>().map_err(anyhow::Error::msg)?,
                None => config.ingest.merge_mode,
            };
            let uploads = read_uploads(&files).await?;
            let result = app
                .ingest_documents_within(&session_id, uploads, merge_mode, build_limit)
                .await?;
            print_ingest(&result);
        }
        Command::Ask { query } => {
            ask_and_print(&app, &session_id, query.join(" "), query_limit).await?;
        }
        Command::Chat => chat(&app, &session_id, query_limit).await?,
        Command::Transcript => {
            for turn in app.get_transcript(&session_id)? {
                print_turn(&turn);
            }
        }
        Command::Status => {
            let status = app.status(&session_id)?;
            println!("Session:      {session_id}");
            println!("State:        {}", describe_phase(status.phase));
            println!("Organization: {}", status.organization);
            if let Some(fp) = &status.fingerprint {
                println!("Documents:    {}", fp.short());
            }
            println!("Turns:        {}", status.turns);
        }
        Command::Reset => {
            app.reset(&session_id)?;
            println!("Session cleared");
        }
    }

    Ok(())
}

fn load_config(file_prefix: &str) -> anyhow::Result<DocQaConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("DOCQA")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
        .with_context(|| format!("invalid configuration in {file_prefix}.toml or DOCQA__ environment"))
}

async fn read_uploads(paths: &[PathBuf]) -> anyhow::Result<Vec<UploadedFile>> {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        uploads.push(UploadedFile::new(filename, bytes));
    }
    Ok(uploads)
}

/// Ask one question. An engine failure prints its error turn instead of failing.
async fn ask_and_print(
    app: &Arc<App>,
    session_id: &SessionId,
    query: String,
    limit: Option<Duration>,
) -> Result<(), DocQaError> {
    match app.ask_within(session_id, query, limit).await {
        Ok(turn) => print_turn(&turn),
        Err(DocQaError::Query(QueryError::EngineFailure { turn, .. })) => print_turn(&turn),
        Err(e) => return Err(e),
    }
    Ok(())
}

async fn chat(app: &Arc<App>, session_id: &SessionId, limit: Option<Duration>) -> anyhow::Result<()> {
    let status = app.status(session_id)?;
    print_banner(status.organization);
    if status.phase != Phase::Ready {
        println!("{}", describe_phase(status.phase));
    }
    println!("{WELCOME}");
    println!("(type 'exit' to leave)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "exit" || query == "quit" {
            break;
        }
        if let Err(e) = ask_and_print(app, session_id, query.to_string(), limit).await {
            eprintln!("{e}");
        }
    }
    Ok(())
}

fn print_banner(organization: Organization) {
    println!("{}", organization.title());
    println!("{}", organization.introduction());
}

fn print_ingest(result: &IngestResult) {
    for name in &result.skipped {
        eprintln!("Skipped unreadable file: {name}");
    }
    match &result.fingerprint {
        None if result.ready => println!("No files uploaded; the current knowledge base stays loaded."),
        None => println!("No files uploaded."),
        Some(fp) if result.rebuilt => println!(
            "All {} document(s) have been processed and are ready for queries ({}).",
            result.documents,
            fp.short()
        ),
        Some(fp) => println!(
            "These documents are already loaded ({}); nothing to rebuild.",
            fp.short()
        ),
    }
}

fn print_turn(turn: &Turn) {
    println!("{}: {}", turn.role, turn.content);
}

fn describe_phase(phase: Phase) -> &'static str {
    match phase {
        Phase::LoggedOut => "Not logged in",
        Phase::Authenticated => "Logged in; upload documents to start",
        Phase::AwaitingIngestion => "Processing documents",
        Phase::Ready => "Ready for questions",
    }
}
