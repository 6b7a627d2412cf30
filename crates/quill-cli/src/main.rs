//! Quill CLI - sync a remote note service into a local searchable index
//!
//! Authenticate once with `quill init`, pull deltas with `quill sync`, then
//! search the local index offline.

use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use quill_core::config::DataConfig;
use quill_core::credentials::CredentialStore;
use quill_core::index::LocalIndex;
use quill_core::query::{search, DateRange, SearchQuery};
use quill_core::sync::{pull, AuthClient, HttpSyncClient, RetryPolicy};
use quill_core::{Note, NoteId};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Sync a remote note service into a local searchable index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to the local data directory
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate against the note service and store the credential
    #[command(alias = "login")]
    Init {
        /// Authorization code (prompted for when omitted)
        code: Option<String>,
    },
    /// Pull note deltas and apply them to the local index
    Sync,
    /// Search synced notes
    Search {
        /// Search terms, all required to match
        terms: Vec<String>,
        /// Require a tag (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// Only notes modified on or after this date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: Option<String>,
        /// Only notes modified on or before this date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        to: Option<String>,
        /// Print at most this many ranked matches
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a synced note
    Get {
        /// Note ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List tags with note counts
    Tags {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the stored credential
    Logout,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] quill_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No authorization code provided")]
    EmptyAuthCode,
}

const fn exit_code(error: &CliError) -> i32 {
    match error {
        CliError::Core(quill_core::Error::InvalidQuery(_)) => 2,
        _ => 1,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(exit_code(&error));
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quill=info".parse().unwrap()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DataConfig::resolve(cli.data_dir)?;

    match cli.command {
        Some(Commands::Init { code }) => run_init(code.as_deref(), &config).await?,
        Some(Commands::Sync) => run_sync(&config).await?,
        Some(Commands::Search {
            terms,
            tags,
            from,
            to,
            limit,
            json,
        }) => run_search(
            &terms,
            &tags,
            from.as_deref(),
            to.as_deref(),
            limit,
            json,
            &config,
        )?,
        Some(Commands::Get { id, json }) => run_get(&id, json, &config)?,
        Some(Commands::Tags { json }) => run_tags(json, &config)?,
        Some(Commands::Logout) => run_logout(&config)?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}

async fn run_init(code: Option<&str>, config: &DataConfig) -> Result<(), CliError> {
    let code = resolve_auth_code(code)?;

    let auth = AuthClient::new(config)?;
    let credential = auth.exchange_code(&code).await?;

    CredentialStore::new(config).save(&credential)?;
    tracing::info!("Credential stored at {}", config.credential_path().display());
    println!("Authenticated. Run `quill sync` to fetch your notes.");
    Ok(())
}

async fn run_sync(config: &DataConfig) -> Result<(), CliError> {
    let credential = CredentialStore::new(config).load()?;
    if credential.is_expired() {
        return Err(quill_core::Error::AuthExpired.into());
    }

    let source = HttpSyncClient::new(config, &credential)?;
    let mut index = LocalIndex::open(config)?;
    let outcome = pull(&source, &mut index, RetryPolicy::default()).await?;

    println!(
        "Applied {} of {} changes (checkpoint {})",
        outcome.applied, outcome.fetched, outcome.checkpoint
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct NoteItem {
    id: String,
    title: String,
    tags: Vec<String>,
    updated_at: i64,
    modified: String,
}

fn run_search(
    terms: &[String],
    tags: &[String],
    from: Option<&str>,
    to: Option<&str>,
    limit: usize,
    as_json: bool,
    config: &DataConfig,
) -> Result<(), CliError> {
    let notes = search_notes(terms, tags, from, to, limit, config)?;

    if as_json {
        let items = notes.iter().map(note_to_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for note in &notes {
            println!("{}", format_note_line(note));
        }
    }

    Ok(())
}

fn search_notes(
    terms: &[String],
    tags: &[String],
    from: Option<&str>,
    to: Option<&str>,
    limit: usize,
    config: &DataConfig,
) -> Result<Vec<Note>, CliError> {
    let date_range = DateRange::parse(from, to)?;
    let query = SearchQuery::new(terms, tags, date_range);
    if query.is_empty() {
        return Err(quill_core::Error::InvalidQuery(
            "provide at least one term, --tag, --from, or --to".to_string(),
        )
        .into());
    }
    let index = LocalIndex::open(config)?;
    let mut notes = search(&index, &query)?;
    notes.truncate(limit);
    Ok(notes)
}

fn run_get(id: &str, as_json: bool, config: &DataConfig) -> Result<(), CliError> {
    let id: NoteId = id.parse()?;
    let index = LocalIndex::open(config)?;
    let note = index.get_note(&id)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note)?);
    } else {
        println!("{}", note.title);
        if !note.tags.is_empty() {
            println!("{}", render_tags(&note));
        }
        println!("Modified: {}", format_timestamp(note.updated_at));
        println!();
        println!("{}", note.body);
    }

    Ok(())
}

fn run_tags(as_json: bool, config: &DataConfig) -> Result<(), CliError> {
    let index = LocalIndex::open(config)?;
    let tags = index.list_tags()?;

    if as_json {
        #[derive(Serialize)]
        struct TagCount {
            tag: String,
            count: usize,
        }
        let items = tags
            .into_iter()
            .map(|(tag, count)| TagCount { tag, count })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for (tag, count) in tags {
            println!("{tag}\t{count}");
        }
    }

    Ok(())
}

fn run_logout(config: &DataConfig) -> Result<(), CliError> {
    CredentialStore::new(config).clear()?;
    println!("Signed out.");
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "quill", buffer);
}

fn resolve_auth_code(arg: Option<&str>) -> Result<String, CliError> {
    if let Some(code) = arg {
        return normalize_auth_code(code).ok_or(CliError::EmptyAuthCode);
    }

    let stdin = io::stdin();
    let mut buffer = String::new();
    if stdin.is_terminal() {
        eprint!("Authorization code: ");
        io::stderr().flush()?;
        stdin.lock().read_line(&mut buffer)?;
    } else {
        stdin.lock().read_to_string(&mut buffer)?;
    }

    normalize_auth_code(&buffer).ok_or(CliError::EmptyAuthCode)
}

fn normalize_auth_code(code: &str) -> Option<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn format_note_line(note: &Note) -> String {
    format!(
        "{}\t{}\t{}",
        note.id,
        note.title,
        format_timestamp(note.updated_at)
    )
}

fn note_to_item(note: &Note) -> NoteItem {
    NoteItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        tags: note.tags.clone(),
        updated_at: note.updated_at,
        modified: format_timestamp(note.updated_at),
    }
}

fn render_tags(note: &Note) -> String {
    note.tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |moment| moment.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}
