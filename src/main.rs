use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use scribe::config::{ACCOUNT_KEY, Config, ENDPOINT_KEY};
use scribe::consts::{DEFAULT_ACCOUNT, DEFAULT_ENDPOINT, default_db_path};
use scribe::gateway::poller::{PollConfig, ProgressHook};
use scribe::gateway::{CancelOutcome, Gateway, GatewayConfig, Mode, Submission, SubmitOptions};
use scribe::history::sqlite::SqliteHistory;
use scribe::history::{HistoryFilter, HistoryItem};
use scribe::processor::http::HttpProcessor;
use scribe::processor::{ContentKind, Task};
use scribe::spinner::Spinner;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    CoverLetter,
    JobMatch,
    InterviewQuestions,
}

impl From<KindArg> for ContentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::CoverLetter => ContentKind::CoverLetter,
            KindArg::JobMatch => ContentKind::JobMatch,
            KindArg::InterviewQuestions => ContentKind::InterviewQuestions,
        }
    }
}

#[derive(Parser)]
#[command(name = "scribe", version, about = "Slow words, kept safe.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database path for history and config (use :memory: for ephemeral)
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Processor endpoint (overrides the configured value)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Account that owns retained history
    #[arg(short, long)]
    account: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a generation job and wait for the artifact
    Run {
        #[arg(value_enum)]
        kind: KindArg,

        /// Generation parameter as key=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Return the task handle immediately instead of waiting
        #[arg(long)]
        detach: bool,

        /// Do not retain the artifact to history
        #[arg(long)]
        no_save: bool,

        /// Milliseconds between status checks
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Maximum status checks before giving up
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Resume polling a detached task until it settles
    Poll {
        task_id: String,

        /// Do not retain the artifact to history
        #[arg(long)]
        no_save: bool,

        /// Milliseconds between status checks
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Maximum status checks before giving up
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Request early termination of a running task
    Cancel { task_id: String },
    /// Browse and curate retained artifacts
    #[command(subcommand)]
    History(HistoryCommand),
    /// Get or set a persistent default (endpoint, account)
    Config {
        key: String,
        /// When present, store this value; otherwise print the current one
        value: Option<String>,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List retained artifacts, newest first
    List {
        #[arg(value_enum, long)]
        kind: Option<KindArg>,

        /// Only favorites
        #[arg(long)]
        favorites: bool,

        /// Page size
        #[arg(long)]
        limit: Option<usize>,

        /// Only items older than this id (from a previous page's cursor)
        #[arg(long)]
        before: Option<i64>,
    },
    /// Show one artifact in full
    Show { id: i64 },
    /// Flip an artifact's favorite flag
    Favorite { id: i64 },
    /// Rate an artifact from 1 to 5
    Rate { id: i64, rating: u8 },
    /// Permanently remove an artifact
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => default_db_path(),
    };
    let db = db_path.to_string_lossy().to_string();
    if db != ":memory:"
        && let Some(parent) = db_path.parent()
    {
        std::fs::create_dir_all(parent)?;
    }

    let config = Config::open(&db)?;

    // `scribe config` only needs the KV store, not a live gateway.
    if let Command::Config { key, value } = &cli.command {
        match value {
            Some(value) => {
                config.set(key, value)?;
                println!("{key} = {value}");
            }
            None => match config.get(key)? {
                Some(value) => println!("{value}"),
                None => println!("{key} is not set"),
            },
        }
        return Ok(());
    }

    let endpoint = match cli.endpoint {
        Some(endpoint) => endpoint,
        None => config
            .get(ENDPOINT_KEY)?
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
    };
    let account = match cli.account {
        Some(account) => account,
        None => config
            .get(ACCOUNT_KEY)?
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
    };

    let processor = Arc::new(HttpProcessor::new(
        endpoint,
        std::env::var("SCRIBE_API_KEY").ok().filter(|k| !k.is_empty()),
    ));
    let history = Arc::new(SqliteHistory::new(&db)?);

    match cli.command {
        Command::Run {
            kind,
            params,
            detach,
            no_save,
            interval_ms,
            max_attempts,
        } => {
            let gateway_config = GatewayConfig {
                poll: poll_config(interval_ms, max_attempts),
                ..GatewayConfig::default()
            };
            let gateway = Gateway::new(processor, history, account, gateway_config);

            let options = SubmitOptions {
                mode: Some(if detach { Mode::Async } else { Mode::Sync }),
                save_to_history: Some(!no_save),
                on_progress: None,
            };

            if detach {
                match gateway.submit(kind.into(), parse_params(&params)?, options).await? {
                    Submission::Accepted(task) => {
                        println!("accepted: {} ({})", task.id, task.status);
                        println!("poll it with: scribe poll {}", task.id);
                    }
                    Submission::Finished(_) => unreachable!("async submit returns a handle"),
                }
                return Ok(());
            }

            let spinner = Spinner::start("submitting");
            let options = SubmitOptions {
                on_progress: Some(status_hook(&spinner)),
                ..options
            };
            let result = gateway.submit(kind.into(), parse_params(&params)?, options).await;
            spinner.stop().await;

            match result? {
                Submission::Finished(task) => print_artifact(&task),
                Submission::Accepted(_) => unreachable!("sync submit blocks for the result"),
            }
        }

        Command::Poll {
            task_id,
            no_save,
            interval_ms,
            max_attempts,
        } => {
            let gateway = Gateway::new(processor, history, account, GatewayConfig::default());

            let spinner = Spinner::start("polling");
            let hook = status_hook(&spinner);
            let result = gateway
                .poll_with(&task_id, poll_config(interval_ms, max_attempts), Some(&hook))
                .await;
            spinner.stop().await;

            let task = result?;
            // The submitting process is gone, and its save marker with
            // it, so retention is decided here.
            if !no_save {
                let item = gateway.retain(&task).await?;
                eprintln!("retained as history item #{}", item.id);
            }
            print_artifact(&task);
        }

        Command::Cancel { task_id } => {
            let gateway = Gateway::new(processor, history, account, GatewayConfig::default());
            match gateway.cancel(&task_id).await? {
                CancelOutcome::Requested => println!("cancellation requested for {task_id}"),
                CancelOutcome::AlreadyFinished => println!("{task_id} had already finished"),
            }
        }

        Command::History(command) => {
            let gateway = Gateway::new(processor, history, account, GatewayConfig::default());
            run_history(&gateway, command).await?;
        }

        Command::Config { .. } => unreachable!("handled before gateway construction"),
    }

    Ok(())
}

async fn run_history(gateway: &Gateway, command: HistoryCommand) -> anyhow::Result<()> {
    match command {
        HistoryCommand::List {
            kind,
            favorites,
            limit,
            before,
        } => {
            let page = gateway
                .history_list(HistoryFilter {
                    content_type: kind.map(Into::into),
                    favorites_only: favorites,
                    limit,
                    before,
                })
                .await?;

            if page.items.is_empty() {
                println!("nothing here.");
                return Ok(());
            }
            for item in &page.items {
                print_summary(item);
            }
            if let Some(cursor) = page.next_cursor {
                println!("more: scribe history list --before {cursor}");
            }
        }
        HistoryCommand::Show { id } => {
            let item = gateway.history_get(id).await?;
            print_summary(&item);
            println!("{}", serde_json::to_string_pretty(&item.payload)?);
        }
        HistoryCommand::Favorite { id } => {
            let item = gateway.toggle_favorite(id).await?;
            let state = if item.is_favorite { "favorited" } else { "unfavorited" };
            println!("{state} #{id}");
        }
        HistoryCommand::Rate { id, rating } => {
            let item = gateway.rate(id, rating).await?;
            println!("#{} rated {}/5", id, item.rating.unwrap_or(rating));
        }
        HistoryCommand::Delete { id } => {
            gateway.delete(id).await?;
            println!("deleted #{id}");
        }
    }
    Ok(())
}

/// Parse repeated `key=value` arguments into generation parameters.
fn parse_params(raw: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut params = HashMap::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            anyhow::bail!("bad parameter {entry:?}, expected key=value");
        };
        params.insert(key.trim().to_string(), value.to_string());
    }
    Ok(params)
}

fn poll_config(interval_ms: Option<u64>, max_attempts: Option<u32>) -> PollConfig {
    let mut config = PollConfig::default();
    if let Some(ms) = interval_ms {
        config.interval = Duration::from_millis(ms);
    }
    if let Some(n) = max_attempts {
        config.max_attempts = n;
    }
    config
}

/// Feed each status observation into the spinner line.
fn status_hook(spinner: &Spinner) -> ProgressHook {
    let updates = spinner.updates();
    Box::new(move |task: &Task| {
        let _ = updates.send(format!("{} — {}", task.id, task.status));
    })
}

fn print_artifact(task: &Task) {
    println!("{} finished ({})", task.id, task.kind);
    if let Some(result) = &task.result {
        match serde_json::to_string_pretty(result) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{result}"),
        }
    }
}

fn print_summary(item: &HistoryItem) {
    let star = if item.is_favorite { "★" } else { " " };
    let rating = match item.rating {
        Some(r) => format!("{r}/5"),
        None => "—".to_string(),
    };
    println!(
        "#{:<5} {star} {:<20} {rating:<4} {}",
        item.id,
        item.content_type,
        item.created_at.format("%Y-%m-%d %H:%M")
    );
}
