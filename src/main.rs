mod server;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bounty_context::GitHubFetcher;
use bounty_core::{BountyConfig, OutputFormat, ReviewOutcome};
use bounty_pipeline::{
    ContextJob, JobFilter, JobQueue, JobStatus, Pipeline, SqliteJobQueue, Sweeper, WorkerPool,
    CONTEXT_QUEUE, REVIEW_QUEUE,
};
use bounty_review::LlmReviewer;
use bounty_store::{Database, OutcomeStore, SqliteOutcomeStore, SqliteSubmissions};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = ".bounty-review.toml";

#[derive(Parser)]
#[command(
    name = "bounty-review",
    version,
    about = "Automated review of bounty code submissions",
    long_about = "bounty-review scores GitHub submissions against bounty requirements.\n\n\
                   Submissions flow through two durable queues: context generation fetches\n\
                   the pull request or repository from GitHub, then review generation asks\n\
                   an LLM for a score, notes and labels and stores the outcome.\n\n\
                   Examples:\n  \
                     bounty-review serve                               Run the API, workers and sweep\n  \
                     bounty-review submit <url> --bounty B1 --requirements @bounty.md\n  \
                     bounty-review review <url> --requirements 'Add a CLI'  Review once, in-process\n  \
                     bounty-review show <url> --bounty B1               Print a stored outcome\n  \
                     bounty-review jobs --status failed                 Inspect the queue\n  \
                     bounty-review doctor                               Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .bounty-review.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose (debug) logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API, the queue workers and the periodic sweep
    #[command(long_about = "Run the HTTP API, the queue workers and the periodic sweep.\n\n\
        Re-queues jobs left active by a previous process, starts the configured number\n\
        of context and review workers, schedules the overdue-submission sweep and\n\
        serves the review API until Ctrl-C.\n\n\
        Examples:\n  bounty-review serve\n  bounty-review serve --port 8080")]
    Serve {
        /// Address to bind (default from [server] host)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (default from [server] port or PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Queue a submission for review
    #[command(long_about = "Queue a submission for review.\n\n\
        Enqueues a context-generation job; a running 'serve' process picks it up.\n\
        Requirements may be given inline or read from a file with a leading '@'.\n\n\
        Examples:\n  bounty-review submit https://github.com/o/r/pull/7 --bounty B1 --requirements 'Implement X'\n  \
        bounty-review submit https://github.com/o/r --bounty B2 --requirements @bounty.md")]
    Submit {
        /// Pull request or repository URL
        url: String,
        /// Bounty identifier
        #[arg(long)]
        bounty: String,
        /// Requirements text, or @path to read them from a file
        #[arg(long)]
        requirements: String,
    },
    /// Fetch context and review a submission immediately, without the queue
    #[command(long_about = "Fetch context and review a submission immediately.\n\n\
        Runs both stages in this process and stores the outcome like the queued path.\n\
        Requires an LLM API key.\n\n\
        Examples:\n  bounty-review review https://github.com/o/r/pull/7 --requirements 'Implement X'\n  \
        bounty-review review https://github.com/o/r --requirements @bounty.md --format json")]
    Review {
        /// Pull request or repository URL
        url: String,
        /// Bounty identifier used as the storage key
        #[arg(long, default_value = "local")]
        bounty: String,
        /// Requirements text, or @path to read them from a file
        #[arg(long)]
        requirements: String,
    },
    /// Print the stored outcome for a submission
    Show {
        /// Pull request or repository URL
        url: String,
        /// Bounty identifier
        #[arg(long)]
        bounty: String,
    },
    /// List queued, active, completed or failed jobs
    #[command(long_about = "List jobs in the durable queue, newest first.\n\n\
        Examples:\n  bounty-review jobs\n  bounty-review jobs --queue context --status failed\n  bounty-review jobs --limit 5 --format json")]
    Jobs {
        /// Only this queue
        #[arg(long)]
        queue: Option<QueueChoice>,
        /// Only jobs with this status (queued, active, completed, failed)
        #[arg(long)]
        status: Option<JobStatus>,
        /// Maximum jobs to show (default: 20)
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Run one sweep for overdue submissions and queue them
    Sweep,
    /// Create a default .bounty-review.toml configuration file
    #[command(long_about = "Create a default .bounty-review.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .bounty-review.toml already exists.")]
    Init,
    /// Check your setup and environment
    #[command(long_about = "Check your setup and environment.\n\n\
        Runs diagnostics for the config file, GitHub token, LLM API key and the\n\
        database. Use --format json for machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum QueueChoice {
    /// github:generateContext
    Context,
    /// github:reviewSubmission
    Review,
}

impl QueueChoice {
    fn name(self) -> &'static str {
        match self {
            QueueChoice::Context => CONTEXT_QUEUE,
            QueueChoice::Review => REVIEW_QUEUE,
        }
    }
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");
    let (bold, cyan, green, reset) = if use_color {
        ("\x1b[1m", "\x1b[36m", "\x1b[32m", "\x1b[0m")
    } else {
        ("", "", "", "")
    };

    println!("{bold}bounty-review{reset} v{version}, automated review of bounty submissions\n");

    println!("Quick start:");
    println!("  {cyan}bounty-review init{reset}      Create a .bounty-review.toml config file");
    println!("  {cyan}bounty-review serve{reset}     Start the API, workers and sweep");
    println!("  {cyan}bounty-review doctor{reset}    Check your setup\n");

    println!("All commands:");
    println!("  {green}serve{reset}     HTTP API + queue workers + periodic sweep");
    println!("  {green}submit{reset}    Queue a submission for review");
    println!("  {green}review{reset}    Review a submission immediately");
    println!("  {green}show{reset}      Print a stored outcome");
    println!("  {green}jobs{reset}      Inspect the job queue");
    println!("  {green}sweep{reset}     Queue overdue submissions once");
    println!("  {green}doctor{reset}    Check your setup and environment");
    println!("  {green}init{reset}      Create default configuration\n");

    println!("Run 'bounty-review <command> --help' for details.");
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Inline text, or the contents of a file when prefixed with `@`.
fn read_requirements(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err(format!("reading requirements from {path}")),
        None => Ok(value.to_string()),
    }
}

/// Handles shared by every command that touches the database.
struct Services {
    db: Database,
    queue: SqliteJobQueue,
    outcomes: SqliteOutcomeStore,
}

impl Services {
    fn open(config: &BountyConfig) -> Result<Self> {
        let db = Database::open(&config.database.path)
            .wrap_err(format!("opening {}", config.database.path.display()))?;
        Ok(Self {
            queue: SqliteJobQueue::new(db.clone(), &config.queue),
            outcomes: SqliteOutcomeStore::new(db.clone()),
            db,
        })
    }

    fn pipeline(&self, config: &BountyConfig) -> Result<Pipeline> {
        let fetcher = GitHubFetcher::new(&config.github)?;
        let reviewer = LlmReviewer::new(&config.llm, config.review.clone())?;
        Ok(Pipeline::new(
            Arc::new(fetcher),
            Arc::new(reviewer),
            Arc::new(self.outcomes.clone()),
            Arc::new(self.queue.clone()),
        ))
    }

    fn sweeper(&self, config: &BountyConfig, pipeline: Pipeline) -> Sweeper {
        Sweeper::new(
            Arc::new(SqliteSubmissions::new(self.db.clone())),
            pipeline,
            config.sweep.clone(),
        )
    }
}

fn print_outcome(outcome: &ReviewOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome).into_diagnostic()?);
        }
        OutputFormat::Markdown => print!("{}", outcome.to_markdown()),
        OutputFormat::Text => print!("{outcome}"),
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self, use_color: bool) -> &'static str {
        match (self.status, use_color) {
            ("pass", true) => "\x1b[32m\u{2713}\x1b[0m",
            ("pass", false) => "\u{2713}",
            ("fail", true) => "\x1b[31m\u{2717}\x1b[0m",
            ("fail", false) => "\u{2717}",
            (_, true) => "\x1b[33m~\x1b[0m",
            (_, false) => "~",
        }
    }
}

async fn run_doctor(
    config: &BountyConfig,
    config_path: &Path,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    if config_path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", config_path.display()),
        ));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            format!("{} not found, using defaults", config_path.display()),
        ));
    }

    if config.github.token.is_some() {
        checks.push(CheckResult::pass("github_token", "GITHUB_TOKEN set"));
    } else {
        checks.push(CheckResult::fail(
            "github_token",
            "GITHUB_TOKEN not set (anonymous access, 60 requests/hour)",
            "export GITHUB_TOKEN=... or set token under [github]",
        ));
    }

    let llm_env_var = config.llm.api_key_env();
    checks.push(CheckResult::pass(
        "llm_provider",
        format!("{} (model: {})", config.llm.provider, config.llm.model),
    ));
    if config.llm.api_key.is_some() {
        checks.push(CheckResult::pass("llm_api_key", format!("{llm_env_var} set")));
    } else {
        checks.push(CheckResult::fail(
            "llm_api_key",
            format!("{llm_env_var} not set"),
            format!("export {llm_env_var}=... or set api_key under [llm]"),
        ));
    }

    match Services::open(config) {
        Ok(services) => {
            let detail = match services.queue.counts().await {
                Ok(counts) => {
                    let pending: u64 = counts
                        .iter()
                        .filter(|c| matches!(c.status, JobStatus::Queued | JobStatus::Active))
                        .map(|c| c.count)
                        .sum();
                    let failed: u64 = counts
                        .iter()
                        .filter(|c| c.status == JobStatus::Failed)
                        .map(|c| c.count)
                        .sum();
                    format!(
                        "{} ({pending} pending jobs, {failed} failed)",
                        config.database.path.display()
                    )
                }
                Err(_) => config.database.path.display().to_string(),
            };
            checks.push(CheckResult::pass("database", detail));
        }
        Err(e) => checks.push(CheckResult::fail(
            "database",
            format!("{e}"),
            "check [database] path or BOUNTY_DB_PATH",
        )),
    }

    checks.push(CheckResult::info(
        "workers",
        format!(
            "{} context, {} review, {} attempt(s) per job",
            config.queue.context_workers, config.queue.review_workers, config.queue.attempts
        ),
    ));

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            println!(
                "bounty-review v{}, environment check\n",
                env!("CARGO_PKG_VERSION")
            );
            for check in &checks {
                let label = check.name.replace('_', " ");
                println!("  {} {label:<14} {}", check.symbol(use_color), check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }
            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

async fn run_serve(config: &BountyConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let services = Services::open(config)?;
    let pipeline = services.pipeline(config)?;

    let recovered = services
        .queue
        .recover_stalled(Duration::from_secs(config.queue.stall_timeout_secs))
        .await?;
    if recovered > 0 {
        info!(count = recovered, "re-queued jobs left active by a previous run");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers =
        WorkerPool::new(pipeline.clone(), config.queue.clone()).spawn(shutdown_rx.clone());
    let sweep = config.sweep.enabled.then(|| {
        tokio::spawn(
            services
                .sweeper(config, pipeline.clone())
                .run(shutdown_rx.clone()),
        )
    });

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            miette::miette!(
                help = "stop the other process or pass --port (or set PORT)",
                "port {port} is already in use"
            )
        } else {
            miette::miette!("failed to bind {addr}: {e}")
        }
    })?;
    info!(%addr, "bounty-review listening");

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutting down");
        let _ = shutdown_tx.send(true);
    });

    server::serve(listener, server::router(pipeline), shutdown_rx)
        .await
        .into_diagnostic()?;

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "worker task panicked");
        }
    }
    if let Some(sweep) = sweep {
        let _ = sweep.await;
    }
    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# bounty-review configuration
# Environment variables (GITHUB_TOKEN, OPENAI_API_KEY, BOUNTY_DB_PATH, PORT)
# override values in this file.

[github]
# token = "ghp_..."
# api_base = "https://api.github.com"
# max_attempts = 3
# base_delay_ms = 1000
# key_files = ["README.md", "package.json", "tsconfig.json", "Dockerfile", ".env.example"]
# recent_commits = 10

[llm]
# provider = "openai"
# model = "gpt-4-turbo-preview"
# base_url = "https://api.openai.com"
# timeout_secs = 120

[review]
# max_file_changes = 20
# max_commit_messages = 10
# max_key_file_chars = 2000

[database]
# path = ".bounty-review/reviews.db"

[queue]
# context_workers = 2
# review_workers = 2
# poll_interval_ms = 1000
# attempts = 1
# backoff_ms = 5000
# stall_timeout_secs = 600

[sweep]
# enabled = true
# interval_secs = 3600
# batch_size = 100

[server]
# host = "127.0.0.1"
# port = 3001
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();

    let default_level = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Some(Command::Serve { .. }), false) => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    let config = BountyConfig::load(cli.config.as_deref())?;

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Serve { host, port }) => {
            run_serve(&config, host, port).await?;
        }
        Some(Command::Submit {
            ref url,
            ref bounty,
            ref requirements,
        }) => {
            let job = ContextJob::new(url.as_str(), bounty.as_str(), read_requirements(requirements)?);
            let services = Services::open(&config)?;
            let id = services.pipeline(&config)?.submit(&job).await?;
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "jobId": id, "queue": CONTEXT_QUEUE, "submission": job.submission })
                ),
                _ => println!("Queued {} as job {id}", job.submission),
            }
        }
        Some(Command::Review {
            ref url,
            ref bounty,
            ref requirements,
        }) => {
            let job = ContextJob::new(url.as_str(), bounty.as_str(), read_requirements(requirements)?);
            if config.llm.api_key.is_none() {
                miette::bail!(miette::miette!(
                    help = format!(
                        "Set {} or add api_key in your .bounty-review.toml under [llm]",
                        config.llm.api_key_env()
                    ),
                    "No API key configured for LLM provider '{}'",
                    config.llm.provider
                ));
            }
            let services = Services::open(&config)?;
            let pipeline = services.pipeline(&config)?;

            let spinner = std::io::stderr().is_terminal().then(|| {
                let pb = indicatif::ProgressBar::new_spinner();
                if let Ok(style) =
                    indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                {
                    pb.set_style(style);
                }
                pb.set_message(format!("Reviewing {url}..."));
                pb.enable_steady_tick(Duration::from_millis(120));
                pb
            });

            let outcome = pipeline.run_inline(&job).await.inspect_err(|_| {
                if let Some(pb) = &spinner {
                    pb.finish_with_message("Failed");
                }
            })?;
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            print_outcome(&outcome, cli.format)?;
        }
        Some(Command::Show {
            ref url,
            ref bounty,
        }) => {
            let services = Services::open(&config)?;
            match services.outcomes.load(url, bounty).await? {
                Some(outcome) => print_outcome(&outcome, cli.format)?,
                None => miette::bail!(miette::miette!(
                    help = "queue it with 'bounty-review submit' or run 'bounty-review review'",
                    "no review found for {url} (bounty {bounty})"
                )),
            }
        }
        Some(Command::Jobs {
            queue,
            status,
            limit,
        }) => {
            let services = Services::open(&config)?;
            let jobs = services
                .queue
                .list(JobFilter {
                    queue: queue.map(|q| q.name().to_string()),
                    status,
                    limit,
                })
                .await?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&jobs).into_diagnostic()?);
                }
                OutputFormat::Markdown => {
                    println!("| id | queue | status | attempts | submission | error |");
                    println!("|---|---|---|---|---|---|");
                    for job in &jobs {
                        println!(
                            "| {} | {} | {} | {}/{} | {} | {} |",
                            job.id,
                            job.queue,
                            job.status,
                            job.attempts,
                            job.max_attempts,
                            job.submission,
                            job.last_error.as_deref().unwrap_or("")
                        );
                    }
                }
                OutputFormat::Text => {
                    if jobs.is_empty() {
                        println!("No jobs.");
                    }
                    for job in &jobs {
                        println!(
                            "#{:<5} {:<26} {:<9} {}/{}  {}",
                            job.id,
                            job.queue,
                            job.status.to_string(),
                            job.attempts,
                            job.max_attempts,
                            job.submission
                        );
                        if let Some(error) = &job.last_error {
                            println!("       error: {error}");
                        }
                    }
                }
            }
        }
        Some(Command::Sweep) => {
            let services = Services::open(&config)?;
            let pipeline = services.pipeline(&config)?;
            let count = services.sweeper(&config, pipeline).run_once().await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "enqueued": count })),
                _ => println!("Queued {count} overdue submission(s)"),
            }
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Doctor) => {
            let config_path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            run_doctor(&config, &config_path, cli.format, use_color).await?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "bounty-review", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_submit() {
        let cli = Cli::try_parse_from([
            "bounty-review",
            "submit",
            "https://github.com/o/r/pull/7",
            "--bounty",
            "B1",
            "--requirements",
            "Implement X",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Submit { url, bounty, .. }) => {
                assert_eq!(url, "https://github.com/o/r/pull/7");
                assert_eq!(bounty, "B1");
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn cli_parses_job_filters() {
        let cli = Cli::try_parse_from([
            "bounty-review",
            "jobs",
            "--queue",
            "review",
            "--status",
            "failed",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Some(Command::Jobs { queue, status, limit }) => {
                assert_eq!(queue.map(QueueChoice::name), Some(REVIEW_QUEUE));
                assert_eq!(status, Some(JobStatus::Failed));
                assert_eq!(limit, 20);
            }
            _ => panic!("expected jobs"),
        }
    }

    #[test]
    fn cli_rejects_unknown_job_status() {
        assert!(Cli::try_parse_from(["bounty-review", "jobs", "--status", "running"]).is_err());
    }

    #[test]
    fn requirements_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bounty.md");
        std::fs::write(&path, "Build a widget").unwrap();
        let arg = format!("@{}", path.display());
        assert_eq!(read_requirements(&arg).unwrap(), "Build a widget");
        assert_eq!(read_requirements("inline text").unwrap(), "inline text");
        assert!(read_requirements("@/no/such/file").is_err());
    }

    #[test]
    fn default_config_parses() {
        let config = BountyConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.queue.attempts, 1);
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
