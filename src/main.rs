use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use ms_watch::{
    exit_code, fingerprint, parser, ChangeDetector, Config, CycleOutcome, Delivery, EmailNotifier,
    FileFetcher, HttpFetcher, JsonStateStore, ManuscriptStatus, MessageTemplate, NotifyPolicy,
    PageSource, StateStore,
};

#[derive(Parser)]
#[command(name = "ms-watch")]
#[command(about = "Watch a manuscript review status page and email on changes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the YAML config file
    #[arg(long, global = true, default_value = "ms-watch.yml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single check cycle
    Check {
        /// Read the status page from a saved file instead of querying the site
        #[arg(long)]
        page_file: Option<PathBuf>,
    },

    /// Check periodically until interrupted
    Watch {
        /// Seconds between checks (overrides interval_seconds)
        #[arg(long)]
        interval: Option<u64>,

        /// Poll a page file kept current by an external fetcher
        #[arg(long)]
        page_file: Option<PathBuf>,
    },

    /// Print the stored snapshot
    Show,

    /// Parse a saved status page and print the record with its fingerprint
    Parse {
        /// Saved page (HTML or text)
        page_file: PathBuf,
    },
}

type Detector = ChangeDetector<PageSource, JsonStateStore, EmailNotifier>;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    let filter = match "ms_watch=info".parse::<Directive>() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Aborted");
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code::USAGE)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Check { page_file } => {
            let config = load_config(&cli.config)?;
            check(&config, page_file).await
        }
        Commands::Watch {
            interval,
            page_file,
        } => {
            let config = load_config(&cli.config)?;
            let interval = Duration::from_secs(interval.unwrap_or(config.interval_seconds).max(1));
            watch(&config, interval, page_file).await
        }
        Commands::Show => {
            let config = Config::load(&cli.config)?;
            show(&config)
        }
        Commands::Parse { page_file } => parse_page(&page_file),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(config)
}

fn build_detector(config: &Config, page_file: Option<PathBuf>) -> Result<Detector> {
    let source = match page_file {
        Some(path) => {
            info!(path = %path.display(), "Reading status page from file");
            PageSource::File(FileFetcher::new(path))
        }
        None => PageSource::Http(
            HttpFetcher::new(
                &config.fetch.url,
                config.paper.credentials(),
                config.fetch.timeout(),
                &config.fetch.user_agent,
            )
            .context("Failed to create HTTP client")?,
        ),
    };

    let notifier = if config.email.enabled {
        let password = config
            .email
            .resolve_password()
            .context("SMTP password not configured")?;
        Some(EmailNotifier::new(&config.email, &password).context("Failed to set up email")?)
    } else {
        info!("Email disabled, changes are only logged");
        None
    };

    let template = MessageTemplate::new(&config.paper.label, config.email.subject_prefix());

    Ok(ChangeDetector::new(
        source,
        JsonStateStore::new(&config.state_file),
        notifier,
        template,
    )
    .with_policy(NotifyPolicy::from_config(&config.email))
    .with_debug_dir(config.debug_dir.clone()))
}

async fn check(config: &Config, page_file: Option<PathBuf>) -> Result<u8> {
    let detector = build_detector(config, page_file)?;

    match detector.run_cycle().await {
        Ok(outcome) => {
            print_outcome(&outcome);
            if outcome.notification_failed() {
                Ok(exit_code::NOTIFY)
            } else {
                Ok(exit_code::OK)
            }
        }
        Err(e) => {
            error!(error = %e, "Check cycle failed");
            eprintln!("Check failed: {}", e);
            Ok(e.exit_code())
        }
    }
}

async fn watch(config: &Config, interval: Duration, page_file: Option<PathBuf>) -> Result<u8> {
    let detector = build_detector(config, page_file)?;

    info!(interval_secs = interval.as_secs(), "Watching status page");

    loop {
        match detector.run_cycle().await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => error!(error = %e, exit_code = e.exit_code(), "Check cycle failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
        }
    }

    Ok(exit_code::OK)
}

fn show(config: &Config) -> Result<u8> {
    let store = JsonStateStore::new(&config.state_file);

    match store.load() {
        Ok(Some(snapshot)) => {
            println!("Observed at: {}", snapshot.observed_at.to_rfc3339());
            println!("Fingerprint: {}", snapshot.fingerprint);
            println!();
            print_status(&snapshot.status);
            Ok(exit_code::OK)
        }
        Ok(None) => {
            println!("No snapshot stored yet.");
            Ok(exit_code::OK)
        }
        Err(e) => {
            eprintln!("Failed to load snapshot: {}", e);
            Ok(exit_code::STORE)
        }
    }
}

fn parse_page(path: &Path) -> Result<u8> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read page file: {}", path.display()))?;

    match parser::parse(&raw) {
        Ok(status) => {
            print_status(&status);
            println!();
            println!("Fingerprint: {}", fingerprint(&status));
            Ok(exit_code::OK)
        }
        Err(e) => {
            eprintln!("Parse failed: {}", e);
            Ok(exit_code::PARSE)
        }
    }
}

fn print_status(status: &ManuscriptStatus) {
    for (field, value) in status.fields() {
        println!("{:<22}{}", format!("{}:", field.label()), value);
    }
}

fn print_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Baseline { fingerprint, .. } => {
            println!("Baseline captured ({})", fingerprint);
        }
        CycleOutcome::Changed {
            previous,
            fingerprint,
            changes,
            ..
        } => {
            println!("Status changed ({} -> {})", previous, fingerprint);
            for change in changes {
                println!("  {}: {} -> {}", change.field.label(), change.before, change.after);
            }
        }
        CycleOutcome::Unchanged { fingerprint } => {
            println!("No change ({})", fingerprint);
        }
    }

    match outcome.delivery() {
        Some(Delivery::Sent) => println!("Notification sent."),
        Some(Delivery::Failed(e)) => eprintln!("Notification failed, resend manually: {}", e),
        Some(Delivery::Skipped) | None => {}
    }
}
