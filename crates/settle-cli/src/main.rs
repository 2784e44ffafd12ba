//! Command-line front end for settle.
//!
//! Runs single readiness waits and visual checks against an Appium server,
//! and offline comparisons of image files.
//!
//! # Usage
//!
//! ```bash
//! # Wait until the dialog button is ready, then tap it
//! settle wait id=android:id/button1 --click
//!
//! # Wait with a shorter budget and no scroll escalation
//! settle wait accessibility-id=moon -o 5000 --no-scroll
//!
//! # Store the current look of an element as a reference image
//! settle capture accessibility-id=moon "full moon"
//!
//! # Verify an element against a stored reference
//! settle match accessibility-id=moon "full moon" --threshold 0.85
//!
//! # Compare two image files without a device
//! settle compare shot.png resources/references/full\ moon.png
//!
//! # Kill apps between test runs and return to the home screen
//! settle kill-app com.android.settings com.example.moon --home
//!
//! # Show the resolved configuration
//! settle --format json config
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use settle_core::config::HarnessConfig;
use settle_core::driver::MobileDriver;
use settle_core::element::ElementHandle;
use settle_core::error::{MatchError, WaitError};
use settle_core::lifecycle::Termination;
use settle_core::locator::Locator;
use settle_core::logging::{self, LogOptions};
use settle_core::reference::ReferenceStore;
use settle_core::session::{SessionContext, SessionError};
use settle_core::visual::{self, CaptureSource, MatchResult, DEFAULT_THRESHOLD};
use tracing::debug;

/// Readiness waits and visual checks for mobile UI tests.
#[derive(Parser)]
#[command(name = "settle")]
#[command(about = "Wait for mobile UI elements to settle and verify how they look")]
#[command(version)]
struct Cli {
    /// Project root holding settle.json and resources/
    #[arg(short, long, default_value = ".", env = "SETTLE_ROOT")]
    root: PathBuf,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Also write logs to rotated files in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Options shared by every command that waits for an element.
#[derive(clap::Args, Clone)]
struct WaitArgs {
    /// Element locator as strategy=selector (id, accessibility-id, xpath, uiautomator, ...)
    locator: Locator,
    /// Timeout per poll phase in milliseconds
    #[arg(short = 'o', long, env = "SETTLE_TIMEOUT")]
    timeout: Option<u64>,
    /// Do not scroll and retry after the first timeout
    #[arg(long)]
    no_scroll: bool,
    /// Skip centering, keyboard dismissal and the second stability check
    #[arg(long)]
    no_prepare: bool,
    /// Accept disabled elements
    #[arg(long)]
    allow_disabled: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Wait until an element is ready for interaction
    Wait {
        #[command(flatten)]
        wait: WaitArgs,
        /// Tap the element once it is ready
        #[arg(long)]
        click: bool,
    },

    /// Capture an element as a named reference image
    Capture {
        #[command(flatten)]
        wait: WaitArgs,
        /// Reference name (file stem under the reference directory)
        name: String,
    },

    /// Verify an element against a named reference image
    Match {
        #[command(flatten)]
        wait: WaitArgs,
        /// Reference name
        reference: String,
        /// Minimum similarity score
        #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
    },

    /// Compare two image files without a device
    Compare {
        /// The captured image
        captured: PathBuf,
        /// The reference image
        reference: PathBuf,
        /// Minimum similarity score
        #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
    },

    /// List stored reference images
    References,

    /// Terminate apps, trying each termination strategy in turn
    KillApp {
        /// Package names (Android) or bundle ids (iOS)
        #[arg(required = true)]
        apps: Vec<String>,
        /// Press HOME afterwards
        #[arg(long)]
        home: bool,
    },

    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut options = LogOptions::new("settle").with_level(cli.log_level.as_str());
    if let Some(dir) = &cli.log_dir {
        options = options.with_dir(dir);
    }
    let _guard = logging::init(options);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

#[derive(Debug)]
enum CliError {
    /// The check ran and failed: timeout or visual mismatch.
    Failed(String),
    /// Could not reach or drive the device.
    Connection(String),
    /// Bad configuration or input files.
    Input(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Failed(_) => ExitCode::from(1),
            CliError::Connection(_) => ExitCode::from(2),
            CliError::Input(_) => ExitCode::from(3),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Failed(msg) => write!(f, "Check failed: {}", msg),
            CliError::Connection(msg) => write!(f, "Connection error: {}", msg),
            CliError::Input(msg) => write!(f, "Input error: {}", msg),
        }
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Config(e) => CliError::Input(e.to_string()),
            SessionError::Driver(e) => CliError::Connection(e.to_string()),
            SessionError::Io(e) => CliError::Input(e.to_string()),
        }
    }
}

impl From<WaitError> for CliError {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::Timeout { .. } => CliError::Failed(e.to_string()),
            WaitError::Driver { .. } => CliError::Connection(e.to_string()),
        }
    }
}

impl From<MatchError> for CliError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::Verification { .. } => CliError::Failed(e.to_string()),
            MatchError::Capture(_) => CliError::Connection(e.to_string()),
            _ => CliError::Input(e.to_string()),
        }
    }
}

fn load_config(root: &Path) -> Result<HarnessConfig, CliError> {
    HarnessConfig::load(root).map_err(|e| CliError::Input(e.to_string()))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // Commands that don't need a device
    match cli.command {
        Command::Compare {
            ref captured,
            ref reference,
            threshold,
        } => return compare_files(captured, reference, threshold, &cli),
        Command::References => {
            let config = load_config(&cli.root)?;
            let names = ReferenceStore::new(&config.reference_dir).list()?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "references": names }));
            } else if names.is_empty() {
                eprintln!("No reference images in {}", config.reference_dir.display());
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
            return Ok(());
        }
        Command::Config => {
            let config = load_config(&cli.root)?;
            if cli.format == OutputFormat::Json {
                println!("{}", to_json(&config)?);
            } else {
                println!("platform:      {}", config.platform);
                println!("server:        {}", config.server_url);
                println!("profile:       {}", config.device_profile);
                println!("capabilities:  {}", config.capabilities_path.display());
                println!("references:    {}", config.reference_dir.display());
                println!("logs:          {}", config.log_dir.display());
                println!("timeout:       {}ms", config.wait.timeout_ms);
            }
            return Ok(());
        }
        _ => {} // Fall through to device commands
    }

    let config = load_config(&cli.root)?;
    let session = SessionContext::start(config).await?;
    debug!(session = %session.id, "device session open");

    let result = run_on_device(&session, &cli).await;
    if let Err(e) = session.teardown().await {
        eprintln!("Warning: session teardown failed: {}", e);
    }
    result
}

async fn run_on_device(session: &SessionContext, cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Wait { wait, click } => {
            let started = Instant::now();
            let element = wait_for(session, wait).await?;
            if *click {
                session
                    .driver()
                    .click(&element)
                    .await
                    .map_err(|e| CliError::Connection(e.to_string()))?;
            }
            if cli.format == OutputFormat::Json {
                let output = serde_json::json!({
                    "success": true,
                    "locator": wait.locator.to_string(),
                    "element": element.id,
                    "clicked": click,
                    "elapsed_ms": started.elapsed().as_millis() as u64,
                });
                println!("{}", to_json(&output)?);
            } else {
                println!("{}", element.id);
            }
            report(cli, if *click { "click" } else { "wait" }, &wait.locator, started.elapsed());
            Ok(())
        }
        Command::Capture { wait, name } => {
            let started = Instant::now();
            let element = wait_for(session, wait).await?;
            let path = session.capture_reference(&element, name).await?;
            if cli.format == OutputFormat::Json {
                let output = serde_json::json!({ "success": true, "path": path });
                println!("{}", to_json(&output)?);
            } else {
                println!("{}", path.display());
            }
            report(cli, "capture", &wait.locator, started.elapsed());
            Ok(())
        }
        Command::Match {
            wait,
            reference,
            threshold,
        } => {
            let started = Instant::now();
            let element = wait_for(session, wait).await?;
            let result = session
                .matcher()
                .compare(CaptureSource::Element(&element), reference, *threshold)
                .await?;
            print_match(&result, *threshold, cli)?;
            report(cli, "match", &wait.locator, started.elapsed());
            check_passed(&result, reference, *threshold)
        }
        Command::KillApp { apps, home } => {
            let outcomes = session.terminate_apps(apps, *home).await;
            let mut failed = Vec::new();
            let mut rows = Vec::new();
            for outcome in &outcomes {
                let status = match &outcome.result {
                    Ok(Termination::Terminated) => "terminated".to_string(),
                    Ok(Termination::NotRunning) => "not running".to_string(),
                    Ok(Termination::NotInstalled) => "not installed".to_string(),
                    Err(e) => {
                        failed.push(outcome.app_id.clone());
                        e.to_string()
                    }
                };
                rows.push((outcome.app_id.clone(), status, outcome.result.is_ok()));
            }
            if cli.format == OutputFormat::Json {
                let apps: Vec<_> = rows
                    .iter()
                    .map(|(app, status, ok)| {
                        serde_json::json!({ "app": app, "success": ok, "status": status })
                    })
                    .collect();
                println!("{}", to_json(&serde_json::json!({ "apps": apps }))?);
            } else {
                for (app, status, _) in &rows {
                    println!("{}: {}", app, status);
                }
            }
            if failed.is_empty() {
                Ok(())
            } else {
                Err(CliError::Failed(format!("could not terminate {}", failed.join(", "))))
            }
        }
        Command::Compare { .. } | Command::References | Command::Config => Ok(()),
    }
}

async fn wait_for(
    session: &SessionContext,
    args: &WaitArgs,
) -> Result<ElementHandle, CliError> {
    let mut policy = session
        .policy()
        .clone()
        .with_allow_scroll(!args.no_scroll && session.policy().allow_scroll)
        .with_prepare_for_click(!args.no_prepare && session.policy().prepare_for_click)
        .with_require_enabled(!args.allow_disabled && session.policy().require_enabled);
    if let Some(ms) = args.timeout {
        policy = policy.with_timeout(Duration::from_millis(ms));
    }
    Ok(session.ready_element(&args.locator, Some(&policy)).await?)
}

fn compare_files(
    captured: &Path,
    reference: &Path,
    threshold: f64,
    cli: &Cli,
) -> Result<(), CliError> {
    let read = |path: &Path| {
        let bytes = std::fs::read(path)
            .map_err(|e| CliError::Input(format!("{}: {}", path.display(), e)))?;
        visual::decode(&bytes)
            .map(|image| image.to_luma8())
            .map_err(|e| CliError::Input(format!("{}: {}", path.display(), e)))
    };
    let captured_image = read(captured)?;
    let reference_image = read(reference)?;

    let score = visual::match_template(&captured_image, &reference_image)?;
    let result = MatchResult::new(score, threshold);
    print_match(&result, threshold, cli)?;
    check_passed(&result, &reference.display().to_string(), threshold)
}

fn print_match(result: &MatchResult, threshold: f64, cli: &Cli) -> Result<(), CliError> {
    if cli.format == OutputFormat::Json {
        let output = serde_json::json!({
            "score": result.score,
            "threshold": threshold,
            "passed": result.passed,
        });
        println!("{}", to_json(&output)?);
    } else {
        println!(
            "score {:.4} ({} threshold {:.2})",
            result.score,
            if result.passed { ">=" } else { "<" },
            threshold
        );
    }
    Ok(())
}

fn check_passed(result: &MatchResult, reference: &str, threshold: f64) -> Result<(), CliError> {
    if result.passed {
        Ok(())
    } else {
        Err(MatchError::Verification {
            reference: reference.to_string(),
            score: result.score,
            threshold,
        }
        .into())
    }
}

/// Prints the `|time|action|target|duration|` status line on stderr.
fn report(cli: &Cli, action: &str, locator: &Locator, elapsed: Duration) {
    if cli.quiet || cli.format == OutputFormat::Json {
        return;
    }
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ");
    eprintln!("|{}|{}|{}|{}ms|", now, action, locator, elapsed.as_millis());
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::Input(e.to_string()))
}
