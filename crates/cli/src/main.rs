mod snapshot;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use rma_engine::warranty::parse_timestamp;
use rma_engine::{
    compute_warranty, ClaimSource, ConfigError, Engine, EngineConfig, EngineError, FixedClock,
    OrderSummary, SideEffectReport, StaticOrderLookup,
};
use rma_storage::{CaseFilter, MemoryStore, Stage};

use snapshot::{load_store, save_store};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Return case lifecycle tool.
#[derive(Parser)]
#[command(name = "rma", version, about = "Return case lifecycle tool")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the warranty snapshot for an order date
    Warranty {
        /// Order processed timestamp (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        processed_at: Option<String>,
        /// Warranty length in years (overrides the config file)
        #[arg(long)]
        years: Option<i32>,
        /// Evaluate as of this timestamp instead of now
        #[arg(long)]
        now: Option<String>,
        /// Path to the engine config TOML
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Open (or deduplicate) a case from a claim JSON file
    Intake {
        /// Path to the store snapshot JSON (created when missing)
        #[arg(long)]
        store: PathBuf,
        /// Path to the claim JSON, tagged by "source"
        #[arg(long)]
        claim: PathBuf,
        /// Path to a JSON array of orders used for lookup
        #[arg(long)]
        orders: Option<PathBuf>,
        /// Evaluate as of this timestamp instead of now
        #[arg(long)]
        now: Option<String>,
        /// Path to the engine config TOML
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Move a case to another stage
    Transition {
        /// Path to the store snapshot JSON
        #[arg(long)]
        store: PathBuf,
        /// Case id
        #[arg(long = "case")]
        case_id: String,
        /// Target stage
        #[arg(long)]
        to: Stage,
        /// Note recorded on the ledger event
        #[arg(long)]
        note: Option<String>,
        /// Evaluate as of this timestamp instead of now
        #[arg(long)]
        now: Option<String>,
        /// Path to the engine config TOML
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the service history of a serial number
    History {
        /// Path to the store snapshot JSON
        #[arg(long)]
        store: PathBuf,
        /// Serial number
        serial: String,
    },

    /// Read-only SLA and logistics reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Validate an engine config file
    CheckConfig {
        /// Path to the engine config TOML
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Time spent in the current stage, with SLA state
    Stages {
        /// Path to the store snapshot JSON
        #[arg(long)]
        store: PathBuf,
        /// Only cases in this stage
        #[arg(long)]
        stage: Option<Stage>,
        /// Evaluate as of this timestamp instead of now
        #[arg(long)]
        now: Option<String>,
    },
    /// Cases with logistics exceptions
    Exceptions {
        /// Path to the store snapshot JSON
        #[arg(long)]
        store: PathBuf,
        /// Print counts per exception type instead of cases
        #[arg(long)]
        summary: bool,
        /// Evaluate as of this timestamp instead of now
        #[arg(long)]
        now: Option<String>,
    },
}

/// A failed command. `detail` is merged into the JSON error object.
struct Failure {
    message: String,
    detail: serde_json::Value,
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Failure {
            message,
            detail: json!({}),
        }
    }
}

impl From<EngineError> for Failure {
    fn from(e: EngineError) -> Self {
        let detail = match &e {
            EngineError::Transition(t) => json!({
                "kind": e.kind(),
                "rule": t.rule(),
                "missing": t.missing_fields(),
            }),
            EngineError::Validation(errors) => json!({
                "kind": e.kind(),
                "fields": errors.fields(),
            }),
            _ => json!({ "kind": e.kind() }),
        };
        Failure {
            message: e.to_string(),
            detail,
        }
    }
}

impl From<ConfigError> for Failure {
    fn from(e: ConfigError) -> Self {
        EngineError::from(e).into()
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Warranty {
            processed_at,
            years,
            now,
            config,
        } => cmd_warranty(
            processed_at.as_deref(),
            years,
            now.as_deref(),
            config.as_deref(),
            cli.output,
        ),
        Commands::Intake {
            store,
            claim,
            orders,
            now,
            config,
        } => block_on(cmd_intake(
            &store,
            &claim,
            orders.as_deref(),
            now.as_deref(),
            config.as_deref(),
            cli.output,
            cli.quiet,
        )),
        Commands::Transition {
            store,
            case_id,
            to,
            note,
            now,
            config,
        } => block_on(cmd_transition(
            &store,
            &case_id,
            to,
            note.as_deref(),
            now.as_deref(),
            config.as_deref(),
            cli.output,
            cli.quiet,
        )),
        Commands::History { store, serial } => block_on(cmd_history(&store, &serial, cli.output)),
        Commands::Report { command } => match command {
            ReportCommands::Stages { store, stage, now } => {
                block_on(cmd_report_stages(&store, stage, now.as_deref(), cli.output))
            }
            ReportCommands::Exceptions {
                store,
                summary,
                now,
            } => block_on(cmd_report_exceptions(
                &store,
                summary,
                now.as_deref(),
                cli.output,
            )),
        },
        Commands::CheckConfig { file } => cmd_check_config(&file, cli.output, cli.quiet),
    };

    if let Err(failure) = result {
        report_error(&failure, cli.output, cli.quiet);
        process::exit(1);
    }
}

/// Log to stderr, filtered by `RMA_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("RMA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn block_on<F>(future: F) -> Result<(), Failure>
where
    F: Future<Output = Result<(), Failure>>,
{
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("failed to create tokio runtime: {}", e))?;
    rt.block_on(future)
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn cmd_warranty(
    processed_at: Option<&str>,
    years: Option<i32>,
    now: Option<&str>,
    config: Option<&Path>,
    output: OutputFormat,
) -> Result<(), Failure> {
    let mut config = load_config(config)?;
    if let Some(years) = years {
        config.warranty.years = years;
        config.validate()?;
    }
    let now = resolve_now(now)?;
    let snapshot = compute_warranty(processed_at, &config.warranty, now);

    match output {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Text => {
            println!("status:     {}", snapshot.status);
            println!("basis:      {}", snapshot.basis.as_str());
            println!(
                "expires_at: {}",
                snapshot.expires_at.map(rfc3339).unwrap_or_else(|| "-".to_string())
            );
        }
    }
    Ok(())
}

async fn cmd_intake(
    store_path: &Path,
    claim_path: &Path,
    orders_path: Option<&Path>,
    now: Option<&str>,
    config: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), Failure> {
    let claim: ClaimSource = read_json(claim_path, "claim")?;
    let orders: Vec<OrderSummary> = match orders_path {
        Some(path) => read_json(path, "orders")?,
        None => Vec::new(),
    };

    let store = load_store(store_path, true)?;
    let engine = open_engine(store.clone(), config, now)
        .await?
        .with_order_lookup(Arc::new(StaticOrderLookup::new(orders)));
    let outcome = engine.intake(claim).await?;
    if !outcome.deduped {
        save_store(&store, store_path).await?;
    }

    match output {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Text => {
            let verb = if outcome.deduped { "matched open" } else { "opened" };
            println!(
                "{} case {} ({}, {})",
                verb, outcome.case.id, outcome.case.stage, outcome.case.warranty_status
            );
            warn_side_effects(&outcome.side_effects, quiet);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_transition(
    store_path: &Path,
    case_id: &str,
    to: Stage,
    note: Option<&str>,
    now: Option<&str>,
    config: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), Failure> {
    let store = load_store(store_path, false)?;
    let engine = open_engine(store.clone(), config, now).await?;
    let update = engine.transition(case_id, to, note).await?;
    save_store(&store, store_path).await?;

    match output {
        OutputFormat::Json => print_json(&update)?,
        OutputFormat::Text => {
            println!(
                "case {}: {} -> {}",
                update.case.id, update.previous_stage, update.case.stage
            );
            warn_side_effects(&update.side_effects, quiet);
        }
    }
    Ok(())
}

async fn cmd_history(store_path: &Path, serial: &str, output: OutputFormat) -> Result<(), Failure> {
    let store = load_store(store_path, false)?;
    let engine = open_engine(store, None, None).await?;
    let history = engine.service_history(serial).await?;

    match output {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Text => {
            println!(
                "serial {}: {} case(s)",
                history.serial.serial_number, history.serial.case_count
            );
            for event in &history.events {
                println!(
                    "  {}  {:<22} {}",
                    rfc3339(event.created_at),
                    event.event_type.as_str(),
                    event.summary
                );
            }
        }
    }
    Ok(())
}

async fn cmd_report_stages(
    store_path: &Path,
    stage: Option<Stage>,
    now: Option<&str>,
    output: OutputFormat,
) -> Result<(), Failure> {
    let store = load_store(store_path, false)?;
    let engine = open_engine(store, None, now).await?;
    let filter = CaseFilter {
        stage,
        ..CaseFilter::default()
    };
    let ages = engine.time_in_stage(&filter).await?;

    match output {
        OutputFormat::Json => print_json(&ages)?,
        OutputFormat::Text => {
            for age in &ages {
                println!(
                    "{}  {:<20} {:>8.1}h{}",
                    age.case_id,
                    age.stage.as_str(),
                    age.hours_in_stage,
                    if age.is_sla_overdue { "  OVERDUE" } else { "" }
                );
            }
        }
    }
    Ok(())
}

async fn cmd_report_exceptions(
    store_path: &Path,
    summary: bool,
    now: Option<&str>,
    output: OutputFormat,
) -> Result<(), Failure> {
    let store = load_store(store_path, false)?;
    let engine = open_engine(store, None, now).await?;
    let filter = CaseFilter::default();

    if summary {
        let counts: std::collections::BTreeMap<&str, usize> = engine
            .exception_summary(&filter)
            .await?
            .into_iter()
            .map(|(kind, count)| (kind.as_str(), count))
            .collect();
        match output {
            OutputFormat::Json => print_json(&counts)?,
            OutputFormat::Text => {
                for (kind, count) in &counts {
                    println!("{}: {}", kind, count);
                }
            }
        }
        return Ok(());
    }

    let reports = engine.logistics_exceptions(&filter).await?;
    match output {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Text => {
            for report in &reports {
                let kinds: Vec<&str> = report.exception_types.iter().map(|k| k.as_str()).collect();
                println!(
                    "{}  {:<20} {}",
                    report.case.id,
                    report.case.stage.as_str(),
                    kinds.join(", ")
                );
            }
        }
    }
    Ok(())
}

fn cmd_check_config(path: &Path, output: OutputFormat, quiet: bool) -> Result<(), Failure> {
    let config = EngineConfig::load(path)?;
    let mirror = config
        .ticket_mirror
        .as_ref()
        .and_then(|m| m.base_url.as_deref());

    match output {
        OutputFormat::Json => print_json(&json!({
            "valid": true,
            "warranty_years": config.warranty.years,
            "ticket_mirror": mirror,
        }))?,
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "{}: ok (warranty {} year(s), ticket mirror {})",
                    path.display(),
                    config.warranty.years,
                    mirror.unwrap_or("not configured")
                );
            }
        }
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Failure> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

async fn open_engine(
    store: Arc<MemoryStore>,
    config: Option<&Path>,
    now: Option<&str>,
) -> Result<Engine<MemoryStore>, Failure> {
    let config = load_config(config)?;
    let engine = Engine::connect(store, config).await?;
    Ok(match now {
        Some(raw) => engine.with_clock(Arc::new(FixedClock::new(parse_now(raw)?))),
        None => engine,
    })
}

fn resolve_now(now: Option<&str>) -> Result<OffsetDateTime, Failure> {
    match now {
        Some(raw) => parse_now(raw),
        None => Ok(OffsetDateTime::now_utc()),
    }
}

fn parse_now(raw: &str) -> Result<OffsetDateTime, Failure> {
    parse_timestamp(raw).ok_or_else(|| format!("invalid --now timestamp '{}'", raw).into())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T, Failure> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading {} file '{}': {}", what, path.display(), e))?;
    let value = serde_json::from_str(&raw)
        .map_err(|e| format!("error parsing {} file '{}': {}", what, path.display(), e))?;
    Ok(value)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Failure> {
    let pretty = serde_json::to_string_pretty(value)
        .map_err(|e| format!("serialization error: {}", e))?;
    println!("{}", pretty);
    Ok(())
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

/// Auxiliary failures do not fail the command; mention them on stderr.
fn warn_side_effects(report: &SideEffectReport, quiet: bool) {
    if quiet {
        return;
    }
    let steps = [
        ("registry", report.registry.attempted && !report.registry.success, &report.registry.error),
        ("ledger", report.ledger.attempted && !report.ledger.success, &report.ledger.error),
        ("ticket", report.ticket.attempted && !report.ticket.success, &report.ticket.error),
    ];
    for (name, failed, error) in steps {
        if failed {
            eprintln!(
                "warning: {} update failed: {}",
                name,
                error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

fn report_error(failure: &Failure, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", failure.message),
        OutputFormat::Json => {
            let mut body = json!({ "error": failure.message });
            if let (Some(body), Some(detail)) = (body.as_object_mut(), failure.detail.as_object()) {
                for (key, value) in detail {
                    body.insert(key.clone(), value.clone());
                }
            }
            eprintln!("{}", body);
        }
    }
}
