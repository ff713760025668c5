//! provgate CLI - lineage tracking and deployment gating from the shell.
//!
//! Every command opens the SQLite governance store, performs one operation
//! through [`provgate_core`], and prints a machine-readable result on stdout.
//! Logs go to stderr (or the configured log file) so stdout stays parseable.
//!
//! Exit status: 0 on success, 1 for a broken chain or any error, 2 when the
//! compliance gate blocks deployment.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use provgate_config::{LoggingConfig, ProvgateConfig};
use provgate_core::{AuditTrail, ComplianceGate, LineageTracker};
use provgate_store::{
    GovernanceStore, JsonDirRegistry, ModelRegistry, RegistryBiasMetrics, SqliteStore,
};
use provgate_types::{DatasetId, Deadline, ModelId, RiskLevel};
use provgate_utils::{AtomicWriteOptions, ExistingFile, atomic_write_with_options};

#[derive(Parser)]
#[command(name = "provgate")]
#[command(about = "Track data lineage and gate model deployments on compliance checks")]
struct Cli {
    /// Config file (default: $PROVGATE_CONFIG or ~/.provgate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Governance database, overriding the configured path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Give up after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a lineage chain for freshly extracted data
    Extract {
        #[arg(long)]
        source: String,
        #[arg(long)]
        query: String,
        /// JSON data file
        #[arg(long)]
        data: PathBuf,
    },
    /// Record a transformation step
    Transform {
        dataset: String,
        #[arg(long)]
        step: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Transformation source text
        #[arg(long, default_value = "")]
        code: String,
    },
    /// Link a dataset to the model trained on it
    Link {
        dataset: String,
        model: String,
        #[arg(long)]
        training_run: Option<String>,
    },
    /// Verify chain integrity (exit 1 if broken)
    Verify { dataset: String },
    /// Print a chain as JSON
    Chain { dataset: String },
    /// Run the compliance gate (exit 2 if blocked)
    Validate {
        model: String,
        /// minimal, limited, high or unacceptable
        #[arg(long)]
        risk: RiskLevel,
        /// Directory of <model_id>.json metadata files
        #[arg(long)]
        registry: PathBuf,
        /// Also write the report to this file
        #[arg(long)]
        report_out: Option<PathBuf>,
    },
    /// Print audit events as JSON lines
    Audit {
        #[arg(long)]
        subject: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:?}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging);

    match run(&cli, &config) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ProvgateConfig> {
    match path {
        Some(path) => ProvgateConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ProvgateConfig::load()
            .context("Failed to load config")?
            .unwrap_or_default()),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.filter.as_deref().unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut init_warning = None;
    if let Some(path) = &logging.file {
        match open_log_file(path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .with(env_filter)
                    .init();
                return;
            }
            Err(e) => {
                init_warning = Some(format!("Failed to open log file {}: {e}", path.display()));
            }
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
    if let Some(warning) = init_warning {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

struct Services {
    store: Arc<dyn GovernanceStore>,
    audit: AuditTrail,
    tracker: LineageTracker,
}

impl Services {
    fn open(cli: &Cli, config: &ProvgateConfig) -> Result<Self> {
        let path = cli
            .db
            .clone()
            .unwrap_or_else(|| config.storage.resolved_path());
        let busy_timeout = Duration::from_millis(config.storage.busy_timeout_ms);
        let store: Arc<dyn GovernanceStore> = Arc::new(
            SqliteStore::open(&path, busy_timeout)
                .with_context(|| format!("Failed to open governance store {}", path.display()))?,
        );
        let audit = AuditTrail::new(store.clone(), config.audit.actor.clone());
        let tracker = LineageTracker::new(store.clone(), audit.clone());
        Ok(Self {
            store,
            audit,
            tracker,
        })
    }
}

fn run(cli: &Cli, config: &ProvgateConfig) -> Result<ExitCode> {
    let deadline = cli
        .timeout_secs
        .map_or(Deadline::NONE, |secs| Deadline::after(Duration::from_secs(secs)));
    let services = Services::open(cli, config)?;
    let mut out = io::stdout().lock();

    match &cli.command {
        Commands::Extract {
            source,
            query,
            data,
        } => {
            let data = read_json(data)?;
            let dataset_id = services
                .tracker
                .track_extraction(source, query, &data, deadline)
                .context("Extraction was not tracked")?;
            writeln!(out, "{dataset_id}")?;
        }
        Commands::Transform {
            dataset,
            step,
            input,
            output,
            code,
        } => {
            let dataset_id = parse_dataset(dataset)?;
            let input = read_json(input)?;
            let output = read_json(output)?;
            let record = services
                .tracker
                .track_transformation(&dataset_id, step, &input, &output, code, deadline)
                .with_context(|| format!("Failed to record step {step}"))?;
            writeln!(out, "{}", record.content_hash)?;
        }
        Commands::Link {
            dataset,
            model,
            training_run,
        } => {
            let dataset_id = parse_dataset(dataset)?;
            let model_id = parse_model(model)?;
            let record = services
                .tracker
                .link_to_model(&dataset_id, &model_id, training_run.as_deref(), deadline)
                .with_context(|| format!("Failed to link {dataset_id} to {model_id}"))?;
            writeln!(out, "{}", record.content_hash)?;
        }
        Commands::Verify { dataset } => {
            let dataset_id = parse_dataset(dataset)?;
            let verification = services.tracker.verify_chain(&dataset_id, deadline)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&verification)?)?;
            if !verification.is_valid() {
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Chain { dataset } => {
            let dataset_id = parse_dataset(dataset)?;
            let chain = services.tracker.chain(&dataset_id, deadline)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&chain)?)?;
        }
        Commands::Validate {
            model,
            risk,
            registry,
            report_out,
        } => {
            let model_id = parse_model(model)?;
            if !registry.is_dir() {
                bail!("Registry directory not found: {}", registry.display());
            }
            let registry: Arc<dyn ModelRegistry> = Arc::new(JsonDirRegistry::new(registry));
            let gate = ComplianceGate::new(
                services.tracker.clone(),
                registry.clone(),
                Arc::new(RegistryBiasMetrics::new(registry)),
                services.audit.clone(),
            );
            let decision = gate
                .validate_deployment(&model_id, *risk, &config.gate, deadline)
                .with_context(|| format!("Compliance gate failed for {model_id}"))?;

            let rendered = serde_json::to_string_pretty(&decision.report)?;
            if let Some(path) = report_out {
                let options = AtomicWriteOptions {
                    existing: ExistingFile::Replace,
                    ..AtomicWriteOptions::default()
                };
                atomic_write_with_options(path, rendered.as_bytes(), options)
                    .with_context(|| format!("Failed to write report {}", path.display()))?;
            }
            writeln!(out, "{rendered}")?;
            if !decision.can_deploy() {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Audit { subject } => {
            let events = services.store.list_audit_events(subject.as_deref(), deadline)?;
            for event in events {
                writeln!(out, "{}", serde_json::to_string(&event)?)?;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_json(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn parse_dataset(raw: &str) -> Result<DatasetId> {
    DatasetId::new(raw).with_context(|| format!("Invalid dataset id {raw:?}"))
}

fn parse_model(raw: &str) -> Result<ModelId> {
    ModelId::new(raw).with_context(|| format!("Invalid model id {raw:?}"))
}
