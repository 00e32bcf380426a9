//! Data quality pipeline for delimited files.
//!
//! This binary runs one CSV file through rule validation and anomaly
//! detection, writing a clean output, a quarantine file with failure
//! reasons, and a JSON quality report. Optionally the clean rows are loaded
//! into a relational table.
//!
//! # Exit Codes
//! - 0: run completed (including runs that quarantined rows)
//! - 1: input, configuration or artifact-write failure

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tablesieve_core::config::{
    AnomalyConfig, ArtifactDirs, DEFAULT_CONTAMINATION, DEFAULT_DATA_DIR, DEFAULT_RULES_PATH, DEFAULT_SEED,
    PipelineConfig,
};
use tablesieve_core::samples::{DEFAULT_CUSTOMERS, DEFAULT_ORDERS, write_samples};
use tablesieve_core::{
    LogFormat, Pipeline, PipelineOutcome, PipelineSummary, ReasonPolicy, RuleSet, init_logging,
};
use tracing::{info, warn};

#[cfg(feature = "sink")]
use tablesieve_core::error::redact_database_url;
#[cfg(feature = "sink")]
use tablesieve_core::{SinkStatus, SqlSink, persist_clean_table};

#[derive(Parser)]
#[command(name = "tablesieve")]
#[command(about = "CSV data quality pipeline")]
#[command(version)]
#[command(long_about = "
tablesieve - validate, score and quarantine tabular data

Each run reads one CSV file and writes:
- clean_output_<ts>.csv   rows passing every rule and the anomaly check
- quarantine_<ts>.csv     failing rows with a failure_reason column
- report_<ts>.json        row counts and pass rate

EXAMPLES:
  tablesieve samples
  tablesieve init-rules
  tablesieve run data/samples/sample_customers.csv
  tablesieve run --reason-policy all --json orders.csv
  tablesieve run --database-url sqlite://quality.db?mode=rwc customers.csv
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline on one CSV file
    Run(RunArgs),
    /// Generate demo customer and order files
    Samples(SamplesArgs),
    /// Write a starter rule document
    InitRules(InitRulesArgs),
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,
}

#[derive(Args)]
struct RunArgs {
    /// CSV file to process
    input: PathBuf,

    /// Rule document
    #[arg(long, env = "TABLESIEVE_RULES", default_value = DEFAULT_RULES_PATH)]
    rules: PathBuf,

    /// Root directory for clean, quarantine and report artifacts
    #[arg(long, env = "TABLESIEVE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Expected share of anomalous rows (0.001 to 0.5)
    #[arg(long, default_value_t = DEFAULT_CONTAMINATION)]
    contamination: f64,

    /// Seed for the isolation forest
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Override the rule document's reason policy
    #[arg(long, value_enum)]
    reason_policy: Option<ReasonPolicyArg>,

    /// Skip isolation forest scoring
    #[arg(long)]
    disable_anomaly_detection: bool,

    /// Load clean rows into this database
    #[arg(
        long,
        env = "DATABASE_URL",
        help = "Database connection string for the clean table (credentials are redacted in logs)"
    )]
    database_url: Option<String>,

    /// Target table for the clean rows
    #[arg(long, default_value = "clean_data")]
    target_table: String,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SamplesArgs {
    /// Root directory for data artifacts
    #[arg(long, env = "TABLESIEVE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Output directory (defaults to `<data-dir>/samples`)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Number of customers
    #[arg(long, default_value_t = DEFAULT_CUSTOMERS)]
    customers: usize,

    /// Number of orders
    #[arg(long, default_value_t = DEFAULT_ORDERS)]
    orders: usize,

    /// Random seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
}

#[derive(Args)]
struct InitRulesArgs {
    /// Destination of the rule document
    #[arg(long, default_value = DEFAULT_RULES_PATH)]
    path: PathBuf,

    /// Replace an existing document
    #[arg(long)]
    force: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReasonPolicyArg {
    /// Record only the first failure per row
    First,
    /// Record every failure per row
    All,
}

impl From<ReasonPolicyArg> for ReasonPolicy {
    fn from(arg: ReasonPolicyArg) -> Self {
        match arg {
            ReasonPolicyArg::First => Self::First,
            ReasonPolicyArg::All => Self::All,
        }
    }
}

/// JSON document printed by `run --json`.
#[derive(Serialize)]
struct RunOutput<'a> {
    #[serde(flatten)]
    summary: &'a PipelineSummary,
    #[cfg(feature = "sink")]
    sink: SinkStatus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format.into())?;

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Samples(args) => generate_samples(&args),
        Command::InitRules(args) => init_rules(&args),
    }
}

fn pipeline_config(args: &RunArgs) -> PipelineConfig {
    let anomaly = AnomalyConfig::new()
        .with_enabled(!args.disable_anomaly_detection)
        .with_contamination(args.contamination)
        .with_seed(args.seed);
    let config = PipelineConfig::new()
        .with_data_dir(&args.data_dir)
        .with_rules_path(&args.rules)
        .with_anomaly(anomaly);
    match args.reason_policy {
        Some(policy) => config.with_reason_policy(policy.into()),
        None => config,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = pipeline_config(&args);
    let pipeline = Pipeline::new(config).context("Pipeline setup failed")?;
    let PipelineOutcome { summary, clean } = pipeline
        .run(&args.input)
        .with_context(|| format!("Pipeline run failed for {}", args.input.display()))?;

    #[cfg(feature = "sink")]
    let sink = load_sink(args.database_url.as_deref(), &clean, &args.target_table).await;
    #[cfg(not(feature = "sink"))]
    {
        let _ = &clean;
        if args.database_url.is_some() {
            warn!("Built without relational sink support, ignoring --database-url");
        }
    }

    if args.json {
        let output = RunOutput {
            summary: &summary,
            #[cfg(feature = "sink")]
            sink,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_summary(&summary);
        #[cfg(feature = "sink")]
        print_sink_status(&sink);
    }
    Ok(())
}

#[cfg(feature = "sink")]
async fn load_sink(
    database_url: Option<&str>,
    clean: &tablesieve_core::RecordTable,
    target: &str,
) -> SinkStatus {
    let Some(url) = database_url else {
        return SinkStatus::Skipped;
    };
    info!("Loading clean rows into {}", redact_database_url(url));
    match SqlSink::connect(url).await {
        Ok(sink) => {
            let status = persist_clean_table(&sink, clean, target).await;
            sink.close().await;
            status
        }
        Err(e) => {
            warn!("Relational sink unavailable: {}", e);
            SinkStatus::Failed {
                error: e.to_string(),
            }
        }
    }
}

fn print_summary(summary: &PipelineSummary) {
    println!("Input:       {} ({})", summary.input_path.display(), summary.encoding);
    println!(
        "Rows:        {} total, {} invalid, {} anomalous",
        summary.total_rows, summary.invalid_rows, summary.anomaly_rows
    );
    println!("Clean:       {} row(s) -> {}", summary.clean_rows, summary.clean_path.display());
    match &summary.quarantine_path {
        Some(path) => println!(
            "Quarantine:  {} row(s) -> {}",
            summary.quarantined_rows,
            path.display()
        ),
        None => println!("Quarantine:  none"),
    }
    println!("Report:      {}", summary.report_path.display());
    println!("Pass rate:   {:.2}%", summary.report.pass_rate_pct);
}

#[cfg(feature = "sink")]
fn print_sink_status(status: &SinkStatus) {
    match status {
        SinkStatus::Loaded { table, rows } => {
            println!("Database:    {} row(s) -> table '{}'", rows, table);
        }
        SinkStatus::Failed { error } => println!("Database:    load failed ({})", error),
        SinkStatus::Skipped => {}
    }
}

fn samples_dir(args: &SamplesArgs) -> PathBuf {
    args.out_dir
        .clone()
        .unwrap_or_else(|| ArtifactDirs::under(&args.data_dir).samples)
}

fn generate_samples(args: &SamplesArgs) -> anyhow::Result<()> {
    let files = write_samples(&samples_dir(args), args.customers, args.orders, args.seed)
        .context("Sample generation failed")?;
    println!("Customers:   {}", files.customers.display());
    println!("Orders:      {}", files.orders.display());
    Ok(())
}

fn init_rules(args: &InitRulesArgs) -> anyhow::Result<()> {
    write_starter_rules(&args.path, args.force)?;
    println!("Rules:       {}", args.path.display());
    Ok(())
}

fn write_starter_rules(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "Rule document {} already exists (use --force to replace it)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let yaml = RuleSet::starter().to_yaml()?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Starter rules written to {}", path.display());
    Ok(())
}
