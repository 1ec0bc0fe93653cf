//! toolchest - developer tool installer CLI
//!
//! The `toolchest` command resolves tool dependencies from a catalog,
//! installs them with bounded parallelism, and keeps a manifest so re-runs
//! only do the missing work.
//!
//! ## Commands
//!
//! - `install`: Install tools or bundles and their dependencies
//! - `plan`: Show the execution plan without installing
//! - `status`: Show manifest records for every tool
//! - `doctor`: Check installed binaries against the manifest and catalog
//! - `list`: List catalog tools and bundles
//! - `validate`: Load and validate the catalog

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use toolchest_core::{
    CancelHandle, DoctorReport, ExecutionPlan, InstallationOptions, NodeState, ProgressEvent,
    StatusEntry, ToolCatalog, Toolchest, ToolchestConfig,
};
use toolchest_state::RecordStatus;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "toolchest")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dependency-aware developer tool installer", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Command output format
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Catalog file (default: $TOOLCHEST_HOME/catalog.json)
    #[arg(long, global = true, env = "TOOLCHEST_CATALOG")]
    catalog: Option<PathBuf>,

    /// Manifest file (default: $TOOLCHEST_HOME/manifest.json)
    #[arg(long, global = true, env = "TOOLCHEST_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Directory binaries are installed into (default: $TOOLCHEST_HOME/bin)
    #[arg(long, global = true, env = "TOOLCHEST_INSTALL_DIR")]
    install_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Install tools or bundles, dependencies first
    Install {
        /// Tool or bundle ids
        #[arg(required = true)]
        targets: Vec<String>,

        #[command(flatten)]
        run: RunArgs,

        /// Resolve and print the plan; install nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what `install` would do
    Plan {
        /// Tool or bundle ids
        #[arg(required = true)]
        targets: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show manifest records for every catalog tool
    Status,

    /// Check installed binaries (all catalog tools when no ids are given)
    Doctor {
        /// Tool or bundle ids
        targets: Vec<String>,
    },

    /// List catalog tools and bundles
    List,

    /// Load the catalog and report whether it is valid
    Validate,
}

/// Options shared by `install` and `plan`.
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Maximum concurrent installs (default: number of CPUs)
    #[arg(short, long, env = "TOOLCHEST_JOBS")]
    jobs: Option<usize>,

    /// Reinstall tools that are already installed
    #[arg(long)]
    force: bool,

    /// Install only the named tools, not their dependencies
    #[arg(long)]
    skip_deps: bool,

    /// Start no new installs after the first failure
    #[arg(long)]
    stop_on_failure: bool,

    /// Skip tools whose last install failed (unless --force)
    #[arg(long)]
    no_retry_failed: bool,

    /// Per-install timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

impl RunArgs {
    fn options(&self, dry_run: bool) -> InstallationOptions {
        let mut options = InstallationOptions::default()
            .with_force(self.force)
            .with_skip_deps(self.skip_deps)
            .with_stop_on_failure(self.stop_on_failure)
            .with_retry_failed(!self.no_retry_failed)
            .with_dry_run(dry_run);
        if let Some(jobs) = self.jobs {
            options = options.with_parallelism(jobs);
        }
        if let Some(secs) = self.timeout {
            options = options.with_install_timeout(Duration::from_secs(secs));
        }
        options
    }
}

impl Cli {
    /// Environment layout with command-line overrides applied.
    fn config(&self) -> ToolchestConfig {
        let mut config = ToolchestConfig::from_env();
        if let Some(path) = &self.catalog {
            config.catalog_path = path.clone();
        }
        if let Some(path) = &self.manifest {
            config.manifest_path = path.clone();
        }
        if let Some(path) = &self.install_dir {
            config.install_dir = path.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    toolchest_core::telemetry::init_tracing(cli.json, level);

    let config = cli.config();
    let format = cli.format;
    let code = match cli.command {
        Commands::Install {
            targets,
            run,
            dry_run,
        } => cmd_install(open(&config)?, &targets, &run.options(dry_run), format).await?,
        Commands::Plan { targets, run } => {
            cmd_plan(&open(&config)?, &targets, &run.options(true), format).await?
        }
        Commands::Status => cmd_status(&open(&config)?, format).await?,
        Commands::Doctor { targets } => cmd_doctor(&open(&config)?, &targets, format).await?,
        Commands::List => cmd_list(&load_catalog(&config)?, format)?,
        Commands::Validate => cmd_validate(&config)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn open(config: &ToolchestConfig) -> Result<Toolchest> {
    Toolchest::from_config(config).with_context(|| {
        format!(
            "Failed to load catalog from {}",
            config.catalog_path.display()
        )
    })
}

fn load_catalog(config: &ToolchestConfig) -> Result<ToolCatalog> {
    ToolCatalog::load(&config.catalog_path).with_context(|| {
        format!(
            "Failed to load catalog from {}",
            config.catalog_path.display()
        )
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Install targets, printing progress to stderr while the run is live.
async fn cmd_install(
    toolchest: Toolchest,
    targets: &[String],
    options: &InstallationOptions,
    format: OutputFormat,
) -> Result<i32> {
    let printer = spawn_progress_printer(toolchest.subscribe(), format);

    let cancel = CancelHandle::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupted; stopping running installs");
                cancel.cancel();
            }
        }
    });

    let result = toolchest.install(targets, options, cancel.token()).await;
    ctrl_c.abort();

    // Dropping the last sender closes the bus; the printer drains and exits.
    drop(toolchest);
    let _ = printer.await;

    let summary = result.context("Install run aborted")?;
    info!(run_id = %summary.run_id, outcome = %summary.outcome, "install finished");
    match format {
        OutputFormat::Text => println!("{summary}"),
        OutputFormat::Json => print_json(&summary)?,
    }
    Ok(summary.exit_code())
}

fn spawn_progress_printer(
    mut rx: broadcast::Receiver<ProgressEvent>,
    format: OutputFormat,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = format_event(&event, format) {
                        eprintln!("{line}");
                    }
                }
                Err(RecvError::Lagged(n)) => eprintln!("({n} progress events dropped)"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// One progress line, or `None` for transitions not worth showing.
fn format_event(event: &ProgressEvent, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => serde_json::to_string(event).ok(),
        OutputFormat::Text if event.new_state == NodeState::Ready => None,
        OutputFormat::Text => {
            let mut line = format!(
                "[{}] {:<20} {}",
                event.timestamp.format("%H:%M:%S"),
                event.tool_id,
                event.new_state
            );
            if let Some(detail) = event.detail.as_deref().and_then(|d| d.lines().next()) {
                let _ = write!(line, " ({detail})");
            }
            Some(line)
        }
    }
}

/// Show the plan for `targets`.
async fn cmd_plan(
    toolchest: &Toolchest,
    targets: &[String],
    options: &InstallationOptions,
    format: OutputFormat,
) -> Result<i32> {
    let plan = toolchest.plan(targets, options).await?;
    match format {
        OutputFormat::Text => println!("{}", render_plan(&plan)),
        OutputFormat::Json => print_json(&plan)?,
    }
    Ok(0)
}

fn render_plan(plan: &ExecutionPlan) -> String {
    let mut out = format!(
        "plan {}: {} to install, {} already installed\n",
        plan.run_id,
        plan.len(),
        plan.pre_satisfied.len()
    );
    if plan.is_empty() {
        out.push_str("nothing to do\n");
    }
    for (n, layer) in plan.layers.iter().enumerate() {
        let _ = writeln!(out, "  layer {n}: {}", layer.join(", "));
    }
    if !plan.pre_satisfied.is_empty() {
        let _ = writeln!(out, "  already installed: {}", plan.pre_satisfied.join(", "));
    }
    out.trim_end().to_string()
}

/// Show manifest state per tool
async fn cmd_status(toolchest: &Toolchest, format: OutputFormat) -> Result<i32> {
    let entries = toolchest.status().await?;
    match format {
        OutputFormat::Text => println!("{}", render_status(&entries)),
        OutputFormat::Json => print_json(&entries)?,
    }
    Ok(0)
}

fn render_status(entries: &[StatusEntry]) -> String {
    let width = entries
        .iter()
        .map(|e| e.tool_id.len())
        .max()
        .unwrap_or(0)
        .max(4);
    let mut out = format!("{:<width$}  {:<10} {:<12} {:<16} WHEN\n", "TOOL", "STATUS", "VERSION", "METHOD");
    for entry in entries {
        match &entry.record {
            Some(rec) => {
                let version = if rec.status == RecordStatus::Installed {
                    rec.installed_version.as_str()
                } else {
                    "-"
                };
                let _ = write!(
                    out,
                    "{:<width$}  {:<10} {:<12} {:<16} {}",
                    entry.tool_id,
                    rec.status.to_string(),
                    version,
                    rec.method.to_string(),
                    rec.installed_at.format("%Y-%m-%d %H:%M:%S UTC"),
                );
            }
            None => {
                let _ = write!(out, "{:<width$}  {:<10}", entry.tool_id, "-");
            }
        }
        if !entry.in_catalog {
            out.push_str("  (not in catalog)");
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Run health checks
async fn cmd_doctor(toolchest: &Toolchest, targets: &[String], format: OutputFormat) -> Result<i32> {
    let report = toolchest.doctor(targets).await?;
    match format {
        OutputFormat::Text => println!("{}", render_doctor(&report)),
        OutputFormat::Json => print_json(&report)?,
    }
    Ok(report.exit_code())
}

fn render_doctor(report: &DoctorReport) -> String {
    let width = report
        .reports
        .iter()
        .map(|r| r.tool_id.len())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for r in &report.reports {
        let _ = writeln!(
            out,
            "{:<7}  {:<width$}  {}",
            r.status.to_string(),
            r.tool_id,
            r.detail
        );
    }
    let _ = write!(
        out,
        "{} pass, {} warning, {} fail, {} unknown",
        report.pass, report.warning, report.fail, report.unknown
    );
    out
}

#[derive(Serialize)]
struct ListOutput<'a> {
    tools: &'a [toolchest_core::ToolConfig],
    bundles: &'a [toolchest_core::BundleConfig],
}

/// List catalog contents
fn cmd_list(catalog: &ToolCatalog, format: OutputFormat) -> Result<i32> {
    match format {
        OutputFormat::Text => println!("{}", render_list(catalog)),
        OutputFormat::Json => print_json(&ListOutput {
            tools: catalog.tools(),
            bundles: catalog.bundles(),
        })?,
    }
    Ok(0)
}

fn render_list(catalog: &ToolCatalog) -> String {
    let width = catalog
        .tools()
        .iter()
        .map(|t| t.id.len())
        .max()
        .unwrap_or(0);
    let mut out = String::from("Tools:\n");
    for tool in catalog.tools() {
        let _ = write!(
            out,
            "  {:<width$}  {:<10} {:<16}",
            tool.id,
            tool.version,
            tool.method().to_string()
        );
        if !tool.dependencies.is_empty() {
            let _ = write!(out, " needs {}", tool.dependencies.join(", "));
        }
        out.push('\n');
    }
    if !catalog.bundles().is_empty() {
        out.push_str("Bundles:\n");
        for bundle in catalog.bundles() {
            let _ = writeln!(out, "  {}: {}", bundle.id, bundle.tools.join(", "));
        }
    }
    out.trim_end().to_string()
}

/// Validate the catalog; load errors propagate as a non-zero exit.
fn cmd_validate(config: &ToolchestConfig) -> Result<i32> {
    let catalog = load_catalog(config)?;
    println!(
        "{}: ok ({} tools, {} bundles)",
        config.catalog_path.display(),
        catalog.tools().len(),
        catalog.bundles().len()
    );
    Ok(0)
}
