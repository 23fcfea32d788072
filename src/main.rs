use aligner::{AlignedFrame, Aligner};
use analytics::{CumulativeDrift, DriftEngine, DriftSeries, PerformancePaths, TrackingReport};
use anyhow::{Context, Result, bail};
use chrono::{Days, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use configuration::settings::{Config, LoggingConfig};
use configuration::{load_config, load_config_from};
use core_types::{ConstraintKind, DateRange, Measure, ObjectiveKind, SeriesBasis, SolverKind, WeightVector};
use data_source::DataRouter;
use indicatif::{ProgressBar, ProgressStyle};
use optimizer::{OptimizationResult, SolveBudget, SolveStatus, WeightOptimizer};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Base level for the rebased performance paths.
const PERFORMANCE_BASE: f64 = 100.0;

/// The main entry point for the Parallax proxy-basket tracker.
#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; it only carries optional overrides.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => load_config().context("failed to load configuration")?,
    };
    let _guard = init_tracing(&config.logging)?;

    match cli.command {
        Commands::Correlate(args) => handle_correlate(args, config).await,
        Commands::Analyze(args) => handle_analyze(args, config).await,
        Commands::Optimize(args) => handle_optimize(args, config).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Tracks a target instrument with a weighted basket of proxies.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of ./parallax.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the correlation matrix of the target and its proxies.
    Correlate(SessionArgs),
    /// Report drift and tracking statistics for a given weight vector.
    Analyze(AnalyzeArgs),
    /// Solve for the proxy weights that track the target most closely.
    Optimize(OptimizeArgs),
}

#[derive(Args, Clone)]
struct SessionArgs {
    /// The symbol to track (e.g., "BTC-USD").
    #[arg(long)]
    target: String,

    /// Comma-separated proxy symbols (e.g., "MSTR,COIN,IBIT").
    #[arg(long, value_delimiter = ',', required = true)]
    proxies: Vec<String>,

    /// The first date of the window (format: YYYY-MM-DD). Defaults to one year before `--to`.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// The last date of the window (format: YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Comma-separated weights in proxy order. Defaults to equal weights.
    #[arg(long, value_delimiter = ',')]
    weights: Vec<f64>,

    /// Rescale the given weights to sum to one.
    #[arg(long)]
    normalize: bool,

    /// Number of trailing drift rows to print.
    #[arg(long, default_value_t = 10)]
    tail: usize,

    /// Basis for composites and drift, overriding the configuration.
    #[arg(long, value_enum)]
    drift_basis: Option<SeriesBasis>,
}

#[derive(Args)]
struct OptimizeArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Constraint set, overriding the configuration.
    #[arg(long, value_enum)]
    constraint: Option<ConstraintKind>,

    /// Objective to minimize, overriding the configuration.
    #[arg(long, value_enum)]
    objective: Option<ObjectiveKind>,

    /// Force the iterative solver even where a closed form exists.
    #[arg(long, value_enum)]
    solver: Option<SolverKind>,

    /// Stop the solve after this many milliseconds and report the best weights so far.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_correlate(args: SessionArgs, config: Config) -> Result<()> {
    let frame = load_frame(&args, &config).await?;
    let engine = DriftEngine::new(&frame, config.engine.clone());
    let matrix = engine.correlation_matrix();

    let mut table = new_table();
    let mut header = vec![Cell::new(format!("{:?}", matrix.basis).to_lowercase())];
    header.extend(matrix.symbols().iter().map(Cell::new));
    table.set_header(header);
    for (symbol, row) in matrix.symbols().iter().zip(matrix.values()) {
        let mut cells = vec![Cell::new(symbol)];
        cells.extend(row.iter().map(|m| Cell::new(format!("{:.3}", m))));
        table.add_row(cells);
    }

    println!("Correlation over {} aligned rows", frame.len());
    println!("{table}");
    Ok(())
}

async fn handle_analyze(args: AnalyzeArgs, mut config: Config) -> Result<()> {
    if let Some(basis) = args.drift_basis {
        config.engine.drift_basis = basis;
    }
    let weights = weights_from_args(&args.session.proxies, &args.weights, args.normalize)?;
    let frame = load_frame(&args.session, &config).await?;
    let engine = DriftEngine::new(&frame, config.engine.clone());
    let target = &args.session.target;

    let report = engine.report(target, &weights).context("failed to compute tracking report")?;
    let drift = engine.drift(target, &weights)?;
    let cone = CumulativeDrift::accumulate(&drift);
    let paths = engine.performance_paths(target, &weights, PERFORMANCE_BASE)?;

    println!("{}", weights_table(&weights));
    println!("{}", report_table(&report, &paths));
    println!("{}", drift_table(&drift, &cone, args.tail));
    Ok(())
}

async fn handle_optimize(args: OptimizeArgs, mut config: Config) -> Result<()> {
    if let Some(constraint) = args.constraint {
        config.optimizer.constraint = constraint;
    }
    if let Some(objective) = args.objective {
        config.optimizer.objective = objective;
    }
    if let Some(solver) = args.solver {
        config.optimizer.solver = solver;
    }

    let frame = load_frame(&args.session, &config).await?;
    let optimizer = WeightOptimizer::new(config.optimizer.clone(), config.engine.clone())?;

    let cancel = Arc::new(AtomicBool::new(false));
    let mut budget = SolveBudget::unlimited().with_cancel_flag(cancel.clone());
    if let Some(ms) = args.timeout_ms {
        budget = budget.with_timeout(Duration::from_millis(ms));
    }

    let spinner = spinner("Solving for proxy weights...")?;
    let target = args.session.target.clone();
    let proxies = args.session.proxies.clone();
    // The solve is CPU-bound; keep it off the async workers.
    let mut solve = tokio::task::spawn_blocking(move || {
        let proxy_refs: Vec<&str> = proxies.iter().map(String::as_str).collect();
        let result = optimizer.optimize_with_budget(&frame, &target, &proxy_refs, &budget);
        (frame, result)
    });

    let (frame, result) = tokio::select! {
        joined = &mut solve => joined?,
        _ = tokio::signal::ctrl_c() => {
            spinner.set_message("Cancelling...");
            cancel.store(true, Ordering::Relaxed);
            solve.await?
        }
    };
    spinner.finish_and_clear();
    let result = result.context("optimization failed")?;

    print_solution(&result);

    let engine = DriftEngine::new(&frame, config.engine.clone());
    let report = engine.report(&args.session.target, &result.weights)?;
    let paths = engine.performance_paths(&args.session.target, &result.weights, PERFORMANCE_BASE)?;
    println!("{}", report_table(&report, &paths));
    Ok(())
}

// ==============================================================================
// Shared Steps
// ==============================================================================

/// Fetches the target and proxies concurrently and aligns them.
async fn load_frame(args: &SessionArgs, config: &Config) -> Result<AlignedFrame> {
    let range = session_range(args)?;
    let router = DataRouter::from_config(&config.data_source).context("failed to set up data providers")?;

    let mut symbols = vec![args.target.clone()];
    symbols.extend(args.proxies.iter().cloned());

    let spinner = spinner(&format!(
        "Fetching {} series from {} to {}...",
        symbols.len(),
        range.start,
        range.end
    ))?;
    let results = router.fetch_all(&symbols, &range).await;
    spinner.finish_and_clear();

    let series = results
        .into_iter()
        .zip(&symbols)
        .map(|(result, symbol)| result.with_context(|| format!("failed to fetch {}", symbol)))
        .collect::<Result<Vec<_>>>()?;

    let frame = Aligner::new(config.alignment.clone())
        .align(&series, Some(&range))
        .context("failed to align price histories")?;
    info!(
        rows = frame.len(),
        symbols = symbols.len(),
        "Aligned price histories"
    );
    Ok(frame)
}

fn session_range(args: &SessionArgs) -> Result<DateRange> {
    let to = args.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = match args.from {
        Some(from) => from,
        None => to
            .checked_sub_days(Days::new(365))
            .context("default start date is out of range")?,
    };
    Ok(DateRange::new(from, to)?)
}

fn weights_from_args(proxies: &[String], weights: &[f64], normalize: bool) -> Result<WeightVector> {
    if weights.is_empty() {
        return Ok(WeightVector::equal(proxies)?);
    }
    if weights.len() != proxies.len() {
        bail!(
            "{} weights given for {} proxies",
            weights.len(),
            proxies.len()
        );
    }
    let vector = WeightVector::new(proxies.iter().cloned().zip(weights.iter().copied()))?;
    if normalize {
        Ok(vector.normalized()?)
    } else {
        Ok(vector)
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&logging.directory, &logging.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .context("failed to install the tracing subscriber")?;
    Ok(guard)
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

// ==============================================================================
// Output
// ==============================================================================

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn weights_table(weights: &WeightVector) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Proxy", "Weight"]);
    for (symbol, weight) in weights.iter() {
        table.add_row(vec![symbol.to_string(), format!("{:.4}", weight)]);
    }
    table.add_row(vec!["(sum)".to_string(), format!("{:.4}", weights.sum())]);
    table
}

fn report_table(report: &TrackingReport, paths: &PerformancePaths) -> Table {
    let final_level = |points: &[analytics::SeriesPoint]| {
        points.last().map(|p| p.value).unwrap_or(Measure::Undefined)
    };

    let mut table = new_table();
    table.set_header(vec!["Statistic", "Value"]);
    let rows = [
        ("Correlation (returns)", report.correlation, 4),
        ("Target volatility (ann.)", report.target_volatility, 4),
        ("Composite volatility (ann.)", report.composite_volatility, 4),
        ("Volatility spread", report.volatility_spread, 4),
        ("Tracking error (ann.)", report.tracking_error, 4),
        ("Tracking error (period)", report.period_tracking_error, 4),
        ("Final drift", report.final_drift, 4),
        ("Cumulative drift", report.cumulative_drift, 4),
        ("Cumulative squared drift", report.cumulative_squared_drift, 4),
        ("Max |drift|", report.max_abs_drift, 4),
        ("Target path", final_level(&paths.target), 2),
        ("Composite path", final_level(&paths.composite), 2),
    ];
    for (label, value, precision) in rows {
        table.add_row(vec![label.to_string(), format!("{:.*}", precision, value)]);
    }
    table.add_row(vec!["Observations".to_string(), report.observations.to_string()]);
    table
}

fn drift_table(drift: &DriftSeries, cone: &CumulativeDrift, tail: usize) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Timestamp", "Drift", "Cumulative", "Cumulative squared"]);
    let skip = drift.points.len().saturating_sub(tail);
    for (point, total) in drift.points.iter().zip(&cone.points).skip(skip) {
        table.add_row(vec![
            point.timestamp.format("%Y-%m-%d").to_string(),
            format!("{:.4}", point.value),
            format!("{:.4}", total.signed),
            format!("{:.4}", total.squared),
        ]);
    }
    table
}

fn print_solution(result: &OptimizationResult) {
    match result.status {
        SolveStatus::Converged => println!(
            "Converged via {} in {} iterations ({} = {:.6e}, violation {:.1e})",
            result.method, result.iterations, result.objective, result.objective_value, result.constraint_violation
        ),
        SolveStatus::Partial(reason) => {
            warn!(?reason, "Solve stopped early; weights are feasible but not optimal");
            println!(
                "PARTIAL result ({:?}) after {} iterations via {} ({} = {:.6e})",
                reason, result.iterations, result.method, result.objective, result.objective_value
            );
        }
    }
    for warning in &result.warnings {
        println!("warning: {}", warning);
    }
    println!("{}", weights_table(&result.weights));
}
