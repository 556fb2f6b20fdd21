//! renkolab CLI: Renko generation, analytics tables, signal evaluation and
//! backtesting over local CSV/JSON files.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use renkolab::{
    compute_feature_table, generate_renko, run_backtest, summarize_table, AnalyticsConfig,
    BacktestConfig, CancelToken, OhlcBar, RenkoOutput, ReportUnit, SessionSchedule, SignalDef,
    SizeScheduleEntry, SizingConfig, SizingMode, StopType, TargetType, WickMode,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "renkolab")]
#[command(about = "Renko brick engine, analytics and backtesting pipeline")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args, Debug, Clone)]
struct RenkoArgs {
    /// Sizing mode: "price" (fixed sizes) or "adr" (per-session scaling)
    #[arg(long, default_value = "price")]
    sizing_mode: String,

    /// Price-mode brick height
    #[arg(long, default_value = "0.0010")]
    brick_size: f64,

    /// Price-mode reversal threshold (>= brick size)
    #[arg(long, default_value = "0.0020")]
    reversal_size: f64,

    /// ADR-mode brick size as a percentage of ADR
    #[arg(long, default_value = "5.0")]
    brick_pct: f64,

    /// ADR-mode reversal size as a percentage of ADR
    #[arg(long, default_value = "10.0")]
    reversal_pct: f64,

    /// Rolling window (sessions) for ADR
    #[arg(long, default_value = "14")]
    adr_period: usize,

    /// Wick policy: "all", "big" or "none"
    #[arg(long, default_value = "all")]
    wick_mode: String,

    /// Optional JSON file with the per-weekday session schedule
    #[arg(long)]
    schedule: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
struct AnalyticsArgs {
    /// Fast EMA period
    #[arg(long, default_value = "20")]
    ma1_period: usize,

    /// Medium EMA period
    #[arg(long, default_value = "50")]
    ma2_period: usize,

    /// Slow EMA period
    #[arg(long, default_value = "200")]
    ma3_period: usize,

    /// Rolling window for the chop index
    #[arg(long, default_value = "20")]
    chop_period: usize,

    /// First SMA envelope period
    #[arg(long, default_value = "20")]
    smae1_period: usize,

    /// First SMA envelope deviation (percent)
    #[arg(long, default_value = "1.0")]
    smae1_deviation: f64,

    /// Second SMA envelope period
    #[arg(long, default_value = "50")]
    smae2_period: usize,

    /// Second SMA envelope deviation (percent)
    #[arg(long, default_value = "1.0")]
    smae2_deviation: f64,

    /// Sigma multipliers for the session-anchored bands
    #[arg(long, value_delimiter = ',', default_value = "1.0,2.0,2.5,3.0")]
    pwap_sigmas: Vec<f64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate Renko bricks from OHLC CSV
    Renko {
        /// Source OHLC CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV for the completed bricks
        #[arg(short, long)]
        output: PathBuf,

        /// Optional JSON output for the trailing pending brick
        #[arg(long)]
        pending: Option<PathBuf>,

        #[command(flatten)]
        renko: RenkoArgs,
    },

    /// Generate the full analytics feature table from OHLC CSV
    Stats {
        /// Source OHLC CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV for the feature table
        #[arg(short, long)]
        output: PathBuf,

        /// Optional JSON output for the distributional summary report
        #[arg(long)]
        summary: Option<PathBuf>,

        #[command(flatten)]
        renko: RenkoArgs,

        #[command(flatten)]
        analytics: AnalyticsArgs,
    },

    /// Run a batch of stats jobs from a JSON job file, in parallel
    Generate {
        /// JSON file with an array of jobs
        #[arg(short, long)]
        jobs: PathBuf,

        /// Directory for the output tables
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Distributional summary report from an existing feature table
    Summary {
        /// Feature table CSV
        #[arg(short, long)]
        table: PathBuf,

        /// Output JSON report
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Evaluate named predicate signals against a feature table
    Signals {
        /// Feature table CSV
        #[arg(short, long)]
        table: PathBuf,

        /// JSON file with [{name, expression}] signals
        #[arg(short, long)]
        signals: PathBuf,

        /// Output JSON with matching row indices per signal
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Backtest signals against a feature table
    Backtest {
        /// Feature table CSV
        #[arg(short, long)]
        table: PathBuf,

        /// JSON file with [{name, expression}] signals
        #[arg(short, long)]
        signals: PathBuf,

        /// Output JSON with trades and per-signal summaries
        #[arg(short, long)]
        output: PathBuf,

        /// Stop sizing: "rr" or "adr"
        #[arg(long, default_value = "rr")]
        stop_type: String,

        /// Stop distance in stop-type units
        #[arg(long, default_value = "1.0")]
        stop_value: f64,

        /// Target rule: "fixed_rr", "fixed_adr", "ma_trail" or "color_change"
        #[arg(long, default_value = "fixed_rr")]
        target_type: String,

        /// Target distance for the fixed target rules
        #[arg(long, default_value = "2.0")]
        target_value: f64,

        /// Which EMA (1-3) the ma_trail target follows
        #[arg(long, default_value = "1")]
        target_ma: u8,

        /// Unit for reported results: "rr" or "adr"
        #[arg(long, default_value = "rr")]
        report_unit: String,

        /// Skip entries while a trade is open (serialized mode)
        #[arg(long)]
        no_overlap: bool,
    },
}

/// One batch-generate job. Renko and analytics parameters default like the
/// single-shot subcommands.
#[derive(Debug, Clone, Deserialize)]
struct GenerateJob {
    /// Output file stem
    name: String,
    /// Source OHLC CSV
    input: PathBuf,
    #[serde(default)]
    renko: RenkoJobParams,
    #[serde(default)]
    analytics: AnalyticsConfig,
    #[serde(default)]
    session_schedule: Option<SessionSchedule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RenkoJobParams {
    sizing_mode: String,
    brick_size: f64,
    reversal_size: f64,
    brick_pct: f64,
    reversal_pct: f64,
    adr_period: usize,
    wick_mode: String,
}

impl Default for RenkoJobParams {
    fn default() -> Self {
        Self {
            sizing_mode: "price".to_string(),
            brick_size: 0.0010,
            reversal_size: 0.0020,
            brick_pct: 5.0,
            reversal_pct: 10.0,
            adr_period: 14,
            wick_mode: "all".to_string(),
        }
    }
}

impl RenkoJobParams {
    fn sizing(&self) -> Result<SizingConfig> {
        Ok(SizingConfig {
            sizing_mode: parse_sizing_mode(&self.sizing_mode)?,
            brick_size: self.brick_size,
            reversal_size: self.reversal_size,
            brick_pct: self.brick_pct,
            reversal_pct: self.reversal_pct,
            adr_period: self.adr_period,
        })
    }
}

#[derive(Debug, Serialize)]
struct JobResult {
    name: String,
    status: &'static str,
    rows: Option<usize>,
    filepath: Option<PathBuf>,
    error: Option<String>,
}

fn parse_wick_mode(s: &str) -> Result<WickMode> {
    match s {
        "all" => Ok(WickMode::All),
        "big" => Ok(WickMode::Big),
        "none" => Ok(WickMode::None),
        _ => bail!("unknown wick mode '{s}' (expected all, big or none)"),
    }
}

fn parse_sizing_mode(s: &str) -> Result<SizingMode> {
    match s {
        "price" => Ok(SizingMode::Price),
        "adr" => Ok(SizingMode::Adr),
        _ => bail!("unknown sizing mode '{s}' (expected price or adr)"),
    }
}

fn parse_stop_type(s: &str) -> Result<StopType> {
    match s {
        "rr" => Ok(StopType::Rr),
        "adr" => Ok(StopType::Adr),
        _ => bail!("unknown stop type '{s}' (expected rr or adr)"),
    }
}

fn parse_target_type(s: &str) -> Result<TargetType> {
    match s {
        "fixed_rr" => Ok(TargetType::FixedRr),
        "fixed_adr" => Ok(TargetType::FixedAdr),
        "ma_trail" => Ok(TargetType::MaTrail),
        "color_change" => Ok(TargetType::ColorChange),
        _ => bail!("unknown target type '{s}'"),
    }
}

fn parse_report_unit(s: &str) -> Result<ReportUnit> {
    match s {
        "rr" => Ok(ReportUnit::Rr),
        "adr" => Ok(ReportUnit::Adr),
        _ => bail!("unknown report unit '{s}' (expected rr or adr)"),
    }
}

fn load_schedule(path: Option<&Path>) -> Result<SessionSchedule> {
    match path {
        Some(path) => renkolab::io::read_json(path),
        None => Ok(SessionSchedule::default()),
    }
}

/// Build the size schedule and run the Renko engine.
fn build_renko(
    bars: &[OhlcBar],
    sizing: &SizingConfig,
    wick_mode: WickMode,
    schedule: &SessionSchedule,
) -> Result<(RenkoOutput, Vec<SizeScheduleEntry>)> {
    let size_schedule = sizing.build_schedule(bars, schedule)?;
    let output = generate_renko(bars, &size_schedule, wick_mode, &CancelToken::new())?;
    Ok((output, size_schedule))
}

fn run_renko(
    input: &Path,
    output: &Path,
    pending: Option<&Path>,
    renko: &RenkoArgs,
) -> Result<()> {
    let bars = renkolab::io::read_ohlc_csv(input)?;
    let schedule = load_schedule(renko.schedule.as_deref())?;
    let wick_mode = parse_wick_mode(&renko.wick_mode)?;
    let sizing = SizingConfig {
        sizing_mode: parse_sizing_mode(&renko.sizing_mode)?,
        brick_size: renko.brick_size,
        reversal_size: renko.reversal_size,
        brick_pct: renko.brick_pct,
        reversal_pct: renko.reversal_pct,
        adr_period: renko.adr_period,
    };
    let (result, _) = build_renko(&bars, &sizing, wick_mode, &schedule)?;

    renkolab::io::write_bricks_csv(output, &result.bricks)?;
    info!(
        "wrote {} bricks to {:?} (pending: {})",
        result.bricks.len(),
        output,
        result.pending.is_some()
    );
    if let Some(pending_path) = pending {
        renkolab::io::write_json(pending_path, &result.pending)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_stats_job(
    bars: &[OhlcBar],
    renko_params: &RenkoJobParams,
    analytics: &AnalyticsConfig,
    schedule: &SessionSchedule,
    output: &Path,
    summary_out: Option<&Path>,
) -> Result<usize> {
    let wick_mode = parse_wick_mode(&renko_params.wick_mode)?;
    let sizing = renko_params.sizing()?;
    let mut analytics = analytics.clone();
    if sizing.sizing_mode == SizingMode::Adr {
        analytics.adr_period = sizing.adr_period;
    }

    let (result, _) = build_renko(bars, &sizing, wick_mode, schedule)?;

    let table = compute_feature_table(
        &result.bricks,
        bars,
        schedule,
        wick_mode,
        &analytics,
        &CancelToken::new(),
    )?;
    renkolab::io::write_table_csv(output, &table)?;

    if let Some(summary_path) = summary_out {
        let report = summarize_table(&table);
        renkolab::io::write_json(summary_path, &report)?;
    }
    Ok(table.len())
}

fn run_generate(jobs_path: &Path, output_dir: &Path) -> Result<()> {
    let jobs: Vec<GenerateJob> = renkolab::io::read_json(jobs_path)?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {output_dir:?}"))?;

    let results: Vec<JobResult> = jobs
        .par_iter()
        .map(|job| {
            let output = output_dir.join(format!("{}.csv", job.name));
            let schedule = job.session_schedule.unwrap_or_default();
            let run = || -> Result<usize> {
                let bars = renkolab::io::read_ohlc_csv(&job.input)?;
                run_stats_job(&bars, &job.renko, &job.analytics, &schedule, &output, None)
            };
            match run() {
                Ok(rows) => {
                    info!("job {} finished: {} rows", job.name, rows);
                    JobResult {
                        name: job.name.clone(),
                        status: "success",
                        rows: Some(rows),
                        filepath: Some(output),
                        error: None,
                    }
                }
                Err(e) => {
                    error!("job {} failed: {e:#}", job.name);
                    JobResult {
                        name: job.name.clone(),
                        status: "error",
                        rows: None,
                        filepath: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            }
        })
        .collect();

    let succeeded = results.iter().filter(|r| r.status == "success").count();
    info!("{succeeded}/{} jobs succeeded", results.len());
    renkolab::io::write_json(&output_dir.join("results.json"), &results)?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("renkolab=info"))
    };
    fmt().with_env_filter(filter).init();

    match args.command {
        Commands::Renko { input, output, pending, renko } => {
            run_renko(&input, &output, pending.as_deref(), &renko)?;
        }
        Commands::Stats { input, output, summary, renko, analytics } => {
            let bars = renkolab::io::read_ohlc_csv(&input)?;
            let schedule = load_schedule(renko.schedule.as_deref())?;
            let params = RenkoJobParams {
                sizing_mode: renko.sizing_mode.clone(),
                brick_size: renko.brick_size,
                reversal_size: renko.reversal_size,
                brick_pct: renko.brick_pct,
                reversal_pct: renko.reversal_pct,
                adr_period: renko.adr_period,
                wick_mode: renko.wick_mode.clone(),
            };
            let config = AnalyticsConfig {
                adr_period: renko.adr_period,
                ma1_period: analytics.ma1_period,
                ma2_period: analytics.ma2_period,
                ma3_period: analytics.ma3_period,
                chop_period: analytics.chop_period,
                smae1_period: analytics.smae1_period,
                smae1_deviation: analytics.smae1_deviation,
                smae2_period: analytics.smae2_period,
                smae2_deviation: analytics.smae2_deviation,
                pwap_sigmas: analytics.pwap_sigmas.clone(),
            };
            let rows = run_stats_job(
                &bars,
                &params,
                &config,
                &schedule,
                &output,
                summary.as_deref(),
            )?;
            info!("wrote {rows} analytics rows to {output:?}");
        }
        Commands::Generate { jobs, output_dir } => {
            run_generate(&jobs, &output_dir)?;
        }
        Commands::Summary { table, output } => {
            let table = renkolab::io::read_table_csv(&table)?;
            let report = summarize_table(&table);
            renkolab::io::write_json(&output, &report)?;
            info!("wrote summary for {} bars to {output:?}", report.total_bars);
        }
        Commands::Signals { table, signals, output } => {
            let table = renkolab::io::read_table_csv(&table)?;
            let signals: Vec<SignalDef> = renkolab::io::read_json(&signals)?;
            let matches = renkolab::evaluate_signals(&table, &signals);
            for (name, message) in &matches.errors {
                error!("signal {name}: {message}");
            }
            renkolab::io::write_json(&output, &matches)?;
            info!("evaluated {} signals to {output:?}", signals.len());
        }
        Commands::Backtest {
            table,
            signals,
            output,
            stop_type,
            stop_value,
            target_type,
            target_value,
            target_ma,
            report_unit,
            no_overlap,
        } => {
            let table = renkolab::io::read_table_csv(&table)?;
            let signals: Vec<SignalDef> = renkolab::io::read_json(&signals)?;
            let config = BacktestConfig {
                stop_type: parse_stop_type(&stop_type)?,
                stop_value,
                target_type: parse_target_type(&target_type)?,
                target_value,
                target_ma,
                report_unit: parse_report_unit(&report_unit)?,
                allow_overlap: !no_overlap,
            };
            let report = run_backtest(&table, &signals, &config)?;
            for (name, message) in &report.errors {
                error!("signal {name}: {message}");
            }
            renkolab::io::write_json(&output, &report)?;
            let total_trades: usize = report.signals.values().map(|s| s.trades.len()).sum();
            info!("backtested {total_trades} trades to {output:?}");
        }
    }

    Ok(())
}
