use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use colored::*;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::{error, info, warn};

use vo2lab::error::ErrorSeverity;
use vo2lab::export::fixed;
use vo2lab::export::json::export_json;
use vo2lab::{
    init_logging, AppConfig, EnduranceMetrics, EnduranceStage, MetricsEngine, Participant,
    PhaseInput, PhaseRecords, ReportExporter, RunningEconomyStage, SessionReport, SimpleStage,
    Vo2LabError,
};

/// vo2lab - VO2 test session recorder
///
/// Records the stages of a simple VO2, running-economy or VO2max test for one
/// participant, prints the derived metrics and writes the stage table as CSV.
#[derive(Parser)]
#[command(name = "vo2lab")]
#[command(author = "vo2lab Contributors")]
#[command(version)]
#[command(about = "VO2 test session recorder", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a simple minute-by-minute VO2 test
    Simple {
        #[command(flatten)]
        session: SessionArgs,

        /// VO2 per minute in ml/kg/min, comma separated
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        vo2: Vec<Decimal>,
    },

    /// Record a running-economy test (speed stages)
    RunningEconomy {
        #[command(flatten)]
        session: SessionArgs,

        /// Treadmill speed per stage in km/h
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        speed: Vec<Decimal>,

        /// VO2 per stage in ml/kg/min
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        vo2: Vec<Decimal>,

        /// Heart rate per stage in bpm
        #[arg(long = "hr", value_delimiter = ',', allow_hyphen_values = true, required = true)]
        heart_rate: Vec<i32>,

        /// Perceived exertion per stage (Borg 6-20)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        rpe: Vec<i32>,
    },

    /// Record an endurance / VO2max test (gradient stages)
    Endurance {
        #[command(flatten)]
        session: SessionArgs,

        /// Treadmill gradient per stage in percent
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        gradient: Vec<Decimal>,

        /// VO2 per stage in ml/kg/min
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        vo2: Vec<Decimal>,

        /// Heart rate per stage in bpm
        #[arg(long = "hr", value_delimiter = ',', allow_hyphen_values = true, required = true)]
        heart_rate: Vec<i32>,

        /// Perceived exertion per stage (Borg 6-20)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        rpe: Vec<i32>,
    },

    /// Configure application settings
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// List all configuration options
        #[arg(short, long)]
        list: bool,
    },
}

/// Participant details and output options shared by every test phase
#[derive(Args)]
struct SessionArgs {
    /// Participant number or code
    #[arg(short, long)]
    participant: String,

    /// Researcher running the test
    #[arg(short, long, default_value = "")]
    researcher: String,

    /// Test date (YYYY-MM-DD), defaults to today
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Participant age in years
    #[arg(short, long)]
    age: u16,

    /// Declared number of stages, defaults to the number of values given
    #[arg(short = 'n', long)]
    stages: Option<u32>,

    /// Directory for the CSV export (overrides the config)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Skip writing the CSV export
    #[arg(long)]
    no_export: bool,

    /// Write a JSON session report to this path
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Render the VO2 curve as SVG (needs the `charts` feature)
    #[arg(long, value_name = "FILE")]
    chart: Option<PathBuf>,
}

impl SessionArgs {
    fn stage_count(&self, values: usize) -> u32 {
        self.stages
            .unwrap_or_else(|| u32::try_from(values).unwrap_or(u32::MAX))
    }

    fn participant(&self) -> Participant {
        Participant::new(
            self.participant.as_str(),
            self.researcher.as_str(),
            self.date.unwrap_or_else(|| Local::now().date_naive()),
            self.age,
        )
    }
}

#[derive(Tabled)]
struct SimpleTableRow {
    #[tabled(rename = "Minute")]
    minute: u8,
    #[tabled(rename = "VO2 (ml/kg/min)")]
    vo2: String,
}

#[derive(Tabled)]
struct RunningEconomyTableRow {
    #[tabled(rename = "Stage")]
    stage: u8,
    #[tabled(rename = "Speed (km/h)")]
    speed: String,
    #[tabled(rename = "VO2 (ml/kg/min)")]
    vo2: String,
    #[tabled(rename = "HR (bpm)")]
    heart_rate: u16,
    #[tabled(rename = "RPE")]
    rpe: u8,
}

#[derive(Tabled)]
struct EnduranceTableRow {
    #[tabled(rename = "Stage")]
    stage: u8,
    #[tabled(rename = "Gradient (%)")]
    gradient: String,
    #[tabled(rename = "VO2 (ml/kg/min)")]
    vo2: String,
    #[tabled(rename = "HR (bpm)")]
    heart_rate: u16,
    #[tabled(rename = "RPE")]
    rpe: u8,
    #[tabled(rename = "%HRmax")]
    percent_hr_max: String,
    #[tabled(rename = "Above threshold")]
    exceeds_threshold: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match (&cli.command, &cli.config) {
        (Commands::Config { init: true, .. }, _) => AppConfig::default(),
        (_, Some(path)) => AppConfig::load_from_file(path)?,
        (_, None) => AppConfig::load_or_default(),
    };

    init_logging(&config.logging.clone().with_verbosity(cli.verbose))
        .context("Failed to initialize logging")?;

    match cli.command {
        Commands::Simple { session, vo2 } => {
            let stages = session.stage_count(vo2.len());
            run_phase(&config, &session, stages, PhaseInput::Simple { vo2 })
        }

        Commands::RunningEconomy {
            session,
            speed,
            vo2,
            heart_rate,
            rpe,
        } => {
            let stages = session.stage_count(vo2.len());
            let input = PhaseInput::RunningEconomy {
                speed_kmh: speed,
                vo2,
                heart_rate,
                rpe,
            };
            run_phase(&config, &session, stages, input)
        }

        Commands::Endurance {
            session,
            gradient,
            vo2,
            heart_rate,
            rpe,
        } => {
            let stages = session.stage_count(vo2.len());
            let input = PhaseInput::Endurance {
                gradient_pct: gradient,
                vo2,
                heart_rate,
                rpe,
            };
            run_phase(&config, &session, stages, input)
        }

        Commands::Config { init, list } => handle_config(&config, cli.config, init, list),
    }
}

fn run_phase(config: &AppConfig, args: &SessionArgs, stages: u32, input: PhaseInput) -> Result<()> {
    let phase = input.phase();
    let mut session = config.new_session(args.participant());

    println!("{}", format!("Recording {}...", phase).green().bold());

    if let Err(e) = session.record_phase(stages, input) {
        return Err(rejected(e, format!("{} submission rejected", phase)));
    }

    let engine = config.metrics_engine()?;
    let records = session
        .phase(phase)
        .with_context(|| format!("{} missing after recording", phase))?;

    let derived = match records {
        PhaseRecords::Endurance(stages) => {
            let metrics = engine
                .endurance_for_participant(stages, session.participant())
                .map_err(|e| rejected(e, format!("{} metrics failed", phase)))?;
            Some(metrics)
        }
        _ => None,
    };

    println!("{}", stage_table(records, derived.as_ref()));
    print_summary(records, derived.as_ref(), &engine)
        .map_err(|e| rejected(e, format!("{} summary failed", phase)))?;

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.export.output_dir.clone());

    if !args.no_export {
        let artifact =
            ReportExporter::export_phase(records, derived.as_ref(), &session.participant().id)?;
        let path = artifact.write_to_dir(&output_dir)?;
        println!("{} {}", "✓ Exported".green(), path.display());
    }

    if let Some(report_path) = &args.report {
        let report = SessionReport::build(&session, &engine)?;
        export_json(&report, report_path)?;
        println!("{} {}", "✓ Report written".green(), report_path.display());
    } else if config.export.write_session_report && !args.no_export {
        let path = SessionReport::build(&session, &engine)?
            .to_artifact()?
            .write_to_dir(&output_dir)?;
        println!("{} {}", "✓ Report written".green(), path.display());
    }

    if let Some(chart_path) = &args.chart {
        render_chart(chart_path, records)?;
        println!("{} {}", "✓ Chart rendered".green(), chart_path.display());
    }

    info!(session = %session.session_id(), phase = %phase, "Phase processed");
    Ok(())
}

fn stage_table(records: &PhaseRecords, derived: Option<&EnduranceMetrics>) -> String {
    let mut table = match (records, derived) {
        (PhaseRecords::Simple(rows), _) => Table::new(rows.iter().map(simple_row)),
        (PhaseRecords::RunningEconomy(rows), _) => Table::new(rows.iter().map(running_economy_row)),
        (PhaseRecords::Endurance(_), Some(metrics)) => Table::new(metrics.rows.iter().map(|row| {
            EnduranceTableRow {
                percent_hr_max: fixed(row.percent_hr_max, 2),
                exceeds_threshold: if row.exceeds_threshold {
                    "yes".to_string()
                } else {
                    "no".to_string()
                },
                ..endurance_row(&row.record)
            }
        })),
        (PhaseRecords::Endurance(rows), None) => Table::new(rows.iter().map(endurance_row)),
    };

    table.with(Style::rounded()).to_string()
}

fn simple_row(record: &SimpleStage) -> SimpleTableRow {
    SimpleTableRow {
        minute: record.stage,
        vo2: fixed(record.vo2, 1),
    }
}

fn running_economy_row(record: &RunningEconomyStage) -> RunningEconomyTableRow {
    RunningEconomyTableRow {
        stage: record.stage,
        speed: fixed(record.speed_kmh, 1),
        vo2: fixed(record.vo2, 1),
        heart_rate: record.heart_rate,
        rpe: record.rpe,
    }
}

fn endurance_row(record: &EnduranceStage) -> EnduranceTableRow {
    EnduranceTableRow {
        stage: record.stage,
        gradient: fixed(record.gradient_pct, 1),
        vo2: fixed(record.vo2, 1),
        heart_rate: record.heart_rate,
        rpe: record.rpe,
        percent_hr_max: "-".to_string(),
        exceeds_threshold: "-".to_string(),
    }
}

fn print_summary(
    records: &PhaseRecords,
    derived: Option<&EnduranceMetrics>,
    engine: &MetricsEngine,
) -> vo2lab::Result<()> {
    let lines = summary_lines(records, derived, engine)?;

    if let Some((headline, rest)) = lines.split_first() {
        println!("{}", headline.cyan().bold());
        for line in rest {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Summary text, headline (VO2max) first
fn summary_lines(
    records: &PhaseRecords,
    derived: Option<&EnduranceMetrics>,
    engine: &MetricsEngine,
) -> vo2lab::Result<Vec<String>> {
    let summary = MetricsEngine::summarize_phase(records)?;

    let mut lines = vec![
        format!("VO₂max: {} ml/kg/min", fixed(summary.max, 2)),
        format!("Average VO₂: {} ml/kg/min", fixed(summary.mean, 2)),
        format!("Reached at stage {}", summary.max_stage),
    ];

    if let Some(metrics) = derived {
        lines.push(format!(
            "Predicted HRmax: {} bpm ({})",
            fixed(metrics.predicted_hr_max, 0),
            engine.hr_max_formula()
        ));

        let flagged = metrics.flagged_stages();
        if flagged > 0 {
            lines.push(format!(
                "{} stage(s) above {}% HRmax",
                flagged,
                metrics.threshold_percent.normalize()
            ));
        }
    }

    Ok(lines)
}

/// Report a failed step to the user and log it at its severity
fn rejected(e: Vo2LabError, step: String) -> anyhow::Error {
    match e.severity() {
        ErrorSeverity::Warning => warn!(error = %e, "{}", step),
        ErrorSeverity::Error => error!(error = %e, "{}", step),
    }

    eprintln!("{} {}", "✗".red().bold(), e.user_message().red());
    if e.is_retryable() {
        eprintln!("{}", "Correct the values and run the command again.".dimmed());
    }

    anyhow::Error::new(e).context(step)
}

#[cfg(feature = "charts")]
fn render_chart(path: &Path, records: &PhaseRecords) -> Result<()> {
    use vo2lab::chart::{render_svg, vo2_series};

    let series = match records {
        PhaseRecords::Simple(rows) => vo2_series(rows),
        PhaseRecords::RunningEconomy(rows) => vo2_series(rows),
        PhaseRecords::Endurance(rows) => vo2_series(rows),
    };

    render_svg(&series, path)?;
    Ok(())
}

#[cfg(not(feature = "charts"))]
fn render_chart(_path: &Path, _records: &PhaseRecords) -> Result<()> {
    bail!("Chart output needs vo2lab built with the `charts` feature")
}

fn handle_config(config: &AppConfig, path: Option<PathBuf>, init: bool, list: bool) -> Result<()> {
    let path = path.unwrap_or_else(AppConfig::default_config_path);

    if init {
        if path.exists() {
            bail!("Config file already exists: {}", path.display());
        }

        AppConfig::default().save_to_file(&path)?;
        println!("{} {}", "✓ Config written".green(), path.display());
    }

    if list || !init {
        println!("{}", format!("# {}", path.display()).dimmed());
        let content =
            toml::to_string_pretty(config).context("Failed to serialize configuration")?;
        println!("{}", content);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_summary_headline_is_vo2max() {
        let records = PhaseRecords::Simple(vec![
            SimpleStage { stage: 1, vo2: dec!(10) },
            SimpleStage { stage: 2, vo2: dec!(30) },
            SimpleStage { stage: 3, vo2: dec!(20) },
        ]);

        let lines = summary_lines(&records, None, &MetricsEngine::default()).unwrap();
        assert_eq!(lines[0], "VO₂max: 30.00 ml/kg/min");
        assert_eq!(lines[1], "Average VO₂: 20.00 ml/kg/min");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_endurance_summary_lines() {
        let stages = vec![
            EnduranceStage {
                stage: 1,
                gradient_pct: dec!(0),
                vo2: dec!(41.2),
                heart_rate: 171,
                rpe: 14,
            },
            EnduranceStage {
                stage: 2,
                gradient_pct: dec!(2),
                vo2: dec!(48.6),
                heart_rate: 182,
                rpe: 18,
            },
        ];
        let engine = MetricsEngine::default();
        let metrics = engine.compute_endurance_metrics(&stages, dec!(190)).unwrap();

        let lines =
            summary_lines(&PhaseRecords::Endurance(stages), Some(&metrics), &engine).unwrap();
        assert_eq!(lines[0], "VO₂max: 48.60 ml/kg/min");
        assert_eq!(lines[3], "Predicted HRmax: 190 bpm (220 - age)");
        assert_eq!(lines[4], "1 stage(s) above 90% HRmax");
    }
}
