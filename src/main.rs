use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use soiling_analyzer::analysis;
use soiling_analyzer::config::AnalysisConfig;
use soiling_analyzer::models::CleaningEvent;
use soiling_analyzer::normalize::{self, RawTable};
use soiling_analyzer::report;

#[derive(Parser)]
#[command(name = "soiling-analyzer")]
#[command(about = "Solar panel soiling and cleaning interval analyzer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Light/temperature sensor CSV export
    #[arg(long)]
    sensor: PathBuf,
    /// Inverter generation CSV export
    #[arg(long)]
    generation: PathBuf,
    /// Text file with one cleaning date per line
    #[arg(long)]
    cleaning: Option<PathBuf>,
    /// TOML file with site constants
    #[arg(long)]
    config: Option<PathBuf>,
    /// System capacity in kWp
    #[arg(long)]
    capacity: Option<f64>,
    /// Light units per W/m²
    #[arg(long)]
    calibration: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis and write a report
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Also write the structured response as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Show how the two series line up without analysing them
    MergeCheck {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Export the daily PR trend as CSV
    Trend {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "trend.csv")]
        out: PathBuf,
    },
    /// Print the default configuration as TOML
    Config,
}

impl InputArgs {
    fn config(&self) -> anyhow::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };
        if let Some(capacity) = self.capacity {
            config.capacity_kwp = capacity;
        }
        if let Some(calibration) = self.calibration {
            config.light_to_irradiance = calibration;
        }
        Ok(config)
    }

    fn tables(&self) -> anyhow::Result<(RawTable, RawTable)> {
        Ok((read_table(&self.sensor)?, read_table(&self.generation)?))
    }

    fn cleaning_events(&self) -> anyhow::Result<Vec<CleaningEvent>> {
        match &self.cleaning {
            Some(path) => {
                let text = std::fs::read_to_string(path).with_context(|| {
                    format!("failed to read cleaning dates {}", path.display())
                })?;
                Ok(normalize::parse_cleaning_dates(&text))
            }
            None => Ok(Vec::new()),
        }
    }
}

fn read_table(path: &Path) -> anyhow::Result<RawTable> {
    RawTable::from_path(path).with_context(|| format!("failed to read {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { input, out, json } => {
            let config = input.config()?;
            let (sensor, generation) = input.tables()?;
            let events = input.cleaning_events()?;

            let response = analysis::analyze(&sensor, &generation, &events, &config);

            if let Some(path) = &json {
                let body = serde_json::to_string_pretty(&response)?;
                std::fs::write(path, body)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Structured response written to {}.", path.display());
            }

            let Some(report) = &response.report else {
                if let Some(diagnostics) = &response.diagnostics {
                    println!("{}", serde_json::to_string_pretty(diagnostics)?);
                }
                anyhow::bail!(
                    "analysis failed: {}",
                    response.message.as_deref().unwrap_or("unknown error")
                );
            };

            std::fs::write(&out, report::render_markdown(report))
                .with_context(|| format!("failed to write {}", out.display()))?;

            let degradation = &report.degradation;
            println!(
                "Soiling loss {:.2}% (PR {:.1}% -> {:.1}%), clean every {} days.",
                degradation.soiling_loss_index,
                degradation.baseline_pr * 100.0,
                degradation.current_pr * 100.0,
                degradation.recommended_interval_days
            );
            for line in &report.recommendations {
                println!("- {line}");
            }
            println!("Report written to {}.", out.display());
        }
        Commands::MergeCheck { input } => {
            let config = input.config()?;
            let (sensor, generation) = input.tables()?;
            let diagnostics = analysis::merge_check(&sensor, &generation, &config)?;

            println!("{}", serde_json::to_string_pretty(&diagnostics)?);
            println!("{}", diagnostics.cause_label());
        }
        Commands::Trend { input, out } => {
            let config = input.config()?;
            let (sensor, generation) = input.tables()?;
            let daily = analysis::daily_performance(&sensor, &generation, &config)?;

            let mut writer = csv::Writer::from_path(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let points = report::pr_trend(&daily);
            for point in &points {
                writer.serialize(point)?;
            }
            writer.flush()?;
            println!("Wrote {} trend points to {}.", points.len(), out.display());
        }
        Commands::Config => {
            print!("{}", AnalysisConfig::default().to_toml()?);
        }
    }

    Ok(())
}
