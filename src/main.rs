mod config;
mod data;
mod output;
mod pipeline;
mod processing;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use config::{Config, EnvConfig, OutputConfig};
use data::entsoe_api::CancelSignal;
use output::writer::{ArtifactKind, ArtifactWriter};
use pipeline::{Pipeline, Processor};

#[derive(Parser, Debug)]
#[command(name = "entsoe-da-prices", version, about = "Day-ahead electricity prices from the ENTSO-E transparency platform")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Output directory (overrides [output].directory)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download prices for a market area and derive the CSV tables
    Fetch(FetchArgs),
    /// Derive the CSV tables from a previously downloaded XML document
    Process(ProcessArgs),
    /// List configured market areas
    Areas,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Market area code, e.g. FR or IT-North
    #[arg(short, long)]
    area: String,

    /// First delivery day (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last delivery day (YYYY-MM-DD), inclusive
    #[arg(long)]
    end: NaiveDate,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Market area the document was fetched for
    #[arg(short, long)]
    area: String,

    /// Publication document to process
    #[arg(long)]
    xml: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("entsoe_da_prices=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(dir) = &cli.output {
        config.output.directory = dir.display().to_string();
    }

    match cli.command {
        Command::Fetch(args) => run_fetch(&config, args).await,
        Command::Process(args) => run_process(&config, args),
        Command::Areas => {
            let processor = Processor::from_config(&config)?;
            let areas = processor.areas();
            for code in areas.codes() {
                let area = areas.resolve(code)?;
                println!(
                    "{:<10} {:<18} {:<18} {}",
                    area.code,
                    area.eic,
                    area.timezone.name(),
                    area.name.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        tracing::info!("Loading configuration from {}", path.display());
        Config::load(&path.display().to_string())
    } else {
        tracing::info!("{} not found, using built-in defaults", path.display());
        Ok(Config::default())
    }
}

async fn run_fetch(config: &Config, args: FetchArgs) -> Result<()> {
    let env = EnvConfig::load()?;
    let pipeline = Pipeline::from_config(config, &env)?;

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling fetch...");
            on_interrupt.cancel();
        }
    });

    tracing::info!("Fetching {} prices for {}..={}", args.area, args.start, args.end);
    let document = pipeline.fetch(&args.area, args.start, args.end, &cancel).await?;
    tracing::info!("Fetched {} series in {} pages", document.stats.kept, document.stats.pages);

    let artifacts = Artifacts {
        area: &args.area,
        range: Some((args.start, args.end)),
        xml_name: Some(document.file_name.as_str()),
    };
    emit(pipeline.processor(), &config.output, artifacts, &document.xml)
}

fn run_process(config: &Config, args: ProcessArgs) -> Result<()> {
    let xml = std::fs::read(&args.xml)
        .with_context(|| format!("Failed to read {}", args.xml.display()))?;

    let processor = Processor::from_config(config)?;
    let artifacts = Artifacts {
        area: &args.area,
        range: None,
        xml_name: None,
    };
    emit(&processor, &config.output, artifacts, &xml)
}

/// Naming inputs for one run's output files.
struct Artifacts<'a> {
    area: &'a str,
    /// Without a range the names use the first and last day with prices.
    range: Option<(NaiveDate, NaiveDate)>,
    /// Name the fetcher already chose for the merged document.
    xml_name: Option<&'a str>,
}

/// Run the offline stages and write every enabled artifact.
fn emit(processor: &Processor, output: &OutputConfig, artifacts: Artifacts<'_>, xml: &[u8]) -> Result<()> {
    let area = artifacts.area;
    let mtu = processor.to_mtu(area, xml)?;
    let hourly = processor.to_hourly(&mtu.csv)?;
    let stats = processor.daily_stats(&hourly.csv)?;
    let (start, end) = artifacts
        .range
        .unwrap_or((stats.summary.start_date, stats.summary.end_date));

    let writer = ArtifactWriter::new(&output.directory)?;
    let files = [
        (ArtifactKind::Xml, xml),
        (ArtifactKind::MtuCsv, mtu.csv.as_slice()),
        (ArtifactKind::HourlyCsv, hourly.csv.as_slice()),
        (ArtifactKind::DailyStatsCsv, stats.csv.as_slice()),
    ];
    for (kind, bytes) in files {
        if !kind.enabled(output) {
            continue;
        }
        let name = match (kind, artifacts.xml_name) {
            (ArtifactKind::Xml, Some(name)) => name.to_string(),
            _ => kind.file_name(area, start, end),
        };
        writer.write(&name, bytes)?;
    }

    let warnings = mtu.warnings.len() + hourly.warnings.len();
    if warnings > 0 {
        tracing::warn!("{} data quality warnings, affected rows are marked in the output", warnings);
    }

    println!("{}", serde_json::to_string_pretty(&stats.summary)?);
    Ok(())
}
