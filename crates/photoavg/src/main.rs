//! photoavg: average dated photographs into day, month, and year
//! composites.
//!
//! Discovers the JPEG files below an input directory, reads their
//! capture metadata with `exiftool`, buckets them by date, and writes
//! one contrast-stretched average per bucket. Existing composites are
//! never regenerated, so the tool can be rerun after every new photo.
//!
//! # Usage
//!
//! ```text
//! photoavg -i <IMAGE_PATH> -o <OUTPUT_PATH> [OPTIONS]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use photoavg_io::{Averager, AveragerConfig, CacheConfig, CommandPublisher, ExifTool, RunReport};
use photoavg_pipeline::{CombinationMode, Credits, Granularity};
use tracing_subscriber::EnvFilter;

/// Average dated photographs into day, month, and year composites.
#[derive(Parser)]
#[command(name = "photoavg", version)]
struct Cli {
    /// Directory of images to process (searched recursively).
    #[arg(short = 'i', long)]
    image_path: PathBuf,

    /// Directory where composites are written.
    #[arg(short = 'o', long)]
    output_path: PathBuf,

    /// How images of different sizes are combined.
    #[arg(short = 'c', long, value_enum, default_value_t = Method::Crop)]
    combination_method: Method,

    /// Keyword prefix marking a grouping date, e.g. `faceit365:date=`.
    ///
    /// An image with exactly one keyword containing this prefix is
    /// grouped by the `YYYYMMDD` date following it instead of its
    /// capture date.
    #[arg(short = 't', long)]
    grouping_tag: Option<String>,

    /// Author recorded on every composite.
    #[arg(short = 'a', long, default_value = "")]
    author: String,

    /// Copyright notice recorded on every composite.
    #[arg(long, default_value = photoavg_io::averager::DEFAULT_COPYRIGHT)]
    copyright: String,

    /// Granularities to average, in day, month, year order.
    #[arg(short = 'g', long, value_enum, default_values_t = [Level::Day, Level::Month, Level::Year])]
    granularity: Vec<Level>,

    /// Disable the monthly and yearly composite cache.
    #[arg(long)]
    no_cache: bool,

    /// Cache directory.
    #[arg(long, default_value = photoavg_io::averager::DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Cache entries kept per granularity.
    #[arg(long, default_value_t = photoavg_io::cache::DEFAULT_RETENTION, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    cache_size: usize,

    /// Do not write metadata to the composites.
    #[arg(long)]
    no_metadata: bool,

    /// Command run for every published composite as
    /// `<command> <path> <title>`.
    #[arg(long)]
    publish_command: Option<String>,

    /// Granularities handed to the publish command.
    #[arg(long, value_enum, default_values_t = [Level::Day])]
    publish_granularity: Vec<Level>,

    /// Print run reports as JSON instead of summaries.
    #[arg(long)]
    json: bool,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Full averager config as a JSON string.
    ///
    /// When provided, the output path, combination method, grouping
    /// tag, author, copyright, cache, and publish granularity flags are
    /// ignored. The JSON must be a valid `AveragerConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Combination method selection.
#[derive(Clone, Copy, ValueEnum)]
enum Method {
    /// Crop every image to the smallest extent.
    Crop,
    /// Pad every image on white to the largest extent.
    Pad,
    /// Scale every image to cover the largest extent, then crop.
    Resize,
}

/// Granularity selection.
#[derive(Clone, Copy, ValueEnum)]
enum Level {
    /// One composite per day.
    Day,
    /// One composite per month.
    Month,
    /// One composite per year.
    Year,
}

const fn mode_from_cli(method: Method) -> CombinationMode {
    match method {
        Method::Crop => CombinationMode::Crop,
        Method::Pad => CombinationMode::Pad,
        Method::Resize => CombinationMode::Resize,
    }
}

const fn granularity_from_cli(level: Level) -> Granularity {
    match level {
        Level::Day => Granularity::Day,
        Level::Month => Granularity::Month,
        Level::Year => Granularity::Year,
    }
}

/// Build an [`AveragerConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual config flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<AveragerConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(AveragerConfig {
        output_dir: cli.output_path.clone(),
        mode: mode_from_cli(cli.combination_method),
        grouping_tag: cli.grouping_tag.clone(),
        credits: Credits {
            author: cli.author.clone(),
            copyright: cli.copyright.clone(),
        },
        cache: (!cli.no_cache).then(|| CacheConfig {
            dir: cli.cache_dir.clone(),
            retention: cli.cache_size,
        }),
        publish: cli
            .publish_granularity
            .iter()
            .copied()
            .map(granularity_from_cli)
            .collect(),
        ..AveragerConfig::default()
    })
}

/// Install a stderr subscriber; `RUST_LOG` takes precedence over
/// `level`.
fn init_logging(level: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| format!("Invalid log filter '{level}': {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("Logger initialization failed: {e}"))
}

fn print_report(report: &RunReport, json: bool) -> Result<(), String> {
    if json {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| format!("Error serializing report: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    println!("{}", report.summary());
    for result in &report.generated {
        println!(
            "  wrote {} ({} images, {:.4} s exposure, {} from cache)",
            result.path.display(),
            result.count,
            result.exposure_seconds,
            result.cached_images(),
        );
    }
    for failed in &report.failed {
        println!("  FAILED {}: {}", failed.path.display(), failed.error);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(msg) = init_logging(&cli.log_level) {
        eprintln!("{msg}");
        return ExitCode::FAILURE;
    }

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let exiftool = ExifTool::default();
    let sources = match photoavg_io::collect_sources(&cli.image_path, &exiftool) {
        Ok(sources) => sources,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(images = sources.len(), "read source metadata");

    let publisher = cli
        .publish_command
        .as_deref()
        .and_then(CommandPublisher::from_command_line);

    let mut averager = Averager::new(config);
    if !cli.no_metadata {
        averager = averager.with_metadata_writer(&exiftool);
    }
    if let Some(ref publisher) = publisher {
        averager = averager.with_publisher(publisher);
    }

    let mut granularities: Vec<Granularity> =
        cli.granularity.iter().copied().map(granularity_from_cli).collect();
    granularities.sort_unstable();
    granularities.dedup();

    let mut failed = false;
    for granularity in granularities {
        match averager.run(&sources, granularity) {
            Ok(report) => {
                failed |= report.has_failures();
                if let Err(msg) = print_report(&report, cli.json) {
                    eprintln!("{msg}");
                    return ExitCode::FAILURE;
                }
            }
            Err(e) => {
                eprintln!("Error averaging by {granularity}: {e}");
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
