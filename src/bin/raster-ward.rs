use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use raster_ward::aggregation::{AggregationDriver, BinningMode, RunOutcome};
use raster_ward::boundary::BoundarySet;
use raster_ward::config::{RasterFormat, RunConfig};
use raster_ward::io::{read_boundary_shapefile, GeoTiffLoader, OutputLayout, RasterLoader};

#[derive(Parser)]
#[command(name = "raster-ward", about = "Aggregate raster archives into per-ward time series")]
struct ClArgs {
    /// Run configuration (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Override the first year
    #[arg(long)]
    start_year: Option<i32>,

    /// Override the last year (inclusive)
    #[arg(long)]
    end_year: Option<i32>,

    /// Override the binning mode (day, dekad, month, quarter)
    #[arg(long)]
    mode: Option<BinningMode>,

    /// Override the output layout (per_unit, per_period, long_form, pivot)
    #[arg(long)]
    layout: Option<OutputLayout>,

    /// Override the output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long = "threads", default_value_t = 0)]
    threads: usize,

    /// Verbosity, used when RUST_LOG is unset
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ClArgs::parse();

    let level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let tracing_subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(tracing_subscriber)
        .expect("setting default tracing subscriber failed");

    configure_threads(args.threads)?;

    let config = apply_overrides(RunConfig::from_toml_file(&args.config)?, &args);
    config.validate()?;

    let format = config.raster_format()?;

    let boundaries = read_boundary_shapefile(
        &config.boundary_path,
        &config.name_field,
        config.qualifier_field.as_deref(),
        config.boundary_crs()?,
    )?;
    info!(units = boundaries.len(), crs = %boundaries.crs(), "boundaries loaded");

    let raster_crs = config.raster_crs()?;
    let outcome = match format {
        RasterFormat::GeoTiff => run(config, boundaries, GeoTiffLoader::new(raster_crs))?,
        #[cfg(feature = "netcdf")]
        RasterFormat::Netcdf => {
            let loader = raster_ward::io::NetcdfLoader::new(config.variable.clone(), raster_crs);
            run(config, boundaries, loader)?
        }
    };

    for (kind, count) in outcome.report.summary() {
        warn!(%kind, count, "skipped work");
    }
    println!(
        "{} values, {} missing, {} skipped units of work",
        outcome.matrix.filled_count(),
        outcome.matrix.missing_count(),
        outcome.report.len()
    );
    Ok(())
}

#[cfg(feature = "parallel")]
fn configure_threads(threads: usize) -> Result<(), Box<dyn std::error::Error>> {
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }
    Ok(())
}

#[cfg(not(feature = "parallel"))]
fn configure_threads(threads: usize) -> Result<(), Box<dyn std::error::Error>> {
    if threads > 1 {
        warn!(threads, "built without the parallel feature, --threads ignored");
    }
    Ok(())
}

fn apply_overrides(mut config: RunConfig, args: &ClArgs) -> RunConfig {
    let start = args.start_year.unwrap_or(config.start_year);
    let end = args.end_year.unwrap_or(config.end_year);
    config = config.with_years(start, end);
    if let Some(mode) = args.mode {
        config = config.with_mode(mode);
    }
    let dir = args.output.clone().unwrap_or_else(|| config.output.dir.clone());
    let layout = args.layout.unwrap_or(config.output.layout);
    config.with_output(dir, layout)
}

fn run<L: RasterLoader>(
    config: RunConfig,
    boundaries: BoundarySet,
    loader: L,
) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let exporter = config.output.layout.exporter(config.output.dir.clone());
    let driver = AggregationDriver::new(config, boundaries, loader);
    Ok(driver.run_and_export(exporter.as_ref())?)
}
