use std::fmt::Write;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, command};
use gohome::{DEFAULT_QUANTILE, GohomeError, RouteError, World};
use tracing::level_filters::LevelFilter;
use tracing::{Level, info};
use tracing_subscriber::fmt;

#[derive(Parser)]
#[command(name = "gohome", version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Commands,

    /// Configure diagnostic logging level
    #[clap(long, default_value_t = Level::ERROR)]
    log: Level,
}

#[derive(Parser, Debug)]
struct RouteArgs {
    /// GPX files with recorded tracks and waypoints
    #[clap(required = true)]
    inputs: Vec<PathBuf>,

    /// Name of the waypoint to start from
    #[clap(long)]
    from: String,

    /// Name of the waypoint to reach
    #[clap(long)]
    to: String,

    /// Quantile of the observed travel times to optimise for
    #[clap(long, short, default_value_t = DEFAULT_QUANTILE)]
    quantile: f64,
}

#[derive(Parser, Debug)]
struct PeriodsArgs {
    /// GPX files with recorded tracks and waypoints
    #[clap(required = true)]
    inputs: Vec<PathBuf>,

    /// Name of the waypoint to start from
    #[clap(long)]
    from: String,

    /// Quantile of the observed travel times to optimise for
    #[clap(long, short, default_value_t = DEFAULT_QUANTILE)]
    quantile: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the learned fastest route between two named waypoints
    Route(RouteArgs),

    /// Print the expected period to every waypoint reachable from a source
    Periods(PeriodsArgs),
}

fn load_world(inputs: &[PathBuf]) -> Result<World> {
    let mut world = World::new();
    for input in inputs {
        let bytes = fs::read(input)
            .with_context(|| format!("Opening GPX input file {}", input.display()))?;
        let summary = world.ingest(&bytes).map_err(|err| match err {
            GohomeError::Gpx(_) => anyhow::Error::from(err).context(format!(
                "{} is not a valid GPX file. Check that it is correct.",
                input.display()
            )),
            _ => err.into(),
        })?;
        info!(
            input = %input.display(),
            trackpoints = summary.trackpoints,
            waypoints = summary.waypoints,
            "ingested"
        );
    }
    Ok(world)
}

fn check_quantile(quantile: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&quantile) {
        bail!("Quantile must be between 0 and 1");
    }
    Ok(())
}

fn route_cmd(args: &RouteArgs) -> Result<String> {
    check_quantile(args.quantile)?;
    let mut world = load_world(&args.inputs)?;
    let (path, cost) = world
        .fastest_path(&args.from, &args.to, args.quantile)
        .map_err(|err| match err {
            GohomeError::Route(RouteError::UnknownWaypoint(_)) => anyhow::Error::from(err)
                .context("No such waypoint has been observed on any trip"),
            _ => err.into(),
        })?;

    let mut report = String::new();
    for vertex in &path {
        writeln!(&mut report, "{vertex}")?;
    }
    writeln!(
        &mut report,
        "{:.0} s at quantile {}",
        cost, args.quantile
    )?;
    Ok(report)
}

fn periods_cmd(args: &PeriodsArgs) -> Result<String> {
    check_quantile(args.quantile)?;
    let mut world = load_world(&args.inputs)?;
    let periods = world.single_source_periods(&args.from, args.quantile)?;

    let mut report = String::new();
    for (name, secs) in &periods {
        writeln!(&mut report, "{name}\t{secs}")?;
    }
    Ok(report)
}

fn main() -> Result<()> {
    // Intentionally avoid wrapping argument parsing errors in anyhow::Result
    // so we preserve Clap's pretty formatting of usage info.
    let args = Args::parse();

    let subscriber = fmt()
        .with_target(false)
        .with_max_level(LevelFilter::from_level(args.log))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let report = match &args.cmd {
        Commands::Route(sub_args) => route_cmd(sub_args),
        Commands::Periods(sub_args) => periods_cmd(sub_args),
    }?;

    print!("{}", report);
    Ok(())
}
