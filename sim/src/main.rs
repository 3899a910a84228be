//! HELILAND SIM: simulated landings of a vehicle guided by a landmark-based particle filter.
//!
//! Every flight spawns the vehicle at a random point 90 to 100 meters out (and 50 to 60 meters up), then
//! steers it towards the platform using only the particle filter estimate of its pose. The filter observes
//! the landmark layout painted on the platform. A flight succeeds if the true vehicle ends within the landing
//! accuracy of the platform.
//!
//! You can run simulations either by:
//!   1. Loading all parameters from a configuration file (TOML/JSON/YAML)
//!   2. Specifying parameters via command-line flags
//!   3. Entering them interactively

mod common;
#[cfg(feature = "plotting")]
mod plotting;

use clap::{Args, Parser, Subcommand};
use common::{init_logger, prompt_output_path, prompt_with_default, validate_output_path};
use heliland::sim::{
    FlightResult, FlightStatistics, SimulationConfig, run_flight, run_simulation, write_report,
};
use heliland::{HeadingAveraging, LandmarkLayout, Noise, ParticleResamplingStrategy};
use log::{error, info};
use rayon::prelude::*;
use std::error::Error;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

const LONG_ABOUT: &str = "HELILAND SIM: simulated landings guided by a landmark-based particle filter.

Each flight starts far from the landing platform and is steered towards it using only the
particle filter's pose estimate. The filter is fed noisy displacements to the landmarks painted
on the platform (TRIANGLE, CROSS or CROSS_WITH_CENTER layout).

You can run simulations either by:
  1. Loading all parameters from a configuration file (TOML/JSON/YAML)
  2. Specifying parameters via command-line flags
  3. Entering them interactively

The output directory receives report.txt, flights.csv and the trajectory of the first flight.";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated landings guided by a landmark-based particle filter.", long_about = LONG_ABOUT)]
struct Cli {
    /// Run simulation from a configuration file (TOML/JSON/YAML)
    /// This option overrides any subcommand arguments
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Command to execute (ignored if --config is provided)
    #[command(subcommand)]
    command: Option<Command>,

    /// Output directory for the report and CSV files
    #[arg(short, long, global = true, default_value = "output")]
    output: PathBuf,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Fly independent flights in parallel
    #[arg(long, global = true)]
    parallel: bool,
}

/// Top-level commands
#[derive(Subcommand, Clone, Debug)]
enum Command {
    #[command(name = "run", about = "Run a simulation with parameters given as flags")]
    Run(RunArgs),
    #[command(
        name = "interactive",
        about = "Enter simulation parameters interactively, then run"
    )]
    Interactive,
    #[command(name = "config", about = "Generate a template configuration file")]
    CreateConfig(CreateConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Number of particles per filter
    #[arg(long, default_value_t = 100)]
    num_particles: usize,
    /// Flights per landmark layout
    #[arg(long, default_value_t = 10)]
    flights: usize,
    /// Maximum length of a single move (m)
    #[arg(long, default_value_t = 1.0)]
    step_size: f64,
    /// Distance to the platform that counts as landed (m)
    #[arg(long, default_value_t = 0.5)]
    landing_accuracy: f64,
    /// Flights are abandoned after traveling this multiple of the shortest route
    #[arg(long, default_value_t = 5.0)]
    travel_budget_factor: f64,
    /// Maximum loop iterations per flight
    #[arg(long, default_value_t = 10_000)]
    max_steps: usize,
    /// Observation position noise std dev (m)
    #[arg(long, default_value_t = 0.1)]
    observation_noise: f64,
    /// Motion position noise std dev (m)
    #[arg(long, default_value_t = 0.1)]
    motion_position_noise: f64,
    /// Motion heading noise std dev (rad), capped at pi
    #[arg(long, default_value_t = 0.1)]
    motion_heading_noise: f64,
    /// Particle initialization position noise std dev (m)
    #[arg(long, default_value_t = 0.5)]
    init_position_noise: f64,
    /// Particle initialization heading noise std dev (rad), capped at pi
    #[arg(long, default_value_t = 0.1)]
    init_heading_noise: f64,
    /// Landmark layouts to fly (comma separated, all if omitted)
    #[arg(long, value_enum, value_delimiter = ',')]
    layouts: Vec<LandmarkLayout>,
    /// Resampling strategy
    #[arg(long, value_enum, default_value_t = ParticleResamplingStrategy::Multinomial)]
    resampling: ParticleResamplingStrategy,
    /// Heading averaging used by the estimate
    #[arg(long, value_enum, default_value_t = HeadingAveraging::Linear)]
    heading_averaging: HeadingAveraging,
    /// Base random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}
impl RunArgs {
    fn to_config(&self) -> SimulationConfig {
        let layouts = if self.layouts.is_empty() {
            LandmarkLayout::ALL.to_vec()
        } else {
            self.layouts.clone()
        };
        let mut config = SimulationConfig {
            num_particles: self.num_particles,
            flights_per_layout: self.flights,
            step_size: self.step_size,
            landing_accuracy: self.landing_accuracy,
            travel_budget_factor: self.travel_budget_factor,
            max_steps: self.max_steps,
            seed: self.seed,
            resampling_strategy: self.resampling,
            heading_averaging: self.heading_averaging,
            layouts,
            observation_noise: Noise::positional(self.observation_noise),
            motion_noise: Noise::new(self.motion_position_noise, self.motion_heading_noise),
            filter_init_noise: Noise::new(self.init_position_noise, self.init_heading_noise),
            ..SimulationConfig::default()
        };
        config.clamp_heading_noise();
        config
    }
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Where to write the template (.toml, .json, .yaml)
    #[arg(default_value = "heliland.toml")]
    path: PathBuf,
}

/// Fly every flight of `config` and write the outputs to `output`.
fn execute(config: &SimulationConfig, output: &Path, parallel: bool) -> Result<(), Box<dyn Error>> {
    config.validate()?;
    validate_output_path(output)?;
    info!("Simulation parameters:\n{}", config);

    let results: Vec<FlightResult> = if parallel {
        info!("Flying {} flights in parallel", config.total_flights());
        config
            .flight_plan()
            .par_iter()
            .map(|flight| run_flight(flight.id, flight.layout, config, flight.seed))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        run_simulation(config)?
    };

    for stats in FlightStatistics::from_results(&results) {
        println!("{stats}");
        info!(
            "{}: {}/{} landed ({:.1}%), mean route redundancy {}",
            stats.layout,
            stats.landed,
            stats.flights,
            stats.success_rate,
            stats
                .mean_redundancy
                .map(|r| format!("{r:.2}%"))
                .unwrap_or_else(|| "-".to_string())
        );
    }

    let report = output.join("report.txt");
    write_report(&report, config, &results)?;
    FlightStatistics::flights_to_csv(&results, output.join("flights.csv"))?;
    if let Some(first) = results.first() {
        first.to_csv(output.join(format!("trajectory_{}.csv", first.id)))?;
        #[cfg(feature = "plotting")]
        match plotting::plot_trajectory(first, output) {
            Ok(files) => info!("Plotted flight {} into {} charts", first.id, files.len()),
            // charts are best effort, the trajectory CSV is already written
            Err(e) => error!("Failed to plot flight {}: {}", first.id, e),
        }
    }
    info!("Results written to {}", output.display());
    Ok(())
}

fn run_from_config(path: &Path, output: &Path, parallel: bool) -> Result<(), Box<dyn Error>> {
    info!("Loading configuration from {}", path.display());
    let mut config = SimulationConfig::from_file(path)?;
    config.clamp_heading_noise();
    execute(&config, output, parallel)
}

fn run_interactive(output: &Path, parallel: bool) -> Result<(), Box<dyn Error>> {
    println!("\n=== Heliland Simulation ===");
    println!("(particle filter guided landing)\n");
    let defaults = SimulationConfig::default();
    let mut config = SimulationConfig {
        num_particles: prompt_with_default("Number of particles", defaults.num_particles, 1, 1_000_000)?,
        flights_per_layout: prompt_with_default(
            "Flights per layout",
            defaults.flights_per_layout,
            1,
            100_000,
        )?,
        step_size: prompt_with_default("Step size", defaults.step_size, f64::MIN_POSITIVE, 1e6)?,
        ..defaults.clone()
    };
    config.observation_noise.position_std = prompt_with_default(
        "Observation position noise",
        defaults.observation_noise.position_std,
        0.0,
        1e6,
    )?;
    config.motion_noise.position_std = prompt_with_default(
        "Motion position noise",
        defaults.motion_noise.position_std,
        0.0,
        1e6,
    )?;
    config.motion_noise.heading_std = prompt_with_default(
        "Motion heading noise",
        defaults.motion_noise.heading_std,
        0.0,
        f64::MAX,
    )?;
    config.filter_init_noise.position_std = prompt_with_default(
        "Particle init position noise",
        defaults.filter_init_noise.position_std,
        0.0,
        1e6,
    )?;
    config.filter_init_noise.heading_std = prompt_with_default(
        "Particle init heading noise",
        defaults.filter_init_noise.heading_std,
        0.0,
        f64::MAX,
    )?;
    if config.motion_noise.heading_std > PI || config.filter_init_noise.heading_std > PI {
        println!("Heading noise above pi is capped at pi.");
    }
    config.clamp_heading_noise();
    let output = prompt_output_path(output)?;
    execute(&config, &output, parallel)
}

fn create_config_file(args: &CreateConfigArgs) -> Result<(), Box<dyn Error>> {
    SimulationConfig::default().to_file(&args.path)?;
    println!("Template configuration written to {}", args.path.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    let result = if let Some(ref config_path) = cli.config {
        run_from_config(config_path, &cli.output, cli.parallel)
    } else {
        match cli.command {
            Some(Command::Run(ref args)) => execute(&args.to_config(), &cli.output, cli.parallel),
            Some(Command::Interactive) => run_interactive(&cli.output, cli.parallel),
            Some(Command::CreateConfig(ref args)) => create_config_file(args),
            None => {
                eprintln!("Error: No command provided. Use -h or --help for usage information.");
                std::process::exit(1);
            }
        }
    };
    if let Err(ref e) = result {
        error!("{}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::tempdir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["heliland-sim", "run"]).unwrap();
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.to_config(), SimulationConfig::default());
        assert_eq!(cli.output, PathBuf::from("output"));
        assert!(!cli.parallel);
    }

    #[test]
    fn test_run_args_parsing() {
        let cli = Cli::try_parse_from([
            "heliland-sim",
            "--parallel",
            "run",
            "--num-particles",
            "50",
            "--layouts",
            "triangle,cross-with-center",
            "--resampling",
            "systematic",
            "--heading-averaging",
            "circular",
            "--motion-heading-noise",
            "7.0",
        ])
        .unwrap();
        assert!(cli.parallel);
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        let config = args.to_config();
        assert_eq!(config.num_particles, 50);
        assert_eq!(
            config.layouts,
            vec![LandmarkLayout::Triangle, LandmarkLayout::CrossWithCenter]
        );
        assert_eq!(config.resampling_strategy, ParticleResamplingStrategy::Systematic);
        assert_eq!(config.heading_averaging, HeadingAveraging::Circular);
        assert_eq!(config.motion_noise.heading_std, PI);
    }

    #[test]
    fn test_create_config_and_run_from_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("heliland.yaml");
        create_config_file(&CreateConfigArgs { path: path.clone() }).unwrap();
        assert_eq!(
            SimulationConfig::from_file(&path).unwrap(),
            SimulationConfig::default()
        );
    }

    #[test]
    fn test_execute_writes_outputs() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out");
        let config = SimulationConfig {
            num_particles: 20,
            flights_per_layout: 1,
            layouts: vec![LandmarkLayout::Cross],
            max_steps: 200,
            ..SimulationConfig::default()
        };
        execute(&config, &output, false).unwrap();
        assert!(output.join("report.txt").is_file());
        assert!(output.join("flights.csv").is_file());
        assert!(output.join("trajectory_0.csv").is_file());
        #[cfg(feature = "plotting")]
        for axis in ["x", "y", "z"] {
            assert!(output.join(format!("trajectory_0_{axis}.svg")).is_file());
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let dir = tempdir().unwrap();
        let config = SimulationConfig {
            num_particles: 15,
            flights_per_layout: 2,
            layouts: vec![LandmarkLayout::Triangle],
            max_steps: 100,
            ..SimulationConfig::default()
        };
        let sequential = dir.path().join("seq");
        let parallel = dir.path().join("par");
        execute(&config, &sequential, false).unwrap();
        execute(&config, &parallel, true).unwrap();
        let a = std::fs::read_to_string(sequential.join("flights.csv")).unwrap();
        let b = std::fs::read_to_string(parallel.join("flights.csv")).unwrap();
        assert_eq!(a, b);
    }
}
