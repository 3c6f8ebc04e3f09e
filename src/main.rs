//! vivarium - CLI entry point
//!
//! Runs the simulation headless and prints periodic population summaries.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use vivarium::{Config, Simulation, TickOutcome};

#[derive(Parser)]
#[command(name = "vivarium")]
#[command(version)]
#[command(about = "Evolutionary agent simulation with adaptive population balancing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation
    Run {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Number of ticks to simulate
        #[arg(short, long, default_value = "10000")]
        ticks: u64,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Quiet mode (final report only)
        #[arg(short, long)]
        quiet: bool,

        /// Write the stats history to this JSON file at the end
        #[arg(long)]
        stats_out: Option<PathBuf>,
    },

    /// Generate a default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            ticks,
            seed,
            quiet,
            stats_out,
        } => run_simulation(config, ticks, seed, quiet, stats_out),
        Commands::Init { output } => generate_config(output),
    }
}

fn run_simulation(
    config_path: PathBuf,
    ticks: u64,
    seed: Option<u64>,
    quiet: bool,
    stats_out: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = if config_path.exists() {
        println!("Loading config from: {:?}", config_path);
        Config::from_file(&config_path)?
    } else {
        println!("Using default configuration");
        Config::default()
    };

    let mut sim = if let Some(s) = seed {
        println!("Using seed: {}", s);
        Simulation::new_with_seed(config, s)?
    } else {
        Simulation::new(config)?
    };

    println!("Starting simulation");
    println!("  Initial population: {}", sim.population());
    println!(
        "  Grid size: {}x{}",
        sim.config().world.width,
        sim.config().world.height
    );
    println!("  Ticks: {}", ticks);
    println!();

    let stats_interval = sim.config().logging.stats_interval;
    let start = Instant::now();

    let mut extinct = false;
    for i in 0..ticks {
        if sim.step()? == TickOutcome::Extinct {
            println!("\nPopulation extinct at tick {}", sim.tick());
            extinct = true;
            break;
        }
        if !quiet && i % stats_interval == 0 {
            println!("{}", sim.stats().summary());
        }
    }

    let elapsed = start.elapsed();
    let ticks_per_sec = sim.tick() as f64 / elapsed.as_secs_f64();

    if let Some(path) = stats_out {
        sim.history().save(path.to_string_lossy().as_ref())?;
        println!("Stats history: {:?}", path);
    }

    println!();
    println!("=== Simulation Complete ===");
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Speed: {:.1} ticks/s", ticks_per_sec);
    if !extinct {
        println!("Tunables: {:?}", sim.tunables());
    }
    println!("{}", sim.shutdown());

    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save(&output)?;
    println!("Configuration saved to: {:?}", output);
    Ok(())
}
