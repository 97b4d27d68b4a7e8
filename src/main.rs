use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use clap::Parser;
use whirlybird::sim::NoiseConfig;
use whirlybird::telemetry::write_csv;
use whirlybird::{Simulation, WhirlybirdConfig};

#[derive(Debug, Parser)]
#[command(author, version, about = "Closed-loop whirlybird attitude simulation")]
struct Cli {
    /// JSON configuration file; the built-in PD setup when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated time in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Telemetry CSV output path
    #[arg(long, default_value = "whirlybird.csv")]
    output: PathBuf,

    /// Seed for the measurement noise
    #[arg(long)]
    seed: Option<u64>,

    /// Standard deviation of the angle measurement noise (rad)
    #[arg(long)]
    noise: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => WhirlybirdConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WhirlybirdConfig::default(),
    };
    if let Some(v) = cli.duration {
        cfg.simulation.duration = v;
    }
    if cli.noise.is_some() || cli.seed.is_some() {
        let current = cfg.simulation.noise;
        cfg.simulation.noise = Some(NoiseConfig {
            std_dev: cli
                .noise
                .or(current.map(|n| n.std_dev))
                .unwrap_or(0.0),
            seed: cli.seed.or(current.map(|n| n.seed)).unwrap_or(0),
        });
    }

    let mut sim = Simulation::new(&cfg).context("invalid configuration")?;
    let ticks = sim.run_for_duration(&AtomicBool::new(false))?;

    write_csv(&cli.output, sim.records())
        .with_context(|| format!("writing {}", cli.output.display()))?;

    let state = sim.state();
    println!("Simulation complete. Ticks: {} | t = {:.2} s", ticks, sim.time());
    println!(
        "Attitude (roll, pitch, yaw): ({:.4}, {:.4}, {:.4}) rad",
        state.roll, state.pitch, state.yaw
    );
    println!(
        "Rates: ({:.4}, {:.4}, {:.4}) rad/s",
        state.roll_rate, state.pitch_rate, state.yaw_rate
    );
    println!("CSV: {}", cli.output.display());

    Ok(())
}
