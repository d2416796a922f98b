//! TWEANN - CLI Entry Point
//!
//! Runs agents on built-in tasks and manages configuration files.

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use tweann::genotype::Body;
use tweann::message::{Feedback, HaltSignal};
use tweann::{
    benchmark, Activation, AgentNetwork, Config, Environment, EnvironmentHost, Genotype, Heredity,
    Tuner, UnitId,
};

#[derive(Parser)]
#[command(name = "tweann")]
#[command(version)]
#[command(about = "Concurrent execution substrate for neuroevolved agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tune a dense agent on two-input XOR
    Xor {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Hidden layer widths
        #[arg(long, value_delimiter = ',', default_value = "3")]
        hidden: Vec<usize>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Write the tuned genotype here (YAML)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of episodes
        #[arg(short, long, default_value = "100")]
        episodes: u32,

        /// Ticks per episode
        #[arg(short, long, default_value = "50")]
        ticks: u64,

        /// Hidden layer widths
        #[arg(long, value_delimiter = ',', default_value = "16,16")]
        hidden: Vec<usize>,
    },

    /// Generate default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },

    /// Validate a genotype file and summarise it
    Inspect {
        /// Genotype file (YAML)
        genotype: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Xor {
            config,
            hidden,
            seed,
            output,
        } => run_xor(config, hidden, seed, output),

        Commands::Benchmark {
            episodes,
            ticks,
            hidden,
        } => run_benchmark(episodes, ticks, hidden),

        Commands::Init { output } => generate_config(output),

        Commands::Inspect { genotype } => inspect_genotype(genotype),
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

const XOR_TABLE: [([f64; 2], f64); 4] = [
    ([-1.0, -1.0], -1.0),
    ([-1.0, 1.0], 1.0),
    ([1.0, -1.0], 1.0),
    ([1.0, 1.0], -1.0),
];

/// One pass over the truth table per episode
struct Xor {
    row: usize,
    worst: f64,
}

impl Environment for Xor {
    fn sense(&mut self, _sensor: UnitId, _name: &str, _vl: usize) -> Vec<f64> {
        XOR_TABLE[self.row].0.to_vec()
    }

    fn act(&mut self, _actuator: UnitId, _name: &str, output: &[f64]) -> Feedback {
        let error = (output[0] - XOR_TABLE[self.row].1).abs();
        self.worst = self.worst.max(error);
        self.row = (self.row + 1) % XOR_TABLE.len();

        let halt = if self.row != 0 {
            HaltSignal::Continue
        } else if self.worst < 0.2 {
            HaltSignal::Goal
        } else {
            HaltSignal::Timeout
        };
        if self.row == 0 {
            self.worst = 0.0;
        }
        Feedback::new(-error * error, halt)
    }
}

fn run_xor(
    config_path: PathBuf,
    hidden: Vec<usize>,
    seed: Option<u64>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };
    init_logging(&config.logging.log_level);
    if seed.is_some() {
        config.runtime.seed = seed;
    }

    let mut rng = match config.runtime.seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut genotype = Genotype::dense(
        1,
        &[("xor_in", 2)],
        &hidden,
        &[("xor_out", 1)],
        Activation::Tanh,
        &mut rng,
    );
    genotype.heredity = Heredity::Lamarckian;

    println!("Tuning XOR agent");
    println!("  Neurons: {}", genotype.tunable_neurons().len());
    println!("  Selection: {}", config.tuning.selection.tag());
    println!("  Duration: {}", config.tuning.duration.tag());
    println!();

    let host = EnvironmentHost::spawn(Xor { row: 0, worst: 0.0 })?;
    let (mut network, events) = AgentNetwork::spawn(genotype, host.handle(), &config)?;
    let outcome = Tuner::from_config(&config).run(&network, &events)?;

    println!("=== Tuning Complete ===");
    println!("Time: {:.2}s", outcome.elapsed.as_secs_f64());
    println!("Evaluations: {}", outcome.evaluations);
    println!("Budget: {}", outcome.budget);
    println!("Fitness: {:.6} -> {:.6}", outcome.initial_fitness, outcome.best_fitness);
    println!("Solved: {}", outcome.goal_reached);

    if let Some(path) = output {
        let tuned = network.harvest()?;
        std::fs::write(&path, serde_yaml::to_string(&tuned)?)?;
        println!("Genotype saved to: {:?}", path);
    }
    network.stop()?;
    Ok(())
}

fn run_benchmark(episodes: u32, ticks: u64, hidden: Vec<usize>) -> Result<(), Box<dyn std::error::Error>> {
    init_logging("warn");
    println!("=== TWEANN Benchmark ===");
    println!("Episodes: {}", episodes);
    println!("Ticks per episode: {}", ticks);
    println!();

    let result = benchmark(episodes, ticks, &hidden)?;
    println!("{}", result);
    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save(&output)?;
    println!("Configuration saved to: {:?}", output);
    Ok(())
}

fn inspect_genotype(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(&path)?;
    let genotype: Genotype = serde_yaml::from_str(&contents)?;
    genotype.validate()?;

    println!("=== Genotype ===");
    println!("Agent: {}", genotype.agent);
    println!("Generation: {}", genotype.generation);
    println!("Heredity: {:?}", genotype.heredity);
    println!("Sensors: {}", genotype.sensors.len());
    println!("Actuators: {}", genotype.actuators.len());
    match &genotype.body {
        Body::Neural { neurons } => {
            let weights: usize = neurons.iter().map(|n| n.weight_count()).sum();
            println!("Neurons: {} ({} weights)", neurons.len(), weights);
        }
        Body::Substrate(substrate) => {
            println!(
                "Substrate: {}x{}x{} hidden, {:?} plasticity",
                substrate.density.depth,
                substrate.density.width,
                substrate.density.height,
                substrate.plasticity
            );
            println!("CPPN neurons: {}", substrate.cppn.len());
        }
    }
    Ok(())
}
