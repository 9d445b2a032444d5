pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use liftlab_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "liftlab",
    about = "Liftlab experiment analysis CLI",
    long_about = "Operate the Bayesian A/B analysis pipeline: migrations, fixtures, snapshot \
                  creation, statistics refresh, and readiness checks.",
    after_help = "Examples:\n  liftlab migrate\n  liftlab snapshot\n  liftlab refresh\n  \
                  liftlab compute --experiment 1 --goal 1 --draws 20000\n  liftlab doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset (two variants, one goal)")]
    Seed,
    #[command(about = "Create pending analysis rows for every active experiment")]
    Snapshot,
    #[command(about = "Fill statistics for every pair with snapshot rows, or a chosen subset")]
    Refresh {
        #[arg(long = "experiment", help = "Restrict the refresh to these experiment ids")]
        experiments: Vec<i64>,
        #[arg(long, help = "Monte Carlo draws per pair (defaults to engine.refresh_draws)")]
        draws: Option<u32>,
    },
    #[command(about = "Fill statistics for one (experiment, goal) pair")]
    Compute {
        #[arg(long)]
        experiment: i64,
        #[arg(long)]
        goal: i64,
        #[arg(long, help = "Monte Carlo draws (defaults to engine.default_draws)")]
        draws: Option<u32>,
        #[arg(long, help = "RNG seed for a reproducible run")]
        seed: Option<u64>,
    },
    #[command(about = "Print the analysis time series for one (experiment, goal) pair")]
    Report {
        #[arg(long)]
        experiment: i64,
        #[arg(long)]
        goal: i64,
    },
    #[command(about = "Validate configuration and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    let result = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };

    if let Err(error) = result {
        eprintln!("logging init failed: {error}");
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Snapshot => commands::snapshot::run(),
        Command::Refresh { experiments, draws } => commands::refresh::run(&experiments, draws),
        Command::Compute { experiment, goal, draws, seed } => {
            commands::compute::run(experiment, goal, draws, seed)
        }
        Command::Report { experiment, goal } => commands::report::run(experiment, goal),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
