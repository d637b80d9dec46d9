use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thorns::app::{handle_fatal_error, initialize_app, AppConfig};
use thorns::greenwood::{frequencies_to_places, place_to_frequency, places_to_frequencies, HUMAN};
use thorns::map::{Backend, Mapper};
use thorns::{ErrorCode, ThornsError};
use tracing::debug;

/// Spike-train analysis utilities
#[derive(Parser)]
#[command(name = "thorns", version)]
#[command(about = "Spike-train analysis utilities with a nesting-aware parallel map", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file (default: ./thorns.toml if present)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert cochlear places (metres from apex) to frequencies (Hz)
    Greenwood {
        /// Map backend (serial, threads)
        #[arg(short, long)]
        backend: Option<Backend>,

        /// Number of worker threads for the threads backend
        #[arg(short, long)]
        workers: Option<usize>,

        /// Convert frequencies (Hz) back to places instead
        #[arg(long)]
        inverse: bool,

        /// Disable the progress bar and terminal title
        #[arg(long)]
        no_status: bool,

        /// Values to convert
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let config = match initialize_app(verbose, cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => handle_fatal_error(e, verbose),
    };

    if let Err(e) = run(cli.command, &config) {
        handle_fatal_error(e, verbose);
    }
}

fn run(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Greenwood {
            backend,
            workers,
            inverse,
            no_status,
            values,
        } => {
            let mut map_config = config.map.clone();
            if let Some(backend) = backend {
                map_config.backend = backend;
            }
            if workers.is_some() {
                map_config.workers = workers;
            }
            if no_status {
                map_config.show_status = false;
            }
            map_config.validate()?;
            validate_values(&values, inverse)?;

            let mapper = Mapper::new(&map_config).label("greenwood");
            debug!("Converting {} values with {:?}", values.len(), mapper);

            let converted = if inverse {
                frequencies_to_places(&values, &HUMAN, &mapper)
            } else {
                places_to_frequencies(&values, &HUMAN, &mapper)
            };
            for value in converted {
                println!("{}", value);
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.map.to_toml_string()?);
            Ok(())
        }
    }
}

/// Reject inputs the Greenwood conversion cannot map to a finite result.
fn validate_values(values: &[f64], inverse: bool) -> Result<(), ThornsError> {
    let floor = -HUMAN.scale * HUMAN.k;
    for (index, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(ThornsError::validation_with_code(
                ErrorCode::VALIDATION_NOT_A_NUMBER,
                format!("value #{} ({}) is not a finite number", index + 1, value),
                Some("values".to_string()),
            ));
        }
        if inverse && value <= floor {
            return Err(ThornsError::validation_with_code(
                ErrorCode::VALIDATION_OUT_OF_RANGE,
                format!("frequency {} Hz must be above {} Hz", value, floor),
                Some("values".to_string()),
            ));
        }
        if !inverse && !place_to_frequency(value, &HUMAN).is_finite() {
            return Err(ThornsError::validation_with_code(
                ErrorCode::VALIDATION_OUT_OF_RANGE,
                format!("place {} m is beyond the representable frequency range", value),
                Some("values".to_string()),
            ));
        }
    }
    Ok(())
}
