//! nd2-omezarr - Parse Nikon ND2 acquisitions for OME-Zarr conversion.
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nd2_omezarr_converter::{
    config::{Cli, Command, InitConfig, InspectConfig},
    convert_nd2_init_task, parse_nd2_acquisition,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Inspect(config) => run_inspect(config),
        Command::Init(config) => run_init(config),
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

fn run_inspect(config: InspectConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let images = match parse_nd2_acquisition(
        &config.path,
        config.plate_name.as_deref(),
        config.acquisition_id,
    ) {
        Ok(images) => images,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Found {} image(s) in {}",
        images.len(),
        config.path.display()
    );

    let output: Vec<serde_json::Value> = images
        .iter()
        .map(|image| {
            serde_json::json!({
                "path": image.path(),
                "image": image,
            })
        })
        .collect();

    print_json(&output, config.pretty)
}

// =============================================================================
// Init Command
// =============================================================================

fn run_init(config: InitConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let acquisitions = match config.input_models() {
        Ok(acquisitions) => acquisitions,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Output: {}", config.zarr_dir.display());
    info!("  Acquisitions: {}", acquisitions.len());
    info!("  Overwrite: {}", config.overwrite);

    let output = match convert_nd2_init_task(
        &config.zarr_dir,
        &acquisitions,
        config.overwrite,
        &config.advanced.to_options(),
    ) {
        Ok(output) => output,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    print_json(&output, config.pretty)
}

// =============================================================================
// Helpers
// =============================================================================

fn print_json<T: Serialize>(value: &T, pretty: bool) -> ExitCode {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };

    match rendered {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "nd2_omezarr_converter=debug,nd2_omezarr=debug"
    } else {
        "nd2_omezarr_converter=info,nd2_omezarr=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
