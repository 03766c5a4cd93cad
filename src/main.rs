// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the aquarium auto-tester controller
use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use tokio::signal;

use rust_autotester::config::{self, Config};
use rust_autotester::daemon::launch_daemon::Daemon;

/// Scheduled water chemistry auto-tester
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Use the simulated analyzer instead of the I2C bus
    #[arg(long)]
    simulate: bool,

    /// I2C bus device (e.g. /dev/i2c-1)
    #[arg(long)]
    i2c_device: Option<String>,

    /// Analyzer bus address, used when no configuration record is stored yet
    #[arg(long, value_parser = parse_address)]
    address: Option<u8>,

    /// Directory of the file store
    #[arg(long)]
    storage_path: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// Accept decimal or `0x`-prefixed hexadecimal addresses
fn parse_address(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse::<u8>(),
    };
    match parsed {
        Ok(address) if (1..=0x7F).contains(&address) => Ok(address),
        Ok(address) => Err(format!("0x{:02X} is not a 7-bit bus address", address)),
        Err(e) => Err(format!("invalid address '{}': {}", value, e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger with appropriate level based on verbose and quiet flags
    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    // Check if --show-config-schema flag is set
    if args.show_config_schema {
        return config::output_config_schema();
    }

    // Validate configuration file if --validate-config is set
    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }
        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    // Apply command line overrides
    config.apply_args(
        args.i2c_device.clone(),
        args.address,
        args.simulate,
        args.storage_path.clone(),
    );
    config::validate_specific_rules(&config)?;

    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    // Wait for termination signal
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, terminating daemon"),
        Err(err) => eprintln!("Error waiting for shutdown signal: {}", err),
    }
    daemon.shutdown().await;
    daemon.join().await?;

    Ok(())
}
