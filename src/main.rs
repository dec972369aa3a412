use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use schemalog::config::{load_config, print_schema, SchemaConfig, DEFAULT_CONFIG_PATH};
use schemalog::pipeline::{flush_logging, setup_from_config};

/// Console logging plus a file that only keeps schema-matching JSON records.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// YAML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// File sink path, overriding the configuration.
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Delivery workers, overriding the configuration. 0 is synchronous.
    #[arg(long)]
    pool_size: Option<usize>,

    /// Inline schema such as "field1: string, field2: integer".
    #[arg(long)]
    schema: Option<String>,

    /// Print the configuration's JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
}

#[derive(Serialize)]
struct DemoMetric<'a> {
    field1: &'a str,
    field2: i64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_schema {
        return match print_schema() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error printing schema: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let mut config = match load_config(&cli.config) {
        Ok(config) => config.logging,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(logfile) = cli.logfile {
        config.logfile = Some(logfile);
    }
    if let Some(pool_size) = cli.pool_size {
        config.pool_size = pool_size;
    }
    if let Some(schema) = cli.schema {
        config.schema = Some(SchemaConfig::Declaration(schema));
    }
    if config.schema.is_none() {
        config.schema = Some(SchemaConfig::Declaration(
            "field1: string, field2: integer".to_string(),
        ));
    }

    if let Err(e) = setup_from_config(&config) {
        eprintln!("Error setting up logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Normal log. Will only appear in console");
    match serde_json::to_string(&DemoMetric {
        field1: "Custom log",
        field2: 42,
    }) {
        Ok(metric) => info!("{}", metric),
        Err(e) => error!("Could not encode demo metric: {}", e),
    }

    flush_logging();
    ExitCode::SUCCESS
}
