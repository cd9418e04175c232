//! Staffing ETL - Main entry point

use clap::Parser;
use staffing_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use staffing_etl::{Cli, Commands, EtlConfig};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Verbose mode logs debug; environment variables take precedence
    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("staffing-etl")
        .build();
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    if let Err(e) = execute_command(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: Cli) -> anyhow::Result<()> {
    let config = EtlConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => staffing_etl::commands::run::run(config, &args).await,
        Commands::Migrate => staffing_etl::commands::migrate::run(&config).await,
        Commands::Report { name } => staffing_etl::commands::report::run(&config, name).await,
        Commands::Profile {
            entity,
            file,
            data_dir,
        } => staffing_etl::commands::profile::run(&config, entity, file, data_dir),
    }
}
