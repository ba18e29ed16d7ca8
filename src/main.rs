mod agents;
mod cli;
mod config;
mod error;
mod logging;
mod winget;
mod workflow;

use clap::Parser;
use clap::error::ErrorKind;
use cli::{Cli, Commands};
use colored::Colorize;
use config::Config;
use std::process;
use workflow::ServiceAction;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::InvalidSubcommand => {
            let command = std::env::args().nth(1).unwrap_or_default();
            eprintln!("{} {}", "Unknown command:".red().bold(), command);
            workflow::print_usage();
            process::exit(1);
        }
        Err(e) => e.exit(),
    };

    let Some(command) = cli.command else {
        workflow::print_usage();
        return;
    };

    let config = Config::load();

    let log_guard = logging::init(&config);
    for warning in &config.warnings {
        tracing::warn!("{warning}");
    }

    if let Err(e) = dispatch(command, &config) {
        tracing::error!("{e}");
        eprintln!("{} {}", "Error:".red().bold(), e);
        drop(log_guard);
        process::exit(1);
    }
}

fn dispatch(command: Commands, config: &Config) -> error::Result<()> {
    match command {
        Commands::Update => workflow::execute_update(config),
        Commands::List => workflow::execute_list(config),
        Commands::RunService => workflow::execute_run_service(config),
        Commands::Install => workflow::execute_service_command(config, ServiceAction::Install),
        Commands::Uninstall => {
            workflow::execute_service_command(config, ServiceAction::Uninstall)
        }
        Commands::Start => workflow::execute_service_command(config, ServiceAction::Start),
        Commands::Stop => workflow::execute_service_command(config, ServiceAction::Stop),
        Commands::Help => {
            workflow::print_usage();
            Ok(())
        }
    }
}
