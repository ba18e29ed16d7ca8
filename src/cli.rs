use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "wingetau",
    about = "Winget Auto Update - check for and apply package upgrades, once or as a background service",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Install the background service and start it
    Install,

    /// Uninstall the background service
    Uninstall,

    /// Start the background service
    Start,

    /// Stop the background service
    Stop,

    /// Check for and apply updates to installed packages
    Update,

    /// List available updates without applying them
    List,

    /// Run as the background service (invoked by the service manager)
    #[command(name = "runservice")]
    RunService,

    /// Print usage
    Help,
}
