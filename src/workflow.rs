use crate::agents::notifier::NOTIFICATION_TITLE;
use crate::agents::{
    CycleRunner, CycleSummary, DesktopNotifier, NotificationKind, Notifier, ServiceControlAgent,
    ServiceController, UpdateCycleRunner, service_lifecycle,
};
use crate::config::Config;
use crate::error::{Result, WingetauError};
use crate::winget::{
    self, PackageManager, UpgradeCandidate, UpgradeOutcome, WingetClient, WingetFactory, locator,
};
use colored::Colorize;
use std::io::IsTerminal;
use tokio::sync::mpsc;
use tracing::info;

/// Service-manager actions exposed as subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Install,
    Uninstall,
    Start,
    Stop,
}

/// Run exactly one update cycle in the foreground.
pub fn execute_update(config: &Config) -> Result<()> {
    println!("{}", "Checking for package updates...".cyan().bold());

    let factory = WingetFactory::new(config);
    let notifier = DesktopNotifier;
    let summary = UpdateCycleRunner::new(config, &factory, &notifier)
        .with_progress(std::io::stdout().is_terminal())
        .run_cycle();

    print_cycle_summary(&summary);

    if summary.is_success() {
        return Ok(());
    }
    let reason = summary
        .aborted
        .clone()
        .unwrap_or_else(|| format!("{} package(s) failed to update", summary.failed()));
    Err(WingetauError::CycleIncomplete(reason))
}

/// Discover available upgrades and print them without applying anything.
pub fn execute_list(config: &Config) -> Result<()> {
    println!("{}", "Listing available updates...".cyan().bold());

    let path = match locator::resolve_tool(config) {
        Ok(path) => path,
        Err(err) => {
            DesktopNotifier.notify(
                NOTIFICATION_TITLE,
                &format!("Error finding winget path: {err}"),
                NotificationKind::Error,
            );
            return Err(err);
        }
    };
    println!("   Using {}", path.display().to_string().dimmed());

    let client = WingetClient::new(&path, &config.source, &config.refresh_source);
    let raw = match client.list_upgrades() {
        Ok(raw) => raw,
        Err(err) => {
            if let Some(output) = err.tool_output() {
                eprint!("{output}");
            }
            return Err(err);
        }
    };

    let candidates: Vec<UpgradeCandidate> = winget::parse(&raw)
        .into_iter()
        .map(|candidate| UpgradeCandidate {
            source: config.source.clone(),
            ..candidate
        })
        .collect();
    if candidates.is_empty() {
        print!("{raw}");
        println!("\n{}", "✨ No updates available.".green().bold());
        return Ok(());
    }

    print_candidates(&candidates);
    println!("\n{}", "To apply these updates, run:".dimmed());
    println!("  {}", "wingetau update".cyan());
    Ok(())
}

/// Enter the service loop until a stop or shutdown request arrives.
///
/// On Windows a process started by the service control manager is handed to
/// its dispatcher; started from a console it runs the same loop driven by
/// console signals.
pub fn execute_run_service(config: &Config) -> Result<()> {
    info!("Running as a background service...");

    #[cfg(windows)]
    if crate::agents::windows_host::dispatch(&config.service_name)? {
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let factory = WingetFactory::new(config);
    let notifier = DesktopNotifier;
    let runner = UpdateCycleRunner::new(config, &factory, &notifier);
    let mut controller = ServiceController::new(runner, config.check_interval);

    let cycles = runtime.block_on(async {
        let (tx, rx) = mpsc::unbounded_channel();
        service_lifecycle::spawn_signal_forwarder(tx)?;
        Ok::<_, WingetauError>(controller.run(rx).await)
    })?;

    info!(
        "Service {} after {} update cycle(s)",
        controller.state(),
        cycles
    );
    Ok(())
}

/// Install, uninstall, start or stop the background service.
pub fn execute_service_command(config: &Config, action: ServiceAction) -> Result<()> {
    let agent = ServiceControlAgent::for_current_exe(&config.service_name)?;

    let (progress, done) = match action {
        ServiceAction::Install => ("Installing service...", "✓ Service installed and started"),
        ServiceAction::Uninstall => ("Uninstalling service...", "✓ Service uninstalled"),
        ServiceAction::Start => ("Starting service...", "✓ Service started"),
        ServiceAction::Stop => ("Stopping service...", "✓ Service stop requested"),
    };
    println!("{}", progress.yellow());

    match action {
        ServiceAction::Install => agent.install()?,
        ServiceAction::Uninstall => agent.uninstall()?,
        ServiceAction::Start => agent.start()?,
        ServiceAction::Stop => agent.stop()?,
    }

    println!("{}", done.green());
    Ok(())
}

pub fn print_usage() {
    println!(
        "{}",
        "wingetau (Winget Auto Update) - automatic updates of installed packages using WinGet"
            .cyan()
            .bold()
    );
    println!(
        "\nUsage: wingetau <install|uninstall|start|stop|update|list|runservice>\n\n\
         Commands:\n  \
         install    - Install the background service\n  \
         uninstall  - Uninstall the background service\n  \
         start      - Start the background service\n  \
         stop       - Stop the background service\n  \
         update     - Check for and apply updates to installed packages\n  \
         list       - List available updates for installed packages\n  \
         runservice - Run as the background service\n"
    );
}

fn print_candidates(candidates: &[UpgradeCandidate]) {
    println!("\n{}", "📦 Available Updates:".cyan().bold());
    println!(
        "{}",
        format!("Found {} update(s)", candidates.len()).yellow()
    );
    for candidate in candidates {
        println!(
            "  • {} {} {} → {} {}",
            candidate.name.white().bold(),
            format!("[{}]", candidate.id).dimmed(),
            candidate.current_version.red(),
            candidate.available_version.green().bold(),
            format!("({})", candidate.source).dimmed()
        );
    }
}

fn print_cycle_summary(summary: &CycleSummary) {
    if let Some(reason) = &summary.aborted {
        println!("\n{} {}", "✗".red().bold(), reason.red());
        return;
    }

    if summary.outcomes.is_empty() {
        println!("\n{}", "✨ All packages are up to date!".green().bold());
        return;
    }

    println!("\n{}", "Update Summary:".cyan().bold());
    for (candidate, outcome) in &summary.outcomes {
        let status = match outcome {
            UpgradeOutcome::Upgraded => "✓ updated".green(),
            UpgradeOutcome::Failed(_) => "✗ failed".red(),
            UpgradeOutcome::Skipped => "- skipped".dimmed(),
        };
        println!(
            "  • {} {} → {} {}",
            candidate.name.white().bold(),
            candidate.current_version.red(),
            candidate.available_version.green(),
            status
        );
        if let UpgradeOutcome::Failed(reason) = outcome {
            println!("    {}", reason.dimmed());
        }
    }
    println!(
        "{}",
        format!(
            "{} updated, {} failed, {} skipped",
            summary.upgraded(),
            summary.failed(),
            summary.skipped()
        )
        .yellow()
    );
}
