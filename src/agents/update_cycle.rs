use crate::agents::notifier::{NOTIFICATION_TITLE, NotificationKind, Notifier};
use crate::config::Config;
use crate::error::WingetauError;
use crate::winget::output_parser;
use crate::winget::{PackageManager, PackageManagerFactory, UpgradeCandidate, UpgradeOutcome};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, error, info, warn};

/// What one update cycle did, kept only long enough to report it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub outcomes: Vec<(UpgradeCandidate, UpgradeOutcome)>,
    /// Reason the cycle stopped before processing packages
    pub aborted: Option<String>,
}

impl CycleSummary {
    fn abandoned(reason: String) -> Self {
        Self {
            outcomes: Vec::new(),
            aborted: Some(reason),
        }
    }

    pub fn upgraded(&self) -> usize {
        self.count(|o| matches!(o, UpgradeOutcome::Upgraded))
    }

    pub fn failed(&self) -> usize {
        self.count(UpgradeOutcome::is_failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, UpgradeOutcome::Skipped))
    }

    /// Completed without aborting and without a failed package.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.failed() == 0
    }

    fn count(&self, predicate: impl Fn(&UpgradeOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }
}

/// Anything the service loop can invoke once per timer tick.
pub trait CycleRunner {
    fn run_cycle(&mut self) -> CycleSummary;
}

/// Runs one discover-and-upgrade pass.
///
/// Every failure is turned into a log line and a notification; nothing
/// escapes `run_cycle`, so a broken cycle never takes the service down.
/// The next cycle starts from scratch, including locating the tool again.
pub struct UpdateCycleRunner<'a> {
    config: &'a Config,
    factory: &'a dyn PackageManagerFactory,
    notifier: &'a dyn Notifier,
    show_progress: bool,
}

impl<'a> UpdateCycleRunner<'a> {
    pub fn new(
        config: &'a Config,
        factory: &'a dyn PackageManagerFactory,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            factory,
            notifier,
            show_progress: false,
        }
    }

    /// Draw a progress bar across upgrades (interactive `update` only).
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn report(&self, kind: NotificationKind, message: &str) {
        match kind {
            NotificationKind::Error => error!("{message}"),
            NotificationKind::Success | NotificationKind::Info => info!("{message}"),
        }
        self.notifier.notify(NOTIFICATION_TITLE, message, kind);
    }

    fn abort(&self, message: String) -> CycleSummary {
        self.report(NotificationKind::Error, &message);
        CycleSummary::abandoned(message)
    }

    fn refresh_sources(&self, tool: &dyn PackageManager) {
        match tool.refresh_sources() {
            Ok(output) => debug!("Source refresh output: {}", output.trim()),
            Err(err) => {
                if let Some(output) = err.tool_output() {
                    warn!("Source refresh output: {}", output.trim());
                }
                self.report(
                    NotificationKind::Error,
                    &format!("Error updating {} source: {err}", self.config.refresh_source),
                );
            }
        }
    }

    fn discover(&self, tool: &dyn PackageManager) -> Result<Vec<UpgradeCandidate>, String> {
        let raw = tool
            .list_upgrades()
            .map_err(|err| format!("Error checking updates: {err}"))?;
        debug!("winget list output:\n{raw}");

        let parsed = output_parser::parse_with_stats(&raw);
        if parsed.skipped_rows > 0 {
            debug!("Skipped {} unparsable row(s)", parsed.skipped_rows);
            if parsed.candidates.is_empty() {
                warn!(
                    "No upgrade rows parsed but {} row(s) were skipped; the listing format may have changed",
                    parsed.skipped_rows
                );
            }
        }
        // The listing is filtered to one catalog, so every row comes from it
        Ok(parsed
            .candidates
            .into_iter()
            .map(|candidate| UpgradeCandidate {
                source: self.config.source.clone(),
                ..candidate
            })
            .collect())
    }

    fn upgrade_one(
        &self,
        tool: &dyn PackageManager,
        candidate: &UpgradeCandidate,
    ) -> UpgradeOutcome {
        if self.config.is_excluded(&candidate.id) {
            info!("Skipping {} (excluded by configuration)", candidate);
            return UpgradeOutcome::Skipped;
        }

        self.report(
            NotificationKind::Info,
            &format!("Updating {}...", candidate.describe()),
        );

        match tool.upgrade(&candidate.id) {
            Ok(output) => {
                debug!("Upgrade output for {}: {}", candidate.id, output.trim());
                self.report(
                    NotificationKind::Success,
                    &format!(
                        "Successfully updated {} to version {}",
                        candidate.name, candidate.available_version
                    ),
                );
                UpgradeOutcome::Upgraded
            }
            Err(err) => {
                let reason = failure_reason(&err);
                self.report(
                    NotificationKind::Error,
                    &format!("Error updating {}: {reason}", candidate.name),
                );
                UpgradeOutcome::Failed(err.to_string())
            }
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        let pb = ProgressBar::new(len as u64);
        if !self.show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Ok(style) = ProgressStyle::default_bar().template("  [{bar:40}] {pos}/{len} {msg}") {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb
    }
}

impl CycleRunner for UpdateCycleRunner<'_> {
    fn run_cycle(&mut self) -> CycleSummary {
        info!("Checking for package updates...");

        let tool = match self.factory.open() {
            Ok(tool) => tool,
            Err(err) => return self.abort(format!("Error finding winget path: {err}")),
        };

        self.refresh_sources(tool.as_ref());

        let candidates = match self.discover(tool.as_ref()) {
            Ok(candidates) => candidates,
            Err(message) => return self.abort(message),
        };

        if candidates.is_empty() {
            self.report(NotificationKind::Info, "No updates available.");
            return CycleSummary::default();
        }

        info!(
            "Found {} package(s) with updates available.",
            candidates.len()
        );
        for candidate in &candidates {
            info!("- {candidate}");
        }

        let pb = self.progress_bar(candidates.len());
        let mut summary = CycleSummary::default();
        // Strictly sequential: winget does not tolerate concurrent installs
        for candidate in candidates {
            pb.set_message(format!("Updating {}", candidate.name));
            let outcome = self.upgrade_one(tool.as_ref(), &candidate);
            summary.outcomes.push((candidate, outcome));
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            "Update cycle finished: {} upgraded, {} failed, {} skipped",
            summary.upgraded(),
            summary.failed(),
            summary.skipped()
        );
        summary
    }
}

fn failure_reason(err: &WingetauError) -> String {
    match err.tool_output() {
        Some(output) => format!("{err}\nOutput: {}", output.trim()),
        None => err.to_string(),
    }
}
