use std::fmt;

/// One row of `winget list --upgrade-available` output that has an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeCandidate {
    pub id: String,
    /// Display name, may contain spaces
    pub name: String,
    pub current_version: String,
    pub available_version: String,
    /// Origin catalog; empty when the table does not name one
    pub source: String,
}

impl UpgradeCandidate {
    /// `name (current -> available)`, used in notifications and log lines.
    pub fn describe(&self) -> String {
        format!(
            "{} ({} -> {})",
            self.name, self.current_version, self.available_version
        )
    }
}

impl fmt::Display for UpgradeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [Id: {}]", self.describe(), self.id)?;
        if !self.source.is_empty() {
            write!(f, " from {}", self.source)?;
        }
        Ok(())
    }
}

/// Per-package result of one update cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Upgraded,
    Failed(String),
    Skipped,
}

impl UpgradeOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, UpgradeOutcome::Failed(_))
    }
}
