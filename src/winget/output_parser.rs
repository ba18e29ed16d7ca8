use crate::winget::package::UpgradeCandidate;

/// Informational lines winget prints around the upgrade table.
const BANNERS: &[&str] = &[
    "package(s) have version numbers that cannot be determined",
    "packages have version numbers that cannot be determined",
    "require explicit targeting for upgrade",
    "No installed package found matching input criteria",
];

const HEADER_TOKENS: &[&str] = &["Name", "Id", "Version", "Available"];

const SEPARATOR: char = '-';

/// Trailing fields every table row must carry: id, current and available version.
const TRAILING_FIELDS: usize = 3;

/// Result of parsing one listing, with the number of rows that could not be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub candidates: Vec<UpgradeCandidate>,
    /// Non-blank, non-banner rows dropped for having too few fields
    pub skipped_rows: usize,
}

/// Parse the tabular text of `winget list --upgrade-available`.
///
/// Rows are anchored from the right: the last three fields are the id,
/// current version and available version, and everything before them is
/// the display name. Rows that cannot supply all of them are dropped.
pub fn parse(raw: &str) -> Vec<UpgradeCandidate> {
    parse_with_stats(raw).candidates
}

pub fn parse_with_stats(raw: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    for line in raw.lines() {
        if is_noise(line) {
            continue;
        }

        match parse_row(line) {
            Some(candidate) => outcome.candidates.push(candidate),
            None => outcome.skipped_rows += 1,
        }
    }

    outcome
}

fn is_noise(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == SEPARATOR) {
        return true;
    }

    if HEADER_TOKENS.iter().all(|token| line.contains(token)) {
        return true;
    }

    BANNERS.iter().any(|banner| line.contains(banner))
}

fn parse_row(line: &str) -> Option<UpgradeCandidate> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() <= TRAILING_FIELDS {
        return None;
    }

    let split = fields.len() - TRAILING_FIELDS;
    Some(UpgradeCandidate {
        name: fields[..split].join(" "),
        id: fields[split].to_string(),
        current_version: fields[split + 1].to_string(),
        available_version: fields[split + 2].to_string(),
        source: String::new(),
    })
}
