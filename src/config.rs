use crate::error::{Result, WingetauError};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const INTERVAL_ENV_VAR: &str = "WINGET_AUTOUPDATE_INTERVAL_SECONDS";
pub const EXCLUDE_ENV_VAR: &str = "WINGETAU_EXCLUDE";
pub const LOG_DIR_ENV_VAR: &str = "WINGETAU_LOG_DIR";

/// One hour between checks unless overridden.
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

pub const CONFIG_FILE_NAME: &str = "wingetau.toml";
pub const LOG_FILE_NAME: &str = "wingetau.log";
pub const SERVICE_NAME: &str = "Winget-AutoUpdate";

/// Runtime configuration, built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub tool_name: String,
    pub tool_search_root: PathBuf,
    pub log_dir: PathBuf,
    pub service_name: String,
    pub check_interval: Duration,
    /// Package ids that are never upgraded
    pub excluded_ids: Vec<String>,
    /// Catalog queried for upgrades
    pub source: String,
    /// Catalog whose agreements are refreshed before listing
    pub refresh_source: String,
    /// Non-fatal problems found while loading, logged once logging is up
    pub warnings: Vec<String>,
}

/// Optional overrides read from `wingetau.toml` in the log directory.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    tool_name: Option<String>,
    tool_search_root: Option<PathBuf>,
    interval_seconds: Option<u64>,
    excluded_ids: Option<Vec<String>>,
    source: Option<String>,
    refresh_source: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let (tool_name, tool_search_root, log_dir) = if cfg!(windows) {
            (
                "winget.exe",
                r"C:\Program Files\WindowsApps",
                r"C:\ProgramData\winget-service",
            )
        } else {
            ("winget", "/usr/local/bin", "/var/log/wingetau")
        };

        Self {
            tool_name: tool_name.to_string(),
            tool_search_root: PathBuf::from(tool_search_root),
            log_dir: PathBuf::from(log_dir),
            service_name: SERVICE_NAME.to_string(),
            check_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            excluded_ids: Vec::new(),
            source: "winget".to_string(),
            refresh_source: "msstore".to_string(),
            warnings: Vec::new(),
        }
    }
}

impl Config {
    /// Defaults, then `wingetau.toml` if present, then environment overrides.
    ///
    /// Never fails: an unreadable or invalid file is skipped with a warning
    /// and the remaining sources still apply.
    pub fn load() -> Self {
        Self::load_with(|name| env::var(name).ok())
    }

    fn load_with(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = var(LOG_DIR_ENV_VAR).filter(|dir| !dir.is_empty()) {
            config.log_dir = PathBuf::from(dir);
        }

        let file_path = config.config_file();
        if file_path.is_file() {
            if let Err(err) = config.apply_file(&file_path) {
                config.warnings.push(format!(
                    "Ignoring {}: {err}",
                    file_path.display()
                ));
            }
        }

        // An empty variable counts as unset
        let interval = var(INTERVAL_ENV_VAR).filter(|raw| !raw.trim().is_empty());
        config.apply_env_overrides(interval.as_deref(), var(EXCLUDE_ENV_VAR).as_deref());
        config
    }

    pub fn config_file(&self) -> PathBuf {
        self.log_dir.join(CONFIG_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }

    pub fn is_excluded(&self, id: &str) -> bool {
        self.excluded_ids
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(id))
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|e| {
            WingetauError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let file: FileConfig = toml::from_str(&content)?;

        if let Some(tool_name) = file.tool_name {
            self.tool_name = tool_name;
        }
        if let Some(root) = file.tool_search_root {
            self.tool_search_root = root;
        }
        if let Some(secs) = file.interval_seconds {
            match interval_from_secs(secs) {
                Some(interval) => self.check_interval = interval,
                None => self.warnings.push(format!(
                    "interval_seconds = 0 in {} is invalid, keeping {}s",
                    path.display(),
                    self.check_interval.as_secs()
                )),
            }
        }
        if let Some(ids) = file.excluded_ids {
            self.excluded_ids = ids;
        }
        if let Some(source) = file.source {
            self.source = source;
        }
        if let Some(refresh_source) = file.refresh_source {
            self.refresh_source = refresh_source;
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self, interval: Option<&str>, exclude: Option<&str>) {
        if interval.is_some() {
            self.check_interval = match resolve_interval(interval) {
                Ok(interval) => interval,
                Err(err) => {
                    self.warnings.push(err.to_string());
                    Duration::from_secs(DEFAULT_INTERVAL_SECS)
                }
            };
        }

        if let Some(raw) = exclude {
            self.excluded_ids = raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
}

/// Interpret the interval override; absent means the default.
///
/// Callers fall back to [`DEFAULT_INTERVAL_SECS`] on error after logging it.
pub fn resolve_interval(raw: Option<&str>) -> Result<Duration> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs(DEFAULT_INTERVAL_SECS));
    };

    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(interval_from_secs)
        .ok_or_else(|| {
            WingetauError::Config(format!(
                "{INTERVAL_ENV_VAR}='{raw}' is not a positive number of seconds, \
                 falling back to {DEFAULT_INTERVAL_SECS}s"
            ))
        })
}

fn interval_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn interval_override_is_used() {
        assert_eq!(
            resolve_interval(Some("120")).unwrap(),
            Duration::from_secs(120)
        );
        assert_eq!(
            resolve_interval(None).unwrap(),
            Duration::from_secs(DEFAULT_INTERVAL_SECS)
        );
    }

    #[test]
    fn unusable_interval_is_a_config_error() {
        for raw in ["abc", "-5", "0", ""] {
            let err = resolve_interval(Some(raw)).unwrap_err();
            assert!(matches!(err, WingetauError::Config(_)));
        }
    }

    #[test]
    fn unparsable_env_interval_falls_back_with_one_warning() {
        let mut config = Config::default();
        config.apply_env_overrides(Some("abc"), None);

        assert_eq!(
            config.check_interval,
            Duration::from_secs(DEFAULT_INTERVAL_SECS)
        );
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains("abc"));
    }

    #[test]
    fn exclusions_are_split_and_case_insensitive() {
        let mut config = Config::default();
        config.apply_env_overrides(None, Some(" Git.Git, ,Mozilla.Firefox "));

        assert_eq!(config.excluded_ids, vec!["Git.Git", "Mozilla.Firefox"]);
        assert!(config.is_excluded("git.git"));
        assert!(!config.is_excluded("Microsoft.Edge"));
    }

    #[test]
    fn file_values_apply_before_env() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "interval_seconds = 600\nsource = \"msstore\"\nexcluded_ids = [\"A.B\"]\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(&path).unwrap();
        assert_eq!(config.check_interval, Duration::from_secs(600));
        assert_eq!(config.source, "msstore");

        config.apply_env_overrides(Some("120"), None);
        assert_eq!(config.check_interval, Duration::from_secs(120));
        assert_eq!(config.excluded_ids, vec!["A.B"]);
    }

    fn env_with_log_dir(dir: &Path) -> impl Fn(&str) -> Option<String> {
        let dir = dir.to_string_lossy().into_owned();
        move |name: &str| (name == LOG_DIR_ENV_VAR).then(|| dir.clone())
    }

    #[test]
    fn invalid_file_falls_back_to_defaults_with_a_warning() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "interval_seconds = \"abc\"\n",
        )
        .unwrap();

        let config = Config::load_with(env_with_log_dir(dir.path()));

        assert_eq!(config.log_dir, dir.path());
        assert_eq!(
            config.check_interval,
            Duration::from_secs(DEFAULT_INTERVAL_SECS)
        );
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn valid_file_is_picked_up_from_log_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "interval_seconds = 900\n").unwrap();

        let config = Config::load_with(env_with_log_dir(dir.path()));

        assert_eq!(config.check_interval, Duration::from_secs(900));
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "intervall = 5\n").unwrap();

        let err = Config::default().apply_file(&path).unwrap_err();
        assert!(matches!(err, WingetauError::TomlConfig(_)));
    }
}
