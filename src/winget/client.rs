use crate::config::Config;
use crate::error::{Result, WingetauError};
use crate::winget::locator;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// Operations of the package-manager CLI the update cycle relies on.
///
/// Each call returns the captured output on success and a
/// [`WingetauError::ToolInvocation`] carrying that output otherwise.
pub trait PackageManager {
    /// Re-accept the terms of the refresh catalog and update its index.
    fn refresh_sources(&self) -> Result<String>;

    /// Raw table of installed packages with an upgrade available.
    fn list_upgrades(&self) -> Result<String>;

    /// Upgrade a single package unattended.
    fn upgrade(&self, id: &str) -> Result<String>;
}

/// Produces a ready-to-use [`PackageManager`], locating the tool as needed.
pub trait PackageManagerFactory {
    fn open(&self) -> Result<Box<dyn PackageManager>>;
}

/// Locates winget on every `open`, never caching the path between cycles.
pub struct WingetFactory<'a> {
    config: &'a Config,
}

impl<'a> WingetFactory<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl PackageManagerFactory for WingetFactory<'_> {
    fn open(&self) -> Result<Box<dyn PackageManager>> {
        let path = locator::resolve_tool(self.config)?;
        Ok(Box::new(WingetClient::new(
            path,
            &self.config.source,
            &self.config.refresh_source,
        )))
    }
}

/// Blocking wrapper around the winget executable.
pub struct WingetClient {
    winget_path: PathBuf,
    source: String,
    refresh_source: String,
}

impl WingetClient {
    pub fn new<P: AsRef<Path>>(winget_path: P, source: &str, refresh_source: &str) -> Self {
        Self {
            winget_path: winget_path.as_ref().to_path_buf(),
            source: source.to_string(),
            refresh_source: refresh_source.to_string(),
        }
    }

    fn run_winget(&self, args: &[&str]) -> Result<Output> {
        debug!("Executing: {} {}", self.winget_path.display(), args.join(" "));
        Command::new(&self.winget_path)
            .args(args)
            .output()
            .map_err(|e| WingetauError::ToolInvocation {
                command: Self::describe(args),
                detail: format!("failed to spawn process: {e}"),
                output: String::new(),
            })
    }

    /// Accept the run only on a zero exit status; the failure keeps `output`.
    fn ensure_success(output: &Output, args: &[&str], captured: String) -> Result<String> {
        if output.status.success() {
            return Ok(captured);
        }

        let detail = match output.status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        Err(WingetauError::ToolInvocation {
            command: Self::describe(args),
            detail,
            output: captured,
        })
    }

    fn combined(output: &Output) -> String {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        text
    }

    fn describe(args: &[&str]) -> String {
        format!("winget {}", args.join(" "))
    }
}

impl PackageManager for WingetClient {
    fn refresh_sources(&self) -> Result<String> {
        let args = [
            "source",
            "update",
            "--name",
            self.refresh_source.as_str(),
            "--disable-interactivity",
        ];
        let output = self.run_winget(&args)?;
        Self::ensure_success(&output, &args, Self::combined(&output))
    }

    fn list_upgrades(&self) -> Result<String> {
        let source_arg = format!("--source={}", self.source);
        let args = ["list", "--upgrade-available", source_arg.as_str()];
        let output = self.run_winget(&args)?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        Self::ensure_success(&output, &args, Self::combined(&output))
    }

    fn upgrade(&self, id: &str) -> Result<String> {
        let args = [
            "upgrade",
            "--silent",
            "--include-unknown",
            "--accept-package-agreements",
            "--accept-source-agreements",
            "--disable-interactivity",
            "--id",
            id,
        ];
        let output = self.run_winget(&args)?;
        Self::ensure_success(&output, &args, Self::combined(&output))
    }
}
