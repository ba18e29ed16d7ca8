use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WingetauError {
    #[error("{tool} not found under {}", root.display())]
    ToolNotFound { tool: String, root: PathBuf },

    #[error("Failed to search {} for the package manager: {source}", root.display())]
    ToolSearch {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("'{command}' failed: {detail}")]
    ToolInvocation {
        command: String,
        detail: String,
        output: String,
    },

    #[error("Update cycle incomplete: {0}")]
    CycleIncomplete(String),

    #[error("Service manager operation failed: {0}")]
    ServiceManager(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    TomlConfig(#[from] toml::de::Error),
}

impl WingetauError {
    /// Captured tool output attached to an invocation failure, if any.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            WingetauError::ToolInvocation { output, .. } if !output.trim().is_empty() => {
                Some(output.as_str())
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WingetauError>;
