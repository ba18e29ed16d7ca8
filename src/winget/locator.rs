use crate::config::Config;
use crate::error::{Result, WingetauError};
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Resolve the package-manager executable: `PATH` first, then a walk of the
/// configured search root.
pub fn resolve_tool(config: &Config) -> Result<PathBuf> {
    if let Some(path) = find_on_path(&config.tool_name) {
        debug!("Found {} on PATH at {}", config.tool_name, path.display());
        return Ok(path);
    }

    locate(&config.tool_search_root, &config.tool_name)
}

/// Walk `search_root` depth-first and return the first regular file named `tool_name`.
///
/// A failing walk (missing root, permission denied) is reported as
/// [`WingetauError::ToolSearch`], distinct from a completed walk without a match.
pub fn locate(search_root: &Path, tool_name: &str) -> Result<PathBuf> {
    for entry in WalkDir::new(search_root).sort_by_file_name() {
        let entry = entry.map_err(|source| WingetauError::ToolSearch {
            root: search_root.to_path_buf(),
            source,
        })?;

        if entry.file_type().is_file() && matches_tool(entry.file_name(), tool_name) {
            return Ok(entry.into_path());
        }
    }

    Err(WingetauError::ToolNotFound {
        tool: tool_name.to_string(),
        root: search_root.to_path_buf(),
    })
}

fn find_on_path(tool_name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(tool_name))
        .find(|candidate| candidate.is_file())
}

fn matches_tool(file_name: &OsStr, tool_name: &str) -> bool {
    let file_name = file_name.to_string_lossy();
    if cfg!(windows) {
        file_name.eq_ignore_ascii_case(tool_name)
    } else {
        file_name == tool_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_nested_executable() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("Microsoft.DesktopAppInstaller_1.21_x64");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("winget.exe"), b"").unwrap();

        let found = locate(dir.path(), "winget.exe").unwrap();
        assert_eq!(found, nested.join("winget.exe"));
    }

    #[test]
    fn returns_first_match_in_walk_order() {
        let dir = tempdir().unwrap();
        for version in ["a_1.0", "b_2.0"] {
            let sub = dir.path().join(version);
            fs::create_dir_all(&sub).unwrap();
            fs::write(sub.join("winget.exe"), b"").unwrap();
        }

        let found = locate(dir.path(), "winget.exe").unwrap();
        assert_eq!(found, dir.path().join("a_1.0").join("winget.exe"));
    }

    #[test]
    fn ignores_directories_and_similar_names() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("winget.exe")).unwrap();
        fs::write(dir.path().join("notwinget.exe"), b"").unwrap();

        let err = locate(dir.path(), "winget.exe").unwrap_err();
        assert!(matches!(err, WingetauError::ToolNotFound { .. }));
    }

    #[test]
    fn missing_root_is_a_search_failure() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let err = locate(&missing, "winget.exe").unwrap_err();
        assert!(matches!(err, WingetauError::ToolSearch { .. }));
    }
}
