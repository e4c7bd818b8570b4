//! Platform-specific paths for configuration and patch documents.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/patchbay/config.toml` (Linux), `~/Library/Application Support/patchbay/` (macOS), `%APPDATA%\patchbay\` (Windows)
//! - **User patches**: the `patches/` subdirectory of the config directory
//!
//! # Example
//!
//! ```rust,no_run
//! use patchbay_config::paths;
//!
//! if let Some(path) = paths::find_patch("bass_voice") {
//!     println!("Found patch at: {:?}", path);
//! }
//! ```

use std::path::{Path, PathBuf};

/// Application name used for directory paths.
const APP_NAME: &str = "patchbay";

/// Subdirectory name for saved graph documents.
const PATCHES_SUBDIR: &str = "patches";

/// File name of the engine config inside the config directory.
const CONFIG_FILE: &str = "config.toml";

/// Extension of graph and timeline documents.
const DOCUMENT_EXT: &str = "json";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the user-specific patch directory.
pub fn user_patches_dir() -> PathBuf {
    user_config_dir().join(PATCHES_SUBDIR)
}

/// Default location of the engine config file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    ensure_dir(user_config_dir())
}

/// Ensure the user patch directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_patches_dir() -> Result<PathBuf, crate::ConfigError> {
    ensure_dir(user_patches_dir())
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf, crate::ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Resolves a patch by path or by name in the user patch directory.
///
/// A bare name gets the `.json` extension appended.
pub fn find_patch(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if path.extension().is_some_and(|ext| ext == DOCUMENT_EXT) {
        name.to_string()
    } else {
        format!("{name}.{DOCUMENT_EXT}")
    };
    let user_path = user_patches_dir().join(filename);
    user_path.is_file().then_some(user_path)
}

/// Saved patches in the user patch directory, sorted by path.
pub fn list_user_patches() -> Vec<PathBuf> {
    list_documents_in_dir(&user_patches_dir())
}

/// JSON documents directly inside `dir`, sorted by path.
///
/// Returns an empty vector if the directory doesn't exist or can't be read.
pub fn list_documents_in_dir(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == DOCUMENT_EXT))
        .collect();
    found.sort();
    found
}

/// Patch name from a file path (the file stem).
pub fn patch_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn config_paths_share_app_dir() {
        let dir = user_config_dir();
        assert!(dir.ends_with(APP_NAME));
        assert!(user_patches_dir().starts_with(&dir));
        assert_eq!(default_config_path(), dir.join("config.toml"));
    }

    #[test]
    fn lists_only_json_sorted() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.json"), "{}").unwrap();
        fs::write(temp_dir.path().join("a.json"), "{}").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(temp_dir.path().join("dir.json")).unwrap();

        let found = list_documents_in_dir(temp_dir.path());
        let names: Vec<_> = found
            .iter()
            .filter_map(|p| patch_name_from_path(p))
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn nonexistent_dir_lists_nothing() {
        assert!(list_documents_in_dir(Path::new("/nonexistent/path/12345")).is_empty());
    }

    #[test]
    fn find_patch_by_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lead.json");
        fs::write(&path, "{}").unwrap();

        assert_eq!(find_patch(path.to_str().unwrap()), Some(path));
        assert!(find_patch("definitely_not_a_saved_patch_9f2c").is_none());
    }
}
