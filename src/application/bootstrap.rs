use crate::infrastructure::config::ensure_default_configs;
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub session_file_path: PathBuf,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let session_file_path = state_dir.join("userData.json");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        session_file_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bootstrap_creates_layout_and_seeds_configs() {
        let root = TempDir::new().expect("temp dir");
        let result = bootstrap_workspace(root.path()).expect("bootstrap");

        assert!(root.path().join("config/app.json").exists());
        assert!(root.path().join("config/timers.json").exists());
        assert!(root.path().join("state").is_dir());
        assert!(root.path().join("logs").is_dir());
        assert_eq!(
            result.session_file_path,
            root.path().join("state/userData.json")
        );
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let root = TempDir::new().expect("temp dir");
        bootstrap_workspace(root.path()).expect("first bootstrap");
        bootstrap_workspace(root.path()).expect("second bootstrap");
    }
}
