use anyhow::{Context, Result};
use helf_supabase::AuthSession;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const DEFAULT_STATE_DIR: &str = ".local/state/helf";
const SESSION_FILE: &str = "session.json";

/// `~/.local/state/helf`, used when `--state-dir` is not given.
pub fn default_state_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME env var not set")?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_DIR))
}

/// Ensure the state directory exists with `0700` permissions.
pub fn ensure_state_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create state dir {}", path.display()))?;
    }
    #[cfg(unix)]
    {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("failed to set state dir permissions {}", path.display()))?;
    }
    Ok(())
}

/// The session saved by `helf login`, if any.
pub fn load_session(dir: &Path) -> Result<Option<AuthSession>> {
    let path = dir.join(SESSION_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let session = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(session))
}

pub fn save_session(dir: &Path, session: &AuthSession) -> Result<()> {
    ensure_state_dir(dir)?;
    let path = dir.join(SESSION_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(session)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

/// Remove the saved session. Returns whether one existed.
pub fn clear_session(dir: &Path) -> Result<bool> {
    let path = dir.join(SESSION_FILE);
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(&path)
        .with_context(|| format!("failed to remove {}", path.display()))?;
    Ok(true)
}
