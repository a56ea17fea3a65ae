use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::AutomationError;

const LOCK_FILE: &str = ".profile.lock";

/// Persistent browser profile (cookies, local storage) reused across runs.
///
/// Only one session may use a profile at a time; callers hold the write half
/// of [`BrowserProfile::open_lock`] for the whole session.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    dir: PathBuf,
}

impl BrowserProfile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Create the profile directory (owner-only on unix).
    pub fn ensure_dir(&self) -> Result<&Path, AutomationError> {
        std::fs::create_dir_all(&self.dir).map_err(AutomationError::Profile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700))
                .map_err(AutomationError::Profile)?;
        }

        tracing::debug!(profile_dir = %self.dir.display(), "Browser profile directory ensured");
        Ok(&self.dir)
    }

    /// Open the profile's lock file. Acquire with `try_write()`; a failure
    /// means another session owns the profile.
    pub fn open_lock(&self) -> Result<fd_lock::RwLock<File>, AutomationError> {
        self.ensure_dir()?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(LOCK_FILE))
            .map_err(AutomationError::Profile)?;
        Ok(fd_lock::RwLock::new(file))
    }

    pub fn locked_error(&self) -> AutomationError {
        AutomationError::ProfileLocked(self.dir.clone())
    }
}
