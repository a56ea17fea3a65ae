//! Retention for files uploaded alongside requests (CNH scans and similar).

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Delete regular files in `dir` last modified more than `older_than` ago.
///
/// A missing directory counts as empty. Files that cannot be inspected or
/// removed are skipped with a warning; the count covers removed files only.
pub fn cleanup_old_uploads(dir: &Path, older_than: Duration) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Uploads directory does not exist");
            return Ok(0);
        }
        Err(e) => return Err(e),
    };
    let cutoff = SystemTime::now()
        .checked_sub(older_than)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable uploads entry");
                continue;
            }
        };
        let modified = match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta.modified(),
            Ok(_) => continue,
            Err(e) => Err(e),
        };
        match modified {
            Ok(modified) if modified < cutoff => match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove old upload"),
            },
            Ok(_) => {}
            Err(e) => warn!(file = %path.display(), error = %e, "Failed to read upload metadata"),
        }
    }

    info!(dir = %dir.display(), removed, "Old uploads cleaned up");
    Ok(removed)
}
