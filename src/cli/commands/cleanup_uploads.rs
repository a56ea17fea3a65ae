use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use crate::uploads::cleanup_old_uploads;

pub struct CleanupUploadsCommand {
    pub dir: PathBuf,
    pub older_than: Duration,
}

impl CleanupUploadsCommand {
    pub fn from_days(dir: PathBuf, days: u64) -> Self {
        Self {
            dir,
            older_than: Duration::from_secs(days.saturating_mul(24 * 60 * 60)),
        }
    }

    pub fn execute(&self) -> Result<i32> {
        match cleanup_old_uploads(&self.dir, self.older_than) {
            Ok(0) => println!("🧹 No old uploads in {}", self.dir.display()),
            Ok(removed) => println!("🧹 Removed {removed} old upload(s) from {}", self.dir.display()),
            Err(e) => {
                println!("❌ Cannot read {}: {e}", self.dir.display());
                return Ok(1);
            }
        }
        Ok(0)
    }
}
