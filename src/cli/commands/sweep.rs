use anyhow::Result;
use std::time::Duration;

use crate::workflow::WorkflowEngine;

pub struct SweepCommand {
    pub older_than: Duration,
}

impl SweepCommand {
    pub fn from_minutes(minutes: u64) -> Self {
        Self {
            older_than: Duration::from_secs(minutes.saturating_mul(60)),
        }
    }

    pub async fn execute(&self, engine: &WorkflowEngine) -> Result<i32> {
        let reclaimed = match engine.sweep_stale_running(self.older_than).await {
            Ok(reclaimed) => reclaimed,
            Err(e) => {
                println!("❌ {e}. {}", e.remediation());
                return Ok(e.exit_code());
            }
        };

        if reclaimed.is_empty() {
            println!("🧹 No stale stages found");
            return Ok(0);
        }

        println!("🧹 Reclaimed {} stale stage(s):", reclaimed.len());
        for stage in reclaimed {
            println!(
                "   {} {} (running since {})",
                stage.request_id,
                stage.stage,
                stage.since.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Ok(0)
    }
}
