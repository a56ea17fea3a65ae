use anyhow::Result;

use crate::domain::RequestId;
use crate::workflow::WorkflowEngine;

pub struct EventsCommand {
    pub request_id: RequestId,
    pub limit: usize,
}

impl EventsCommand {
    pub async fn execute(&self, engine: &WorkflowEngine) -> Result<i32> {
        let events = match engine.events(&self.request_id, self.limit).await {
            Ok(events) => events,
            Err(e) => {
                println!("❌ {e}. {}", e.remediation());
                return Ok(e.exit_code());
            }
        };

        if events.is_empty() {
            println!("No events recorded for {}", self.request_id);
            return Ok(0);
        }

        for event in events {
            println!(
                "{}  {:<5}  {:<12} {}",
                event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                event.level.as_str(),
                event.system,
                event.message
            );
        }
        Ok(0)
    }
}
