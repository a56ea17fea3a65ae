use anyhow::Result;

use crate::domain::RequestId;
use crate::workflow::{StatusView, WorkflowEngine};

pub struct StatusCommand {
    pub request_id: RequestId,
    pub json: bool,
}

impl StatusCommand {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub async fn execute(&self, engine: &WorkflowEngine) -> Result<i32> {
        let view = match engine.request_status(&self.request_id).await {
            Ok(view) => view,
            Err(e) => {
                println!("❌ {e}. {}", e.remediation());
                return Ok(e.exit_code());
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&view)?);
        } else {
            print_view(&view);
        }
        Ok(0)
    }
}

pub(crate) fn print_view(view: &StatusView) {
    println!("📋 {} ({})", view.request_id, view.applicant);
    println!("──────────────────────────────");
    for line in &view.stages {
        let when = line
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("   {:<12} {:<20} {}", line.stage.system_name(), line.status.as_str(), when);
    }
    println!(
        "   CNH received: {}",
        if view.document_received { "yes" } else { "no" }
    );
    println!("   Overall:      {}", view.overall);
}
