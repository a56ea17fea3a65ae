use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::domain::IntakeDocument;
use crate::workflow::WorkflowEngine;

pub struct IntakeCommand {
    pub file: PathBuf,
}

impl IntakeCommand {
    pub async fn execute(&self, engine: &WorkflowEngine) -> Result<i32> {
        let raw = std::fs::read_to_string(&self.file)
            .with_context(|| format!("failed to read {}", self.file.display()))?;

        let request = match IntakeDocument::from_json(&raw).and_then(IntakeDocument::validate) {
            Ok(request) => request,
            Err(e) => {
                println!("❌ Intake document rejected: {e}");
                return Ok(1);
            }
        };

        let name = request
            .applicant
            .canonical_name
            .clone()
            .unwrap_or_else(|| request.applicant.display_name.clone());
        match engine.create_request(request).await {
            Ok(id) => {
                println!("✅ Request created: {id}");
                println!("   {name}");
                println!("   Next: courier-onboarding run-stage {id} brasil-risk");
                Ok(0)
            }
            Err(e) => {
                println!("❌ {e}. {}", e.remediation());
                Ok(e.exit_code())
            }
        }
    }
}
