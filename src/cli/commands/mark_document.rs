use anyhow::Result;

use super::status::print_view;
use crate::domain::RequestId;
use crate::workflow::WorkflowEngine;

pub struct MarkDocumentCommand {
    pub request_id: RequestId,
}

impl MarkDocumentCommand {
    pub async fn execute(&self, engine: &WorkflowEngine) -> Result<i32> {
        match engine.mark_document_received(&self.request_id).await {
            Ok(view) => {
                println!("✅ CNH recorded as received");
                print_view(&view);
                Ok(0)
            }
            Err(e) => {
                println!("❌ {e}. {}", e.remediation());
                Ok(e.exit_code())
            }
        }
    }
}
