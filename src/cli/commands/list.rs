use anyhow::Result;

use crate::store::RequestQuery;
use crate::workflow::WorkflowEngine;

pub struct ListCommand {
    pub query: Option<String>,
    pub limit: usize,
}

impl ListCommand {
    pub async fn execute(&self, engine: &WorkflowEngine) -> Result<i32> {
        let query = RequestQuery {
            text: self.query.clone(),
            limit: Some(self.limit),
        };
        let requests = match engine.search(query).await {
            Ok(requests) => requests,
            Err(e) => {
                println!("❌ {e}. {}", e.remediation());
                return Ok(e.exit_code());
            }
        };

        if requests.is_empty() {
            println!("No requests found");
            return Ok(0);
        }

        for request in requests {
            println!(
                "{}  {}  {:<11}  {:<30} {}",
                request.id,
                request.created_at.format("%Y-%m-%d"),
                request.applicant.document_number,
                request.applicant.display_name,
                request.derived_overall()
            );
        }
        Ok(0)
    }
}
