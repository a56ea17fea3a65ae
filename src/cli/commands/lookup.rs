use anyhow::Result;

use crate::domain::RequestId;
use crate::validators::validate_exact_digits;
use crate::workflow::{WorkflowEngine, WorkflowError};

use super::status::print_view;

/// Applicant-facing status check: protocol plus the last four CPF digits.
pub struct LookupCommand {
    pub request_id: RequestId,
    pub cpf_last4: String,
    pub json: bool,
}

impl LookupCommand {
    pub async fn execute(&self, engine: &WorkflowEngine) -> Result<i32> {
        let last4 = match validate_exact_digits("CPF (last 4 digits)", &self.cpf_last4, 4) {
            Ok(digits) => digits,
            Err(e) => {
                println!("❌ {e}");
                return Ok(1);
            }
        };

        let view = match engine.public_status(&self.request_id, &last4).await {
            Ok(view) => view,
            Err(WorkflowError::NotFound(_)) => {
                println!("🔍 Nothing found for that protocol and CPF");
                return Ok(0);
            }
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
