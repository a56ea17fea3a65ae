use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;

use crate::domain::{RequestSnapshot, Stage};
use crate::store::RequestQuery;
use crate::workflow::WorkflowEngine;

const HEADER: [&str; 15] = [
    "request_id",
    "created_at",
    "kind",
    "role",
    "cpf",
    "name",
    "canonical_name",
    "requester_name",
    "requester_org",
    "cnh_received",
    "status_brasil_risk",
    "status_rlog_cielo",
    "status_rlog_geral",
    "status_bringg",
    "overall",
];

/// CSV export of every request, newest first.
pub struct ReportCommand {
    pub output: Option<PathBuf>,
    pub limit: usize,
}

impl ReportCommand {
    pub async fn execute(&self, engine: &WorkflowEngine) -> Result<i32> {
        let query = RequestQuery {
            text: None,
            limit: Some(self.limit),
        };
        let requests = match engine.search(query).await {
            Ok(requests) => requests,
            Err(e) => {
                println!("❌ {e}. {}", e.remediation());
                return Ok(e.exit_code());
            }
        };

        match &self.output {
            Some(path) => {
                let file = std::fs::File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let mut out = std::io::BufWriter::new(file);
                write_csv(&requests, &mut out)?;
                out.flush()?;
                println!("✅ Wrote {} requests to {}", requests.len(), path.display());
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                write_csv(&requests, &mut out)?;
                out.flush()?;
            }
        }
        Ok(0)
    }
}

/// One header line, then one row per request. Fields are quoted per RFC 4180.
pub fn write_csv<W: Write>(requests: &[RequestSnapshot], out: &mut W) -> std::io::Result<()> {
    write_row(out, HEADER.iter().copied())?;
    for request in requests {
        let created_at = request.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let cnh = if request.document_received { "1" } else { "0" };
        let row = [
            request.id.as_str(),
            created_at.as_str(),
            request.kind.as_str(),
            request.role.as_str(),
            request.applicant.document_number.as_str(),
            request.applicant.display_name.as_str(),
            request.applicant.canonical_name.as_deref().unwrap_or(""),
            request.requester_name.as_deref().unwrap_or(""),
            request.requester_org.as_deref().unwrap_or(""),
            cnh,
            request.stages.status(Stage::BrasilRisk).as_str(),
            request.stages.status(Stage::RlogCielo).as_str(),
            request.stages.status(Stage::RlogGeral).as_str(),
            request.stages.status(Stage::Bringg).as_str(),
            request.derived_overall().as_str(),
        ];
        write_row(out, row.into_iter())?;
    }
    Ok(())
}

fn write_row<'a, W: Write>(out: &mut W, fields: impl Iterator<Item = &'a str>) -> std::io::Result<()> {
    let line = fields.map(escape).collect::<Vec<_>>().join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(b"\r\n")
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
