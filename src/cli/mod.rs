use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::Stage;

pub mod commands;

#[derive(Parser)]
#[command(name = "courier-onboarding")]
#[command(about = "Courier onboarding workflow: Brasil Risk gate, then Rlog Cielo, Rlog Geral and Bringg")]
#[command(long_about = "Runs the courier onboarding stages against a request. The Brasil Risk gate \
                       must decide 'Apto' before any downstream stage may run. Exit codes: 0 completed \
                       or refused for an expected reason, 1 fatal error, 2 waiting for a human step.")]
pub struct Cli {
    /// Load configuration from this TOML file instead of the working directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one stage for a request
    RunStage {
        /// Request id
        request_id: String,
        /// Stage: brasil-risk (gate), rlog-cielo, rlog-geral or bringg
        stage: Stage,
        /// Retry execution failures this many times with exponential backoff
        #[arg(long, default_value = "0", help = "Automatic retries for execution failures only")]
        retries: u32,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show stage and overall statuses for a request
    Status {
        request_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the event history of a request, newest first
    Events {
        request_id: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// List requests, optionally filtered by CPF, name or id
    List {
        #[arg(long, short = 'q')]
        query: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Create a request from a JSON intake document
    Intake {
        /// Path to the intake document
        file: PathBuf,
    },
    /// Move stages stuck in "Em processo" to "Erro"
    Sweep {
        /// Age threshold; defaults to engine.stale_running_minutes
        #[arg(long)]
        older_than_minutes: Option<u64>,
    },
    /// Record that the driver's CNH was received
    MarkDocument { request_id: String },
    /// Applicant status check by protocol and the last 4 CPF digits
    Lookup {
        /// Protocol (request id) given to the applicant
        request_id: String,
        #[arg(long)]
        cpf_last4: String,
        #[arg(long)]
        json: bool,
    },
    /// Export all requests as CSV
    Report {
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[arg(long, default_value = "5000")]
        limit: usize,
    },
    /// Delete uploaded files older than the retention period
    CleanupUploads {
        /// Age threshold; defaults to uploads.retention_days
        #[arg(long)]
        older_than_days: Option<u64>,
    },
}
