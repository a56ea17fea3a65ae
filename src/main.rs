use anyhow::Result;
use clap::Parser;

use courier_onboarding::cli::commands::{
    self, cleanup_uploads::CleanupUploadsCommand, events::EventsCommand, intake::IntakeCommand,
    list::ListCommand, lookup::LookupCommand, mark_document::MarkDocumentCommand,
    report::ReportCommand, run_stage::RunStageCommand, status::StatusCommand,
    sweep::SweepCommand,
};
use courier_onboarding::cli::{Cli, Commands};
use courier_onboarding::config::OnboardingConfig;
use courier_onboarding::shutdown::ShutdownCoordinator;
use courier_onboarding::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = OnboardingConfig::load_env_file();
    let config = commands::load_config(cli.config.as_deref())?;
    init_telemetry(&config.observability.log_level, config.observability.json)?;

    let code = tokio::runtime::Runtime::new()?.block_on(async {
        let shutdown = ShutdownCoordinator::new();
        let listener = shutdown.listen_for_ctrl_c();
        let engine = commands::build_engine(&config, shutdown.token()).await?;

        let code = match cli.command {
            Commands::RunStage {
                request_id,
                stage,
                retries,
                json,
            } => {
                RunStageCommand::new(commands::request_id(&request_id), stage, shutdown.token())
                    .with_retries(retries)
                    .with_json(json)
                    .execute(&engine)
                    .await?
            }
            Commands::Status { request_id, json } => {
                StatusCommand::new(commands::request_id(&request_id))
                    .with_json(json)
                    .execute(&engine)
                    .await?
            }
            Commands::Events { request_id, limit } => {
                EventsCommand {
                    request_id: commands::request_id(&request_id),
                    limit,
                }
                .execute(&engine)
                .await?
            }
            Commands::List { query, limit } => ListCommand { query, limit }.execute(&engine).await?,
            Commands::Intake { file } => IntakeCommand { file }.execute(&engine).await?,
            Commands::Sweep { older_than_minutes } => {
                SweepCommand::from_minutes(
                    older_than_minutes.unwrap_or(config.engine.stale_running_minutes),
                )
                .execute(&engine)
                .await?
            }
            Commands::MarkDocument { request_id } => {
                MarkDocumentCommand {
                    request_id: commands::request_id(&request_id),
                }
                .execute(&engine)
                .await?
            }
            Commands::Lookup {
                request_id,
                cpf_last4,
                json,
            } => {
                LookupCommand {
                    request_id: commands::request_id(&request_id),
                    cpf_last4,
                    json,
                }
                .execute(&engine)
                .await?
            }
            Commands::Report { output, limit } => {
                ReportCommand { output, limit }.execute(&engine).await?
            }
            Commands::CleanupUploads { older_than_days } => CleanupUploadsCommand::from_days(
                config.uploads.dir.clone(),
                older_than_days.unwrap_or(config.uploads.retention_days),
            )
            .execute()?,
        };

        shutdown.trigger();
        let _ = listener.await;
        anyhow::Ok(code)
    })?;

    std::process::exit(code);
}
