use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::domain::Stage;

/// Initialize structured logging.
///
/// `RUST_LOG` wins over `default_level` when set. Logs go to stderr so command
/// output on stdout stays machine-readable.
pub fn init_telemetry(default_level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    tracing::debug!("Courier onboarding telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one stage execution
pub fn create_stage_span(request_id: &str, stage: Stage, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "stage_execution",
        request.id = request_id,
        stage = stage.slug(),
        system = stage.system_name(),
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}
