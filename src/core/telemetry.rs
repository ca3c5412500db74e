use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// SDK and driver crates log every request at `info`; keep them at `warn`
/// unless `RUST_LOG` says otherwise.
const QUIET_DEPENDENCIES: &[&str] =
    &["aws_config=warn", "aws_smithy_runtime=warn", "hyper=warn", "sqlx=warn", "redis=warn"];

fn default_directives(level: &str) -> String {
    let mut directives = vec![level.trim().to_string()];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|directive| directive.to_string()));
    directives.join(",")
}

/// Installs the global subscriber for one process role (`api` or `reconciler`).
pub(crate) fn init_tracing(settings: &Settings, role: &'static str) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&telemetry.log_level)))
        .map_err(|err| anyhow::anyhow!("invalid GRADEFLOW_LOG_LEVEL: {err}"))?;

    let builder = fmt().with_env_filter(filter).with_target(false);

    if telemetry.json {
        builder
            .json()
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    tracing::info!(
        role,
        service = %settings.api().project_name,
        version = %settings.api().version,
        environment = settings.runtime().environment.as_str(),
        json = telemetry.json,
        "Tracing initialised"
    );

    Ok(())
}
