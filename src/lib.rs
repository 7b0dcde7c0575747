pub mod agents;
pub mod artifacts;
pub mod config;
pub mod device;
pub mod engine;
pub mod errors;
pub mod llm;
pub mod perception;
pub mod presentation;

use std::sync::Arc;

use crate::device::appium::AppiumController;
use crate::engine::session::Session;
use crate::engine::verdict::SessionStatus;
use crate::errors::TapCrewResult;
use crate::llm::registry::ProviderRegistry;
use crate::presentation::TracingPresentation;

/// Initialize tracing and load `.env`. Call once at process start.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
}

/// Wire config → providers → device → session and run one task end to end.
///
/// Falls back to default configuration when no config.toml is found, the
/// same way a missing role key falls back to the shared key: the run should
/// start and fail observably, not die on wiring.
pub async fn run_task(task: &str) -> TapCrewResult<SessionStatus> {
    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config; using defaults");
            config::AppConfig::default()
        }
    };

    let providers = ProviderRegistry::from_config(&config.llm);

    let session_id = uuid::Uuid::new_v4().to_string();
    let artifacts = artifacts::Artifacts::for_session(&session_id);

    let device = Arc::new(AppiumController::new(
        config.device.server_url.clone(),
        config.device.platform.clone(),
        artifacts.screenshots.clone(),
    ));
    device.connect().await?;

    let mut session = Session::with_artifacts(
        config.session.clone(),
        &providers,
        device,
        Arc::new(TracingPresentation),
        artifacts,
    )?;
    session.run(task).await
}
