//! Mascot generation engine: the remote generation seam, retry and
//! orchestration around it, background removal, and the studio session
//! that ties images to the editable website sections.

pub mod adjust;
pub mod config;
pub mod matting;
pub mod orchestrator;
pub mod providers;
pub mod retry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use mascot_contracts::events::{EventPayload, EventWriter};
use serde_json::Value;

pub use adjust::ImageAdjustments;
pub use config::EngineConfig;
pub use orchestrator::{GenerationOrchestrator, VariationOutcome};
pub use providers::{
    default_provider_registry, DryrunProvider, GeminiProvider, GenerationRequest, ImageGenerator,
    ProviderRegistry,
};
pub use retry::{ErrorClass, RetryController, RetryPolicy, Sleeper, ThreadSleeper};
pub use session::{Presentation, StudioSession};

/// Wires a session from config: picks the provider by name, builds the retry
/// controller and orchestrator, and records events through `events`.
pub fn build_session(
    config: &EngineConfig,
    events: EventWriter,
    status_listener: impl Fn(&str) + Send + Sync + 'static,
) -> Result<StudioSession> {
    let mut providers = default_provider_registry(config);
    let generator = providers.take(&config.provider).ok_or_else(|| {
        anyhow!(
            "unknown provider '{}' (available: {})",
            config.provider,
            providers.names().join(", ")
        )
    })?;
    let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);
    let retry = RetryController::new(RetryPolicy::from_config(config), sleeper);
    let orchestrator =
        GenerationOrchestrator::new(generator, retry, config.variation_cooldown, events)
            .with_status_listener(status_listener);
    StudioSession::new(orchestrator)
}

pub(crate) fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}
