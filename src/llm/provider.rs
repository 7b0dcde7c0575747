use std::path::Path;

use async_trait::async_trait;

use crate::errors::TapCrewResult;

/// Unified completion capability. The engine treats the reasoning service as
/// a request/response surface: send a prompt (optionally with one image),
/// receive text. Failures are transient from the engine's point of view and
/// are caught per cycle, never propagated out of one.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Identifier for logs and registry lookups.
    fn name(&self) -> &str;

    /// One-shot text completion. `image` is a path to a PNG frame to attach
    /// inline for vision-capable roles.
    async fn complete(&self, prompt: &str, image: Option<&Path>) -> TapCrewResult<String>;
}
