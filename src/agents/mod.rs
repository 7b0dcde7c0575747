//! Worker contract and the fixed registry of known worker identities.
//!
//! Every worker consumes a read-only snapshot of the chat room plus an
//! expectation string from the planner, and produces exactly one typed
//! entry. The identity set is closed: a plan can never name a ninth worker.

pub mod application_selector;
pub mod chain_of_thought;
pub mod code_generator;
pub mod code_verifier;
pub mod coordinate_extractor;
pub mod page_summarizer;
pub mod summarizer;
pub mod user_prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::chatroom::{ChatRoom, Message, MessageKind};
use crate::errors::{TapCrewError, TapCrewResult};

/// The eight dispatchable worker identities, in fixed dispatch order.
///
/// Declaration order is the priority order the dispatch loop uses when a
/// plan names several workers at once, not the order the planner happened
/// to list them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentId {
    CoordinateExtractor,
    ChainOfThought,
    CodeGenerator,
    CodeVerifier,
    UserPrompt,
    PageSummarizer,
    Summarizer,
    ApplicationSelector,
}

impl AgentId {
    pub const ALL: [AgentId; 8] = [
        AgentId::CoordinateExtractor,
        AgentId::ChainOfThought,
        AgentId::CodeGenerator,
        AgentId::CodeVerifier,
        AgentId::UserPrompt,
        AgentId::PageSummarizer,
        AgentId::Summarizer,
        AgentId::ApplicationSelector,
    ];

    /// Wire name used in planner replies and as the entry sender.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoordinateExtractor => "CoordinateExtractorAgent",
            Self::ChainOfThought => "ChainOfThoughtAgent",
            Self::CodeGenerator => "CodeGeneratorAgent",
            Self::CodeVerifier => "CodeVerifierAgent",
            Self::UserPrompt => "UserPromptAgent",
            Self::PageSummarizer => "PageSummarizerAgent",
            Self::Summarizer => "SummarizerAgent",
            Self::ApplicationSelector => "ApplicationSelectorAgent",
        }
    }

    /// Role id used for provider configuration lookups.
    pub fn role(&self) -> &'static str {
        match self {
            Self::CoordinateExtractor => "coordinate_extractor",
            Self::ChainOfThought => "chain_of_thought",
            Self::CodeGenerator => "code_generator",
            Self::CodeVerifier => "code_verifier",
            Self::UserPrompt => "user_prompt",
            Self::PageSummarizer => "page_summarizer",
            Self::Summarizer => "summarizer",
            Self::ApplicationSelector => "application_selector",
        }
    }

    /// Resolve a wire name to a known identity. Unknown names yield `None`
    /// and are never dispatched.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.as_str() == name)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform capability every worker implements: consume the log, produce one
/// typed entry. A worker may fail with `MissingContext` when entries it
/// depends on are absent; the dispatch loop converts that into an `error`
/// entry and keeps the cycle alive.
#[async_trait]
pub trait Worker: Send + Sync {
    fn id(&self) -> AgentId;

    async fn produce(&self, room: &ChatRoom, expectation: &str) -> TapCrewResult<Message>;
}

/// Build the fixed worker registry, one worker per identity in dispatch
/// order, each wired to its configured provider role.
pub fn build_registry(
    providers: &crate::llm::registry::ProviderRegistry,
    device: std::sync::Arc<dyn crate::device::DeviceControl>,
    cell_size: u32,
    grids_dir: std::path::PathBuf,
) -> TapCrewResult<Vec<std::sync::Arc<dyn Worker>>> {
    use std::sync::Arc;

    Ok(vec![
        Arc::new(coordinate_extractor::CoordinateExtractor::new(
            providers.for_role(AgentId::CoordinateExtractor.role())?,
            cell_size,
            grids_dir,
        )),
        Arc::new(chain_of_thought::ChainOfThought::new(
            providers.for_role(AgentId::ChainOfThought.role())?,
        )),
        Arc::new(code_generator::CodeGenerator::new(
            providers.for_role(AgentId::CodeGenerator.role())?,
        )),
        Arc::new(code_verifier::CodeVerifier::new(
            providers.for_role(AgentId::CodeVerifier.role())?,
        )),
        Arc::new(user_prompt::UserPrompt::new(
            providers.for_role(AgentId::UserPrompt.role())?,
        )),
        Arc::new(page_summarizer::PageSummarizer::new(
            providers.for_role(AgentId::PageSummarizer.role())?,
        )),
        Arc::new(summarizer::Summarizer::new(
            providers.for_role(AgentId::Summarizer.role())?,
        )),
        Arc::new(application_selector::ApplicationSelector::new(
            providers.for_role(AgentId::ApplicationSelector.role())?,
            device,
        )),
    ])
}

/// Latest content of `kind`, or a `MissingContext` error attributed to the
/// requesting worker.
pub(crate) fn require(room: &ChatRoom, kind: MessageKind, agent: AgentId) -> TapCrewResult<String> {
    room.latest_content(kind)
        .map(str::to_string)
        .ok_or_else(|| TapCrewError::missing_context(agent.as_str(), kind.as_str()))
}

/// Build a worker's single output entry with the worker as sender.
pub(crate) fn reply(agent: AgentId, kind: MessageKind, content: String) -> Message {
    Message {
        sender: agent.as_str().to_string(),
        kind,
        content: content.trim().to_string(),
        timestamp: chrono::Utc::now(),
    }
}
