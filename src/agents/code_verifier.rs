use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{reply, require, AgentId, Worker};
use crate::device::sanitize::{sanitize_code, sanitize_json};
use crate::engine::chatroom::{ChatRoom, Message, MessageKind};
use crate::errors::TapCrewResult;
use crate::llm::provider::ReasoningService;

const PROMPT: &str = "Review and repair an action script for a touch device.\n\n\
Task: {task}\n\
Expectation: {expectation}\n\
Resolved screen coordinates: {json}\n\
Action plan: {action}\n\
Page summary: {page_summary}\n\
{error_section}\n\
Current script:\n{code}\n\n\
Fix wrong coordinates, missing waits and out-of-order steps. Only the \
driver.* and time.sleep statements are allowed. Reply with the corrected \
script in a single fenced code block and nothing else.";

/// Improves an existing snippet using the latest error and screen context.
pub struct CodeVerifier {
    provider: Arc<dyn ReasoningService>,
}

impl CodeVerifier {
    pub fn new(provider: Arc<dyn ReasoningService>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for CodeVerifier {
    fn id(&self) -> AgentId {
        AgentId::CodeVerifier
    }

    async fn produce(&self, room: &ChatRoom, expectation: &str) -> TapCrewResult<Message> {
        let task = require(room, MessageKind::Task, self.id())?;
        let action = require(room, MessageKind::ActionPlan, self.id())?;
        let code = sanitize_code(&require(room, MessageKind::CodeSnippet, self.id())?);
        let json = room
            .latest_content(MessageKind::ScreenCoordinates)
            .and_then(sanitize_json)
            .unwrap_or_else(|| "No JSON extracted".to_string());
        let page_summary = room
            .latest_content(MessageKind::PageSummary)
            .unwrap_or_default();
        let error_section = room
            .latest_content(MessageKind::Error)
            .map(|e| format!("Previous error: {e}"))
            .unwrap_or_default();

        let prompt = PROMPT
            .replace("{task}", &task)
            .replace("{expectation}", expectation)
            .replace("{json}", &json)
            .replace("{action}", &action)
            .replace("{page_summary}", page_summary)
            .replace("{error_section}", &error_section)
            .replace("{code}", &code);

        let verified = self.provider.complete(&prompt, None).await?;
        Ok(reply(self.id(), MessageKind::CodeSnippet, verified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::StaticProvider;

    #[tokio::test]
    async fn verifies_existing_snippet() {
        let mut room = ChatRoom::new();
        room.add("User", MessageKind::Task, "open camera");
        room.add("ChainOfThoughtAgent", MessageKind::ActionPlan, "Tap shutter.");
        room.add(
            "CodeGeneratorAgent",
            MessageKind::CodeSnippet,
            "```\ndriver.tap(999, 37)\n```",
        );
        room.add("Controller", MessageKind::Error, "coordinates (999, 37) outside screen");

        let provider = Arc::new(StaticProvider::new("```\ndriver.tap(74, 37)\n```"));
        let worker = CodeVerifier::new(provider.clone());
        let message = worker.produce(&room, "").await.unwrap();

        assert_eq!(message.kind, MessageKind::CodeSnippet);
        assert_eq!(message.sender, "CodeVerifierAgent");
        let prompt = provider.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("driver.tap(999, 37)"));
        assert!(prompt.contains("Previous error: coordinates"));
    }

    #[tokio::test]
    async fn requires_a_snippet_to_verify() {
        let mut room = ChatRoom::new();
        room.add("User", MessageKind::Task, "open camera");
        room.add("ChainOfThoughtAgent", MessageKind::ActionPlan, "Tap shutter.");
        let worker = CodeVerifier::new(Arc::new(StaticProvider::new("x")));
        let err = worker.produce(&room, "").await.unwrap_err();
        assert!(err.to_string().contains("code_snippet"));
    }
}
