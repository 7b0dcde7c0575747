use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{reply, require, AgentId, Worker};
use crate::device::sanitize::sanitize_json;
use crate::engine::chatroom::{ChatRoom, Message, MessageKind};
use crate::errors::{TapCrewError, TapCrewResult};
use crate::llm::provider::ReasoningService;

const PROMPT: &str = "Write an action script for a touch device.\n\n\
Task: {task}\n\
Expectation: {expectation}\n\
Resolved screen coordinates: {json}\n\
Action plan: {action}\n\
Page summary: {page_summary}\n\
{error_section}\n\
Allowed statements, one per line:\n\
driver.tap(x, y)\n\
driver.double_tap(x, y)\n\
driver.long_press(x, y, duration_ms)\n\
driver.swipe(x1, y1, x2, y2)\n\
driver.type_text(x, y, \"text\")\n\
driver.press_key(\"enter\"|\"back\"|\"home\"|\"app_switch\")\n\
driver.launch(\"package.id\")\n\
time.sleep(seconds)\n\n\
Reply with the script in a single fenced code block and nothing else.";

/// Turns the action plan plus resolved coordinates into an executable
/// action script.
pub struct CodeGenerator {
    provider: Arc<dyn ReasoningService>,
}

impl CodeGenerator {
    pub fn new(provider: Arc<dyn ReasoningService>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for CodeGenerator {
    fn id(&self) -> AgentId {
        AgentId::CodeGenerator
    }

    async fn produce(&self, room: &ChatRoom, expectation: &str) -> TapCrewResult<Message> {
        let task = require(room, MessageKind::Task, self.id())?;
        let json = room
            .latest_content(MessageKind::ScreenCoordinates)
            .and_then(sanitize_json)
            .unwrap_or_else(|| "No JSON extracted".to_string());
        // The plan usually comes from ChainOfThought; the raw agent
        // selection carries enough intent when planning was skipped.
        let action = room
            .latest_content(MessageKind::ActionPlan)
            .or_else(|| room.latest_content(MessageKind::AgentSelection))
            .ok_or_else(|| TapCrewError::missing_context(self.id().as_str(), "action_plan"))?;
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
            .replace("{action}", action)
            .replace("{page_summary}", page_summary)
            .replace("{error_section}", &error_section);

        let code = self.provider.complete(&prompt, None).await?;
        Ok(reply(self.id(), MessageKind::CodeSnippet, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::StaticProvider;

    #[tokio::test]
    async fn generates_snippet_from_plan_and_coordinates() {
        let mut room = ChatRoom::new();
        room.add("User", MessageKind::Task, "open camera");
        room.add(
            "Controller",
            MessageKind::ScreenCoordinates,
            "extracted: {\"center\": (74, 37)}",
        );
        room.add("ChainOfThoughtAgent", MessageKind::ActionPlan, "Tap the shutter.");

        let provider = Arc::new(StaticProvider::new("```\ndriver.tap(74, 37)\n```"));
        let worker = CodeGenerator::new(provider.clone());
        let message = worker.produce(&room, "").await.unwrap();

        assert_eq!(message.kind, MessageKind::CodeSnippet);
        let prompt = provider.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("{\"center\": (74, 37)}"));
        assert!(prompt.contains("Tap the shutter."));
    }

    #[tokio::test]
    async fn agent_selection_substitutes_for_missing_plan() {
        let mut room = ChatRoom::new();
        room.add("User", MessageKind::Task, "open camera");
        room.add("OrchestratorAgent", MessageKind::AgentSelection, "run the generator");

        let worker = CodeGenerator::new(Arc::new(StaticProvider::new("```\ntime.sleep(1)\n```")));
        assert!(worker.produce(&room, "").await.is_ok());
    }

    #[tokio::test]
    async fn no_plan_at_all_is_missing_context() {
        let mut room = ChatRoom::new();
        room.add("User", MessageKind::Task, "open camera");
        let worker = CodeGenerator::new(Arc::new(StaticProvider::new("x")));
        let err = worker.produce(&room, "").await.unwrap_err();
        assert!(matches!(err, TapCrewError::MissingContext { .. }));
    }
}
