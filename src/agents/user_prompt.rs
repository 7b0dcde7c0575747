use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{reply, require, AgentId, Worker};
use crate::engine::chatroom::{ChatRoom, Message, MessageKind};
use crate::errors::{TapCrewError, TapCrewResult};
use crate::llm::provider::ReasoningService;

const PROMPT: &str = "The automation run is blocked and needs the user.\n\n\
Task: {task}\n\
Expectation: {expectation}\n\
Resolved screen coordinates: {json}\n\
Page summary: {page_summary}\n\
Blocking context: {error}\n\n\
Write one short, polite question asking the user for exactly the input or \
decision needed to continue.";

/// Asks the human for help when the run cannot proceed on its own.
pub struct UserPrompt {
    provider: Arc<dyn ReasoningService>,
}

impl UserPrompt {
    pub fn new(provider: Arc<dyn ReasoningService>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for UserPrompt {
    fn id(&self) -> AgentId {
        AgentId::UserPrompt
    }

    async fn produce(&self, room: &ChatRoom, expectation: &str) -> TapCrewResult<Message> {
        let task = require(room, MessageKind::Task, self.id())?;
        let json = room
            .latest_content(MessageKind::ScreenCoordinates)
            .unwrap_or("No JSON extracted");
        let page_summary = room
            .latest_content(MessageKind::PageSummary)
            .unwrap_or_default();
        // Whatever blocked the run: the last error, or the planner's own
        // reasoning when no error was recorded.
        let blocking = room
            .latest_content(MessageKind::Error)
            .or_else(|| room.latest_content(MessageKind::AgentSelection))
            .ok_or_else(|| TapCrewError::missing_context(self.id().as_str(), "error"))?;

        let prompt = PROMPT
            .replace("{task}", &task)
            .replace("{expectation}", expectation)
            .replace("{json}", json)
            .replace("{page_summary}", page_summary)
            .replace("{error}", blocking);

        let message = self.provider.complete(&prompt, None).await?;
        Ok(reply(self.id(), MessageKind::UserPrompt, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::StaticProvider;

    #[tokio::test]
    async fn prompts_user_with_blocking_error() {
        let mut room = ChatRoom::new();
        room.add("User", MessageKind::Task, "log into the banking app");
        room.add("Controller", MessageKind::Error, "login screen requires a one-time code");

        let provider = Arc::new(StaticProvider::new("Please enter the one-time code."));
        let worker = UserPrompt::new(provider.clone());
        let message = worker.produce(&room, "").await.unwrap();

        assert_eq!(message.kind, MessageKind::UserPrompt);
        assert!(provider.prompts.lock().unwrap()[0].contains("one-time code"));
    }

    #[tokio::test]
    async fn needs_error_or_planner_context() {
        let mut room = ChatRoom::new();
        room.add("User", MessageKind::Task, "t");
        let worker = UserPrompt::new(Arc::new(StaticProvider::new("x")));
        assert!(worker.produce(&room, "").await.is_err());

        room.add("OrchestratorAgent", MessageKind::AgentSelection, "stuck, ask the user");
        assert!(worker.produce(&room, "").await.is_ok());
    }
}
