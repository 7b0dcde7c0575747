use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{reply, require, AgentId, Worker};
use crate::engine::chatroom::{ChatRoom, Message, MessageKind};
use crate::errors::TapCrewResult;
use crate::llm::provider::ReasoningService;

const PROMPT: &str = "You are planning the next action on a mobile device.\n\n\
Task: {task}\n\
Expectation: {expectation}\n\
Resolved screen coordinates: {json}\n\
Page summary: {page_summary}\n\
{feedback_section}\n\
Reason step by step about the current screen state, then state the single \
next best action in one imperative sentence.";

/// Reasoning worker: turns the resolved coordinates and recent feedback into
/// an action plan for the code generator.
pub struct ChainOfThought {
    provider: Arc<dyn ReasoningService>,
}

impl ChainOfThought {
    pub fn new(provider: Arc<dyn ReasoningService>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for ChainOfThought {
    fn id(&self) -> AgentId {
        AgentId::ChainOfThought
    }

    async fn produce(&self, room: &ChatRoom, expectation: &str) -> TapCrewResult<Message> {
        let task = require(room, MessageKind::Task, self.id())?;
        let json = room
            .latest_content(MessageKind::ScreenCoordinates)
            .unwrap_or("No JSON data found.");
        let page_summary = room
            .latest_content(MessageKind::PageSummary)
            .unwrap_or_default();

        let mut feedback_section = String::new();
        if let Some(feedback) = room.latest_content(MessageKind::Feedback) {
            feedback_section.push_str(&format!("Previous feedback: {feedback}\n"));
        }
        if let Some(error) = room.latest_content(MessageKind::Error) {
            feedback_section.push_str(&format!("Previous error: {error}\n"));
        }

        let prompt = PROMPT
            .replace("{task}", &task)
            .replace("{expectation}", expectation)
            .replace("{json}", json)
            .replace("{page_summary}", page_summary)
            .replace("{feedback_section}", &feedback_section);

        let response = self.provider.complete(&prompt, None).await?;
        Ok(reply(self.id(), MessageKind::ActionPlan, response))
    }
}
