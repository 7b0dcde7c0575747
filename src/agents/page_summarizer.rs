use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{reply, require, AgentId, Worker};
use crate::engine::chatroom::{ChatRoom, Message, MessageKind};
use crate::errors::TapCrewResult;
use crate::llm::provider::ReasoningService;

const PROMPT: &str = "Describe the attached mobile screenshot for an automation run.\n\n\
Task: {task}\n\
Expectation: {expectation}\n\n\
Summarize in a few sentences: which application and screen is visible, the \
main interactive elements, and anything blocking progress (dialogs, \
keyboards, permission prompts).";

/// Reads the latest frame and summarizes the visible screen.
pub struct PageSummarizer {
    provider: Arc<dyn ReasoningService>,
}

impl PageSummarizer {
    pub fn new(provider: Arc<dyn ReasoningService>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for PageSummarizer {
    fn id(&self) -> AgentId {
        AgentId::PageSummarizer
    }

    async fn produce(&self, room: &ChatRoom, expectation: &str) -> TapCrewResult<Message> {
        let task = require(room, MessageKind::Task, self.id())?;
        let frame = require(room, MessageKind::ScreenImage, self.id())?;

        let prompt = PROMPT
            .replace("{task}", &task)
            .replace("{expectation}", expectation);
        let summary = self
            .provider
            .complete(&prompt, Some(Path::new(&frame)))
            .await?;
        Ok(reply(self.id(), MessageKind::PageSummary, summary))
    }
}
