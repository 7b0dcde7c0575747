use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{reply, require, AgentId, Worker};
use crate::engine::chatroom::{render_transcript, ChatRoom, Message, MessageKind};
use crate::errors::TapCrewResult;
use crate::llm::provider::ReasoningService;

const PROMPT: &str = "The automation task has finished.\n\n\
Task: {task}\n\
Expectation: {expectation}\n\n\
Full run transcript:\n{history}\n\n\
Write a short human-readable summary of what was attempted, what happened, \
and the final outcome.";

/// Closes the session with a human-readable summary of the whole run.
pub struct Summarizer {
    provider: Arc<dyn ReasoningService>,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn ReasoningService>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for Summarizer {
    fn id(&self) -> AgentId {
        AgentId::Summarizer
    }

    async fn produce(&self, room: &ChatRoom, expectation: &str) -> TapCrewResult<Message> {
        let task = require(room, MessageKind::Task, self.id())?;
        let history = render_transcript(room.history());

        let prompt = PROMPT
            .replace("{task}", &task)
            .replace("{expectation}", expectation)
            .replace("{history}", &history);
        let summary = self.provider.complete(&prompt, None).await?;
        Ok(reply(self.id(), MessageKind::Summary, summary))
    }
}
