use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{reply, require, AgentId, Worker};
use crate::device::DeviceControl;
use crate::engine::chatroom::{ChatRoom, Message, MessageKind};
use crate::errors::TapCrewResult;
use crate::llm::provider::ReasoningService;

const PROMPT: &str = "Pick the application to carry out a task on a mobile device.\n\n\
Task: {task}\n\
Expectation: {expectation}\n\
{feedback_section}\n\
Installed packages:\n{available_apps}\n\n\
Reply with the single best package identifier and nothing else.";

/// Chooses which installed application the task should run in.
pub struct ApplicationSelector {
    provider: Arc<dyn ReasoningService>,
    device: Arc<dyn DeviceControl>,
}

impl ApplicationSelector {
    pub fn new(provider: Arc<dyn ReasoningService>, device: Arc<dyn DeviceControl>) -> Self {
        Self { provider, device }
    }
}

#[async_trait]
impl Worker for ApplicationSelector {
    fn id(&self) -> AgentId {
        AgentId::ApplicationSelector
    }

    async fn produce(&self, room: &ChatRoom, expectation: &str) -> TapCrewResult<Message> {
        let task = require(room, MessageKind::Task, self.id())?;

        let available_apps = match self.device.installed_packages().await {
            Ok(packages) => packages.join("\n"),
            Err(e) => {
                tracing::warn!(error = %e, "package listing unavailable");
                String::new()
            }
        };

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
            .replace("{feedback_section}", &feedback_section)
            .replace("{available_apps}", &available_apps);

        let response = self.provider.complete(&prompt, None).await?;
        Ok(reply(self.id(), MessageKind::SelectedApplication, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::StubDevice;
    use crate::llm::testing::StaticProvider;

    #[tokio::test]
    async fn offers_installed_packages_to_the_model() {
        let mut room = ChatRoom::new();
        room.add("User", MessageKind::Task, "take a photo");

        let device = Arc::new(StubDevice {
            packages: vec!["com.android.camera".into(), "com.android.settings".into()],
            ..StubDevice::default()
        });
        let provider = Arc::new(StaticProvider::new("com.android.camera"));
        let worker = ApplicationSelector::new(provider.clone(), device);

        let message = worker.produce(&room, "").await.unwrap();
        assert_eq!(message.kind, MessageKind::SelectedApplication);
        assert_eq!(message.content, "com.android.camera");
        assert!(provider.prompts.lock().unwrap()[0].contains("com.android.settings"));
    }
}
