pub mod gemini;
pub mod provider;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::errors::{TapCrewError, TapCrewResult};
    use crate::llm::provider::ReasoningService;

    /// Canned-reply provider: pops the next scripted reply per call, holding
    /// the last one once the script runs out.
    pub struct StaticProvider {
        replies: Mutex<Vec<String>>,
        pub prompts: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl StaticProvider {
        pub fn new(reply: &str) -> Self {
            Self::with_replies(&[reply])
        }

        pub fn with_replies(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                replies: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ReasoningService for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn complete(&self, prompt: &str, _image: Option<&Path>) -> TapCrewResult<String> {
            if self.fail {
                return Err(TapCrewError::Reasoning("injected provider outage".into()));
            }
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.pop().unwrap()
            } else {
                replies.last().cloned().unwrap_or_default()
            };
            Ok(reply)
        }
    }
}
