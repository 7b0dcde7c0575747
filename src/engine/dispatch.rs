//! One dispatch cycle: plan → invoke → route outputs → verdict.
//!
//! No error class escapes a cycle. Planner faults, worker precondition
//! violations, device faults and script faults all become `error` entries
//! that feed the next iteration's context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agents::Worker;
use crate::device::sanitize::{sanitize_app_selection, sanitize_code};
use crate::device::{script, DeviceControl};
use crate::engine::chatroom::{render_transcript, ChatRoom, Message, MessageKind};
use crate::engine::plan::parse_plan;
use crate::engine::verdict::CycleVerdict;
use crate::llm::provider::ReasoningService;
use crate::perception::annotator;

pub const ORCHESTRATOR_SENDER: &str = "OrchestratorAgent";
pub const CONTROLLER_SENDER: &str = "Controller";

const PLANNER_PROMPT: &str = "You coordinate a crew of automation workers \
driving a mobile device.\n\n\
Task: {task}\n\n\
Recent run history:\n{history}\n\n\
Workers you may select:\n\
- CoordinateExtractorAgent: locate a UI element on the current screen\n\
- ChainOfThoughtAgent: decide the next action from resolved coordinates\n\
- CodeGeneratorAgent: write the action script for the planned action\n\
- CodeVerifierAgent: repair the previous script after an error\n\
- UserPromptAgent: ask the user for input when blocked\n\
- PageSummarizerAgent: describe the current screen\n\
- SummarizerAgent: wrap up when the task is complete\n\
- ApplicationSelectorAgent: pick and open the right application\n\n\
Select the workers for the next step. Reply with exactly one JSON block:\n\
```json\n{\"next_agents\": [{\"name\": \"<worker>\", \"expectation\": \"<what you expect from it>\"}]}\n```";

/// Per-iteration state machine over the shared chat room.
pub struct DispatchLoop {
    planner: Arc<dyn ReasoningService>,
    workers: Vec<Arc<dyn Worker>>,
    device: Arc<dyn DeviceControl>,
    coordinates_dir: PathBuf,
}

impl DispatchLoop {
    pub fn new(
        planner: Arc<dyn ReasoningService>,
        workers: Vec<Arc<dyn Worker>>,
        device: Arc<dyn DeviceControl>,
        coordinates_dir: PathBuf,
    ) -> Self {
        Self {
            planner,
            workers,
            device,
            coordinates_dir,
        }
    }

    /// Run one cycle to a verdict. The room is the only thing mutated, and
    /// only by appends.
    pub async fn run_cycle(&self, room: &mut ChatRoom) -> CycleVerdict {
        let recent = room.since_last(MessageKind::AgentSelection);
        let task = recent
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::Task)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "Unknown task".to_string());
        let history = render_transcript(recent);

        let prompt = PLANNER_PROMPT
            .replace("{task}", &task)
            .replace("{history}", &history);

        let selection = match self.planner.complete(&prompt, None).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                tracing::error!(error = %e, "planner request failed");
                room.add(
                    ORCHESTRATOR_SENDER,
                    MessageKind::Error,
                    format!("Orchestrator failed: {e}"),
                );
                return CycleVerdict::Continue;
            }
        };

        // The raw reply is appended before parsing so the audit trail
        // survives malformed output. It is also the slicing marker for the
        // next cycle's context window.
        room.add(ORCHESTRATOR_SENDER, MessageKind::AgentSelection, selection.clone());

        let plan = parse_plan(&selection);
        tracing::info!(
            selected = ?plan.keys().map(|id| id.as_str()).collect::<Vec<_>>(),
            "plan parsed"
        );

        let mut verdict = CycleVerdict::Stalled;

        // Fixed declaration order, not plan order: deterministic execution
        // regardless of how the planner listed the names.
        for worker in &self.workers {
            let Some(expectation) = plan.get(&worker.id()) else {
                continue;
            };

            tracing::info!(worker = %worker.id(), expectation = %expectation, "invoking worker");
            match worker.produce(room, expectation).await {
                Ok(message) => {
                    room.add(message.sender.clone(), message.kind, message.content.clone());
                    verdict = match message.kind {
                        MessageKind::Summary => CycleVerdict::Done,
                        MessageKind::UserPrompt => CycleVerdict::WaitUser,
                        _ => CycleVerdict::Continue,
                    };
                    self.route_output(room, &message).await;
                }
                Err(e) => {
                    tracing::warn!(worker = %worker.id(), error = %e, "worker failed");
                    room.add(
                        worker.id().as_str(),
                        MessageKind::Error,
                        format!("Agent error: {e}"),
                    );
                    verdict = CycleVerdict::Continue;
                }
            }
        }

        verdict
    }

    /// Typed side effects of a worker output. Faults become `error` entries
    /// from the controller and never abort the remaining workers.
    async fn route_output(&self, room: &mut ChatRoom, message: &Message) {
        match message.kind {
            MessageKind::ProposedScreenCoordinates => {
                let Some(frame) = room
                    .latest_content(MessageKind::ScreenImage)
                    .map(str::to_string)
                else {
                    room.add(
                        CONTROLLER_SENDER,
                        MessageKind::Error,
                        "No captured frame to resolve coordinates against",
                    );
                    return;
                };
                match annotator::annotate_from_reply(
                    &message.content,
                    Path::new(&frame),
                    &self.coordinates_dir,
                ) {
                    Ok(Some(annotation)) => {
                        tracing::info!(x = annotation.center.0, y = annotation.center.1, "screen coordinates extracted");
                        room.add(
                            CONTROLLER_SENDER,
                            MessageKind::ScreenCoordinates,
                            format!("Screen coordinates extracted: {}", annotation.describe()),
                        );
                    }
                    Ok(None) => {
                        room.add(
                            CONTROLLER_SENDER,
                            MessageKind::ScreenCoordinates,
                            "Screen coordinates extracted: none",
                        );
                    }
                    Err(e) => {
                        room.add(
                            CONTROLLER_SENDER,
                            MessageKind::Error,
                            format!("Coordinate annotation failed: {e}"),
                        );
                    }
                }
            }

            MessageKind::SelectedApplication => {
                let package = sanitize_app_selection(&message.content);
                tracing::info!(package = %package, "application selected");
                room.add(
                    CONTROLLER_SENDER,
                    MessageKind::Feedback,
                    format!("Application selected: {package}"),
                );
                if let Err(e) = self.device.launch(&package).await {
                    room.add(
                        CONTROLLER_SENDER,
                        MessageKind::Error,
                        format!("Launch failed: {e}"),
                    );
                }
            }

            MessageKind::CodeSnippet => {
                let cleaned = sanitize_code(&message.content);
                match script::execute(&cleaned, self.device.as_ref()).await {
                    Ok(statements) => {
                        tracing::info!(statements, "script executed");
                    }
                    Err(e) => {
                        // The fault is context for the next generation
                        // attempt, not a fatal abort.
                        tracing::warn!(error = %e, "script execution failed");
                        room.add(CONTROLLER_SENDER, MessageKind::Error, e.to_string());
                    }
                }
            }

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{build_registry, AgentId};
    use crate::config::LlmConfig;
    use crate::device::testing::StubDevice;
    use crate::llm::registry::ProviderRegistry;
    use crate::llm::testing::StaticProvider;

    fn selection(worker: &str, expectation: &str) -> String {
        format!(
            "```json\n{{\"next_agents\": [{{\"name\": \"{worker}\", \"expectation\": \"{expectation}\"}}]}}\n```"
        )
    }

    fn registry_with(entries: &[(&str, &str)]) -> ProviderRegistry {
        let mut registry = ProviderRegistry::from_config(&LlmConfig::default());
        for (role, reply) in entries {
            registry.register(role, Arc::new(StaticProvider::new(reply)));
        }
        registry
    }

    fn loop_with(
        planner_reply: &str,
        registry: &ProviderRegistry,
        device: Arc<StubDevice>,
        dir: &Path,
    ) -> DispatchLoop {
        let workers = build_registry(registry, device.clone(), 75, dir.join("grids")).unwrap();
        std::fs::create_dir_all(dir.join("grids")).unwrap();
        std::fs::create_dir_all(dir.join("coords")).unwrap();
        DispatchLoop::new(
            Arc::new(StaticProvider::new(planner_reply)),
            workers,
            device,
            dir.join("coords"),
        )
    }

    fn task_room() -> ChatRoom {
        let mut room = ChatRoom::new();
        room.add("User", MessageKind::Task, "open camera");
        room
    }

    #[tokio::test]
    async fn summary_output_yields_done() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&[("summarizer", "All steps completed.")]);
        let device = Arc::new(StubDevice::default());
        let dispatch = loop_with(
            &selection("SummarizerAgent", "wrap up"),
            &registry,
            device,
            dir.path(),
        );

        let mut room = task_room();
        let verdict = dispatch.run_cycle(&mut room).await;

        assert_eq!(verdict, CycleVerdict::Done);
        assert_eq!(
            room.latest_content(MessageKind::Summary),
            Some("All steps completed.")
        );
        // Raw planner reply lands in the log regardless of parsing.
        assert!(room.latest(MessageKind::AgentSelection).is_some());
    }

    #[tokio::test]
    async fn user_prompt_output_yields_wait_user() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&[("user_prompt", "Which account should I use?")]);
        let device = Arc::new(StubDevice::default());
        let dispatch = loop_with(
            &selection("UserPromptAgent", "ask the user"),
            &registry,
            device,
            dir.path(),
        );

        let mut room = task_room();
        room.add("Controller", MessageKind::Error, "two accounts available");
        let verdict = dispatch.run_cycle(&mut room).await;

        assert_eq!(verdict, CycleVerdict::WaitUser);
        assert_eq!(
            room.latest_content(MessageKind::UserPrompt),
            Some("Which account should I use?")
        );
    }

    #[tokio::test]
    async fn empty_plan_yields_stalled_with_audit_entry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&[]);
        let device = Arc::new(StubDevice::default());
        let dispatch = loop_with("I am not sure what to do next.", &registry, device, dir.path());

        let mut room = task_room();
        let before = room.len();
        let verdict = dispatch.run_cycle(&mut room).await;

        assert_eq!(verdict, CycleVerdict::Stalled);
        assert_eq!(room.len(), before + 1);
        assert_eq!(
            room.latest_content(MessageKind::AgentSelection),
            Some("I am not sure what to do next.")
        );
    }

    #[tokio::test]
    async fn planner_outage_is_logged_and_cycle_continues() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&[]);
        let device = Arc::new(StubDevice::default());
        let workers = build_registry(&registry, device.clone(), 75, dir.path().to_path_buf()).unwrap();
        let dispatch = DispatchLoop::new(
            Arc::new(StaticProvider::failing()),
            workers,
            device,
            dir.path().to_path_buf(),
        );

        let mut room = task_room();
        let verdict = dispatch.run_cycle(&mut room).await;

        assert_eq!(verdict, CycleVerdict::Continue);
        let error = room.latest(MessageKind::Error).unwrap();
        assert_eq!(error.sender, ORCHESTRATOR_SENDER);
        assert!(error.content.starts_with("Orchestrator failed:"));
        assert!(room.latest(MessageKind::AgentSelection).is_none());
    }

    #[tokio::test]
    async fn failed_worker_does_not_abort_later_workers() {
        let dir = tempfile::tempdir().unwrap();
        // CoordinateExtractor will fail (no screen_image); Summarizer runs after.
        let registry = registry_with(&[("summarizer", "Done anyway.")]);
        let device = Arc::new(StubDevice::default());
        let planner_reply = "```json\n{\"next_agents\": [\
            {\"name\": \"SummarizerAgent\", \"expectation\": \"\"},\
            {\"name\": \"CoordinateExtractorAgent\", \"expectation\": \"\"}]}\n```";
        let dispatch = loop_with(planner_reply, &registry, device, dir.path());

        let mut room = task_room();
        let verdict = dispatch.run_cycle(&mut room).await;

        // Extractor ran first (fixed order), failed into an error entry,
        // then the summarizer still produced, so the last output wins.
        assert_eq!(verdict, CycleVerdict::Done);
        let error = room.latest(MessageKind::Error).unwrap();
        assert_eq!(error.sender, AgentId::CoordinateExtractor.as_str());
        assert!(error.content.starts_with("Agent error:"));
        assert_eq!(room.latest_content(MessageKind::Summary), Some("Done anyway."));

        // The error entry precedes the summary: extractor went first even
        // though the plan listed it second.
        let history = room.history();
        let error_idx = history.iter().position(|m| m.kind == MessageKind::Error).unwrap();
        let summary_idx = history.iter().position(|m| m.kind == MessageKind::Summary).unwrap();
        assert!(error_idx < summary_idx);
    }

    #[tokio::test]
    async fn selected_application_is_sanitized_and_launched() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&[(
            "application_selector",
            "Use `com.android.camera/com.android.camera.CameraLauncher` for this.",
        )]);
        let device = Arc::new(StubDevice::default());
        let dispatch = loop_with(
            &selection("ApplicationSelectorAgent", "pick the app"),
            &registry,
            device.clone(),
            dir.path(),
        );

        let mut room = task_room();
        let verdict = dispatch.run_cycle(&mut room).await;

        assert_eq!(verdict, CycleVerdict::Continue);
        assert_eq!(
            room.latest_content(MessageKind::Feedback),
            Some("Application selected: com.android.camera")
        );
        assert_eq!(
            device.calls.lock().unwrap().clone(),
            vec!["launch(com.android.camera)"]
        );
    }

    #[tokio::test]
    async fn code_snippet_executes_and_faults_become_context() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&[(
            "code_generator",
            "```\ndriver.tap(74, 37)\ndriver.teleport(1, 2)\n```",
        )]);
        let device = Arc::new(StubDevice::default());
        let planner_reply = selection("CodeGeneratorAgent", "tap the shutter");
        let dispatch = loop_with(&planner_reply, &registry, device.clone(), dir.path());

        let mut room = task_room();
        room.add("ChainOfThoughtAgent", MessageKind::ActionPlan, "Tap the shutter.");
        let verdict = dispatch.run_cycle(&mut room).await;

        assert_eq!(verdict, CycleVerdict::Continue);
        let error = room.latest(MessageKind::Error).unwrap();
        assert_eq!(error.sender, CONTROLLER_SENDER);
        assert!(error.content.contains("unknown operation"));
        // Parse failure means nothing ran against the device.
        assert!(device.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_coordinate_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("frame.png");
        image::RgbaImage::from_pixel(750, 750, image::Rgba([90, 90, 90, 255]))
            .save(&frame)
            .unwrap();

        let registry = registry_with(&[(
            "coordinate_extractor",
            "Shutter found in the top-left cells.\n```json\n{\"cell_numbers\": [1, 2]}\n```",
        )]);
        let device = Arc::new(StubDevice::default());
        let dispatch = loop_with(
            &selection("CoordinateExtractorAgent", "find shutter"),
            &registry,
            device,
            dir.path(),
        );

        let mut room = task_room();
        room.add("Controller", MessageKind::ScreenImage, frame.display().to_string());
        let verdict = dispatch.run_cycle(&mut room).await;

        assert_eq!(verdict, CycleVerdict::Continue);
        let proposed = room.latest_content(MessageKind::ProposedScreenCoordinates).unwrap();
        assert!(proposed.contains("\"coordinates\": (74, 37)"));

        // Grid centers (37,37) and (112,37) average to (74,37).
        let resolved = room.latest(MessageKind::ScreenCoordinates).unwrap();
        assert_eq!(resolved.sender, CONTROLLER_SENDER);
        assert!(resolved.content.contains("(74, 37)"));
    }
}
