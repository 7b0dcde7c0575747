//! Outer session loop: capture → cycle → render, bounded by an iteration
//! ceiling. The ceiling is enforced here, not inside the dispatch loop; a
//! cycle always runs to a verdict once started.

use std::sync::Arc;
use std::time::Duration;

use crate::agents::build_registry;
use crate::artifacts::Artifacts;
use crate::config::SessionConfig;
use crate::device::DeviceControl;
use crate::engine::chatroom::{ChatRoom, MessageKind};
use crate::engine::dispatch::{DispatchLoop, CONTROLLER_SENDER};
use crate::engine::verdict::{CycleVerdict, SessionStatus};
use crate::errors::TapCrewResult;
use crate::llm::registry::{ProviderRegistry, ORCHESTRATOR_ROLE};
use crate::presentation::Presentation;

pub struct Session {
    room: ChatRoom,
    dispatch: DispatchLoop,
    device: Arc<dyn DeviceControl>,
    presentation: Arc<dyn Presentation>,
    config: SessionConfig,
    artifacts: Artifacts,
}

impl Session {
    /// Assemble a session with artifacts under the platform data dir.
    pub fn new(
        config: SessionConfig,
        providers: &ProviderRegistry,
        device: Arc<dyn DeviceControl>,
        presentation: Arc<dyn Presentation>,
    ) -> TapCrewResult<Self> {
        let room = ChatRoom::new();
        let artifacts = Artifacts::for_session(&room.session_id);
        Self::assemble(config, providers, device, presentation, room, artifacts)
    }

    /// Assemble with an explicit artifact root.
    pub fn with_artifacts(
        config: SessionConfig,
        providers: &ProviderRegistry,
        device: Arc<dyn DeviceControl>,
        presentation: Arc<dyn Presentation>,
        artifacts: Artifacts,
    ) -> TapCrewResult<Self> {
        Self::assemble(config, providers, device, presentation, ChatRoom::new(), artifacts)
    }

    fn assemble(
        config: SessionConfig,
        providers: &ProviderRegistry,
        device: Arc<dyn DeviceControl>,
        presentation: Arc<dyn Presentation>,
        mut room: ChatRoom,
        artifacts: Artifacts,
    ) -> TapCrewResult<Self> {
        room.attach_transcript(artifacts.transcript_path());
        let workers = build_registry(
            providers,
            device.clone(),
            config.grid_cell_size,
            artifacts.grids.clone(),
        )?;
        let dispatch = DispatchLoop::new(
            providers.for_role(ORCHESTRATOR_ROLE)?,
            workers,
            device.clone(),
            artifacts.coordinates.clone(),
        );
        Ok(Self {
            room,
            dispatch,
            device,
            presentation,
            config,
            artifacts,
        })
    }

    pub fn room(&self) -> &ChatRoom {
        &self.room
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// Run `task` until done, paused, or out of iterations.
    ///
    /// Calling `run` again on the same session resumes a paused run: the
    /// follow-up task is appended to the same room and the loop re-enters
    /// with the accumulated history.
    pub async fn run(&mut self, task: &str) -> TapCrewResult<SessionStatus> {
        self.room.add("User", MessageKind::Task, task);
        tracing::info!(
            session = %self.room.session_id,
            task = %task,
            max_iterations = self.config.max_iterations,
            "session started"
        );

        for iteration in 1..=self.config.max_iterations {
            tracing::info!(iteration, "iteration started");

            match self.device.capture().await {
                Ok(frame) => {
                    self.room
                        .add(CONTROLLER_SENDER, MessageKind::ScreenImage, frame.display().to_string());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "frame capture failed; cycle runs on stale context");
                }
            }

            let verdict = self.dispatch.run_cycle(&mut self.room).await;
            self.presentation.render(self.room.history());
            tracing::info!(iteration, ?verdict, "iteration finished");

            match verdict {
                CycleVerdict::Done => {
                    self.room.add(
                        CONTROLLER_SENDER,
                        MessageKind::Feedback,
                        "Task completed successfully.",
                    );
                    self.finish();
                    return Ok(SessionStatus::Completed);
                }
                CycleVerdict::WaitUser => {
                    self.room
                        .add(CONTROLLER_SENDER, MessageKind::Feedback, "Waiting for user input.");
                    self.finish();
                    return Ok(SessionStatus::Paused);
                }
                CycleVerdict::Continue | CycleVerdict::Stalled => {
                    tokio::time::sleep(Duration::from_secs(self.config.sleep_between_secs)).await;
                }
            }
        }

        tracing::warn!(max_iterations = self.config.max_iterations, "iteration ceiling reached");
        self.finish();
        Ok(SessionStatus::MaxIterationsReached)
    }

    fn finish(&self) {
        if let Err(e) = self.room.dump_json(&self.artifacts.log_dump_path()) {
            tracing::warn!(error = %e, "chatroom dump failed");
        }
    }
}
