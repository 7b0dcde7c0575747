use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{reply, require, AgentId, Worker};
use crate::engine::chatroom::{ChatRoom, Message, MessageKind};
use crate::errors::TapCrewResult;
use crate::llm::provider::ReasoningService;
use crate::perception::grid;

const PROMPT: &str = "You are locating a UI element on a mobile screenshot.\n\
The screenshot has a numbered grid overlay: red lines, blue cell numbers, \
numbered left to right then top to bottom starting at 1.\n\n\
Task: {task}\n\
Expectation: {expectation}\n\
Page summary: {page_summary}\n\n\
Identify every grid cell covering the tappable area of the target element. \
Explain briefly what you see, then finish with exactly one JSON block:\n\
```json\n{\"cell_numbers\": [<int>, ...]}\n```";

/// Perception worker: overlays a grid on the latest frame, asks the vision
/// model for cell numbers, and resolves them to one pixel coordinate that is
/// embedded back into the reply.
pub struct CoordinateExtractor {
    provider: Arc<dyn ReasoningService>,
    cell_size: u32,
    grids_dir: PathBuf,
}

impl CoordinateExtractor {
    pub fn new(provider: Arc<dyn ReasoningService>, cell_size: u32, grids_dir: PathBuf) -> Self {
        Self {
            provider,
            cell_size,
            grids_dir,
        }
    }
}

#[async_trait]
impl Worker for CoordinateExtractor {
    fn id(&self) -> AgentId {
        AgentId::CoordinateExtractor
    }

    async fn produce(&self, room: &ChatRoom, expectation: &str) -> TapCrewResult<Message> {
        let task = require(room, MessageKind::Task, self.id())?;
        let frame = require(room, MessageKind::ScreenImage, self.id())?;
        let page_summary = room
            .latest_content(MessageKind::PageSummary)
            .unwrap_or_default();

        let overlay = grid::build_overlay(Path::new(&frame), self.cell_size, &self.grids_dir)?;

        let prompt = PROMPT
            .replace("{task}", &task)
            .replace("{expectation}", expectation)
            .replace("{page_summary}", page_summary);
        let extracted = self
            .provider
            .complete(&prompt, Some(&overlay.grid_image_path))
            .await?;

        let cells = grid::extract_cell_numbers(&extracted).unwrap_or_else(|| {
            tracing::warn!("no cell selection found in extraction reply");
            Vec::new()
        });
        let coordinates = overlay.resolve(&cells);
        tracing::info!(
            cells = cells.len(),
            x = coordinates.0,
            y = coordinates.1,
            "cell selection resolved"
        );

        let content = grid::embed_coordinates(&extracted, coordinates, &cells);
        Ok(reply(self.id(), MessageKind::ProposedScreenCoordinates, content))
    }
}
