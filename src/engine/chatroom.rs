use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed vocabulary of log entry types. The dispatch loop's routing and the
/// workers' context lookups are all keyed by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Task,
    ScreenImage,
    ProposedScreenCoordinates,
    ScreenCoordinates,
    ActionPlan,
    CodeSnippet,
    SelectedApplication,
    PageSummary,
    AgentSelection,
    Feedback,
    Error,
    UserPrompt,
    Summary,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::ScreenImage => "screen_image",
            Self::ProposedScreenCoordinates => "proposed_screen_coordinates",
            Self::ScreenCoordinates => "screen_coordinates",
            Self::ActionPlan => "action_plan",
            Self::CodeSnippet => "code_snippet",
            Self::SelectedApplication => "selected_application",
            Self::PageSummary => "page_summary",
            Self::AgentSelection => "agent_selection",
            Self::Feedback => "feedback",
            Self::Error => "error",
            Self::UserPrompt => "user_prompt",
            Self::Summary => "summary",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable log entry. Never edited after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only, time-ordered shared message log.
///
/// The single owned mutable resource of a session: the dispatch loop is its
/// sole writer during a cycle, workers only read the snapshot they are
/// handed. Entries are removed only by `clear`.
pub struct ChatRoom {
    messages: Vec<Message>,
    pub session_id: String,
    transcript_path: Option<PathBuf>,
}

impl ChatRoom {
    /// Purely in-memory log.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            session_id: uuid::Uuid::new_v4().to_string(),
            transcript_path: None,
        }
    }

    /// Stream every subsequent append to a JSONL transcript as well.
    /// Flush failures are logged, never surfaced; appends cannot fail.
    pub fn attach_transcript(&mut self, path: PathBuf) {
        self.transcript_path = Some(path);
    }

    pub fn add(&mut self, sender: impl Into<String>, kind: MessageKind, content: impl Into<String>) {
        let message = Message {
            sender: sender.into(),
            kind,
            content: content.into(),
            timestamp: self.next_timestamp(),
        };
        tracing::debug!(sender = %message.sender, kind = %message.kind, "message appended");
        self.flush(&message);
        self.messages.push(message);
    }

    /// Wall-clock time clamped so timestamps never move backwards within a log.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    fn flush(&self, message: &Message) {
        let Some(path) = &self.transcript_path else {
            return;
        };
        let result = serde_json::to_string(message).map(|line| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| writeln!(file, "{line}"))
        });
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(path = %path.display(), error = %e, "transcript flush failed"),
            Err(e) => tracing::warn!(error = %e, "transcript serialize failed"),
        }
    }

    /// Full history in append order.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Most recent entry of the given kind, scanning backwards.
    pub fn latest(&self, kind: MessageKind) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.kind == kind)
    }

    /// Content of the most recent entry of the given kind.
    pub fn latest_content(&self, kind: MessageKind) -> Option<&str> {
        self.latest(kind).map(|m| m.content.as_str())
    }

    /// All entries of the given kind, in original order.
    pub fn filter(&self, kind: MessageKind) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.kind == kind).collect()
    }

    /// Everything strictly after the most recent entry of `marker`, or the
    /// whole log when no marker exists. Bounds the context sent to the
    /// planner each cycle.
    pub fn since_last(&self, marker: MessageKind) -> &[Message] {
        let start = self
            .messages
            .iter()
            .rposition(|m| m.kind == marker)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.messages[start..]
    }

    pub fn has_kind_from(&self, kind: MessageKind, sender: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.kind == kind && m.sender == sender)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Dump the full ordered log as pretty JSON, the only durable state
    /// format the engine defines.
    pub fn dump_json(&self, path: &std::path::Path) -> crate::errors::TapCrewResult<()> {
        let json = serde_json::to_string_pretty(&self.messages)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), entries = self.messages.len(), "chatroom dumped");
        Ok(())
    }
}

impl Default for ChatRoom {
    fn default() -> Self {
        Self::new()
    }
}

/// Textual rendering of a slice of history, one `[sender] (kind): content`
/// line per entry. Frames are binary payload paths, not prose; they are
/// excluded here and looked up separately by the perception workers.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.kind != MessageKind::ScreenImage)
        .map(|m| format!("[{}] ({}): {}", m.sender, m.kind, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
