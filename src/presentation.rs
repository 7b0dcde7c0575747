//! One-way display sink. The engine pushes log snapshots out after every
//! cycle and never reads anything back.

use crate::engine::chatroom::Message;

pub trait Presentation: Send + Sync {
    fn render(&self, log: &[Message]);
}

/// Default sink: surfaces the newest entry through tracing.
pub struct TracingPresentation;

impl Presentation for TracingPresentation {
    fn render(&self, log: &[Message]) {
        if let Some(latest) = log.last() {
            tracing::info!(
                sender = %latest.sender,
                kind = %latest.kind,
                entries = log.len(),
                "log updated"
            );
        }
    }
}

/// Discards snapshots; used where no display exists.
pub struct NullPresentation;

impl Presentation for NullPresentation {
    fn render(&self, _log: &[Message]) {}
}
