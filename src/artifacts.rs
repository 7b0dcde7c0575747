//! Per-session artifact layout: screenshots, grid overlays, coordinate
//! annotations and transcripts, grouped under one session directory.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Artifacts {
    pub root: PathBuf,
    pub screenshots: PathBuf,
    pub grids: PathBuf,
    pub coordinates: PathBuf,
}

impl Artifacts {
    /// `<data dir>/tapcrew/sessions/<session id>/` on the platform data dir,
    /// falling back to the current working directory.
    pub fn for_session(session_id: &str) -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        Self::rooted_at(base.join("tapcrew").join("sessions").join(session_id))
    }

    /// Explicit root, used by tests and embedding callers.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let artifacts = Self {
            screenshots: root.join("screenshots"),
            grids: root.join("screenshot_grids"),
            coordinates: root.join("screenshot_coordinates"),
            root,
        };
        for dir in [
            &artifacts.root,
            &artifacts.screenshots,
            &artifacts.grids,
            &artifacts.coordinates,
        ] {
            if let Err(e) = std::fs::create_dir_all(dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "artifact dir creation failed");
            }
        }
        artifacts
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.root.join("transcript.jsonl")
    }

    pub fn log_dump_path(&self) -> PathBuf {
        self.root.join("chatroom.json")
    }
}

/// Place a sibling artifact of `source` under `dir`, keeping the file name
/// but appending `suffix` before the extension.
pub fn derived_path(source: &Path, dir: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    dir.join(format!("{stem}{suffix}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_path_keeps_stem() {
        let p = derived_path(
            Path::new("/tmp/shots/screenshot_001.png"),
            Path::new("/tmp/grids"),
            "_grid",
        );
        assert_eq!(p, PathBuf::from("/tmp/grids/screenshot_001_grid.png"));
    }
}
