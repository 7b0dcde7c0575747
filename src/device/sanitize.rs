//! Cleanup of model output before it touches the device.

use std::sync::OnceLock;

use regex::Regex;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[a-zA-Z]*\r?\n?([\s\S]*?)```").unwrap())
}

fn package_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)+").unwrap())
}

/// Strip markdown fences from a generated script. The first fenced block
/// wins when the reply mixes prose and code; a fence-free reply is trimmed
/// as-is.
pub fn sanitize_code(raw: &str) -> String {
    match fence_re().captures(raw) {
        Some(caps) => caps[1].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Reduce an application-selection reply to a bare package identifier.
/// Launchable-activity suffixes (`pkg/Activity`) and surrounding prose are
/// cut away; a reply with no package-shaped token is returned trimmed.
pub fn sanitize_app_selection(raw: &str) -> String {
    match package_re().find(raw) {
        Some(m) => m.as_str().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Extract the JSON-ish payload from an entry: the first fenced block if
/// present, otherwise the outermost `{…}` span, otherwise nothing.
pub fn sanitize_json(raw: &str) -> Option<String> {
    if let Some(caps) = fence_re().captures(raw) {
        return Some(caps[1].trim().to_string());
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(raw[start..=end].to_string())
}
