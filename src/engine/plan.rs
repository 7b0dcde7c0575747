//! Turns a planner's free-text reply into a worker-invocation plan.
//!
//! The reply is natural-language-adjacent machine output and routinely
//! malformed; parsing degrades through three strategies (fenced JSON, plain
//! text line scan, empty plan) instead of failing the cycle.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::agents::AgentId;

/// Worker identity → expectation text for one cycle. Only known identities
/// can appear; iteration order is irrelevant (dispatch order is fixed).
pub type WorkerPlan = BTreeMap<AgentId, String>;

#[derive(Debug, Deserialize)]
struct PlanEnvelope {
    #[serde(default)]
    next_agents: Vec<PlanItem>,
}

#[derive(Debug, Deserialize)]
struct PlanItem {
    name: String,
    #[serde(default)]
    expectation: String,
}

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```(?:json)?\s*([\s\S]+?)```").unwrap())
}

/// Extract a `WorkerPlan` from a planner reply.
///
/// Scans fenced code blocks in document order, strict-parsing each as a
/// `{"next_agents": [{"name", "expectation"}]}` envelope. Unknown names are
/// dropped silently; they are not an error, just never dispatched. The
/// first block yielding at least one valid entry wins. If no block parses,
/// any trimmed line that exactly equals a wire name is treated as a
/// selection with an empty expectation. Deterministic and side-effect free.
pub fn parse_plan(reply: &str) -> WorkerPlan {
    for block in fenced_block_re().captures_iter(reply) {
        let body = block[1].trim();
        let envelope: PlanEnvelope = match serde_json::from_str(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "plan block rejected, trying next");
                continue;
            }
        };

        let mut plan = WorkerPlan::new();
        for item in envelope.next_agents {
            match AgentId::parse(&item.name) {
                Some(id) => {
                    plan.insert(id, item.expectation.trim().to_string());
                }
                None => {
                    tracing::debug!(name = %item.name, "unknown worker identity dropped");
                }
            }
        }
        if !plan.is_empty() {
            return plan;
        }
    }

    // Fallback: bare worker names on their own lines.
    let mut fallback = WorkerPlan::new();
    for line in reply.lines() {
        if let Some(id) = AgentId::parse(line.trim()) {
            fallback.insert(id, String::new());
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json_plan() {
        let reply = "Next up:\n```json\n{\"next_agents\":[{\"name\":\"CodeGeneratorAgent\",\"expectation\":\"x\"}]}\n```";
        let plan = parse_plan(reply);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.get(&AgentId::CodeGenerator).map(String::as_str), Some("x"));
    }

    #[test]
    fn accepts_unlabelled_fence() {
        let reply = "```\n{\"next_agents\":[{\"name\":\"SummarizerAgent\",\"expectation\":\"wrap up\"}]}\n```";
        let plan = parse_plan(reply);
        assert_eq!(plan.get(&AgentId::Summarizer).map(String::as_str), Some("wrap up"));
    }

    #[test]
    fn drops_unknown_identities() {
        let reply = "```json\n{\"next_agents\":[\
            {\"name\":\"FooAgent\",\"expectation\":\"nope\"},\
            {\"name\":\"ChainOfThoughtAgent\",\"expectation\":\"think\"}]}\n```";
        let plan = parse_plan(reply);
        assert_eq!(plan.len(), 1);
        assert!(plan.contains_key(&AgentId::ChainOfThought));
    }

    #[test]
    fn block_with_only_unknowns_does_not_win() {
        let reply = "```json\n{\"next_agents\":[{\"name\":\"FooAgent\"}]}\n```\n\
                     ```json\n{\"next_agents\":[{\"name\":\"UserPromptAgent\",\"expectation\":\"ask\"}]}\n```";
        let plan = parse_plan(reply);
        assert_eq!(plan.get(&AgentId::UserPrompt).map(String::as_str), Some("ask"));
    }

    #[test]
    fn malformed_block_falls_through_to_next() {
        let reply = "```json\n{next_agents: broken\n```\n\
                     ```json\n{\"next_agents\":[{\"name\":\"PageSummarizerAgent\"}]}\n```";
        let plan = parse_plan(reply);
        assert_eq!(plan.get(&AgentId::PageSummarizer).map(String::as_str), Some(""));
    }

    #[test]
    fn plain_text_fallback_keeps_known_names_only() {
        let plan = parse_plan("CodeGeneratorAgent\nFooAgent");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.get(&AgentId::CodeGenerator).map(String::as_str), Some(""));
    }

    #[test]
    fn empty_plan_when_nothing_matches() {
        assert!(parse_plan("I could not decide on anything.").is_empty());
        assert!(parse_plan("").is_empty());
    }

    #[test]
    fn missing_expectation_defaults_to_empty() {
        let reply = "```json\n{\"next_agents\":[{\"name\":\"CodeVerifierAgent\"}]}\n```";
        let plan = parse_plan(reply);
        assert_eq!(plan.get(&AgentId::CodeVerifier).map(String::as_str), Some(""));
    }

    #[test]
    fn parsing_is_idempotent() {
        let reply = "```json\n{\"next_agents\":[{\"name\":\"SummarizerAgent\",\"expectation\":\"s\"}]}\n```";
        assert_eq!(parse_plan(reply), parse_plan(reply));
    }
}
