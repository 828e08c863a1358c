// All LLM prompt constants for the interview engine.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{INTERVIEWER_PERSONA, JSON_ONLY_SYSTEM};

/// Joins prompt fragments into one system prompt.
pub fn system_prompt(parts: &[&str]) -> String {
    parts.join(" ")
}

pub fn topic_system() -> String {
    system_prompt(&[INTERVIEWER_PERSONA, JSON_ONLY_SYSTEM])
}

pub fn follow_up_system() -> String {
    system_prompt(&[
        INTERVIEWER_PERSONA,
        "Reply with plain text only: a single follow-up question, at most three sentences.",
    ])
}

pub fn task_system() -> String {
    system_prompt(&[INTERVIEWER_PERSONA, JSON_ONLY_SYSTEM])
}

/// Topic prompt. Replace `{used_topics}` before sending.
pub const TOPIC_PROMPT_TEMPLATE: &str = r#"Propose ONE open-ended technical interview topic for the reasoning phase.

Return a JSON object with this EXACT schema:
{
  "text": "How would you design a rate limiter for a public API?",
  "category": "system_design",
  "difficulty": "medium"
}

Rules:
- "category" is one of: system_design, data_modeling, concurrency, debugging, api_design.
- "difficulty" is one of: easy, medium, hard.
- The topic must be answerable in conversation, without writing a full program.
- Do NOT repeat any of these previously used topics:
{used_topics}"#;

/// Follow-up prompt. Replace `{context}` with the rendered transcript before sending.
pub const FOLLOW_UP_PROMPT_TEMPLATE: &str = r#"{context}
Ask the single most useful follow-up question given the candidate's latest answer.
Probe a weakness, an unstated assumption, or a trade-off they skipped.
Do NOT answer the question yourself and do NOT praise the candidate."#;

/// Implementation task prompt. Replace `{context}` before sending.
///
/// `instructions` is deliberately the LAST key so the graph has fully arrived by the
/// time the instructions start streaming.
pub const TASK_PROMPT_TEMPLATE: &str = r#"{context}
The reasoning phase is over. Turn the discussion above into a hands-on implementation task.

Return a JSON object with this EXACT schema and key order:
{
  "graph": {
    "nodes": [
      {"id": "client", "data": {"kind": "client", "label": "Web Client"}, "position": {"x": 0, "y": 0}},
      {"id": "gateway", "data": {"kind": "gateway", "label": "API Gateway"}, "position": {"x": 250, "y": 0}},
      {"id": "db", "data": {"kind": "database", "label": "Primary DB"}, "position": {"x": 500, "y": 0}}
    ],
    "edges": [
      {"id": "e-client-gateway", "source": "client", "target": "gateway", "animated": true},
      {"id": "e-gateway-db", "source": "gateway", "target": "db", "animated": true}
    ]
  },
  "instructions": "Step-by-step task description for the candidate."
}

Rules:
- "kind" is one of: client, database, error, gateway.
- Between 3 and 8 nodes. Every edge must reference existing node ids.
- Instructions describe what to build and how it will be judged, in under 200 words."#;

/// Renders previously used topics as a bullet list for the topic prompt.
pub fn render_used_topics(used: &[String]) -> String {
    if used.is_empty() {
        return "- (none)".to_string();
    }
    used.iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n")
}
