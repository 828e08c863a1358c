//! Topic parsing and the fixed fallbacks used when generation is unavailable.

use serde::Deserialize;

use crate::interview::extractor::extract_partial;
use crate::interview::normalizer::{DEFAULT_POSITION, NODE_VARIANT};
use crate::interview::resolver::{outer_object_span, strip_json_fences};
use crate::models::interview::{Difficulty, Graph, Node, NodeKind, TaskDescriptor, Topic};

const FALLBACK_TOPICS: &[(&str, &str, Difficulty)] = &[
    (
        "How would you design a rate limiter for a public HTTP API serving millions of clients?",
        "system_design",
        Difficulty::Medium,
    ),
    (
        "Walk me through how you would debug a service whose p99 latency doubled overnight.",
        "debugging",
        Difficulty::Medium,
    ),
    (
        "How would you model and store a social feed so reads stay fast as the graph grows?",
        "data_modeling",
        Difficulty::Hard,
    ),
    (
        "Two workers update the same account balance at the same time. What can go wrong and how do you prevent it?",
        "concurrency",
        Difficulty::Easy,
    ),
];

/// Returns a fixed topic. `cursor` rotates through the bank so repeated failures differ.
pub fn fallback_topic(cursor: usize) -> Topic {
    let (text, category, difficulty) = FALLBACK_TOPICS[cursor % FALLBACK_TOPICS.len()];
    Topic::new(text, category, difficulty)
}

/// Task installed when phase-two generation produced nothing usable.
pub fn fallback_task() -> TaskDescriptor {
    TaskDescriptor {
        graph: Graph {
            nodes: vec![Node {
                id: "gateway".to_string(),
                variant: NODE_VARIANT.to_string(),
                kind: NodeKind::Gateway,
                label: "API Gateway".to_string(),
                position: DEFAULT_POSITION,
            }],
            edges: vec![],
        },
        instructions: "Implement the core request path you described in the discussion: \
            accept a request at the gateway, validate it, and persist the result. \
            Explain how your implementation handles failures and load."
            .to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    #[serde(alias = "topic", alias = "question")]
    text: Option<String>,
    category: Option<String>,
    difficulty: Option<String>,
}

/// Parses generated topic text. Returns `None` only when there is no usable text.
pub fn parse_topic(raw: &str) -> Option<Topic> {
    let parsed =
        outer_object_span(raw).and_then(|span| serde_json::from_str::<RawTopic>(span).ok());
    if let Some(parsed) = parsed {
        if let Some(text) = parsed.text.filter(|t| !t.trim().is_empty()) {
            return Some(Topic::new(
                text.trim(),
                parsed
                    .category
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| "general".to_string()),
                parsed
                    .difficulty
                    .map(|d| Difficulty::parse_lenient(&d))
                    .unwrap_or_default(),
            ));
        }
    }

    if let Some(text) = extract_partial(raw, "text").filter(|t| !t.trim().is_empty()) {
        let difficulty = extract_partial(raw, "difficulty")
            .map(|d| Difficulty::parse_lenient(&d))
            .unwrap_or_default();
        return Some(Topic::new(text.trim(), "general", difficulty));
    }

    let plain = strip_json_fences(raw);
    if plain.is_empty() {
        return None;
    }
    Some(Topic::new(plain, "general", Difficulty::Medium))
}
