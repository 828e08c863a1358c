//! Final Payload Resolver — turns the complete generated text into a `TaskDescriptor`.
//!
//! Generators routinely emit almost-JSON, so this is a three-tier pipeline:
//! 1. Strict: parse the outermost `{...}` span. Accepted only if it yields at least one node.
//! 2. Targeted: recover the `instructions` string and the `graph` object independently.
//! 3. Unstructured: when there is no `{...}` span at all, use the whole text as
//!    instructions with an empty graph.
//!
//! `resolve` is total. The worst case is an empty descriptor.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::interview::extractor::{extract_instructions, unescape_lossy};
use crate::interview::normalizer::normalize;
use crate::models::interview::{Graph, TaskDescriptor};

/// Below this many characters, unstructured text is treated as no output at all.
pub const MIN_UNSTRUCTURED_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveTier {
    Strict,
    Targeted,
    Unstructured,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub descriptor: TaskDescriptor,
    pub tier: ResolveTier,
}

#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    #[serde(default)]
    graph: Option<RawGraph>,
    #[serde(default)]
    instructions: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGraph {
    #[serde(default)]
    nodes: Vec<Value>,
    #[serde(default)]
    edges: Vec<Value>,
}

impl RawGraph {
    fn normalize(&self) -> Graph {
        let (nodes, edges) = normalize(&self.nodes, &self.edges);
        Graph { nodes, edges }
    }
}

pub fn resolve(full_text: &str) -> Resolution {
    if let Some(descriptor) = resolve_strict(full_text) {
        return Resolution {
            descriptor,
            tier: ResolveTier::Strict,
        };
    }

    if let Some(descriptor) = resolve_targeted(full_text) {
        return Resolution {
            descriptor,
            tier: ResolveTier::Targeted,
        };
    }

    let unstructured = strip_json_fences(full_text);
    if outer_object_span(full_text).is_none()
        && unstructured.chars().count() >= MIN_UNSTRUCTURED_CHARS
    {
        return Resolution {
            descriptor: TaskDescriptor::instructions_only(unstructured),
            tier: ResolveTier::Unstructured,
        };
    }

    Resolution {
        descriptor: TaskDescriptor::default(),
        tier: ResolveTier::Empty,
    }
}

fn resolve_strict(text: &str) -> Option<TaskDescriptor> {
    let span = outer_object_span(text)?;
    let payload: RawPayload = match serde_json::from_str(span) {
        Ok(payload) => payload,
        Err(e) => {
            debug!("Strict parse failed: {e}");
            return None;
        }
    };

    let graph = payload.graph.unwrap_or_default().normalize();
    if graph.is_empty() {
        debug!("Strict parse produced no nodes; trying targeted recovery");
        return None;
    }

    Some(TaskDescriptor {
        graph,
        instructions: payload.instructions.unwrap_or_default(),
    })
}

fn resolve_targeted(text: &str) -> Option<TaskDescriptor> {
    let instructions = find_instructions(text);
    let graph = find_graph(text)
        .map(|g| g.normalize())
        .unwrap_or_default();

    if instructions.is_none() && graph.is_empty() {
        return None;
    }

    Some(TaskDescriptor {
        graph,
        instructions: instructions.unwrap_or_default(),
    })
}

/// First `{` through last `}`. Surrounding prose and code fences are ignored.
pub(crate) fn outer_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn instructions_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)"instructions"\s*:\s*"((?:[^"\\]|\\.)*)""#)
            .expect("instructions pattern is valid")
    })
}

fn open_instructions_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""instructions"\s*:\s*""#).expect("open instructions pattern is valid")
    })
}

fn graph_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""graph"\s*:\s*\{"#).expect("graph pattern is valid"))
}

/// Last closed `"instructions": "..."` value; a truncated value is taken as far as it goes.
fn find_instructions(text: &str) -> Option<String> {
    let closed = instructions_pattern()
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|raw| {
            serde_json::from_str::<String>(&format!("\"{}\"", raw.as_str()))
                .unwrap_or_else(|_| unescape_lossy(raw.as_str()))
        });

    let truncated = || {
        let marker = open_instructions_pattern().find_iter(text).last()?;
        extract_instructions(&text[marker.start()..])
    };

    closed.or_else(truncated).filter(|s| !s.trim().is_empty())
}

fn find_graph(text: &str) -> Option<RawGraph> {
    let found = graph_pattern().find_iter(text).last()?;
    let object_start = found.end() - 1;
    let object = balanced_object(&text[object_start..])?;
    match serde_json::from_str::<RawGraph>(object) {
        Ok(graph) => Some(graph),
        Err(e) => {
            debug!("Targeted graph parse failed: {e}");
            None
        }
    }
}

/// The `{...}` prefix of `text` with balanced braces, skipping braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub(crate) fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
