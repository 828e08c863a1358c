//! Graph Normalizer — coerces a generated diagram into the exact shape the renderer accepts.
//!
//! The renderer supports a single node component parameterised by `kind`, so every node
//! gets the same variant tag no matter what the generator asked for. Edges are only kept
//! when both endpoints survived normalization.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::models::interview::{Edge, Node, NodeKind, Position};

/// The one rendering component the diagram canvas knows.
pub const NODE_VARIANT: &str = "systemNode";
pub const DEFAULT_LABEL: &str = "Component";
pub const DEFAULT_POSITION: Position = Position { x: 0.0, y: 200.0 };

pub fn normalize(raw_nodes: &[Value], raw_edges: &[Value]) -> (Vec<Node>, Vec<Edge>) {
    let nodes = normalize_nodes(raw_nodes);
    let edges = normalize_edges(raw_edges, &nodes);
    (nodes, edges)
}

fn normalize_nodes(raw_nodes: &[Value]) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(raw_nodes.len());
    let mut seen: HashSet<String> = HashSet::new();

    for (index, raw) in raw_nodes.iter().enumerate() {
        let Some(obj) = raw.as_object() else {
            debug!("Dropping non-object node at index {index}");
            continue;
        };

        let id = id_field(obj.get("id")).unwrap_or_else(|| format!("node-{index}"));
        if !seen.insert(id.clone()) {
            debug!("Dropping duplicate node id '{id}'");
            continue;
        }

        let data = obj.get("data").and_then(Value::as_object);

        let kind = data
            .and_then(|d| first_str(d, &["kind", "type"]))
            .or_else(|| first_str(obj, &["kind", "type"]))
            .map(|hint| NodeKind::from_name(hint).unwrap_or_default())
            .unwrap_or_default();

        let label = data
            .and_then(|d| first_str(d, &["label"]))
            .or_else(|| first_str(obj, &["label", "name"]))
            .unwrap_or(DEFAULT_LABEL)
            .to_string();

        nodes.push(Node {
            id,
            variant: NODE_VARIANT.to_string(),
            kind,
            label,
            position: position(obj.get("position")).unwrap_or(DEFAULT_POSITION),
        });
    }

    nodes
}

fn normalize_edges(raw_edges: &[Value], nodes: &[Node]) -> Vec<Edge> {
    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut edges = Vec::with_capacity(raw_edges.len());

    for raw in raw_edges {
        let Some(obj) = raw.as_object() else {
            continue;
        };
        let (Some(source), Some(target)) =
            (id_field(obj.get("source")), id_field(obj.get("target")))
        else {
            debug!("Dropping edge without endpoints: {raw}");
            continue;
        };
        if !known.contains(source.as_str()) || !known.contains(target.as_str()) {
            debug!("Dropping edge {source} -> {target}: unknown endpoint");
            continue;
        }

        edges.push(Edge {
            id: id_field(obj.get("id")).unwrap_or_else(|| format!("edge-{source}-{target}")),
            animated: obj.get("animated").and_then(Value::as_bool).unwrap_or(true),
            source,
            target,
        });
    }

    edges
}

/// Ids may arrive as strings or numbers; blank strings count as missing.
fn id_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn position(value: Option<&Value>) -> Option<Position> {
    let obj = value?.as_object()?;
    Some(Position {
        x: obj.get("x")?.as_f64()?,
        y: obj.get("y")?.as_f64()?,
    })
}
