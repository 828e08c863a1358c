use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Generator,
}

/// One exchange unit in the transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub code: Option<String>,
    /// Assigned by the transcript on append ("Q1", "A1", ...).
    pub sequence_label: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Builds an unlabelled turn. The transcript assigns the label on append.
    pub fn new(role: Role, text: impl Into<String>, code: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            code: code.filter(|c| !c.trim().is_empty()),
            sequence_label: String::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Lenient parse for generator output; anything unrecognised is `Medium`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" | "junior" | "beginner" => Difficulty::Easy,
            "hard" | "senior" | "advanced" | "expert" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

/// The active phase-one discussion topic. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub text: String,
    pub category: String,
    pub difficulty: Difficulty,
}

impl Topic {
    pub fn new(
        text: impl Into<String>,
        category: impl Into<String>,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            category: category.into(),
            difficulty,
        }
    }
}

/// Closed set of component kinds the diagram renderer knows how to draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Client,
    Database,
    Error,
    #[default]
    Gateway,
}

impl NodeKind {
    /// Case-insensitive lookup. Returns `None` for names outside the closed set.
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "client" => Some(NodeKind::Client),
            "database" => Some(NodeKind::Database),
            "error" => Some(NodeKind::Error),
            "gateway" => Some(NodeKind::Gateway),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Rendering component tag. Always the single supported variant.
    pub variant: String,
    pub kind: NodeKind,
    pub label: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub animated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Structured output of phase two: a diagram plus free-text instructions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub graph: Graph,
    pub instructions: String,
}

impl TaskDescriptor {
    pub fn instructions_only(instructions: impl Into<String>) -> Self {
        Self {
            graph: Graph::default(),
            instructions: instructions.into(),
        }
    }
}
