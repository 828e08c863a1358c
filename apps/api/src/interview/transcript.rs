//! Transcript Builder — the append-only turn log that doubles as the model's memory.
//!
//! There is no summarization: every prompt renders the full transcript, so prompt size
//! grows with session length.

use crate::models::interview::{Role, Topic, Turn};

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    answers: usize,
    questions: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels the turn and appends it. Earlier turns are never touched.
    pub fn append(&mut self, mut turn: Turn) -> &Self {
        turn.sequence_label = match turn.role {
            Role::User => {
                self.answers += 1;
                format!("A{}", self.answers)
            }
            Role::Generator => {
                self.questions += 1;
                format!("Q{}", self.questions)
            }
        };
        self.turns.push(turn);
        self
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Renders the topic and every turn, role-tagged, with code fenced when present.
pub fn build_prompt(topic: &Topic, transcript: &Transcript) -> String {
    let mut prompt = format!(
        "Interview topic ({}, {:?}):\n{}\n\nTranscript so far:\n",
        topic.category, topic.difficulty, topic.text
    );

    if transcript.is_empty() {
        prompt.push_str("(no turns yet)\n");
        return prompt;
    }

    for turn in transcript.turns() {
        let speaker = match turn.role {
            Role::User => "Candidate",
            Role::Generator => "Interviewer",
        };
        prompt.push_str(&format!("[{}] {}:\n{}\n", turn.sequence_label, speaker, turn.text));
        if let Some(code) = &turn.code {
            prompt.push_str(&format!("```\n{}\n```\n", code.trim_end()));
        }
        prompt.push('\n');
    }

    prompt
}
