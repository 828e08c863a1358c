//! Scripted streaming source for engine tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{ChunkSink, GenerationOptions, LlmError, ModelId, StreamingTextSource};

/// One scripted response, consumed in order per call.
pub enum Script {
    Chunks(Vec<String>),
    /// Emits the first chunk, waits for `release`, then emits the rest.
    Gated {
        chunks: Vec<String>,
        release: Arc<Notify>,
    },
    Fail(String),
}

impl Script {
    pub fn chunks(chunks: &[&str]) -> Self {
        Script::Chunks(chunks.iter().map(|c| c.to_string()).collect())
    }

    pub fn text(text: &str) -> Self {
        Script::Chunks(vec![text.to_string()])
    }
}

#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamingTextSource for ScriptedSource {
    async fn generate_streaming(
        &self,
        prompt: &str,
        _system: &str,
        _model: &ModelId,
        on_chunk: &mut ChunkSink<'_>,
        _options: GenerationOptions,
    ) -> Result<(), LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            None => Ok(()),
            Some(Script::Chunks(chunks)) => {
                for chunk in &chunks {
                    on_chunk(chunk);
                }
                Ok(())
            }
            Some(Script::Gated { chunks, release }) => {
                let mut iter = chunks.iter();
                if let Some(first) = iter.next() {
                    on_chunk(first);
                }
                release.notified().await;
                for chunk in iter {
                    on_chunk(chunk);
                }
                Ok(())
            }
            Some(Script::Fail(message)) => Err(LlmError::Stream(message)),
        }
    }
}
