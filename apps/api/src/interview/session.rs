//! Interview session engine.
//!
//! Owns the controller, transcript, live preview and task descriptor of one
//! interview, and sequences generation calls against them. All mutable state
//! sits behind a single `std::sync::Mutex` that is never held across an
//! `.await`: each tick and each streamed chunk runs to completion under it.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::controller::{
    PhaseController, PhaseTimings, SessionState, TickOutcome, TimerState, TransitionError,
};
use crate::interview::countdown::{Countdown, CountdownHandle, CountdownTarget};
use crate::interview::extractor::{StreamingBuffer, INSTRUCTIONS_FIELD};
use crate::interview::prompts::{
    follow_up_system, render_used_topics, task_system, topic_system, FOLLOW_UP_PROMPT_TEMPLATE,
    TASK_PROMPT_TEMPLATE, TOPIC_PROMPT_TEMPLATE,
};
use crate::interview::resolver::{resolve, ResolveTier};
use crate::interview::topic::{fallback_task, fallback_topic, parse_topic};
use crate::interview::transcript::{build_prompt, Transcript};
use crate::llm_client::{GenerationOptions, LlmError, ModelId, StreamingTextSource};
use crate::models::interview::{Role, TaskDescriptor, Topic, Turn};

/// Engine settings shared by every session.
#[derive(Debug, Clone)]
pub struct InterviewSettings {
    pub model: ModelId,
    pub options: GenerationOptions,
    pub timings: PhaseTimings,
    pub tick: Duration,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            model: ModelId::default(),
            options: GenerationOptions::default(),
            timings: PhaseTimings {
                session_seconds: 2700,
                phase_two_threshold_seconds: 900,
            },
            tick: Duration::from_secs(1),
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Phase completion handoff
// ────────────────────────────────────────────────────────────────

/// Receives the artifacts of each completed phase. Persistence belongs to the implementor.
#[async_trait]
pub trait PhaseHandoff: Send + Sync {
    async fn on_phase_one_complete(&self, session_id: Uuid, transcript: &[Turn]);
    async fn on_phase_two_complete(&self, session_id: Uuid, task: &TaskDescriptor);
}

/// Default handoff: records a structured log event and nothing else.
pub struct LoggingHandoff;

#[async_trait]
impl PhaseHandoff for LoggingHandoff {
    async fn on_phase_one_complete(&self, session_id: Uuid, transcript: &[Turn]) {
        info!(
            session_id = %session_id,
            turns = transcript.len(),
            "Phase one complete"
        );
    }

    async fn on_phase_two_complete(&self, session_id: Uuid, task: &TaskDescriptor) {
        info!(
            session_id = %session_id,
            nodes = task.graph.nodes.len(),
            edges = task.graph.edges.len(),
            "Phase two complete"
        );
    }
}

// ────────────────────────────────────────────────────────────────
// Notices
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-visible message about a recovered or failed generation.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub retryable: bool,
    pub created_at: DateTime<Utc>,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            level,
            message: message.into(),
            retryable,
            created_at: Utc::now(),
        }
    }
}

/// Serializable view of a session, returned by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub state: SessionState,
    pub timer: TimerState,
    pub is_generating: bool,
    pub topic: Option<Topic>,
    pub transcript: Vec<Turn>,
    /// Best-effort partial instructions while the task is streaming.
    pub preview: Option<String>,
    pub task: Option<TaskDescriptor>,
    pub notices: Vec<Notice>,
}

// ────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────

struct Inner {
    controller: PhaseController,
    transcript: Transcript,
    topic: Option<Topic>,
    used_topics: Vec<String>,
    preview: Option<String>,
    task: Option<TaskDescriptor>,
    notices: Vec<Notice>,
    fallback_cursor: usize,
    last_activity: Instant,
}

impl Inner {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn next_fallback_topic(&mut self) -> Topic {
        let topic = fallback_topic(self.fallback_cursor);
        self.fallback_cursor += 1;
        topic
    }
}

pub struct InterviewSession {
    id: Uuid,
    settings: InterviewSettings,
    source: Arc<dyn StreamingTextSource>,
    handoff: Arc<dyn PhaseHandoff>,
    inner: Mutex<Inner>,
    countdown: Mutex<Option<CountdownHandle>>,
}

/// Resumes the countdown when a generation call ends, however it ends.
struct GenerationGuard<'a> {
    session: &'a InterviewSession,
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().controller.generation_finished();
    }
}

impl InterviewSession {
    pub fn new(
        id: Uuid,
        settings: InterviewSettings,
        source: Arc<dyn StreamingTextSource>,
        handoff: Arc<dyn PhaseHandoff>,
    ) -> Self {
        let controller = PhaseController::new(settings.timings);
        Self {
            id,
            settings,
            source,
            handoff,
            inner: Mutex::new(Inner {
                controller,
                transcript: Transcript::new(),
                topic: None,
                used_topics: Vec::new(),
                preview: None,
                task: None,
                notices: Vec::new(),
                fallback_cursor: 0,
                last_activity: Instant::now(),
            }),
            countdown: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_complete(&self) -> bool {
        self.lock().controller.is_complete()
    }

    /// Time since the last snapshot was taken, i.e. since a client last
    /// touched this session.
    pub fn idle_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn countdown_slot(&self) -> MutexGuard<'_, Option<CountdownHandle>> {
        self.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pauses the countdown. The returned guard resumes it on drop.
    fn begin_generation(&self, inner: &mut Inner) -> Result<GenerationGuard<'_>, TransitionError> {
        inner.controller.generation_started()?;
        Ok(GenerationGuard { session: self })
    }

    fn arm_countdown(self: &Arc<Self>) {
        if self.lock().controller.is_complete() {
            return;
        }
        let handle = Countdown::spawn(Arc::downgrade(self), self.settings.tick);
        // Replacing a previous handle drops it, which cancels its task.
        *self.countdown_slot() = Some(handle);
    }

    fn cancel_countdown(&self) {
        if let Some(handle) = self.countdown_slot().take() {
            handle.cancel();
        }
    }

    /// Streams one generation call into a buffer, optionally mirroring the
    /// partial `instructions` value into the session preview on every chunk.
    async fn stream_text(
        &self,
        prompt: &str,
        system: &str,
        track_preview: bool,
    ) -> Result<String, LlmError> {
        let mut buffer = StreamingBuffer::default();
        let mut on_chunk = |chunk: &str| {
            buffer.push(chunk);
            if track_preview {
                if let Some(preview) = buffer.preview(INSTRUCTIONS_FIELD) {
                    self.lock().preview = Some(preview);
                }
            }
        };

        self.source
            .generate_streaming(
                prompt,
                system,
                &self.settings.model,
                &mut on_chunk,
                self.settings.options,
            )
            .await?;

        debug!(
            session_id = %self.id,
            chunks = buffer.chunk_count(),
            bytes = buffer.as_str().len(),
            "Generation stream finished"
        );
        Ok(buffer.into_text())
    }

    // ────────────────────────────────────────────────────────────────
    // Operations
    // ────────────────────────────────────────────────────────────────

    /// Idle → phase one: fetches the first topic, then arms the countdown.
    pub async fn start(self: &Arc<Self>) -> Result<SessionSnapshot, AppError> {
        self.lock().controller.start()?;
        info!(session_id = %self.id, "Interview started");

        self.install_topic().await?;
        Ok(self.snapshot())
    }

    /// Replaces the current topic. The countdown is cancelled before the
    /// buffers are reset and re-armed once the new topic is installed.
    pub async fn skip_topic(self: &Arc<Self>) -> Result<SessionSnapshot, AppError> {
        {
            let inner = self.lock();
            let state = inner.controller.state();
            if state != SessionState::PhaseOneRunning {
                return Err(TransitionError {
                    from: state,
                    event: "skip the topic",
                }
                .into());
            }
        }

        self.cancel_countdown();
        {
            let mut inner = self.lock();
            inner.preview = None;
            inner.topic = None;
        }

        self.install_topic().await?;
        Ok(self.snapshot())
    }

    /// Fetches a topic, then arms the countdown, on a task of its own.
    async fn install_topic(self: &Arc<Self>) -> Result<(), AppError> {
        let session = Arc::clone(self);
        run_detached(async move {
            let refreshed = session.refresh_topic().await;
            session.arm_countdown();
            refreshed
        })
        .await
    }

    async fn refresh_topic(&self) -> Result<(), AppError> {
        let (prompt, guard) = {
            let mut inner = self.lock();
            let used = render_used_topics(&inner.used_topics);
            let prompt = TOPIC_PROMPT_TEMPLATE.replace("{used_topics}", &used);
            let guard = self.begin_generation(&mut inner)?;
            (prompt, guard)
        };

        let outcome = self.stream_text(&prompt, &topic_system(), false).await;

        {
            let mut inner = self.lock();
            if inner.controller.is_complete() {
                debug!(session_id = %self.id, "Session ended during topic generation; discarding");
            } else {
                let topic = match outcome {
                    Ok(text) => match parse_topic(&text) {
                        Some(topic) => topic,
                        None => {
                            warn!(
                                session_id = %self.id,
                                "Topic generation produced no text; using fallback"
                            );
                            inner.notify(Notice::new(
                                NoticeLevel::Warning,
                                "Could not generate a topic, so a standard one was used.",
                                true,
                            ));
                            inner.next_fallback_topic()
                        }
                    },
                    Err(e) => {
                        warn!(session_id = %self.id, "Topic generation failed: {e}");
                        inner.notify(Notice::new(
                            NoticeLevel::Warning,
                            "The interviewer is unavailable right now, so a standard topic was used. You can skip to try again.",
                            true,
                        ));
                        inner.next_fallback_topic()
                    }
                };
                info!(
                    session_id = %self.id,
                    category = %topic.category,
                    "Topic installed: {}",
                    topic.text
                );
                inner.used_topics.push(topic.text.clone());
                inner.topic = Some(topic);
            }
        }

        drop(guard);
        Ok(())
    }

    /// Appends the candidate's answer and streams a follow-up question.
    pub async fn submit_answer(
        &self,
        text: &str,
        code: Option<String>,
    ) -> Result<SessionSnapshot, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("answer text must not be empty".to_string()));
        }

        let (prompt, guard) = {
            let mut inner = self.lock();
            let state = inner.controller.state();
            if state != SessionState::PhaseOneRunning {
                return Err(TransitionError {
                    from: state,
                    event: "submit an answer",
                }
                .into());
            }
            let topic = inner
                .topic
                .clone()
                .ok_or_else(|| AppError::Conflict("no active topic".to_string()))?;
            inner.transcript.append(Turn::new(Role::User, text, code));
            let context = build_prompt(&topic, &inner.transcript);
            let guard = self.begin_generation(&mut inner)?;
            (FOLLOW_UP_PROMPT_TEMPLATE.replace("{context}", &context), guard)
        };

        let outcome = self.stream_text(&prompt, &follow_up_system(), false).await;

        let result = {
            let mut inner = self.lock();
            if inner.controller.is_complete() {
                debug!(
                    session_id = %self.id,
                    "Session ended during follow-up generation; discarding"
                );
                Ok(())
            } else {
                match outcome {
                    Ok(text) if !text.trim().is_empty() => {
                        inner
                            .transcript
                            .append(Turn::new(Role::Generator, text.trim(), None));
                        debug!(
                            session_id = %self.id,
                            turns = inner.transcript.len(),
                            "Follow-up appended"
                        );
                        Ok(())
                    }
                    Ok(_) => {
                        warn!(session_id = %self.id, "Follow-up generation produced no output");
                        inner.notify(Notice::new(
                            NoticeLevel::Error,
                            "The interviewer returned an empty response.",
                            true,
                        ));
                        Err(AppError::EmptyGeneration)
                    }
                    Err(e) => {
                        warn!(session_id = %self.id, "Follow-up generation failed: {e}");
                        inner.notify(Notice::new(
                            NoticeLevel::Warning,
                            "The interviewer could not respond. Your answer was saved; please try again.",
                            true,
                        ));
                        Err(AppError::from(e))
                    }
                }
            }
        };

        drop(guard);
        result?;
        Ok(self.snapshot())
    }

    /// Explicit early move to phase two.
    pub async fn advance(self: &Arc<Self>) -> Result<SessionSnapshot, AppError> {
        let advanced = self.lock().controller.advance_to_phase_two()?;
        if advanced {
            info!(session_id = %self.id, "Phase two entered on request");
            let session = Arc::clone(self);
            run_detached(async move { session.begin_phase_two().await }).await?;
        }
        Ok(self.snapshot())
    }

    /// Runs once, right after the one-shot phase transition: hands off the
    /// transcript, streams the task with a live preview, and installs the
    /// resolved descriptor in one step.
    pub async fn begin_phase_two(&self) -> Result<(), AppError> {
        let (turns, prompt, guard) = {
            let mut inner = self.lock();
            let topic = match inner.topic.clone() {
                Some(topic) => topic,
                None => inner.next_fallback_topic(),
            };
            let context = build_prompt(&topic, &inner.transcript);
            inner.preview = None;
            inner.task = None;
            let guard = self.begin_generation(&mut inner)?;
            (
                inner.transcript.turns().to_vec(),
                TASK_PROMPT_TEMPLATE.replace("{context}", &context),
                guard,
            )
        };

        self.handoff.on_phase_one_complete(self.id, &turns).await;

        let outcome = self.stream_text(&prompt, &task_system(), true).await;

        let result = {
            let mut inner = self.lock();
            inner.preview = None;
            if inner.controller.is_complete() {
                debug!(session_id = %self.id, "Session ended during task generation; discarding");
                Ok(())
            } else {
                let (task, result) = match outcome {
                    Ok(text) if text.trim().is_empty() => {
                        warn!(
                            session_id = %self.id,
                            "Task generation produced no output; using fallback"
                        );
                        inner.notify(Notice::new(
                            NoticeLevel::Error,
                            "Task generation produced no output, so a standard task was used.",
                            false,
                        ));
                        (fallback_task(), Err(AppError::EmptyGeneration))
                    }
                    Ok(text) => {
                        let resolution = resolve(&text);
                        info!(
                            session_id = %self.id,
                            tier = ?resolution.tier,
                            nodes = resolution.descriptor.graph.nodes.len(),
                            "Task resolved"
                        );
                        if resolution.tier == ResolveTier::Empty {
                            inner.notify(Notice::new(
                                NoticeLevel::Warning,
                                "The generated task was unusable, so a standard task was used.",
                                false,
                            ));
                            (fallback_task(), Ok(()))
                        } else {
                            (resolution.descriptor, Ok(()))
                        }
                    }
                    Err(e) => {
                        warn!(session_id = %self.id, "Task generation failed: {e}");
                        inner.notify(Notice::new(
                            NoticeLevel::Warning,
                            "The interviewer is unavailable right now, so a standard task was used.",
                            true,
                        ));
                        (fallback_task(), Ok(()))
                    }
                };
                inner.task = Some(task);
                result
            }
        };

        drop(guard);
        result
    }

    /// Phase two → complete. Requires the task to have been installed.
    pub async fn submit_task(&self) -> Result<SessionSnapshot, AppError> {
        let task = {
            let mut inner = self.lock();
            let Some(task) = inner.task.clone() else {
                return Err(AppError::Conflict("the task is not ready yet".to_string()));
            };
            inner.controller.submit()?;
            task
        };

        self.cancel_countdown();
        info!(session_id = %self.id, "Task submitted");
        self.handoff.on_phase_two_complete(self.id, &task).await;
        Ok(self.snapshot())
    }

    /// Ends the session from any state and tears down the countdown.
    pub fn terminate(&self) -> SessionSnapshot {
        let (started, ended) = {
            let mut inner = self.lock();
            let started = inner.controller.has_started();
            (started, inner.controller.terminate())
        };
        self.cancel_countdown();
        if ended {
            info!(session_id = %self.id, started, "Interview terminated");
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut inner = self.lock();
        inner.last_activity = Instant::now();
        SessionSnapshot {
            id: self.id,
            state: inner.controller.state(),
            timer: inner.controller.timer(),
            is_generating: inner.controller.is_generating(),
            topic: inner.topic.clone(),
            transcript: inner.transcript.turns().to_vec(),
            preview: inner.preview.clone(),
            task: inner.task.clone(),
            notices: inner.notices.clone(),
        }
    }

    fn spawn_phase_two(self: Arc<Self>) {
        tokio::spawn(async move {
            if let Err(e) = self.begin_phase_two().await {
                warn!(session_id = %self.id, "Phase two setup failed: {e}");
            }
        });
    }
}

/// Runs the rest of an operation on its own task. A caller whose future is
/// dropped (e.g. a disconnected client) only stops waiting for the result; the
/// operation still reaches a consistent state.
async fn run_detached<F>(work: F) -> Result<(), AppError>
where
    F: Future<Output = Result<(), AppError>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("session task failed")))?
}

impl CountdownTarget for InterviewSession {
    fn on_tick(self: Arc<Self>) -> ControlFlow<()> {
        let (outcome, elapsed) = {
            let mut inner = self.lock();
            if inner.controller.is_complete() {
                return ControlFlow::Break(());
            }
            let outcome = inner.controller.tick();
            if outcome == TickOutcome::PhaseAdvanced {
                inner.notify(Notice::new(
                    NoticeLevel::Info,
                    "Discussion time is up. Moving on to the implementation task.",
                    false,
                ));
            }
            (outcome, inner.controller.elapsed_seconds())
        };

        match outcome {
            TickOutcome::Idle | TickOutcome::Ticked => ControlFlow::Continue(()),
            TickOutcome::PhaseAdvanced => {
                info!(session_id = %self.id, elapsed, "Phase two threshold reached");
                self.spawn_phase_two();
                ControlFlow::Continue(())
            }
            TickOutcome::Expired { phase_advanced } => {
                info!(session_id = %self.id, elapsed, phase_advanced, "Countdown expired");
                if phase_advanced {
                    self.spawn_phase_two();
                }
                ControlFlow::Break(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::controller::Phase;
    use crate::llm_client::testing::{Script, ScriptedSource};
    use crate::models::interview::NodeKind;
    use tokio::sync::Notify;

    const TOPIC_JSON: &str =
        r#"{"text": "Design a rate limiter", "category": "system_design", "difficulty": "hard"}"#;

    const TASK_JSON: &str = r#"{"graph":{"nodes":[{"id":"c","data":{"kind":"client","label":"Web"}},{"id":"g","data":{"kind":"gateway"}}],"edges":[{"source":"c","target":"g"}]},"instructions":"Build the limiter"}"#;

    fn settings(session: u32, threshold: u32) -> InterviewSettings {
        InterviewSettings {
            timings: PhaseTimings {
                session_seconds: session,
                phase_two_threshold_seconds: threshold,
            },
            ..InterviewSettings::default()
        }
    }

    /// Lets spawned session tasks run until they block again.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn session_with(
        source: Arc<ScriptedSource>,
        settings: InterviewSettings,
    ) -> Arc<InterviewSession> {
        Arc::new(InterviewSession::new(
            Uuid::new_v4(),
            settings,
            source,
            Arc::new(LoggingHandoff),
        ))
    }

    #[tokio::test]
    async fn test_start_installs_generated_topic() {
        let source = Arc::new(ScriptedSource::new(vec![Script::text(TOPIC_JSON)]));
        let session = session_with(source, settings(600, 300));

        let snapshot = session.start().await.unwrap();
        assert_eq!(snapshot.state, SessionState::PhaseOneRunning);
        let topic = snapshot.topic.unwrap();
        assert_eq!(topic.text, "Design a rate limiter");
        assert!(snapshot.notices.is_empty());
        session.terminate();
    }

    #[tokio::test]
    async fn test_topic_transport_failure_uses_fallback_with_notice() {
        let source = Arc::new(ScriptedSource::new(vec![Script::Fail("connection reset".into())]));
        let session = session_with(source, settings(600, 300));

        let snapshot = session.start().await.unwrap();
        assert_eq!(snapshot.topic.unwrap().text, fallback_topic(0).text);
        assert_eq!(snapshot.notices.len(), 1);
        assert!(snapshot.notices[0].retryable);
        assert_eq!(snapshot.state, SessionState::PhaseOneRunning);
        session.terminate();
    }

    #[tokio::test]
    async fn test_skip_replaces_topic_and_passes_used_topics() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::text(r#"{"text": "Design a cache"}"#),
        ]));
        let session = session_with(source.clone(), settings(600, 300));
        session.start().await.unwrap();

        let snapshot = session.skip_topic().await.unwrap();
        assert_eq!(snapshot.topic.unwrap().text, "Design a cache");
        assert!(source.prompts()[1].contains("- Design a rate limiter"));
        session.terminate();
    }

    #[tokio::test]
    async fn test_answer_appends_user_and_generator_turns() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::chunks(&["What happens ", "under burst traffic?"]),
        ]));
        let session = session_with(source.clone(), settings(600, 300));
        session.start().await.unwrap();

        let snapshot = session
            .submit_answer("Token bucket per client", Some("let rate = 10;".into()))
            .await
            .unwrap();
        let labels: Vec<&str> = snapshot
            .transcript
            .iter()
            .map(|t| t.sequence_label.as_str())
            .collect();
        assert_eq!(labels, vec!["A1", "Q1"]);
        assert_eq!(snapshot.transcript[1].text, "What happens under burst traffic?");
        assert!(source.prompts()[1].contains("let rate = 10;"));
        assert_eq!(snapshot.state, SessionState::PhaseOneRunning);
        session.terminate();
    }

    #[tokio::test]
    async fn test_empty_answer_is_rejected() {
        let source = Arc::new(ScriptedSource::new(vec![Script::text(TOPIC_JSON)]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let err = session.submit_answer("   ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        session.terminate();
    }

    #[tokio::test]
    async fn test_empty_follow_up_surfaces_generation_failure() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::chunks(&[]),
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let err = session.submit_answer("An answer", None).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyGeneration));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.transcript.len(), 1);
        assert_eq!(snapshot.notices.last().unwrap().level, NoticeLevel::Error);
        assert_eq!(snapshot.state, SessionState::PhaseOneRunning);
        session.terminate();
    }

    #[tokio::test]
    async fn test_follow_up_transport_failure_keeps_answer() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::Fail("timeout".into()),
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let err = session.submit_answer("An answer", None).await.unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.transcript.len(), 1);
        assert!(snapshot.notices.last().unwrap().retryable);
        session.terminate();
    }

    #[tokio::test]
    async fn test_generation_pauses_timer_and_blocks_second_call() {
        let release = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::Gated {
                chunks: vec!["Why ".into(), "that?".into()],
                release: release.clone(),
            },
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.submit_answer("First", None).await })
        };
        tokio::task::yield_now().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::PhaseOnePaused);
        assert!(snapshot.is_generating);
        assert!(!snapshot.timer.is_running);

        let err = session.submit_answer("Second", None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(session.skip_topic().await.is_err());

        release.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(session.snapshot().state, SessionState::PhaseOneRunning);
        session.terminate();
    }

    #[tokio::test]
    async fn test_terminate_during_generation_discards_result() {
        let release = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::Gated {
                chunks: vec!["late ".into(), "question".into()],
                release: release.clone(),
            },
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.submit_answer("Answer", None).await })
        };
        tokio::task::yield_now().await;

        session.terminate();
        release.notify_one();
        pending.await.unwrap().unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Complete);
        assert_eq!(snapshot.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_advance_streams_preview_then_installs_task() {
        let release = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::Gated {
                chunks: vec![
                    r#"{"graph":{"nodes":[],"edges":[]},"instructions":"Build an A"#.into(),
                    r#"PI"}"#.into(),
                ],
                release: release.clone(),
            },
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.advance().await })
        };
        settle().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::PhaseTwoPaused);
        assert_eq!(snapshot.preview.as_deref(), Some("Build an A"));
        assert!(snapshot.task.is_none());

        release.notify_one();
        let snapshot = pending.await.unwrap().unwrap();
        assert_eq!(snapshot.state, SessionState::PhaseTwoRunning);
        assert!(snapshot.preview.is_none());
        let task = snapshot.task.unwrap();
        assert_eq!(task.instructions, "Build an API");
        assert!(task.graph.nodes.is_empty());
        session.terminate();
    }

    #[tokio::test]
    async fn test_task_failure_installs_fallback_task() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::Fail("overloaded".into()),
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let snapshot = session.advance().await.unwrap();
        let task = snapshot.task.unwrap();
        assert_eq!(task.graph.nodes.len(), 1);
        assert_eq!(task.graph.nodes[0].kind, NodeKind::Gateway);
        assert!(snapshot.notices.last().unwrap().retryable);
        session.terminate();
    }

    #[tokio::test]
    async fn test_empty_task_output_is_an_explicit_failure() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::chunks(&[]),
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let err = session.advance().await.unwrap_err();
        assert!(matches!(err, AppError::EmptyGeneration));
        assert!(session.snapshot().task.is_some());
        session.terminate();
    }

    #[tokio::test]
    async fn test_contentless_task_payload_installs_fallback_with_notice() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::text(r#"{"graph":{"nodes":[],"edges":[]},"notes":"later"}"#),
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let snapshot = session.advance().await.unwrap();
        let task = snapshot.task.unwrap();
        assert_eq!(task, fallback_task());
        assert!(!task.instructions.is_empty());
        let notice = snapshot.notices.last().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        session.terminate();
    }

    #[tokio::test]
    async fn test_submit_task_completes_session() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::text(TASK_JSON),
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        assert!(matches!(
            session.submit_task().await.unwrap_err(),
            AppError::Conflict(_)
        ));

        let snapshot = session.advance().await.unwrap();
        let task = snapshot.task.unwrap();
        assert_eq!(task.graph.nodes.len(), 2);
        assert_eq!(task.graph.edges.len(), 1);

        let snapshot = session.submit_task().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Complete);
        assert_eq!(snapshot.timer.phase, Phase::Two);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_forces_phase_two_at_threshold() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::text(TASK_JSON),
        ]));
        let session = session_with(source, settings(5, 3));
        session.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.timer.phase, Phase::Two);
        assert_eq!(snapshot.timer.remaining_seconds, 3);
        assert!(snapshot.task.is_some());
        session.terminate();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_holds_while_generation_is_in_flight() {
        let release = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::Gated {
                chunks: vec!["Hmm".into()],
                release: release.clone(),
            },
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(session.snapshot().timer.remaining_seconds, 598);

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.submit_answer("Answer", None).await })
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(session.snapshot().timer.remaining_seconds, 598);

        release.notify_one();
        pending.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(session.snapshot().timer.remaining_seconds, 596);
        session.terminate();
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_survives_a_dropped_caller() {
        let release = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::Gated {
                chunks: vec![r#"{"text": "Design a "#.into(), r#"cache"}"#.into()],
                release: release.clone(),
            },
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let dropped = tokio::time::timeout(Duration::from_millis(100), session.skip_topic()).await;
        assert!(dropped.is_err());
        assert_eq!(session.snapshot().state, SessionState::PhaseOnePaused);

        release.notify_one();
        settle().await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::PhaseOneRunning);
        assert_eq!(snapshot.topic.unwrap().text, "Design a cache");
        assert!(session.countdown_slot().is_some());

        let remaining = snapshot.timer.remaining_seconds;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(session.snapshot().timer.remaining_seconds < remaining);
        session.terminate();
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_survives_a_dropped_caller() {
        let release = Arc::new(Notify::new());
        let (head, tail) = TASK_JSON.split_at(40);
        let source = Arc::new(ScriptedSource::new(vec![
            Script::text(TOPIC_JSON),
            Script::Gated {
                chunks: vec![head.into(), tail.into()],
                release: release.clone(),
            },
        ]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        let dropped = tokio::time::timeout(Duration::from_millis(100), session.advance()).await;
        assert!(dropped.is_err());

        release.notify_one();
        settle().await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::PhaseTwoRunning);
        assert_eq!(snapshot.task.unwrap().graph.nodes.len(), 2);

        let snapshot = session.submit_task().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_resets_idle_time() {
        let source = Arc::new(ScriptedSource::new(vec![Script::text(TOPIC_JSON)]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(session.idle_for(), Duration::from_secs(30));
        session.snapshot();
        assert_eq!(session.idle_for(), Duration::ZERO);
        session.terminate();
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_tears_down_countdown() {
        let source = Arc::new(ScriptedSource::new(vec![Script::text(TOPIC_JSON)]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        session.terminate();
        let remaining = session.snapshot().timer.remaining_seconds;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(session.snapshot().timer.remaining_seconds, remaining);
        assert!(session.countdown_slot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_session_stops_its_countdown() {
        let source = Arc::new(ScriptedSource::new(vec![Script::text(TOPIC_JSON)]));
        let session = session_with(source, settings(600, 300));
        session.start().await.unwrap();
        let weak = Arc::downgrade(&session);

        drop(session);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(weak.upgrade().is_none());
    }
}
