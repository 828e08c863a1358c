use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::session::InterviewSession;

/// How long sessions stay in the registry without client activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Completed sessions stay readable for this long after their last snapshot.
    pub completed: Duration,
    /// Unfinished sessions untouched for this long are terminated and dropped.
    pub abandoned: Duration,
}

/// In-memory index of live sessions. Nothing here outlives the process.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<InterviewSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<InterviewSession>) {
        self.sessions.write().await.insert(session.id(), session);
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<InterviewSession>, AppError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Interview {id} not found")))
    }

    /// Removes the session and returns it. The countdown stops once the last
    /// strong reference is gone.
    pub async fn remove(&self, id: Uuid) -> Result<Arc<InterviewSession>, AppError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Interview {id} not found")))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops every session the policy no longer retains. Returns how many went.
    pub async fn sweep(&self, policy: RetentionPolicy) -> usize {
        let mut sessions = self.sessions.write().await;

        let expired: Vec<Uuid> = sessions
            .values()
            .filter(|session| {
                let idle = session.idle_for();
                if session.is_complete() {
                    idle >= policy.completed
                } else {
                    idle >= policy.abandoned
                }
            })
            .map(|session| session.id())
            .collect();

        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                session.terminate();
                info!(session_id = %id, "Removed idle interview");
            }
        }
        expired.len()
    }

    /// Runs `sweep` every `period` for the life of the process.
    pub fn spawn_sweeper(&self, policy: RetentionPolicy, period: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                registry.sweep(policy).await;
            }
        })
    }
}
