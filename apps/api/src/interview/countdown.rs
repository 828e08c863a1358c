//! Countdown task driving `PhaseController::tick` once per period.
//!
//! The task only holds a `Weak` reference to its target, and stopping it
//! requires the `CountdownHandle` returned by `spawn`. Dropping the handle
//! cancels the task, so a discarded session can never keep ticking.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Receives one call per countdown period.
pub trait CountdownTarget: Send + Sync + 'static {
    fn on_tick(self: Arc<Self>) -> ControlFlow<()>;
}

pub struct Countdown;

impl Countdown {
    pub fn spawn<T: CountdownTarget>(target: Weak<T>, period: Duration) -> CountdownHandle {
        let token = CancellationToken::new();
        let child = token.clone();

        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => {
                        debug!("Countdown cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(target) = target.upgrade() else {
                            debug!("Countdown target dropped");
                            break;
                        };
                        if target.on_tick().is_break() {
                            break;
                        }
                    }
                }
            }
        });

        CountdownHandle { token, task }
    }
}

/// Owning handle for a running countdown.
pub struct CountdownHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl CountdownHandle {
    /// Stops the countdown. No tick is delivered after this returns
    /// unless one was already executing.
    pub fn cancel(self) {
        self.token.cancel();
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
