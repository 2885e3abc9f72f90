//! Per-task status polling.
//!
//! A poll fetches one task at a fixed interval until the backend reports a
//! terminal status, a fetch fails, the absolute timeout passes, or the poll is
//! cancelled. The interval sleep, the deadline and the cancellation token
//! share one `select!`, so whichever fires first ends the loop and the others
//! are dropped with it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_TIMEOUT_MS};
use crate::error::ApiError;
use crate::models::{Task, TaskStatus};
use crate::notify::{Notification, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Pause between the end of one fetch and the start of the next.
    pub interval: Duration,
    /// Absolute limit measured from poll start.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
        }
    }
}

/// Why a poll stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Backend reported `completed` or `failed`. A notification was emitted.
    Terminal(TaskStatus),
    /// Gave up silently; says nothing about the task itself.
    TimedOut,
    /// A fetch failed. No retry.
    Failed(String),
    /// Superseded by a newer poll or stopped explicitly.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Active,
    Stopped(PollOutcome),
}

impl PollState {
    pub fn is_active(&self) -> bool {
        matches!(self, PollState::Active)
    }
}

/// Drive one poll to completion.
pub async fn run_poll<P, Fut>(
    task_id: &str,
    settings: PollSettings,
    cancel: &CancellationToken,
    notifier: &dyn Notifier,
    mut fetch: P,
) -> PollOutcome
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<Task, ApiError>>,
{
    let deadline = tokio::time::sleep(settings.timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = &mut deadline => return PollOutcome::TimedOut,
            _ = tokio::time::sleep(settings.interval) => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = &mut deadline => return PollOutcome::TimedOut,
            res = fetch() => res,
        };

        let task = match fetched {
            Ok(task) => task,
            Err(e) => {
                log::warn!("fetch for task {task_id} failed: {e}");
                return PollOutcome::Failed(e.to_string());
            }
        };

        match task.status {
            TaskStatus::Completed => {
                notifier.notify(Notification::task_completed(&task));
                return PollOutcome::Terminal(TaskStatus::Completed);
            }
            TaskStatus::Failed => {
                notifier.notify(Notification::task_failed(&task));
                return PollOutcome::Terminal(TaskStatus::Failed);
            }
            TaskStatus::Pending | TaskStatus::Running => {
                log::debug!("task {task_id} still {}", task.status);
            }
        }
    }
}

struct PollHandle {
    cancel: CancellationToken,
    state: watch::Receiver<PollState>,
}

/// Registry of polls, at most one live poll per task id.
///
/// The most recent poll for an id stays registered after it stops so its
/// outcome can still be read. A restart replaces the entry, so the map holds
/// at most one entry per task id polled since the last `shutdown`.
pub struct TaskPoller {
    settings: PollSettings,
    notifier: Arc<dyn Notifier>,
    handles: Mutex<HashMap<String, PollHandle>>,
}

impl TaskPoller {
    pub fn new(settings: PollSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            settings,
            notifier,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, PollHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start polling `task_id`, cancelling any poll already running for it.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start<P, Fut>(&self, task_id: &str, fetch: P)
    where
        P: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Task, ApiError>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(PollState::Active);

        let previous = self.handles().insert(
            task_id.to_string(),
            PollHandle {
                cancel: cancel.clone(),
                state: rx,
            },
        );
        if let Some(previous) = previous {
            if previous.state.borrow().is_active() {
                log::info!("superseding active poll for task {task_id}");
            }
            previous.cancel.cancel();
        }

        let notifier = Arc::clone(&self.notifier);
        let settings = self.settings;
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            log::info!(
                "polling task {task_id} every {}ms (timeout {}s)",
                settings.interval.as_millis(),
                settings.timeout.as_secs()
            );
            let outcome = run_poll(&task_id, settings, &cancel, notifier.as_ref(), fetch).await;
            log::info!("stopped polling task {task_id}: {outcome:?}");
            let _ = tx.send(PollState::Stopped(outcome));
        });
    }

    /// Cancel the live poll for `task_id`. Returns whether one was running.
    pub fn stop(&self, task_id: &str) -> bool {
        let handles = self.handles();
        match handles.get(task_id) {
            Some(h) if h.state.borrow().is_active() => {
                h.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, task_id: &str) -> Option<PollState> {
        self.handles()
            .get(task_id)
            .map(|h| h.state.borrow().clone())
    }

    /// Wait until the most recent poll for `task_id` stops.
    ///
    /// `None` when no poll was ever started for the id.
    pub async fn wait(&self, task_id: &str) -> Option<PollOutcome> {
        let mut rx = self.handles().get(task_id)?.state.clone();
        let outcome = match &*rx.wait_for(|s| !s.is_active()).await.ok()? {
            PollState::Stopped(outcome) => Some(outcome.clone()),
            PollState::Active => None,
        };
        outcome
    }

    /// Ids with a live poll, sorted.
    pub fn active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .handles()
            .iter()
            .filter(|(_, h)| h.state.borrow().is_active())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Cancel every live poll and forget every entry.
    pub fn shutdown(&self) {
        let mut handles = self.handles();
        for handle in handles.values() {
            handle.cancel.cancel();
        }
        log::info!("dropping {} poll entries", handles.len());
        handles.clear();
    }
}
