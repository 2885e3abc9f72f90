use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::api::{DownloadApi, InstallTarget, SteamCredentials};
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::models::{InstallationStatus, Task, TaskStatus};
use crate::notify::{Notification, Notifier};
use crate::poller::{PollOutcome, PollSettings, PollState, TaskPoller};
use crate::session::ActionResult;

/// Result of an install request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub success: bool,
    pub message: String,
    /// Present when the backend started a trackable task.
    pub task_id: Option<String>,
}

struct Inner {
    api: DownloadApi,
    tasks: RwLock<HashMap<String, Task>>,
    current_task: RwLock<Option<String>>,
    loading: AtomicBool,
    notifier: Arc<dyn Notifier>,
    poller: TaskPoller,
}

/// Download/install tasks known to the console.
///
/// Cheap to clone; clones share state. Polls hold a clone while running.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Inner>,
}

/// Clears the loading flag however the action ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TaskStore {
    pub fn new(client: ApiClient, settings: PollSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                api: DownloadApi::new(client),
                tasks: RwLock::new(HashMap::new()),
                current_task: RwLock::new(None),
                loading: AtomicBool::new(false),
                poller: TaskPoller::new(settings, Arc::clone(&notifier)),
                notifier,
            }),
        }
    }

    fn tasks_read(&self) -> RwLockReadGuard<'_, HashMap<String, Task>> {
        self.inner.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks_write(&self) -> RwLockWriteGuard<'_, HashMap<String, Task>> {
        self.inner.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, n: Notification) {
        self.inner.notifier.notify(n);
    }

    /// Replace the local mapping with the backend's.
    pub async fn list_tasks(&self) -> Result<(), ApiError> {
        match self.inner.api.tasks().await {
            Ok(fetched) => {
                let fetched: HashMap<String, Task> = fetched
                    .into_iter()
                    .map(|(key, mut task)| {
                        if task.id.is_empty() {
                            task.id = key.clone();
                        }
                        (key, task)
                    })
                    .collect();
                log::info!("loaded {} download tasks", fetched.len());
                *self.tasks_write() = fetched;
                Ok(())
            }
            Err(e) => {
                log::error!("failed to load download tasks: {e}");
                self.notify(Notification::error("Failed to load download tasks"));
                Err(e)
            }
        }
    }

    /// Fetch one task and upsert it.
    pub async fn get_task(&self, task_id: &str) -> Result<Task, ApiError> {
        let mut task = self.inner.api.task(task_id).await?;
        if task.id.is_empty() {
            task.id = task_id.to_string();
        }
        self.tasks_write().insert(task_id.to_string(), task.clone());
        Ok(task)
    }

    pub async fn install_steamcmd(&self) -> InstallResult {
        self.install(InstallTarget::SteamCmd, None).await
    }

    pub async fn install_server(&self, credentials: Option<&SteamCredentials>) -> InstallResult {
        self.install(InstallTarget::Server, credentials).await
    }

    pub async fn install_plugins(&self, credentials: Option<&SteamCredentials>) -> InstallResult {
        self.install(InstallTarget::Plugins, credentials).await
    }

    pub async fn full_install(&self, credentials: Option<&SteamCredentials>) -> InstallResult {
        self.install(InstallTarget::Full, credentials).await
    }

    pub async fn install(
        &self,
        target: InstallTarget,
        credentials: Option<&SteamCredentials>,
    ) -> InstallResult {
        let _loading = LoadingGuard::engage(&self.inner.loading);
        log::info!("requesting install: {}", target.path_segment());

        match self.inner.api.install(target, credentials).await {
            Ok(resp) if resp.success => {
                self.notify(Notification::success(target.started_message()));
                if let Some(task_id) = resp.task_id.as_deref().filter(|id| !id.is_empty()) {
                    *self
                        .inner
                        .current_task
                        .write()
                        .unwrap_or_else(PoisonError::into_inner) = Some(task_id.to_string());
                    self.poll_task(task_id);
                }
                let _ = self.list_tasks().await;
                InstallResult {
                    success: true,
                    message: resp
                        .message
                        .unwrap_or_else(|| target.started_message().to_string()),
                    task_id: resp.task_id,
                }
            }
            Ok(resp) => {
                let message = resp
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| target.failure_message().to_string());
                log::warn!("install {} rejected: {message}", target.path_segment());
                self.notify(Notification::error(message.clone()));
                InstallResult {
                    success: false,
                    message,
                    task_id: None,
                }
            }
            Err(e) => {
                log::error!("install {} failed: {e}", target.path_segment());
                let message = e.user_message(target.failure_message());
                self.notify(Notification::error(message.clone()));
                InstallResult {
                    success: false,
                    message,
                    task_id: None,
                }
            }
        }
    }

    /// Ask the backend to cancel, stop the local poll, refresh.
    pub async fn cancel_task(&self, task_id: &str) -> ActionResult {
        match self.inner.api.cancel(task_id).await {
            Ok(_) => {
                if self.stop_polling(task_id) {
                    log::info!("stopped polling cancelled task {task_id}");
                }
                self.notify(Notification::success("Download task cancelled").for_task(task_id));
                let _ = self.list_tasks().await;
                ActionResult::ok()
            }
            Err(e) => {
                log::error!("failed to cancel task {task_id}: {e}");
                let message = e.user_message("Failed to cancel download task");
                self.notify(Notification::error(message.clone()).for_task(task_id));
                ActionResult::failed(message)
            }
        }
    }

    pub async fn installation_status(&self) -> Result<InstallationStatus, ApiError> {
        self.inner.api.installation_status().await
    }

    /// Poll `task_id` until it settles, replacing any poll already running for it.
    pub fn poll_task(&self, task_id: &str) {
        let store = self.clone();
        let id = task_id.to_string();
        self.inner.poller.start(task_id, move || {
            let store = store.clone();
            let id = id.clone();
            async move { store.get_task(&id).await }
        });
    }

    pub fn stop_polling(&self, task_id: &str) -> bool {
        self.inner.poller.stop(task_id)
    }

    pub fn poll_state(&self, task_id: &str) -> Option<PollState> {
        self.inner.poller.state(task_id)
    }

    pub async fn wait_for_poll(&self, task_id: &str) -> Option<PollOutcome> {
        self.inner.poller.wait(task_id).await
    }

    pub fn active_polls(&self) -> Vec<String> {
        self.inner.poller.active()
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.inner.poller.settings()
    }

    /// Cancel all polls. The store stays usable.
    pub fn shutdown(&self) {
        self.inner.poller.shutdown();
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks_read().get(task_id).cloned()
    }

    pub fn tasks(&self) -> HashMap<String, Task> {
        self.tasks_read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::SeqCst)
    }

    pub fn current_task(&self) -> Option<String> {
        self.inner
            .current_task
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn running(&self) -> Vec<Task> {
        self.with_status(TaskStatus::Running)
    }

    pub fn completed(&self) -> Vec<Task> {
        self.with_status(TaskStatus::Completed)
    }

    pub fn failed(&self) -> Vec<Task> {
        self.with_status(TaskStatus::Failed)
    }

    fn with_status(&self, status: TaskStatus) -> Vec<Task> {
        let mut out: Vec<Task> = self
            .tasks_read()
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use std::time::Duration;

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.into(),
            status,
            description: format!("task {id}"),
            message: None,
            task_type: None,
            progress: None,
            start_time: None,
            end_time: None,
            duration: None,
            total_size: None,
            downloaded_size: None,
        }
    }

    fn store() -> TaskStore {
        let client = ApiClient::new("http://127.0.0.1:9/api", Duration::from_millis(200)).unwrap();
        TaskStore::new(client, PollSettings::default(), Arc::new(LogNotifier))
    }

    #[test]
    fn partitions_by_status() {
        let store = store();
        {
            let mut tasks = store.tasks_write();
            for (id, status) in [
                ("b", TaskStatus::Running),
                ("a", TaskStatus::Running),
                ("c", TaskStatus::Completed),
                ("d", TaskStatus::Failed),
                ("e", TaskStatus::Pending),
            ] {
                tasks.insert(id.into(), task(id, status));
            }
        }

        let running: Vec<_> = store.running().into_iter().map(|t| t.id).collect();
        assert_eq!(running, ["a", "b"]);
        assert_eq!(store.completed().len(), 1);
        assert_eq!(store.failed()[0].id, "d");
        // Pending tasks belong to none of the views.
        assert_eq!(store.tasks().len(), 5);
    }

    #[test]
    fn loading_guard_resets_on_drop() {
        let store = store();
        {
            let _guard = LoadingGuard::engage(&store.inner.loading);
            assert!(store.is_loading());
        }
        assert!(!store.is_loading());
    }
}
