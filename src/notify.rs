use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Error,
}

/// User-facing notice raised by a store action or a finished poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    /// Set when the notice is about a specific download task.
    pub task_id: Option<String>,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
            task_id: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
            task_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            task_id: None,
        }
    }

    pub fn for_task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn task_completed(task: &Task) -> Self {
        Self::success(format!("{} completed", task.description)).for_task(&task.id)
    }

    pub fn task_failed(task: &Task) -> Self {
        let reason = task.failure_message().unwrap_or("unknown error");
        Self::error(format!("{} failed: {reason}", task.description)).for_task(&task.id)
    }
}

/// Where notifications go. The UI layer decides how to show them.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            Level::Error => log::error!("{}", n.message),
            _ => log::info!("{}", n.message),
        }
    }
}

/// Prints to the terminal as notices arrive.
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, n: Notification) {
        let tag = match n.level {
            Level::Success => "ok",
            Level::Info => "info",
            Level::Error => "error",
        };
        match n.level {
            Level::Error => {
                log::error!("{}", n.message);
                eprintln!("[{tag}] {}", n.message);
            }
            _ => {
                log::info!("{}", n.message);
                println!("[{tag}] {}", n.message);
            }
        }
    }
}

/// Forwards into an unbounded channel.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier for ChannelNotifier {
    fn notify(&self, n: Notification) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.tx.send(n);
    }
}

pub fn channel() -> (ChannelNotifier, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelNotifier { tx }, rx)
}
