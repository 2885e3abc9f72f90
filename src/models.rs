use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Profile of the signed-in user as the backend reports it.
///
/// Steam logins only fill `username`, `steam_id` and `avatar_url`; password
/// logins carry the full account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Numeric on the wire for accounts, kept opaque here.
    #[serde(default, deserialize_with = "deserialize_opaque_id")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub steam_id: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

fn deserialize_opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unsupported user id: {other}"
        ))),
    }
}

impl UserProfile {
    /// Account id when the backend assigned one, otherwise the Steam id.
    pub fn user_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.steam_id.as_deref())
    }

    pub fn display_name(&self) -> &str {
        &self.username
    }

    pub fn avatar_ref(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// `completed` and `failed` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend-tracked install/download operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Filled from the mapping key when a listing omits it.
    #[serde(rename = "task_id", alias = "id", default)]
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub description: String,
    /// Populated by the backend on failure; often an empty string otherwise.
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub task_type: Option<String>,
    /// 0..=100
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub total_size: Option<u64>,
    #[serde(default)]
    pub downloaded_size: Option<u64>,
}

impl Task {
    /// Failure text with empty strings treated as absent.
    pub fn failure_message(&self) -> Option<&str> {
        self.message.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

/// `GET /servers/install/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationStatus {
    pub steamcmd_installed: bool,
    pub server_installed: bool,
    #[serde(default)]
    pub steamcmd_path: String,
    #[serde(default)]
    pub server_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_from_backend_dict() {
        let task: Task = serde_json::from_value(json!({
            "task_id": "l4d2_server_1a2b3c4d",
            "task_type": "server_download",
            "description": "Download L4D2 server",
            "status": "running",
            "progress": 42,
            "message": "",
            "start_time": 1700000000.5,
            "end_time": null,
            "duration": null,
            "total_size": 0,
            "downloaded_size": 0
        }))
        .unwrap();

        assert_eq!(task.id, "l4d2_server_1a2b3c4d");
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress, Some(42.0));
        assert_eq!(task.failure_message(), None);
        assert!(!task.status.is_terminal());
    }

    #[test]
    fn task_accepts_plain_id() {
        let task: Task = serde_json::from_value(json!({
            "id": "t1",
            "status": "failed",
            "description": "Install plugins",
            "message": "disk full"
        }))
        .unwrap();
        assert_eq!(task.id, "t1");
        assert_eq!(task.failure_message(), Some("disk full"));
        assert!(task.status.is_terminal());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let res = serde_json::from_value::<Task>(json!({ "task_id": "x", "status": "paused" }));
        assert!(res.is_err());
    }

    #[test]
    fn user_id_accepts_numbers_and_strings() {
        let account: UserProfile = serde_json::from_value(json!({
            "id": 7,
            "username": "admin",
            "email": "admin@example.com",
            "is_admin": true,
            "is_active": true
        }))
        .unwrap();
        assert_eq!(account.user_id(), Some("7"));
        assert!(account.is_admin);

        let steam: UserProfile = serde_json::from_value(json!({
            "username": "gordon",
            "steam_id": "76561197960287930",
            "avatar_url": "https://avatars.example/g.jpg"
        }))
        .unwrap();
        assert_eq!(steam.user_id(), Some("76561197960287930"));
        assert_eq!(steam.avatar_ref(), Some("https://avatars.example/g.jpg"));
        assert!(steam.is_active);

        // Serialized ids come back as strings and must still parse.
        let roundtrip: UserProfile =
            serde_json::from_str(&serde_json::to_string(&account).unwrap()).unwrap();
        assert_eq!(roundtrip, account);
    }
}
