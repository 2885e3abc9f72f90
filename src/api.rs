use std::collections::HashMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::http::{ApiClient, Auth};
use crate::models::{InstallationStatus, Task, UserProfile};

/// `POST /auth/login` body.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordCredentials {
    pub email: String,
    pub password: String,
}

/// `POST /auth/register` body.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// SteamCMD account used by the backend to pull server files.
#[derive(Debug, Clone, Serialize)]
pub struct SteamCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SteamLoginResponse {
    pub success: bool,
    #[serde(default)]
    pub steam_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Not issued by every backend version.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallResponse {
    pub success: bool,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// What an install request asks the backend to set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallTarget {
    SteamCmd,
    Server,
    Plugins,
    /// SteamCMD, server and plugins in one go.
    Full,
}

impl InstallTarget {
    pub fn path_segment(self) -> &'static str {
        match self {
            InstallTarget::SteamCmd => "steamcmd",
            InstallTarget::Server => "server",
            InstallTarget::Plugins => "plugins",
            InstallTarget::Full => "full",
        }
    }

    pub fn started_message(self) -> &'static str {
        match self {
            InstallTarget::SteamCmd => "SteamCMD installed",
            InstallTarget::Server => "Server download started",
            InstallTarget::Plugins => "Plugin installation started",
            InstallTarget::Full => "Full installation started",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            InstallTarget::SteamCmd => "SteamCMD installation failed",
            InstallTarget::Server => "Server installation failed",
            InstallTarget::Plugins => "Plugin installation failed",
            InstallTarget::Full => "Full installation failed",
        }
    }

    /// SteamCMD needs no account; the others forward one when given.
    pub fn accepts_credentials(self) -> bool {
        !matches!(self, InstallTarget::SteamCmd)
    }
}

/// `/auth/*` endpoints.
#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn steam_login(&self, steam_id: &str) -> Result<SteamLoginResponse, ApiError> {
        self.client
            .request(
                Method::POST,
                &["auth", "steam", "login"],
                &[("steam_id", steam_id)],
                None,
                Auth::Anonymous,
            )
            .await
    }

    pub async fn login(&self, credentials: &PasswordCredentials) -> Result<AuthResponse, ApiError> {
        let body = to_body(credentials)?;
        self.client
            .request(Method::POST, &["auth", "login"], &[], Some(body), Auth::Anonymous)
            .await
    }

    pub async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let body = to_body(registration)?;
        self.client
            .request(Method::POST, &["auth", "register"], &[], Some(body), Auth::Anonymous)
            .await
    }

    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.client.get(&["auth", "me"]).await
    }

    pub async fn logout(&self) -> Result<Value, ApiError> {
        self.client.post(&["auth", "logout"], None).await
    }
}

/// `/servers/*` download and install endpoints.
#[derive(Clone)]
pub struct DownloadApi {
    client: ApiClient,
}

impl DownloadApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn tasks(&self) -> Result<HashMap<String, Task>, ApiError> {
        self.client.get(&["servers", "downloads"]).await
    }

    pub async fn task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.client.get(&["servers", "downloads", task_id]).await
    }

    pub async fn cancel(&self, task_id: &str) -> Result<Value, ApiError> {
        self.client.delete(&["servers", "downloads", task_id]).await
    }

    pub async fn install(
        &self,
        target: InstallTarget,
        credentials: Option<&SteamCredentials>,
    ) -> Result<InstallResponse, ApiError> {
        let body = match credentials {
            Some(c) if target.accepts_credentials() => Some(to_body(c)?),
            _ if target.accepts_credentials() => Some(Value::Object(Default::default())),
            _ => None,
        };
        self.client
            .post(&["servers", "install", target.path_segment()], body)
            .await
    }

    pub async fn installation_status(&self) -> Result<InstallationStatus, ApiError> {
        self.client.get(&["servers", "install", "status"]).await
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}
