//! Signed-in user and bearer token.
//!
//! The in-memory session is a single `Option<Session>`, so a token without a
//! user (or the reverse) cannot be represented. The durable copy lives in two
//! storage slots that are written together and cleared together.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::api::{AuthApi, AuthResponse, PasswordCredentials, Registration};
use crate::http::ApiClient;
use crate::models::UserProfile;
use crate::storage::{KeyValueStore, TOKEN_KEY, USER_KEY};

const LOGIN_FAILED: &str = "Login failed";
const REGISTER_FAILED: &str = "Registration failed";

/// Outcome of a store action as the UI sees it. Actions never return errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: UserProfile,
    pub token: String,
}

impl Session {
    pub fn user_id(&self) -> Option<&str> {
        self.user.user_id()
    }

    pub fn display_name(&self) -> &str {
        self.user.display_name()
    }

    pub fn avatar_ref(&self) -> Option<&str> {
        self.user.avatar_ref()
    }
}

/// The part of the store the HTTP client's 401 hook can reach.
struct SessionState {
    storage: Arc<dyn KeyValueStore>,
    session: RwLock<Option<Session>>,
}

impl SessionState {
    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget the session in memory and on disk.
    fn clear(&self) -> Option<Session> {
        let previous = self.write().take();
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.storage.remove(key) {
                log::warn!("failed to clear stored {key}: {e}");
            }
        }
        previous
    }

    /// A 401 for `rejected` arrived. Only the current token ends the session.
    fn reject(&self, rejected: Option<&str>) {
        let current = self.read().as_ref().map(|s| s.token.clone());
        if rejected.is_none() || current.as_deref() != rejected {
            return;
        }
        if let Some(session) = self.clear() {
            log::info!("credentials rejected by backend; signed out {}", session.user.username);
        }
    }
}

pub struct SessionStore {
    api: AuthApi,
    state: Arc<SessionState>,
}

impl SessionStore {
    /// Registers a 401 hook on `client`: a rejection of the current token
    /// clears the session before the failing request returns.
    pub fn new(client: ApiClient, storage: Arc<dyn KeyValueStore>) -> Self {
        let state = Arc::new(SessionState {
            storage,
            session: RwLock::new(None),
        });
        let weak = Arc::downgrade(&state);
        client.on_unauthorized(move |rejected| {
            if let Some(state) = weak.upgrade() {
                state.reject(rejected);
            }
        });
        Self {
            api: AuthApi::new(client),
            state,
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.state.write()
    }

    fn current_token(&self) -> Option<String> {
        self.state.read().as_ref().map(|s| s.token.clone())
    }

    pub fn current(&self) -> Option<Session> {
        self.state.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().is_some()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.current().map(|s| s.user)
    }

    pub fn token(&self) -> Option<String> {
        self.current_token()
    }

    /// Load the stored session without talking to the backend.
    ///
    /// Half-written or unreadable slots are cleared.
    pub fn restore(&self) -> bool {
        let token = self.state.storage.get(TOKEN_KEY).filter(|t| !t.is_empty());
        let user = self.state.storage.get(USER_KEY);

        match (token, user) {
            (Some(token), Some(user)) => match serde_json::from_str::<UserProfile>(&user) {
                Ok(user) => {
                    log::info!("restored session for {}", user.username);
                    self.install(Session { user, token });
                    true
                }
                Err(e) => {
                    log::warn!("stored user is unreadable ({e}); clearing session");
                    self.logout();
                    false
                }
            },
            (None, None) => false,
            _ => {
                log::warn!("stored session is incomplete; clearing it");
                self.logout();
                false
            }
        }
    }

    /// Restore, then confirm the stored token with the backend.
    pub async fn initialize(&self) -> bool {
        if self.restore() {
            self.fetch_current_user().await;
        }
        self.is_authenticated()
    }

    /// Refresh the profile from `GET /auth/me`. Any failure signs out.
    pub async fn fetch_current_user(&self) -> bool {
        let Some(token) = self.current_token() else {
            return false;
        };

        match self.api.current_user().await {
            Ok(user) => {
                let mut guard = self.write();
                // Signed out or re-logged in while the request was in flight.
                let Some(session) = guard.as_mut().filter(|s| s.token == token) else {
                    return false;
                };
                match serde_json::to_string(&user) {
                    Ok(json) => {
                        if let Err(e) = self.state.storage.set(USER_KEY, &json) {
                            log::warn!("failed to save refreshed profile: {e}");
                        }
                    }
                    Err(e) => log::warn!("failed to encode refreshed profile: {e}"),
                }
                session.user = user;
                true
            }
            Err(e) => {
                log::warn!("session revalidation failed: {e}");
                if self.current_token().as_deref() == Some(token.as_str()) {
                    self.logout();
                }
                false
            }
        }
    }

    pub async fn login_steam(&self, steam_id: &str) -> ActionResult {
        let steam_id = steam_id.trim();
        if steam_id.is_empty() {
            return ActionResult::failed("Steam id is required");
        }

        match self.api.steam_login(steam_id).await {
            Ok(resp) if resp.success => {
                let steam_id = resp
                    .steam_id
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| steam_id.to_string());
                // The Steam endpoint may not mint a bearer; keep a local marker
                // so the session still has both halves.
                let token = resp
                    .token
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| format!("steam:{steam_id}"));
                let user = UserProfile {
                    id: None,
                    username: resp.username.unwrap_or_else(|| steam_id.clone()),
                    email: None,
                    steam_id: Some(steam_id),
                    avatar_url: resp.avatar_url,
                    is_admin: false,
                    is_active: true,
                };
                self.establish(user, token)
            }
            Ok(resp) => failure(resp.message, LOGIN_FAILED),
            Err(e) => {
                log::warn!("steam login failed: {e}");
                ActionResult::failed(e.user_message(LOGIN_FAILED))
            }
        }
    }

    pub async fn login_with_password(&self, credentials: &PasswordCredentials) -> ActionResult {
        match self.api.login(credentials).await {
            Ok(resp) => self.accept(resp, LOGIN_FAILED),
            Err(e) => {
                log::warn!("password login failed: {e}");
                ActionResult::failed(e.user_message(LOGIN_FAILED))
            }
        }
    }

    pub async fn register(&self, registration: &Registration) -> ActionResult {
        match self.api.register(registration).await {
            Ok(resp) => self.accept(resp, REGISTER_FAILED),
            Err(e) => {
                log::warn!("registration failed: {e}");
                ActionResult::failed(e.user_message(REGISTER_FAILED))
            }
        }
    }

    /// Drop the session locally. Safe to call when already signed out.
    pub fn logout(&self) {
        self.api.client().set_token(None);
        if let Some(session) = self.state.clear() {
            log::info!("signed out {}", session.user.username);
        }
    }

    /// Tell the backend, then sign out locally whatever it answered.
    pub async fn logout_remote(&self) {
        if self.current_token().is_some() {
            if let Err(e) = self.api.logout().await {
                log::warn!("backend logout failed: {e}");
            }
        }
        self.logout();
    }

    fn accept(&self, resp: AuthResponse, fallback: &str) -> ActionResult {
        if !resp.success {
            return failure(resp.message, fallback);
        }
        match (resp.user, resp.token.filter(|t| !t.is_empty())) {
            (Some(user), Some(token)) => self.establish(user, token),
            _ => {
                log::warn!("auth response reported success without user and token");
                ActionResult::failed(format!("{fallback}: incomplete response"))
            }
        }
    }

    fn establish(&self, user: UserProfile, token: String) -> ActionResult {
        if let Err(e) = self.persist(&user, &token) {
            log::error!("failed to save session: {e}");
            self.logout();
            return ActionResult::failed(format!("Failed to save session: {e}"));
        }
        log::info!("signed in as {}", user.username);
        self.install(Session { user, token });
        ActionResult::ok()
    }

    fn persist(&self, user: &UserProfile, token: &str) -> Result<(), String> {
        let user_json = serde_json::to_string(user).map_err(|e| e.to_string())?;
        let storage = &self.state.storage;
        storage.set(TOKEN_KEY, token)?;
        if let Err(e) = storage.set(USER_KEY, &user_json) {
            let _ = storage.remove(TOKEN_KEY);
            return Err(e);
        }
        Ok(())
    }

    fn install(&self, session: Session) {
        self.api.client().set_token(Some(session.token.clone()));
        *self.write() = Some(session);
    }
}

fn failure(message: Option<String>, fallback: &str) -> ActionResult {
    let message = message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| fallback.to_string());
    ActionResult::failed(message)
}
