use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::ApiError;

/// Signals raised by the transport for whoever owns session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The backend answered 401. `token` is the bearer the rejected request
    /// carried, so a listener can ignore rejections of a credential it has
    /// already replaced.
    Unauthorized { token: Option<String> },
}

/// Whether a request carries the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Bearer,
    /// Login and registration go out without credentials. A 401 on these is
    /// an ordinary rejection, not a session invalidation.
    Anonymous,
}

/// Runs inside the failing request, before the caller sees the error.
type UnauthorizedHook = Box<dyn Fn(Option<&str>) + Send + Sync>;

/// Thin JSON client for the management backend.
///
/// Cloning is cheap and clones share the bearer token, the hooks and the
/// event channel.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    bearer: Arc<RwLock<Option<String>>>,
    hooks: Arc<RwLock<Vec<UnauthorizedHook>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, String> {
        let base_url = Url::parse(base_url.trim().trim_end_matches('/'))
            .map_err(|e| format!("invalid base url {base_url}: {e}"))?;
        if base_url.cannot_be_a_base() {
            return Err(format!("invalid base url {base_url}"));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build http client: {e}"))?;
        let (events, _) = broadcast::channel(32);
        Ok(Self {
            http,
            base_url,
            bearer: Arc::new(RwLock::new(None)),
            hooks: Arc::new(RwLock::new(Vec::new())),
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn token(&self) -> Option<String> {
        self.bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.bearer.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Receive 401 notifications. Every subscriber sees every event.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Run `hook` synchronously on every 401 to a bearer request, with the
    /// rejected token. Hooks must not register further hooks.
    pub fn on_unauthorized(&self, hook: impl Fn(Option<&str>) + Send + Sync + 'static) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// `<base>/<segments...>`, each segment percent-encoded on its own.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        self.request(Method::GET, segments, &[], None, Auth::Bearer).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        self.request(Method::DELETE, segments, &[], None, Auth::Bearer).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, segments, &[], body, Auth::Bearer).await
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<Value>,
        auth: Auth,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments);
        let path = url.path().to_string();
        let mut req = self.http.request(method.clone(), url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = &body {
            req = req.json(body);
        }

        let sent_token = match auth {
            Auth::Bearer => self.token(),
            Auth::Anonymous => None,
        };
        if let Some(token) = &sent_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            log::warn!("{method} {path} failed: {e}");
            ApiError::Transport(e.to_string())
        })?;
        let status = resp.status();
        log::info!("{method} {path} -> {}", status.as_u16());

        if status == StatusCode::UNAUTHORIZED && auth == Auth::Bearer {
            self.invalidate(sent_token);
            return Err(ApiError::Unauthorized);
        }

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            return Err(ApiError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub(crate) fn invalidate(&self, rejected: Option<String>) {
        {
            // Only drop the bearer if nobody has swapped in a new one meanwhile.
            let mut bearer = self.bearer.write().unwrap_or_else(PoisonError::into_inner);
            if rejected.is_some() && *bearer == rejected {
                *bearer = None;
            }
        }
        log::warn!("backend rejected credentials");

        for hook in self.hooks.read().unwrap_or_else(PoisonError::into_inner).iter() {
            hook(rejected.as_deref());
        }
        // No receivers is fine: nothing may be listening yet.
        let _ = self.events.send(ClientEvent::Unauthorized { token: rejected });
    }
}
