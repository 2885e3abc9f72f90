use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::config::ConsoleConfig;
use crate::http::{ApiClient, ClientEvent};
use crate::notify::Notifier;
use crate::router::{Navigation, Route, Router};
use crate::session::SessionStore;
use crate::storage::KeyValueStore;
use crate::tasks::TaskStore;

/// Application state shared by every screen/command.
pub struct Console {
    config: ConsoleConfig,
    session: SessionStore,
    tasks: TaskStore,
    notifier: Arc<dyn Notifier>,
    router: Router,
    events: broadcast::Receiver<ClientEvent>,
}

impl Console {
    pub fn new(
        config: ConsoleConfig,
        storage: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, String> {
        let client = ApiClient::new(&config.base_url, config.request_timeout())?;
        let events = client.subscribe();
        let session = SessionStore::new(client.clone(), storage);
        let tasks = TaskStore::new(client.clone(), config.poll_settings(), Arc::clone(&notifier));
        log::info!("backend: {}", client.base_url());
        Ok(Self {
            config,
            session,
            tasks,
            notifier,
            router: Router::new(),
            events,
        })
    }

    /// Restore and revalidate the stored session, then land on `/`.
    pub async fn start(&mut self) -> Navigation {
        let signed_in = self.session.initialize().await;
        log::info!("session restored: {signed_in}");
        // Revalidation 401s are expected here, not an expiry mid-use.
        self.drain_events();
        self.navigate(Route::Root)
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn current_route(&self) -> Route {
        self.router.current()
    }

    pub fn navigate(&mut self, target: Route) -> Navigation {
        self.router.navigate(target, &self.session)
    }

    /// Whether a 401 ended the session since the last call. When it did, the
    /// router is moved to the login route.
    pub fn take_session_expired(&mut self) -> bool {
        if !self.drain_events() || self.session.is_authenticated() {
            return false;
        }
        self.router.force_login();
        true
    }

    /// True when a request carrying a bearer was rejected.
    fn drain_events(&mut self) -> bool {
        let mut rejected = false;
        loop {
            match self.events.try_recv() {
                Ok(ClientEvent::Unauthorized { token }) => rejected |= token.is_some(),
                Err(TryRecvError::Lagged(_)) => rejected = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        rejected
    }

    pub fn shutdown(&self) {
        self.tasks.shutdown();
    }
}
