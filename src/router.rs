use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    /// `/`, an alias of the dashboard.
    Root,
    Dashboard,
    Servers,
    Mods,
    Rooms,
    Downloads,
}

/// Where anonymous users are sent.
pub const LOGIN_ROUTE: Route = Route::Login;
/// Where signed-in users land.
pub const DEFAULT_ROUTE: Route = Route::Dashboard;

impl Route {
    pub const ALL: [Route; 7] = [
        Route::Login,
        Route::Root,
        Route::Dashboard,
        Route::Servers,
        Route::Mods,
        Route::Rooms,
        Route::Downloads,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Root => "/",
            Route::Dashboard => "/dashboard",
            Route::Servers => "/servers",
            Route::Mods => "/mods",
            Route::Rooms => "/rooms",
            Route::Downloads => "/downloads",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Route::Login => "Login",
            Route::Root => "Root",
            Route::Dashboard => "Dashboard",
            Route::Servers => "Servers",
            Route::Mods => "Mods",
            Route::Rooms => "Rooms",
            Route::Downloads => "Downloads",
        }
    }

    /// Trailing slashes are ignored; matching is exact otherwise.
    pub fn from_path(path: &str) -> Option<Route> {
        let trimmed = path.trim();
        let normalized = match trimmed.trim_end_matches('/') {
            "" if trimmed.starts_with('/') => "/",
            p => p,
        };
        Route::ALL.into_iter().find(|r| r.path() == normalized)
    }

    pub fn requires_auth(self) -> bool {
        !matches!(self, Route::Login)
    }

    /// Follow static aliases.
    pub fn resolve(self) -> Route {
        match self {
            Route::Root => Route::Dashboard,
            r => r,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow(Route),
    Redirect(Route),
}

impl Navigation {
    /// The route the user ends up on.
    pub fn destination(self) -> Route {
        match self {
            Navigation::Allow(r) | Navigation::Redirect(r) => r,
        }
    }
}

/// Decide a navigation from session presence alone.
pub fn guard(target: Route, authenticated: bool) -> Navigation {
    let resolved = target.resolve();
    let decision = if resolved.requires_auth() && !authenticated {
        Navigation::Redirect(LOGIN_ROUTE)
    } else if resolved == LOGIN_ROUTE && authenticated {
        Navigation::Redirect(DEFAULT_ROUTE)
    } else {
        Navigation::Allow(resolved)
    };

    match decision {
        Navigation::Allow(r) if r != target => Navigation::Redirect(r),
        d => d,
    }
}

/// Tracks the current route for the UI.
#[derive(Debug)]
pub struct Router {
    current: Route,
}

impl Default for Router {
    fn default() -> Self {
        Self { current: LOGIN_ROUTE }
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Route {
        self.current
    }

    /// Guard and move. Reads the session, never changes it.
    pub fn navigate(&mut self, target: Route, session: &SessionStore) -> Navigation {
        let nav = guard(target, session.is_authenticated());
        if let Navigation::Redirect(to) = nav {
            log::info!("redirect {} -> {}", target.path(), to.path());
        }
        self.current = nav.destination();
        nav
    }

    /// Send the user to the login entry point, e.g. after a 401.
    pub fn force_login(&mut self) {
        self.current = LOGIN_ROUTE;
    }
}
