//! Session Manager: the one authoritative copy of who is signed in.
//!
//! State lives in a `watch` channel so views can observe it, and is
//! mirrored to the durable store under [`AUTH_STATE_KEY`] on every change.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use parlor_types::api::{
    LOGIN_PATH, LOGOUT_PATH, LoginRequest, REFRESH_TOKEN_PATH, REGISTER_PATH, RegisterRequest,
    UserResponse,
};
use parlor_types::{AuthState, User, UserPatch};

use crate::config::RefreshMode;
use crate::error::{ClientError, Result};
use crate::guard::Route;
use crate::interceptor::AuthInterceptor;
use crate::storage::KeyValueStore;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

pub const AUTH_STATE_KEY: &str = "authState";

/// Receives navigation requests, e.g. the sign-in redirect after logout.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Drops every navigation request.
pub struct NullNavigator;

impl Navigator for NullNavigator {
    fn navigate(&self, _route: Route) {}
}

impl Navigator for mpsc::UnboundedSender<Route> {
    fn navigate(&self, route: Route) {
        let _ = self.send(route);
    }
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: watch::Sender<AuthState>,
    store: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    interceptor: AuthInterceptor,
}

pub struct SessionManagerBuilder {
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn HttpTransport>,
    navigator: Arc<dyn Navigator>,
    refresh_mode: RefreshMode,
}

impl SessionManagerBuilder {
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn refresh_mode(mut self, mode: RefreshMode) -> Self {
        self.refresh_mode = mode;
        self
    }

    /// Restore persisted state and build the manager.
    pub fn build(self) -> SessionManager {
        let restored = restore(self.store.as_ref());
        let (state, _) = watch::channel(restored);
        SessionManager {
            inner: Arc::new(SessionInner {
                state,
                store: self.store,
                navigator: self.navigator,
                interceptor: AuthInterceptor::new(self.transport, self.refresh_mode),
            }),
        }
    }
}

impl SessionManager {
    pub fn builder(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            store,
            transport,
            navigator: Arc::new(NullNavigator),
            refresh_mode: RefreshMode::default(),
        }
    }

    // -- State --

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Observe every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.borrow().token.clone()
    }

    pub fn has_token(&self) -> bool {
        self.inner
            .state
            .borrow()
            .token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.state.borrow().user.as_ref().map(|u| u.id.clone())
    }

    pub fn username(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .user
            .as_ref()
            .map(|u| u.username.clone())
    }

    /// "First Last" when both are known, else whichever is, else the username.
    pub fn full_name(&self) -> Option<String> {
        let state = self.inner.state.borrow();
        let user = state.user.as_ref()?;
        let name = match (user.first_name.as_deref(), user.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.to_string(),
            (None, Some(last)) => last.to_string(),
            (None, None) => user.username.clone(),
        };
        Some(name)
    }

    // -- Mutations --

    pub fn login(&self, user: User, token: Option<String>) {
        info!("{} ({}) signed in", user.username, user.id);
        self.inner.state.send_modify(|state| {
            *state = AuthState::signed_in(user, token);
            self.persist(state);
        });
    }

    /// Safe to call when already signed out.
    pub fn logout(&self) {
        self.inner.state.send_modify(|state| {
            if state.is_authenticated {
                info!("Signed out");
            }
            *state = AuthState::signed_out();
            if let Err(e) = self.inner.store.remove(AUTH_STATE_KEY) {
                warn!("Failed to clear persisted session: {}", e);
            }
        });
        self.inner.navigator.navigate(Route::SignIn);
    }

    /// No-op when nobody is signed in.
    pub fn update_user(&self, patch: UserPatch) {
        self.inner.state.send_if_modified(|state| {
            let Some(user) = state.user.as_mut() else {
                return false;
            };
            user.apply(patch);
            self.persist(state);
            true
        });
    }

    pub fn update_token(&self, token: Option<String>) {
        self.inner.state.send_modify(|state| {
            state.token = token;
            self.persist(state);
        });
    }

    fn persist(&self, state: &AuthState) {
        let result = serde_json::to_string(state)
            .map_err(ClientError::from)
            .and_then(|json| self.inner.store.set(AUTH_STATE_KEY, &json));
        if let Err(e) = result {
            warn!("Failed to persist session: {}", e);
        }
    }

    // -- Remote --

    /// Run a request through the auth interceptor.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.inner.interceptor.execute(self, &request).await
    }

    /// Authenticate; the credential itself comes back as a cookie.
    pub async fn login_api(&self, form: &LoginRequest) -> Result<UserResponse> {
        let response = self
            .request(ApiRequest::post(LOGIN_PATH).json(form)?)
            .await?;
        let body: UserResponse = response.json()?;
        self.login(body.clone().into_user(), None);
        Ok(body)
    }

    /// Create an account and sign straight into it.
    pub async fn register_api(&self, form: &RegisterRequest) -> Result<UserResponse> {
        let response = self
            .request(ApiRequest::post(REGISTER_PATH).json(form)?)
            .await?;
        let body: UserResponse = response.json()?;
        self.login(body.clone().into_user(), None);
        Ok(body)
    }

    /// Local state is signed out whatever the server says.
    pub async fn logout_api(&self) -> Result<()> {
        let outcome = self
            .request(ApiRequest::post(LOGOUT_PATH).with_empty_body())
            .await;
        self.logout();
        outcome.map(|_| ())
    }

    pub async fn refresh_token_api(&self) -> Result<()> {
        let outcome = self
            .request(ApiRequest::post(REFRESH_TOKEN_PATH).with_empty_body())
            .await;
        match outcome {
            Ok(_) => {
                info!("Session refreshed");
                Ok(())
            }
            Err(e) => {
                warn!("Session refresh failed: {}", e);
                self.logout();
                Err(e)
            }
        }
    }

    /// Like [`refresh_token_api`](Self::refresh_token_api), but concurrent
    /// callers share one in-flight call.
    pub async fn refresh_token_shared(&self) -> Result<()> {
        self.inner.interceptor.refresh_shared(self).await
    }
}

fn restore(store: &dyn KeyValueStore) -> AuthState {
    let raw = match store.get(AUTH_STATE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return AuthState::signed_out(),
        Err(e) => {
            warn!("Failed to read persisted session: {}", e);
            return AuthState::signed_out();
        }
    };

    match serde_json::from_str::<AuthState>(&raw) {
        Ok(state) if state.is_authenticated && state.is_consistent() => {
            info!("Restored persisted session");
            state
        }
        Ok(state) if state.is_authenticated => {
            warn!("Persisted session claims sign-in without a user, discarding");
            clear_corrupt(store);
            AuthState::signed_out()
        }
        Ok(_) => AuthState::signed_out(),
        Err(e) => {
            warn!("Persisted session is corrupt, discarding: {}", e);
            clear_corrupt(store);
            AuthState::signed_out()
        }
    }
}

fn clear_corrupt(store: &dyn KeyValueStore) {
    if let Err(e) = store.remove(AUTH_STATE_KEY) {
        warn!("Failed to clear corrupt session: {}", e);
    }
}
