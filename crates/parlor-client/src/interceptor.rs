//! Bearer attachment and 401 recovery for every outbound HTTP call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use parlor_types::api::{LOGIN_PATH, REFRESH_TOKEN_PATH};

use crate::config::RefreshMode;
use crate::error::{ClientError, Result};
use crate::session::SessionManager;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

type SharedRefresh = Shared<BoxFuture<'static, Result<()>>>;

/// Request pipeline hook. Holds no session state of its own; it reads the
/// token from, and forces logout through, the [`SessionManager`] it is
/// handed on each call.
pub struct AuthInterceptor {
    transport: Arc<dyn HttpTransport>,
    mode: RefreshMode,
    inflight: Mutex<Option<SharedRefresh>>,
}

impl AuthInterceptor {
    pub fn new(transport: Arc<dyn HttpTransport>, mode: RefreshMode) -> Self {
        Self {
            transport,
            mode,
            inflight: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    /// Send `request`, recovering once from a 401 by refreshing the session.
    ///
    /// Boxed because the refresh call itself comes back through here.
    pub fn execute<'a>(
        &'a self,
        session: &'a SessionManager,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<ApiResponse>> {
        async move {
            let response = self.dispatch(session, request).await?;
            if response.status != StatusCode::UNAUTHORIZED {
                return response.into_result();
            }
            let unauthorized = ClientError::Status {
                status: response.status,
                body: response.body,
            };

            if request.targets(LOGIN_PATH) {
                debug!("Login rejected: bad credentials");
                return Err(unauthorized);
            }

            if request.targets(REFRESH_TOKEN_PATH) {
                warn!("Refresh token rejected, forcing logout");
                session.logout();
                return Err(unauthorized);
            }

            info!("{} {} returned 401, refreshing session", request.method, request.path);
            if let Err(e) = self.refresh(session).await {
                session.logout();
                return Err(e);
            }

            // Past a successful refresh, any failure of the retry ends the session.
            let retried = self
                .dispatch(session, request)
                .await
                .and_then(ApiResponse::into_result);
            if let Err(e) = &retried {
                warn!("{} failed after refresh ({}), forcing logout", request.path, e);
                session.logout();
            }
            retried
        }
        .boxed()
    }

    /// Refresh according to the configured mode.
    pub async fn refresh(&self, session: &SessionManager) -> Result<()> {
        match self.mode {
            RefreshMode::PerRequest => session.refresh_token_api().await,
            RefreshMode::Shared => self.refresh_shared(session).await,
        }
    }

    /// At most one refresh call in flight; every concurrent caller awaits
    /// the same call and sees the same outcome.
    pub async fn refresh_shared(&self, session: &SessionManager) -> Result<()> {
        let refresh = {
            let mut slot = self.lock_inflight();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    let owner = session.clone();
                    let started = async move { owner.refresh_token_api().await }
                        .boxed()
                        .shared();
                    *slot = Some(started.clone());
                    started
                }
            }
        };

        let outcome = refresh.clone().await;

        let mut slot = self.lock_inflight();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&refresh)) {
            *slot = None;
        }
        outcome
    }

    async fn dispatch(&self, session: &SessionManager, request: &ApiRequest) -> Result<ApiResponse> {
        let token = session.token();
        self.transport.send(request, token.as_deref()).await
    }

    fn lock_inflight(&self) -> MutexGuard<'_, Option<SharedRefresh>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
