//! Per-invocation wiring: config, durable store, HTTP transport, session.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use parlor_client::{ClientConfig, FileStore, KeyValueStore, ReqwestTransport, SessionManager};

/// Server-issued cookies survive between invocations under this key.
pub const COOKIES_KEY: &str = "cookies";

pub struct Context {
    pub config: ClientConfig,
    pub session: SessionManager,
    store: Arc<FileStore>,
    transport: Arc<ReqwestTransport>,
}

impl Context {
    pub fn open(config: ClientConfig) -> Result<Self> {
        let store = Arc::new(FileStore::new(config.state_dir.clone()));
        let transport = Arc::new(ReqwestTransport::new(config.origin.clone())?);

        if let Some(cookies) = store.get(COOKIES_KEY)? {
            debug!("Restoring cookies from {}", store.dir().display());
            transport.import_cookies(&cookies);
        }

        let session = SessionManager::builder(store.clone(), transport.clone())
            .refresh_mode(config.refresh_mode)
            .build();

        Ok(Self {
            config,
            session,
            store,
            transport,
        })
    }

    /// Write the cookie jar back so the next invocation stays signed in.
    pub fn save_cookies(&self) -> Result<()> {
        match self.transport.export_cookies() {
            Some(cookies) => self.store.set(COOKIES_KEY, &cookies)?,
            None => self.store.remove(COOKIES_KEY)?,
        }
        Ok(())
    }
}
