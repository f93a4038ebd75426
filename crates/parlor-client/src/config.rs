use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use parlor_types::api::ONLINE_PATH;

use crate::error::{ClientError, Result};

const DEFAULT_ORIGIN: &str = "http://localhost:8000";
const DEFAULT_STATE_DIR: &str = ".parlor";
const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

/// How 401 recoveries coordinate their token refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Every failing request refreshes on its own.
    PerRequest,
    /// Concurrent failures share a single in-flight refresh.
    #[default]
    Shared,
}

impl FromStr for RefreshMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "per-request" | "per_request" => Ok(Self::PerRequest),
            other => Err(ClientError::Config(format!("unknown refresh mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme and authority the backend is served from, e.g. `https://chat.example.com`.
    pub origin: Url,
    /// Directory backing the durable key-value store.
    pub state_dir: PathBuf,
    pub refresh_mode: RefreshMode,
    pub history_page_size: u32,
}

impl ClientConfig {
    pub fn new(origin: &str) -> Result<Self> {
        Ok(Self {
            origin: parse_origin(origin)?,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            refresh_mode: RefreshMode::default(),
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        })
    }

    /// Read `PARLOR_*` variables, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let origin = lookup("PARLOR_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.into());
        let mut config = Self::new(&origin)?;

        if let Some(dir) = lookup("PARLOR_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(mode) = lookup("PARLOR_REFRESH_MODE") {
            config.refresh_mode = mode.parse()?;
        }
        if let Some(size) = lookup("PARLOR_HISTORY_PAGE_SIZE") {
            config.history_page_size = size
                .trim()
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ClientError::Config(format!("invalid history page size '{}'", size)))?;
        }

        Ok(config)
    }

    pub fn with_origin(mut self, origin: &str) -> Result<Self> {
        self.origin = parse_origin(origin)?;
        Ok(self)
    }

    /// Realtime endpoint: `ws://` for `http://` origins, `wss://` for `https://`.
    pub fn socket_url(&self) -> Result<Url> {
        socket_url(&self.origin)
    }
}

pub(crate) fn parse_origin(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ClientError::Config(format!(
                "origin must be http or https, got '{}'",
                other
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(ClientError::Config(format!("origin '{}' has no host", raw)));
    }
    Ok(url)
}

pub(crate) fn socket_url(origin: &Url) -> Result<Url> {
    let scheme = if origin.scheme() == "https" { "wss" } else { "ws" };
    let mut url = origin.clone();
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Config(format!("cannot derive socket url from '{}'", origin)))?;
    url.set_path(ONLINE_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
