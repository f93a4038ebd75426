//! Client-side core of Parlor: session handling, authenticated HTTP with
//! token refresh, and the realtime messaging socket.

pub mod config;
pub mod error;
pub mod guard;
pub mod history;
pub mod interceptor;
pub mod messaging;
pub mod session;
pub mod storage;
pub mod timestamp;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, RefreshMode};
pub use error::{ClientError, Result};
pub use guard::{GuardDecision, Route, auth_guard, guest_guard};
pub use history::{RoomHistory, RoomStore};
pub use messaging::{ChatClient, RoomFeed};
pub use session::{AUTH_STATE_KEY, Navigator, NullNavigator, SessionManager};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
