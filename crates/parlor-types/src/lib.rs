//! Wire and domain types shared by the Parlor client crates.
//!
//! Field names follow the backend's JSON exactly; nothing here performs I/O.

pub mod api;
pub mod events;
pub mod models;

pub use events::{ClientAction, MessageList, ServerEvent};
pub use models::{AuthState, ConnectionState, Room, User, UserPatch, WsMessage};
