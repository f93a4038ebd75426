use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The signed-in account as the client knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            avatar: None,
            created_at: None,
        }
    }

    /// Merge every field present in `patch` into this user.
    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(id) = patch.id {
            self.id = id;
        }
        if let Some(username) = patch.username {
            self.username = username;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
        if patch.first_name.is_some() {
            self.first_name = patch.first_name;
        }
        if patch.last_name.is_some() {
            self.last_name = patch.last_name;
        }
        if patch.avatar.is_some() {
            self.avatar = patch.avatar;
        }
        if patch.created_at.is_some() {
            self.created_at = patch.created_at;
        }
    }
}

/// Partial update for [`User`]. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Client-held session record, persisted under the `authState` key.
///
/// `is_authenticated` is true exactly when `user` is present. Use
/// [`AuthState::signed_in`] and [`AuthState::signed_out`] to build values
/// that hold that invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub token: Option<String>,
}

impl AuthState {
    pub fn signed_in(user: User, token: Option<String>) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
            token,
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Whether the flag and the user agree.
    pub fn is_consistent(&self) -> bool {
        self.is_authenticated == self.user.is_some()
    }
}

/// A chat room as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
}

/// A chat message as carried over the realtime channel.
///
/// `id` is unique; `created_at` is server-assigned and orders messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsMessage {
    pub id: String,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    pub content: String,
    pub created_at: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chatroom_id: Option<String>,
}

impl WsMessage {
    /// Display name of the author, falling back to the author id.
    pub fn author_label(&self) -> &str {
        self.author_name.as_deref().unwrap_or(&self.author_id)
    }
}

/// Realtime socket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
}
