use serde::{Deserialize, Serialize};

use crate::models::WsMessage;

/// Actions sent FROM client TO server over the realtime socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ClientAction {
    JoinRoom {
        chatroom_id: String,
    },

    LeaveRoom {
        chatroom_id: String,
    },

    SendMessage {
        chatroom_id: String,
        content: String,
    },

    /// Request one history page, newest first. `before_created_at` is the
    /// cursor of the oldest message already held.
    #[serde(rename = "get_message")]
    GetMessages {
        chatroom_id: String,
        limit: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before_created_at: Option<String>,
    },

    MarkRoomRead {
        chatroom_id: String,
    },

    Disconnect,
}

impl ClientAction {
    /// Wire name of the action.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::SendMessage { .. } => "send_message",
            Self::GetMessages { .. } => "get_message",
            Self::MarkRoomRead { .. } => "mark_room_read",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Events sent FROM server TO client over the realtime socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A message was posted to a room.
    NewMessage(WsMessage),

    /// A history page answering `get_message`.
    MessageList(MessageList),

    /// Any event type this client does not handle.
    #[serde(other)]
    Other,
}

impl ServerEvent {
    /// Room the event is scoped to, if the server said.
    pub fn chatroom_id(&self) -> Option<&str> {
        match self {
            Self::NewMessage(message) => message.chatroom_id.as_deref(),
            Self::MessageList(list) => Some(&list.chatroom_id),
            Self::Other => None,
        }
    }
}

/// One history page. Messages arrive newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageList {
    pub chatroom_id: String,
    #[serde(default)]
    pub messages: Vec<WsMessage>,
}
