//! What a room view holds: the selected room and its de-duplicated messages.
//!
//! History pages and live pushes can race and overlap, so every message id
//! is admitted at most once. Each page comes newest first and is reversed
//! before it is appended, so every page reads oldest first on its own.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use parlor_types::{MessageList, WsMessage};

use crate::timestamp::parse_timestamp;

#[derive(Debug, Default)]
pub struct RoomHistory {
    room_id: Option<String>,
    messages: Vec<WsMessage>,
    seen: HashSet<String>,
}

impl RoomHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_room(room_id: impl Into<String>) -> Self {
        let mut history = Self::new();
        history.select_room(room_id);
        history
    }

    /// Switch rooms, dropping everything held for the previous one.
    pub fn select_room(&mut self, room_id: impl Into<String>) {
        self.room_id = Some(room_id.into());
        self.messages.clear();
        self.seen.clear();
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn messages(&self) -> &[WsMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    /// Merge a history page. Returns how many messages were appended.
    pub fn apply_page(&mut self, page: &MessageList) -> usize {
        if self.room_id.as_deref() != Some(page.chatroom_id.as_str()) {
            debug!("Dropping history page for unselected room {}", page.chatroom_id);
            return 0;
        }

        let fresh: Vec<WsMessage> = page
            .messages
            .iter()
            .filter(|m| !self.seen.contains(&m.id))
            .rev()
            .cloned()
            .collect();

        let mut added = 0;
        for message in fresh {
            if self.seen.insert(message.id.clone()) {
                self.messages.push(message);
                added += 1;
            }
        }
        added
    }

    /// Append a live push if it belongs to the selected room and is new.
    pub fn apply_live(&mut self, message: &WsMessage) -> bool {
        if message.chatroom_id.is_none() || message.chatroom_id != self.room_id {
            return false;
        }
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message.clone());
        true
    }

    /// Cursor for fetching the next older page. Older pages land at the
    /// tail, so this is the earliest timestamp held, not the first message.
    pub fn oldest_created_at(&self) -> Option<&str> {
        self.messages
            .iter()
            .map(|m| m.created_at.as_str())
            .min_by(|a, b| compare_timestamps(a, b))
    }
}

fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Messages for many rooms at once, keyed by room id.
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: HashMap<String, Vec<WsMessage>>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// File a message under its room. Messages without a room, or already
    /// filed, are ignored.
    pub fn add(&mut self, message: WsMessage) -> bool {
        let Some(room_id) = message.chatroom_id.clone() else {
            return false;
        };
        let held = self.rooms.entry(room_id).or_default();
        if held.iter().any(|m| m.id == message.id) {
            return false;
        }
        held.push(message);
        true
    }

    pub fn messages(&self, room_id: &str) -> &[WsMessage] {
        self.rooms.get(room_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }
}
