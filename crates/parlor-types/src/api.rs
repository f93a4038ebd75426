use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{Room, User};

// -- Endpoints --

pub const LOGIN_PATH: &str = "/api/user/login";
pub const REGISTER_PATH: &str = "/api/user/register";
pub const LOGOUT_PATH: &str = "/api/user/logout";
pub const REFRESH_TOKEN_PATH: &str = "/api/user/refresh-token";
pub const CREATE_ROOM_PATH: &str = "/api/message/create_room";
pub const GET_ROOMS_PATH: &str = "/api/message/get_rooms";
pub const ONLINE_PATH: &str = "/api/message/online";

// -- User --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub username: String,
    pub password: String,
}

/// Body returned by both login and register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub user_id: String,
    pub username: String,
}

impl UserResponse {
    /// The account id the user signs in with doubles as the email field.
    pub fn into_user(self) -> User {
        User::new(self.id, self.username, self.user_id)
    }
}

// -- Rooms --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
}

/// `{"room_ids": {"<id>": "<name>", ...}}`. Numeric ids come first in
/// ascending order, any other ids after them in server order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomsResponse {
    #[serde(default, deserialize_with = "rooms_in_order")]
    pub room_ids: Vec<Room>,
}

fn rooms_in_order<'de, D>(deserializer: D) -> Result<Vec<Room>, D::Error>
where
    D: Deserializer<'de>,
{
    struct RoomMapVisitor;

    impl<'de> Visitor<'de> for RoomMapVisitor {
        type Value = Vec<Room>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of room id to room name, or null")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_map(self)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut rooms: Vec<Room> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((id, name)) = map.next_entry::<String, String>()? {
                // A repeated key keeps its first position and takes the last name.
                match rooms.iter_mut().find(|room| room.id == id) {
                    Some(room) => room.name = name,
                    None => rooms.push(Room { id, name }),
                }
            }
            // Stable, so non-index keys keep the order they arrived in.
            rooms.sort_by_key(|room| match array_index(&room.id) {
                Some(index) => (0, index),
                None => (1, 0),
            });
            Ok(rooms)
        }
    }

    deserializer.deserialize_option(RoomMapVisitor)
}

/// Keys that read as canonical array indices (`"0"`, `"12"`, not `"012"` or
/// `"-1"`) list first, ascending; the rest follow in insertion order. This
/// is how a JavaScript object enumerates its entries, and the room list is
/// shown in that order.
fn array_index(key: &str) -> Option<u32> {
    let index: u32 = key.parse().ok()?;
    (index != u32::MAX && index.to_string() == key).then_some(index)
}
