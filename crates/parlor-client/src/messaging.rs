//! Realtime Messaging Client.
//!
//! One socket per client. Actions issued while the socket is not open wait
//! in a FIFO queue and are flushed, in order, the moment it opens. Inbound
//! events fan out to any number of read-only subscribers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};
use url::Url;

use parlor_types::api::{CREATE_ROOM_PATH, CreateRoomRequest, CreateRoomResponse, GET_ROOMS_PATH, RoomsResponse};
use parlor_types::{ClientAction, ConnectionState, MessageList, Room, ServerEvent, WsMessage};

use crate::config::{ClientConfig, socket_url};
use crate::error::Result;
use crate::session::SessionManager;
use crate::transport::ApiRequest;

const EVENT_BUFFER: usize = 256;
const DEFAULT_PAGE_SIZE: u32 = 50;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ChatInner>,
}

struct ChatInner {
    socket_url: Url,
    session: SessionManager,
    history_page_size: u32,
    /// Only written while `link` is locked.
    state: watch::Sender<ConnectionState>,
    link: Mutex<Link>,
    new_messages: broadcast::Sender<WsMessage>,
    history: broadcast::Sender<MessageList>,
}

#[derive(Default)]
struct Link {
    /// Bumped on every connect and disconnect; events from older sockets are ignored.
    generation: u64,
    /// Feeds the writer task while the socket is open.
    outbound: Option<mpsc::UnboundedSender<ClientAction>>,
    pending: VecDeque<ClientAction>,
    task: Option<JoinHandle<()>>,
}

impl ChatClient {
    pub fn new(config: &ClientConfig, session: SessionManager) -> Result<Self> {
        Ok(Self::build(config.socket_url()?, session, config.history_page_size))
    }

    /// Build against an explicit origin, deriving the socket endpoint from it.
    pub fn for_origin(origin: &Url, session: SessionManager) -> Result<Self> {
        Ok(Self::build(socket_url(origin)?, session, DEFAULT_PAGE_SIZE))
    }

    pub fn with_socket_url(url: Url, session: SessionManager) -> Self {
        Self::build(url, session, DEFAULT_PAGE_SIZE)
    }

    fn build(url: Url, session: SessionManager, history_page_size: u32) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        let (new_messages, _) = broadcast::channel(EVENT_BUFFER);
        let (history, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(ChatInner {
                socket_url: url,
                session,
                history_page_size,
                state,
                link: Mutex::new(Link::default()),
                new_messages,
                history,
            }),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    // -- Connection --

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Open the socket unless one already exists. Must be called from
    /// within a Tokio runtime.
    pub fn connect(&self) {
        let generation = {
            let mut link = self.inner.lock_link();
            if *self.inner.state.borrow() != ConnectionState::Closed {
                return;
            }
            link.generation += 1;
            self.inner.state.send_replace(ConnectionState::Connecting);
            link.generation
        };

        info!("Connecting to {}", self.inner.socket_url);
        let task = tokio::spawn(self.inner.clone().run_socket(generation));
        self.inner.adopt_task(generation, task);
    }

    /// Say goodbye if open, then close without waiting for the server.
    pub fn disconnect(&self) {
        let mut link = self.inner.lock_link();
        if *self.inner.state.borrow() == ConnectionState::Closed {
            return;
        }

        // Dropping the sender lets the writer flush the goodbye and close.
        if let Some(outbound) = link.outbound.take() {
            let _ = outbound.send(ClientAction::Disconnect);
        }
        link.generation += 1;
        self.inner.state.send_replace(ConnectionState::Closed);
        info!("Disconnected, {} actions pending", link.pending.len());
    }

    /// [`disconnect`](Self::disconnect), then give the writer a moment to
    /// put the goodbye, and anything sent just before it, on the wire.
    pub async fn shutdown(&self) {
        self.disconnect();
        let task = self.inner.lock_link().task.take();
        if let Some(task) = task {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                debug!("Socket task still running after {:?}", SHUTDOWN_GRACE);
            }
        }
    }

    /// Actions waiting for the socket to open.
    pub fn pending_actions(&self) -> usize {
        self.inner.lock_link().pending.len()
    }

    // -- Actions --

    pub fn join_room(&self, room_id: &str) {
        self.send(ClientAction::JoinRoom {
            chatroom_id: room_id.to_string(),
        });
    }

    pub fn leave_room(&self, room_id: &str) {
        self.send(ClientAction::LeaveRoom {
            chatroom_id: room_id.to_string(),
        });
    }

    pub fn send_message(&self, room_id: &str, content: &str) {
        self.send(ClientAction::SendMessage {
            chatroom_id: room_id.to_string(),
            content: content.to_string(),
        });
    }

    /// Ask for up to `limit` messages older than `before` (newest first).
    pub fn get_messages(&self, room_id: &str, limit: u32, before: Option<&str>) {
        self.send(ClientAction::GetMessages {
            chatroom_id: room_id.to_string(),
            limit,
            before_created_at: before.map(str::to_string),
        });
    }

    /// [`get_messages`](Self::get_messages) with the configured page size.
    pub fn fetch_history(&self, room_id: &str, before: Option<&str>) {
        self.get_messages(room_id, self.inner.history_page_size, before);
    }

    pub fn mark_room_read(&self, room_id: &str) {
        self.send(ClientAction::MarkRoomRead {
            chatroom_id: room_id.to_string(),
        });
    }

    fn send(&self, action: ClientAction) {
        let mut link = self.inner.lock_link();
        let action = match link.outbound.as_ref() {
            Some(outbound) => match outbound.send(action) {
                Ok(()) => return,
                Err(mpsc::error::SendError(action)) => action,
            },
            None => action,
        };
        debug!("Queueing {} until the socket opens", action.kind());
        link.pending.push_back(action);
    }

    // -- Events --

    /// Every live message, whatever its room.
    pub fn subscribe_new_messages(&self) -> broadcast::Receiver<WsMessage> {
        self.inner.new_messages.subscribe()
    }

    /// Live messages for one room only.
    pub fn subscribe_room(&self, room_id: &str) -> RoomFeed {
        RoomFeed {
            room_id: room_id.to_string(),
            rx: self.inner.new_messages.subscribe(),
        }
    }

    /// History pages, for every room that was asked about.
    pub fn subscribe_history(&self) -> broadcast::Receiver<MessageList> {
        self.inner.history.subscribe()
    }

    // -- Rooms (HTTP) --

    pub async fn create_room(&self, name: Option<&str>) -> Result<Room> {
        let body = CreateRoomRequest {
            room_name: name.map(str::to_string),
        };
        let response = self
            .inner
            .session
            .request(ApiRequest::post(CREATE_ROOM_PATH).json(&body)?)
            .await
            .inspect_err(|e| warn!("Error creating room: {}", e))?;

        let created: CreateRoomResponse = response.json()?;
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("room_{}", created.room_id),
        };
        info!("Created room {} ({})", name, created.room_id);
        Ok(Room {
            id: created.room_id,
            name,
        })
    }

    /// Rooms, numeric ids ascending. Failures are logged and read as "no rooms".
    pub async fn get_rooms(&self) -> Vec<Room> {
        let fetched = async {
            let response = self
                .inner
                .session
                .request(ApiRequest::get(GET_ROOMS_PATH))
                .await?;
            response.json::<RoomsResponse>()
        };
        match fetched.await {
            Ok(rooms) => rooms.room_ids,
            Err(e) => {
                warn!("Error getting rooms: {}", e);
                Vec::new()
            }
        }
    }
}

impl ChatInner {
    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_socket(self: Arc<Self>, generation: u64) {
        let stream = match connect_async(self.socket_url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("Socket connect to {} failed: {}", self.socket_url, e);
                self.closed(generation, Vec::new());
                return;
            }
        };
        let (mut sink, mut source) = stream.split();
        let (outbound, mut rx) = mpsc::unbounded_channel();

        if !self.publish_open(generation, outbound) {
            debug!("Socket opened after disconnect, closing it");
            let _ = sink.close().await;
            return;
        }
        info!("Socket open at {}", self.socket_url);

        // Holds the action being written, so a failed or interrupted write
        // returns it to the queue. An interrupted write may be sent twice.
        let mut in_flight = None;
        let writer = write_actions(&mut sink, &mut rx, &mut in_flight);

        let reader = async {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => self.handle_frame(text.as_str()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Socket read failed: {}", e);
                        break;
                    }
                }
            }
        };

        tokio::select! {
            _ = writer => {}
            _ = reader => {}
        }

        let mut unsent: Vec<ClientAction> = in_flight.into_iter().collect();
        rx.close();
        while let Ok(action) = rx.try_recv() {
            unsent.push(action);
        }
        self.closed(generation, unsent);
    }

    /// Keep the handle of the socket task for `generation`, unless a newer
    /// connect or a disconnect has already moved past it.
    fn adopt_task(&self, generation: u64, task: JoinHandle<()>) {
        let mut link = self.lock_link();
        if link.generation == generation {
            link.task = Some(task);
        } else {
            debug!("Not keeping handle of superseded socket task");
        }
    }

    /// Flush the queue into the writer, then publish `Open`, under one lock.
    fn publish_open(&self, generation: u64, outbound: mpsc::UnboundedSender<ClientAction>) -> bool {
        let mut link = self.lock_link();
        if link.generation != generation {
            return false;
        }
        for action in link.pending.drain(..) {
            let _ = outbound.send(action);
        }
        link.outbound = Some(outbound);
        self.state.send_replace(ConnectionState::Open);
        true
    }

    /// Socket gone. Anything that never reached the wire goes back to the
    /// head of the queue, ahead of whatever was queued meanwhile.
    fn closed(&self, generation: u64, unsent: Vec<ClientAction>) {
        let mut link = self.lock_link();
        if link.generation != generation {
            debug!("Ignoring close of a superseded socket");
            return;
        }
        link.outbound = None;
        for action in unsent.into_iter().rev() {
            link.pending.push_front(action);
        }
        self.state.send_replace(ConnectionState::Closed);
        info!("Socket closed, {} actions pending", link.pending.len());
    }

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(ServerEvent::NewMessage(message)) => {
                debug!("<- new_message {} in {:?}", message.id, message.chatroom_id);
                let _ = self.new_messages.send(message);
            }
            Ok(ServerEvent::MessageList(list)) => {
                debug!("<- message_list {} ({} messages)", list.chatroom_id, list.messages.len());
                let _ = self.history.send(list);
            }
            Ok(ServerEvent::Other) => {
                debug!("Ignoring unhandled event: {}", preview(text));
            }
            Err(e) => {
                warn!("Bad socket frame: {} -- raw: {}", e, preview(text));
            }
        }
    }
}

/// Write actions in channel order until the channel closes (then close the
/// sink) or a write fails. `in_flight` is `Some` while a write is pending and
/// stays `Some` if that write fails or this future is dropped mid-write.
async fn write_actions<S>(
    sink: &mut S,
    rx: &mut mpsc::UnboundedReceiver<ClientAction>,
    in_flight: &mut Option<ClientAction>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(action) = rx.recv().await {
        let text = match serde_json::to_string(&action) {
            Ok(text) => text,
            Err(e) => {
                warn!("Dropping unencodable {}: {}", action.kind(), e);
                continue;
            }
        };
        debug!("-> {}", action.kind());
        *in_flight = Some(action);
        if let Err(e) = sink.send(Message::text(text)).await {
            warn!("Socket write failed: {}", e);
            return;
        }
        *in_flight = None;
    }
    let _ = sink.close().await;
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Live messages filtered to a single room.
pub struct RoomFeed {
    room_id: String,
    rx: broadcast::Receiver<WsMessage>,
}

impl RoomFeed {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Next message for this room; `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<WsMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) if message.chatroom_id.as_deref() == Some(self.room_id.as_str()) => {
                    return Some(message);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Room feed {} lagged by {} messages", self.room_id, n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
