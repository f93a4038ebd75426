//! Interactive room session: history, live messages, and stdin as input.

use anyhow::{Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use parlor_client::{ChatClient, GuardDecision, RoomHistory, Route, auth_guard};
use parlor_types::ConnectionState;

use crate::context::Context;
use crate::output::{format_message, print_success, print_warning};

enum Input<'a> {
    Quit,
    More,
    Say(&'a str),
    Nothing,
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "/quit" => Input::Quit,
        "/more" => Input::More,
        "" => Input::Nothing,
        text => Input::Say(text),
    }
}

pub async fn run(context: &Context, room_id: &str) -> Result<()> {
    let requested = format!("{}/{}", Route::Chat.path(), room_id);
    if let GuardDecision::Redirect { to, .. } = auth_guard(&context.session.state(), &requested) {
        bail!(
            "Not signed in (sent to {}); run `parlor login <user_id>` first",
            to.path()
        );
    }

    let chat = ChatClient::new(&context.config, context.session.clone())?;
    let mut history = RoomHistory::for_room(room_id);
    let mut pages = chat.subscribe_history();
    let mut live = chat.subscribe_room(room_id);
    let mut connection = chat.subscribe_state();
    let mut auth = context.session.subscribe();

    // Queued until the socket opens, then sent in this order.
    chat.join_room(room_id);
    chat.mark_room_read(room_id);
    chat.fetch_history(room_id, None);
    chat.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        tokio::select! {
            page = pages.recv() => match page {
                Ok(page) => {
                    let before = history.len();
                    if history.apply_page(&page) > 0 {
                        for message in &history.messages()[before..] {
                            println!("{}", format_message(message));
                        }
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Skipped {} history pages", n),
                Err(RecvError::Closed) => break Ok(()),
            },
            message = live.recv() => match message {
                Some(message) => {
                    if history.apply_live(&message) {
                        println!("{}", format_message(&message));
                    }
                }
                None => break Ok(()),
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_input(&line) {
                    Input::Quit => break Ok(()),
                    Input::More => chat.fetch_history(room_id, history.oldest_created_at()),
                    Input::Say(text) => chat.send_message(room_id, text),
                    Input::Nothing => {}
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            },
            changed = connection.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *connection.borrow_and_update();
                match state {
                    ConnectionState::Open => print_success(&format!(
                        "Joined {} (/more for older messages, /quit to leave)",
                        room_id
                    )),
                    ConnectionState::Closed => break Err(anyhow::anyhow!("Connection to chat server lost")),
                    ConnectionState::Connecting => {}
                }
            },
            changed = auth.changed() => {
                if changed.is_err() || !context.session.is_authenticated() {
                    print_warning("Session ended");
                    break Ok(());
                }
            },
        }
    };

    chat.leave_room(room_id);
    chat.shutdown().await;
    outcome
}
