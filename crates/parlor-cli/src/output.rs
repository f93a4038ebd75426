//! Terminal formatting for command results and chat lines.

use chrono::Local;

use parlor_client::timestamp::parse_timestamp;
use parlor_types::WsMessage;

pub fn print_success(msg: &str) {
    println!("✓ {}", msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("⚠ {}", msg);
}

pub fn print_kv(key: &str, value: &str) {
    println!("  {:<12} {}", format!("{}:", key), value);
}

/// `[HH:MM] author: content`, in local time. Unparseable timestamps are
/// shown as received.
pub fn format_message(message: &WsMessage) -> String {
    let at = match parse_timestamp(&message.created_at) {
        Ok(at) => at.with_timezone(&Local).format("%H:%M").to_string(),
        Err(_) => message.created_at.clone(),
    };
    format!("[{}] {}: {}", at, message.author_label(), message.content)
}
