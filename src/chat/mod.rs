mod page;
pub mod store;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

/// The shared room behind `GET /chat`.
pub const LOBBY: &str = "lobby";

/// Not a valid character in a user id, so derived ids can never collide with
/// a participant's own id.
const ROOM_SEPARATOR: char = '_';

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", get(page::lobby))
        .route("/chat/ws", get(ws::chat_ws))
        .route("/chat/{peer_id}", get(page::with_peer))
}

/// Derives the conversation id for an unordered pair of participants: the
/// pair is sorted lexicographically and joined, so both sides always land in
/// the same room and restarts change nothing.
pub fn room_id(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}{ROOM_SEPARATOR}{second}")
}

/// A message already appended to a room, fanned out over the process-wide
/// broadcast channel; each socket forwards only the rooms it has joined.
/// `id` is the appended message's v7 id, so receivers can discard anything
/// their history replay already covered.
#[derive(Debug, Clone)]
pub struct RoomBroadcast {
    pub id: String,
    pub room_id: String,
    pub payload: String,
}
