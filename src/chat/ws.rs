use std::{collections::HashMap, sync::Arc};

use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_sessions::Session;

use crate::{
    AppResult,
    chat::{
        RoomBroadcast,
        store::{ChatMessage, MessageStore},
    },
    session::USER_ID,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room_id: String,
        sender_id: String,
        sender_name: String,
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ServerEvent {
    Message {
        text: String,
        sender: String,
        time: String,
    },
}

impl ServerEvent {
    fn from_message(message: &ChatMessage) -> Self {
        Self::Message {
            text: message.text.clone(),
            sender: message.sender_name.clone(),
            time: message.sent_at.clone(),
        }
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    State(store): State<Arc<dyn MessageStore>>,
    State(tx): State<broadcast::Sender<RoomBroadcast>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    if session.get::<String>(USER_ID).await?.is_none() {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    }

    Ok(ws.on_upgrade(async move |stream| {
        let mut rx = tx.subscribe();
        let (mut sender, mut receiver) = stream.split();
        // joined room -> id of the last message its replay delivered; the
        // subscription predates every replay, so broadcasts buffered while a
        // history SELECT ran would otherwise be delivered twice
        let mut joined: HashMap<String, String> = HashMap::new();

        loop {
            tokio::select! {
                incoming = receiver.next() => {
                    let Some(Ok(msg)) = incoming else {
                        break;
                    };
                    let Ok(event) = serde_json::from_slice::<ClientEvent>(&msg.into_data()) else {
                        continue;
                    };

                    match event {
                        ClientEvent::JoinRoom { room_id } => {
                            // replay once, oldest first, then start forwarding
                            // anything newer than the replay's last message
                            let mut cutoff = String::new();
                            match store.history(&room_id).await {
                                Ok(history) => {
                                    for message in &history {
                                        let Ok(payload) =
                                            serde_json::to_string(&ServerEvent::from_message(message))
                                        else {
                                            continue;
                                        };
                                        if sender.send(payload.into()).await.is_err() {
                                            return;
                                        }
                                    }
                                    if let Some(last) = history.last() {
                                        cutoff = last.id.clone();
                                    }
                                }
                                Err(err) => {
                                    tracing::error!("history replay failed for {room_id}: {err:#}");
                                }
                            }
                            joined.insert(room_id, cutoff);
                        }
                        ClientEvent::ChatMessage { room_id, sender_id, sender_name, text } => {
                            if let Err(err) =
                                send_message(store.as_ref(), &tx, &room_id, &sender_id, &sender_name, &text).await
                            {
                                tracing::error!("chat message dropped in {room_id}: {err:#}");
                            }
                        }
                    }
                }
                outgoing = rx.recv() => {
                    match outgoing {
                        Ok(broadcast) if should_forward(&joined, &broadcast) => {
                            if sender.send(broadcast.payload.into()).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(count)) => {
                            tracing::warn!("chat socket lagged, {count} broadcasts skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }))
}

/// A broadcast reaches the client iff its room was joined and its id is
/// newer than the join's replay cutoff. v7 ids sort chronologically, so a
/// plain string comparison is enough.
fn should_forward(joined: &HashMap<String, String>, broadcast: &RoomBroadcast) -> bool {
    joined
        .get(&broadcast.room_id)
        .is_some_and(|cutoff| broadcast.id.as_str() > cutoff.as_str())
}

/// Appends and then broadcasts one message. Whitespace-only text is dropped
/// silently; a failed append drops the message entirely so a broadcast can
/// never precede its history entry.
pub(crate) async fn send_message(
    store: &dyn MessageStore,
    tx: &broadcast::Sender<RoomBroadcast>,

    room_id: &str,
    sender_id: &str,
    sender_name: &str,
    text: &str,
) -> anyhow::Result<Option<ChatMessage>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let message = ChatMessage::new(room_id, sender_id, sender_name, text);
    store.append(&message).await?;

    let payload = serde_json::to_string(&ServerEvent::from_message(&message))?;
    // no receivers is fine, the room may be idle
    let _ = tx.send(RoomBroadcast {
        id: message.id.clone(),
        room_id: room_id.to_owned(),
        payload,
    });

    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{room_id, store::MemoryMessageStore};

    #[tokio::test]
    async fn send_appends_then_broadcasts() {
        let store = MemoryMessageStore::default();
        let (tx, mut rx) = broadcast::channel(8);
        let room = room_id("u1", "u2");

        let sent = send_message(&store, &tx, &room, "u1", "Alice", "hello")
            .await
            .unwrap()
            .expect("message should be accepted");
        assert_eq!(sent.text, "hello");

        let history = store.history(&room).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "hello");

        let broadcast = rx.recv().await.unwrap();
        assert_eq!(broadcast.room_id, room);
        let event: serde_json::Value = serde_json::from_str(&broadcast.payload).unwrap();
        assert_eq!(event["type"], "message");
        assert_eq!(event["text"], "hello");
        assert_eq!(event["sender"], "Alice");
        assert!(event["time"].is_string());
    }

    #[tokio::test]
    async fn whitespace_only_text_is_a_silent_no_op() {
        let store = MemoryMessageStore::default();
        let (tx, mut rx) = broadcast::channel(8);

        let sent = send_message(&store, &tx, "room1", "u1", "Alice", "   ")
            .await
            .unwrap();
        assert!(sent.is_none());
        assert!(store.history("room1").await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcasts_are_filtered_by_joined_room() {
        let store = MemoryMessageStore::default();
        let (tx, mut rx) = broadcast::channel(8);

        send_message(&store, &tx, "room1", "u1", "Alice", "hello")
            .await
            .unwrap();

        // a connection joined to a different room filters this out
        let joined = HashMap::from([("room2".to_owned(), String::new())]);
        let broadcast = rx.recv().await.unwrap();
        assert!(!should_forward(&joined, &broadcast));

        let joined = HashMap::from([("room1".to_owned(), String::new())]);
        assert!(should_forward(&joined, &broadcast));
    }

    #[tokio::test]
    async fn replayed_messages_are_not_forwarded_a_second_time() {
        let store = MemoryMessageStore::default();
        let (tx, mut rx) = broadcast::channel(8);

        // lands after this socket subscribed but before its replay ran
        send_message(&store, &tx, "room1", "u1", "Alice", "hello")
            .await
            .unwrap();

        // join: replay history, then record the cutoff
        let history = store.history("room1").await.unwrap();
        let mut delivered: Vec<String> = history.iter().map(|m| m.text.clone()).collect();
        let cutoff = history.last().map(|m| m.id.clone()).unwrap_or_default();
        let joined = HashMap::from([("room1".to_owned(), cutoff)]);

        // the buffered broadcast duplicates the replay and must be dropped
        while let Ok(broadcast) = rx.try_recv() {
            if should_forward(&joined, &broadcast) {
                let event: serde_json::Value = serde_json::from_str(&broadcast.payload).unwrap();
                delivered.push(event["text"].as_str().unwrap().to_owned());
            }
        }
        assert_eq!(delivered, ["hello"]);

        // a genuinely new message still goes through
        send_message(&store, &tx, "room1", "u1", "Alice", "again")
            .await
            .unwrap();
        let broadcast = rx.recv().await.unwrap();
        assert!(should_forward(&joined, &broadcast));
    }

    #[tokio::test]
    async fn send_order_matches_history_order() {
        let store = MemoryMessageStore::default();
        let (tx, _rx) = broadcast::channel(8);

        for text in ["one", "two", "three"] {
            send_message(&store, &tx, "room1", "u1", "Alice", text)
                .await
                .unwrap();
        }

        let texts: Vec<_> = store
            .history("room1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }
}
