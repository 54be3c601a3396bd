use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, chat, include_res, res, session::USER_ID};

#[debug_handler]
pub(crate) async fn lobby(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<String>(USER_ID).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    render_chat(&db_pool, &user_id, chat::LOBBY, "Lobby").await
}

#[debug_handler]
pub(crate) async fn with_peer(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(peer_id): Path<Uuid>,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<String>(USER_ID).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let Some((peer_name,)): Option<(String,)> =
        sqlx::query_as("SELECT full_name FROM users WHERE id=?")
            .bind(peer_id.to_string())
            .fetch_optional(&db_pool)
            .await?
    else {
        return res::sorry("user");
    };

    let room_id = chat::room_id(&user_id, &peer_id.to_string());
    render_chat(&db_pool, &user_id, &room_id, &peer_name).await
}

async fn render_chat(
    db_pool: &SqlitePool,
    user_id: &str,
    room_id: &str,
    title: &str,
) -> AppResult<Response> {
    let (user_name,): (String,) = sqlx::query_as("SELECT full_name FROM users WHERE id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .unwrap_or(("Anonymous".to_owned(),));

    Ok(Html(
        include_res!(str, "/pages/chat.html")
            .replace("{room_id}", room_id)
            .replace("{user_id}", user_id)
            .replace("{user_name}", &html_escape::encode_safe(&user_name))
            .replace("{room_title}", &html_escape::encode_safe(title)),
    )
    .into_response())
}
