pub mod appresult;
pub mod auth;
pub mod cars;
pub mod chat;
pub mod index;
pub mod plate;
pub mod profile;
pub mod res;
pub mod search;
pub mod session;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

pub use appresult::{AppError, AppResult};

use cars::imagekit::ImageKit;
use chat::RoomBroadcast;
use chat::store::MessageStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub imagekit: ImageKit,
    pub messages: Arc<dyn MessageStore>,
    pub tx: broadcast::Sender<RoomBroadcast>,
}
