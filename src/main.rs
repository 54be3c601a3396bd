use std::sync::Arc;

use axum::{Router, routing::get};
use carplate::{AppState, auth, cars, chat, index, profile, res, search};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(dotenv::var("DATABASE_URL")?.as_str())
        .await?;
    sqlx::migrate!().run(&db_pool).await?;

    let app_state = AppState {
        db_pool: db_pool.clone(),
        imagekit: cars::imagekit::ImageKit::from_env()?,
        messages: Arc::new(chat::store::SqliteMessageStore::new(db_pool)),
        tx: broadcast::channel(256).0,
    };

    let app = Router::new()
        .route("/", get(index::home))
        .route("/profile", get(profile::profile))
        .route("/js/plate.js", get(res::plate_js))
        .route("/style.css", get(res::style_css))
        .merge(auth::router())
        .merge(cars::router())
        .merge(chat::router())
        .merge(search::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(CorsLayer::permissive());

    let port = dotenv::var("PORT").unwrap_or_else(|_| "3000".to_owned());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("listening on http://localhost:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
