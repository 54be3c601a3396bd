use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form, Router, debug_handler,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult, AppState, include_res,
    session::{IS_GUEST, USER_ID},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", get(register_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/guest-login", post(guest_login))
        .route("/logout", post(logout))
}

pub(crate) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("password hashing failed: {err}"))?;
    Ok(hash.to_string())
}

pub(crate) fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn register_form(error: &str) -> Response {
    Html(include_res!(str, "/pages/register.html").replace("{error}", error)).into_response()
}

fn login_form(error: &str) -> Response {
    Html(include_res!(str, "/pages/login.html").replace("{error}", error)).into_response()
}

#[debug_handler]
pub(crate) async fn register_page() -> impl IntoResponse {
    register_form("")
}

#[debug_handler]
pub(crate) async fn login_page() -> impl IntoResponse {
    login_form("")
}

#[derive(Deserialize)]
pub(crate) struct RegisterQuery {
    full_name: String,
    email: String,
    password: String,
    confirm_password: String,
}

#[debug_handler]
pub(crate) async fn register(
    State(db_pool): State<SqlitePool>,
    session: Session,

    Form(form): Form<RegisterQuery>,
) -> AppResult<Response> {
    if form.password != form.confirm_password {
        return Ok(register_form("Passwords do not match."));
    }
    if form.full_name.trim().is_empty() || form.email.trim().is_empty() {
        return Ok(register_form("Name and email are required."));
    }

    let id = Uuid::now_v7();
    let password_hash = hash_password(&form.password)?;
    let inserted = sqlx::query("INSERT INTO users (id,full_name,email,password_hash) VALUES (?,?,?,?)")
        .bind(id.to_string())
        .bind(form.full_name.trim())
        .bind(form.email.trim().to_lowercase())
        .bind(&password_hash)
        .execute(&db_pool)
        .await;

    match inserted {
        Ok(_) => {
            session.insert(USER_ID, id.to_string()).await?;
            session.insert(IS_GUEST, false).await?;
            tracing::info!("registered user {id}");
            Ok(Redirect::to("/").into_response())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Ok(register_form("This email is already registered."))
        }
        Err(err) => Err(err)?,
    }
}

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    email: String,
    password: String,
}

#[debug_handler]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,

    Form(LoginQuery { email, password }): Form<LoginQuery>,
) -> AppResult<Response> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT id,password_hash FROM users WHERE email=?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&db_pool)
            .await?;

    let Some((user_id, password_hash)) = row else {
        return Ok(login_form("Wrong email or password."));
    };
    if !verify_password(&password, &password_hash) {
        return Ok(login_form("Wrong email or password."));
    }

    session.insert(USER_ID, &user_id).await?;
    session.insert(IS_GUEST, false).await?;
    Ok(Redirect::to("/").into_response())
}

#[debug_handler]
pub(crate) async fn guest_login(session: Session) -> AppResult<Redirect> {
    session.remove::<String>(USER_ID).await?;
    session.insert(IS_GUEST, true).await?;
    Ok(Redirect::to("/"))
}

#[debug_handler]
pub(crate) async fn logout(session: Session) -> AppResult<Redirect> {
    session.clear().await;
    Ok(Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hashes() {
        assert!(!verify_password("hunter2", "not-a-phc-string"));
        assert!(!verify_password("hunter2", ""));
    }
}
