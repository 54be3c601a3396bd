use axum::{
    debug_handler,
    extract::State,
    response::{Html, IntoResponse, Response},
};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppResult, include_res, plate,
    session::{IS_GUEST, USER_ID},
};

/// Guests get their own nav, without the guest-login button they already
/// pressed.
fn nav_for(logged_in: bool, is_guest: bool) -> &'static str {
    if logged_in {
        include_res!(str, "/pages/nav_user.html")
    } else if is_guest {
        include_res!(str, "/pages/nav_guest_active.html")
    } else {
        include_res!(str, "/pages/nav_guest.html")
    }
}

#[debug_handler]
pub async fn home(State(db_pool): State<SqlitePool>, session: Session) -> AppResult<Response> {
    let logged_in = session.get::<String>(USER_ID).await?.is_some();
    let is_guest = session.get::<bool>(IS_GUEST).await?.unwrap_or(false);

    let cars: Vec<(String, String, String, String)> = sqlx::query_as(
        "SELECT id,plate_number,make,model FROM cars ORDER BY added_at DESC, id DESC LIMIT 12",
    )
    .fetch_all(&db_pool)
    .await?;

    let mut car_items = String::new();
    for (id, plate_number, make, model) in cars {
        car_items += &include_res!(str, "/pages/car_item.html")
            .replace("{id}", &id)
            .replace("{plate}", &html_escape::encode_safe(&plate::format(&plate_number)))
            .replace("{make}", &html_escape::encode_safe(&make))
            .replace("{model}", &html_escape::encode_safe(&model));
    }

    Ok(Html(
        include_res!(str, "/pages/home.html")
            .replace("{nav}", nav_for(logged_in, is_guest))
            .replace("{car_items}", &car_items),
    )
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nav_matches_the_session_kind() {
        assert!(nav_for(true, false).contains("/logout"));
        // a guest session is told apart from a fresh visitor
        assert!(nav_for(false, true).contains("guest"));
        assert!(!nav_for(false, true).contains("/guest-login"));
        assert!(nav_for(false, false).contains("/guest-login"));
        // a logged-in session wins over a stale guest flag
        assert!(nav_for(true, true).contains("/logout"));
    }
}
