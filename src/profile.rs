use axum::{
    debug_handler,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, include_res, plate, res, session::USER_ID};

#[debug_handler]
pub async fn profile(State(db_pool): State<SqlitePool>, session: Session) -> AppResult<Response> {
    let Some(user_id) = session.get::<String>(USER_ID).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let Some((full_name,)): Option<(String,)> =
        sqlx::query_as("SELECT full_name FROM users WHERE id=?")
            .bind(&user_id)
            .fetch_optional(&db_pool)
            .await?
    else {
        return res::sorry("profile");
    };

    let cars: Vec<(String, String, String, String, String)> = sqlx::query_as(
        "SELECT id,plate_number,make,model,image_url FROM cars \
         WHERE owner_id=? ORDER BY added_at DESC, id DESC",
    )
    .bind(&user_id)
    .fetch_all(&db_pool)
    .await?;

    let mut car_items = String::new();
    for (id, plate_number, make, model, image_url) in cars {
        car_items += &include_res!(str, "/pages/profile_car_item.html")
            .replace("{id}", &id)
            .replace("{plate}", &html_escape::encode_safe(&plate::format(&plate_number)))
            .replace("{make}", &html_escape::encode_safe(&make))
            .replace("{model}", &html_escape::encode_safe(&model))
            .replace("{image_url}", &html_escape::encode_safe(&image_url));
    }

    Ok(Html(
        include_res!(str, "/pages/profile.html")
            .replace("{full_name}", &html_escape::encode_safe(&full_name))
            .replace("{car_items}", &car_items),
    )
    .into_response())
}
