use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Response},
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppResult, include_res, plate, res};

#[debug_handler]
pub(crate) async fn car(
    State(db_pool): State<SqlitePool>,
    Path(car_id): Path<Uuid>,
) -> AppResult<Response> {
    let Some((plate_number, make, model, image_url, owner_id)): Option<(
        String,
        String,
        String,
        String,
        String,
    )> = sqlx::query_as("SELECT plate_number,make,model,image_url,owner_id FROM cars WHERE id=?")
        .bind(car_id.to_string())
        .fetch_optional(&db_pool)
        .await?
    else {
        return res::sorry("car");
    };

    let (owner_name,): (String,) = sqlx::query_as("SELECT full_name FROM users WHERE id=?")
        .bind(&owner_id)
        .fetch_optional(&db_pool)
        .await?
        .unwrap_or(("Unknown owner".to_owned(),));

    Ok(Html(
        include_res!(str, "/pages/car.html")
            .replace("{plate}", &html_escape::encode_safe(&plate::format(&plate_number)))
            .replace("{make}", &html_escape::encode_safe(&make))
            .replace("{model}", &html_escape::encode_safe(&model))
            .replace("{image_url}", &html_escape::encode_safe(&image_url))
            .replace("{owner_name}", &html_escape::encode_safe(&owner_name))
            .replace("{owner_id}", &owner_id),
    )
    .into_response())
}
