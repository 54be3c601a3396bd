use axum::{
    debug_handler,
    extract::{Multipart, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, include_res, plate::PlateNumber, session::USER_ID};

use super::imagekit::ImageKit;

fn add_car_form(error: &str) -> Response {
    Html(include_res!(str, "/pages/add_car.html").replace("{error}", error)).into_response()
}

#[debug_handler]
pub(crate) async fn add_car_page(session: Session) -> AppResult<Response> {
    if session.get::<String>(USER_ID).await?.is_none() {
        return Ok(Redirect::to("/login").into_response());
    }
    Ok(add_car_form(""))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn add_car(
    State(db_pool): State<SqlitePool>,
    State(imagekit): State<ImageKit>,
    session: Session,

    mut form: Multipart,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<String>(USER_ID).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let mut plate_number = String::new();
    let mut make = String::new();
    let mut model = String::new();
    let mut image: Option<(String, Vec<u8>)> = None;

    while let Some(field) = form.next_field().await? {
        match field.name() {
            Some("plate_number") => plate_number = field.text().await?,
            Some("make") => make = field.text().await?,
            Some("model") => model = field.text().await?,
            Some("car_image") => {
                let file_name = field.file_name().unwrap_or("car.jpg").to_owned();
                image = Some((file_name, field.bytes().await?.to_vec()));
            }
            _ => {}
        }
    }

    // the stored plate is always the canonical form the matcher expects
    let Some(plate) = PlateNumber::parse(&plate_number) else {
        return Ok(add_car_form("Enter a valid plate number."));
    };
    let (make, model) = (make.trim().to_owned(), model.trim().to_owned());
    if make.is_empty() || model.is_empty() {
        return Ok(add_car_form("Make and model are required."));
    }
    let Some((file_name, bytes)) = image.filter(|(_, bytes)| !bytes.is_empty()) else {
        return Ok(add_car_form("Please upload an image."));
    };

    let image_url = match imagekit.upload(&file_name, &bytes).await {
        Ok(url) => url,
        Err(err) => {
            tracing::error!("image upload failed: {err:#}");
            return Ok(add_car_form("The image could not be uploaded. Try again."));
        }
    };

    let id = Uuid::now_v7();
    let inserted = sqlx::query(
        "INSERT INTO cars (id,plate_number,make,model,image_url,owner_id,added_at) \
         VALUES (?,?,?,?,?,?,?)",
    )
    .bind(id.to_string())
    .bind(plate.as_str())
    .bind(&make)
    .bind(&model)
    .bind(&image_url)
    .bind(&user_id)
    .bind(time::OffsetDateTime::now_utc().unix_timestamp())
    .execute(&db_pool)
    .await;

    match inserted {
        Ok(_) => {
            tracing::info!("car {id} listed with plate {}", plate.as_str());
            Ok(Redirect::to("/profile").into_response())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Ok(add_car_form("A car with this plate number already exists."))
        }
        Err(err) => Err(err)?,
    }
}
