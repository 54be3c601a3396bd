pub mod imagekit;
mod new;
mod page;

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add-car", get(new::add_car_page).post(new::add_car))
        .route("/car/{id}", get(page::car))
}
