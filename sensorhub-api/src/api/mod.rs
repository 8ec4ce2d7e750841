pub mod company;
pub mod folder;
pub mod login;
pub mod logout;
pub mod map;
pub mod power_sensor;
pub mod power_toggle;
pub mod product;
pub mod provision;
pub mod purchase;
pub mod sensor;
pub mod status;
pub mod user;

use rocket::Route;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

/// Error body shared by the `/api/1` endpoints.
#[derive(Debug, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = Custom<Json<ErrorResponse>>;

pub fn api_error(code: Status, message: impl Into<String>) -> ApiError {
    Custom(
        code,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Logs the database failure and hides it behind a 500.
pub fn db_error(context: &str, e: diesel::result::Error) -> ApiError {
    error!("Database error while {}: {:?}", context, e);
    api_error(Status::InternalServerError, format!("Database error while {}", context))
}

pub fn forbidden(message: impl Into<String>) -> ApiError {
    api_error(Status::Forbidden, message)
}

pub fn not_found(what: &str) -> ApiError {
    api_error(Status::NotFound, format!("{} not found", what))
}

pub fn is_unique_violation(e: &diesel::result::Error) -> bool {
    matches!(
        e,
        diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _)
    )
}

/// For `Option<Option<T>>` request fields: absent → `None`, `null` →
/// `Some(None)`, value → `Some(Some(v))`. Pair with `#[serde(default)]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(company::routes());
    routes.extend(folder::routes());
    routes.extend(login::routes());
    routes.extend(logout::routes());
    routes.extend(map::routes());
    routes.extend(power_sensor::routes());
    routes.extend(power_toggle::routes());
    routes.extend(product::routes());
    routes.extend(provision::routes());
    routes.extend(purchase::routes());
    routes.extend(sensor::routes());
    routes.extend(status::routes());
    routes.extend(user::routes());
    routes
}
