//! Map endpoint for the dashboard.

use rocket::Route;
use rocket::serde::json::Json;

use crate::api::folder::load_folder;
use crate::api::{ApiError, db_error};
use crate::map::{MapData, load_map};
use crate::orm::DbConn;
use crate::session_guards::AuthenticatedUser;

/// Map endpoint.
///
/// - **URL:** `/api/1/Map?folder_id=<id>`
/// - **Method:** `GET`
/// - **Authentication:** Required
///
/// Markers for every positioned sensor and plug the caller can see, plus
/// their bounding box (`null` when there are no markers). With `folder_id`,
/// only that folder and its subfolders are drawn.
///
/// ```json
/// {
///   "markers": [
///     { "kind": "sensor", "id": 1, "name": "Tractor Tracker", "imei": "356938035643809",
///       "latitude": 52.11, "longitude": 5.11, "status": "online", "folder_id": 1, "company_id": 2 }
///   ],
///   "bounds": { "min_latitude": 52.11, "min_longitude": 5.11, "max_latitude": 52.11, "max_longitude": 5.11 }
/// }
/// ```
#[get("/1/Map?<folder_id>")]
pub async fn get_map(
    db: DbConn,
    folder_id: Option<i32>,
    auth_user: AuthenticatedUser,
) -> Result<Json<MapData>, ApiError> {
    let company = match folder_id {
        // Scope to the folder's own company so masters can map any folder.
        Some(id) => Some(load_folder(&db, &auth_user, id).await?.company_id),
        None if auth_user.is_master() => None,
        None => Some(auth_user.user.company_id),
    };
    db.run(move |conn| load_map(conn, company, folder_id))
        .await
        .map(Json)
        .map_err(|e| db_error("building map", e))
}

pub fn routes() -> Vec<Route> {
    routes![get_map]
}
