//! API endpoints for project folders.
//!
//! Folders group the sensors and plugs of one company and may nest. Reading
//! is open to every member of the company; writing needs an admin of the
//! company or a master.

use rocket::Route;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::api::{ApiError, api_error, db_error, forbidden, not_found, nullable};
use crate::logged_json::LoggedJson;
use crate::models::{Folder, FolderInput, PowerSensorWithStatus, Sensor};
use crate::orm::DbConn;
use crate::orm::folder::{
    FolderChanges, delete_folder, get_all_folders, get_folder_by_company_and_name,
    get_folder_by_id, get_folders_by_company, insert_folder, update_folder, would_create_cycle,
};
use crate::orm::power_sensor::{get_power_sensors_by_folder, with_status};
use crate::orm::sensor::get_sensors_by_folder;
use crate::session_guards::AuthenticatedUser;

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CreateFolderRequest {
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub parent_id: Option<i32>,
    /// Defaults to the caller's company.
    pub company_id: Option<i32>,
}

/// All fields optional; `null` clears a nullable field.
#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct UpdateFolderRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "string | null")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "string | null")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "number | null")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "number | null")]
    pub longitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "number | null")]
    pub parent_id: Option<Option<i32>>,
}

pub(crate) fn check_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), ApiError> {
    if let Some(lat) = latitude {
        if !lat.is_finite() || lat.abs() > 90.0 {
            return Err(api_error(Status::BadRequest, format!("latitude {} is out of range", lat)));
        }
    }
    if let Some(lng) = longitude {
        if !lng.is_finite() || lng.abs() > 180.0 {
            return Err(api_error(Status::BadRequest, format!("longitude {} is out of range", lng)));
        }
    }
    Ok(())
}

/// Fetches a folder and checks read access to it.
pub(crate) async fn load_folder(
    db: &DbConn,
    auth_user: &AuthenticatedUser,
    folder_id: i32,
) -> Result<Folder, ApiError> {
    let folder = db
        .run(move |conn| get_folder_by_id(conn, folder_id))
        .await
        .map_err(|e| db_error("fetching folder", e))?
        .ok_or_else(|| not_found("Folder"))?;
    if !auth_user.can_access_company(folder.company_id) {
        return Err(forbidden("Insufficient permissions to access this folder"));
    }
    Ok(folder)
}

/// Checks that `folder_id` names a folder of `company_id`. Used for the
/// `folder_id` of devices and the `parent_id` of folders.
pub(crate) fn check_folder_in_company(
    conn: &mut diesel::SqliteConnection,
    folder_id: i32,
    company_id: i32,
) -> Result<(), ApiError> {
    match get_folder_by_id(conn, folder_id).map_err(|e| db_error("fetching folder", e))? {
        Some(folder) if folder.company_id == company_id => Ok(()),
        Some(_) => Err(api_error(
            Status::BadRequest,
            format!("Folder {} belongs to another company", folder_id),
        )),
        None => Err(api_error(Status::BadRequest, format!("Folder {} does not exist", folder_id))),
    }
}

/// Create Folder endpoint.
///
/// - **URL:** `/api/1/Folders`
/// - **Method:** `POST`
/// - **Authentication:** admin of the company, or master
///
/// ```json
/// { "name": "Barn A", "parent_id": 1, "latitude": 52.2, "longitude": 5.2 }
/// ```
///
/// Folder names are unique within a company (409).
#[post("/1/Folders", data = "<request>")]
pub async fn create_folder(
    db: DbConn,
    request: LoggedJson<CreateFolderRequest>,
    auth_user: AuthenticatedUser,
) -> Result<status::Created<Json<Folder>>, ApiError> {
    let request = request.into_inner();
    let company_id = request.company_id.unwrap_or(auth_user.user.company_id);
    if !auth_user.can_manage_company(company_id) {
        return Err(forbidden("Insufficient permissions to create folders"));
    }
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(api_error(Status::BadRequest, "Folder name must not be empty"));
    }
    check_coordinates(request.latitude, request.longitude)?;

    db.run(move |conn| -> Result<status::Created<Json<Folder>>, ApiError> {
        if let Some(parent) = request.parent_id {
            check_folder_in_company(conn, parent, company_id)?;
        }
        if get_folder_by_company_and_name(conn, company_id, &name)
            .map_err(|e| db_error("checking for existing folder", e))?
            .is_some()
        {
            return Err(api_error(
                Status::Conflict,
                format!("Folder '{}' already exists in this company", name),
            ));
        }

        let folder = insert_folder(
            conn,
            FolderInput {
                name,
                description: request.description,
                address: request.address,
                latitude: request.latitude,
                longitude: request.longitude,
                parent_id: request.parent_id,
                company_id,
            },
        )
        .map_err(|e| db_error("creating folder", e))?;
        info!("Created folder {} '{}' in company {}", folder.id, folder.name, company_id);
        Ok(status::Created::new(format!("/api/1/Folders/{}", folder.id)).body(Json(folder)))
    })
    .await
}

/// List Folders endpoint.
///
/// - **URL:** `/api/1/Folders`
/// - **Method:** `GET`
///
/// Masters see every folder, everybody else the folders of their company.
#[get("/1/Folders")]
pub async fn list_folders(db: DbConn, auth_user: AuthenticatedUser) -> Result<Json<Vec<Folder>>, ApiError> {
    let is_master = auth_user.is_master();
    let company_id = auth_user.user.company_id;
    db.run(move |conn| {
        if is_master {
            get_all_folders(conn)
        } else {
            get_folders_by_company(conn, company_id)
        }
    })
    .await
    .map(Json)
    .map_err(|e| db_error("listing folders", e))
}

/// Get Folder endpoint: `GET /api/1/Folders/<folder_id>`.
#[get("/1/Folders/<folder_id>")]
pub async fn get_folder(
    db: DbConn,
    folder_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<Folder>, ApiError> {
    load_folder(&db, &auth_user, folder_id).await.map(Json)
}

/// Update Folder endpoint.
///
/// - **URL:** `/api/1/Folders/<folder_id>`
/// - **Method:** `PUT`
/// - **Authentication:** admin of the company, or master
///
/// A new `parent_id` must be a folder of the same company and must not be
/// the folder itself or one of its descendants.
#[put("/1/Folders/<folder_id>", data = "<request>")]
pub async fn update_folder_endpoint(
    db: DbConn,
    folder_id: i32,
    request: LoggedJson<UpdateFolderRequest>,
    auth_user: AuthenticatedUser,
) -> Result<Json<Folder>, ApiError> {
    let folder = load_folder(&db, &auth_user, folder_id).await?;
    if !auth_user.can_manage_company(folder.company_id) {
        return Err(forbidden("Insufficient permissions to update this folder"));
    }
    let request = request.into_inner();
    check_coordinates(request.latitude.flatten(), request.longitude.flatten())?;
    let name = match request.name {
        Some(n) if n.trim().is_empty() => {
            return Err(api_error(Status::BadRequest, "Folder name must not be empty"));
        }
        Some(n) => Some(n.trim().to_string()),
        None => None,
    };

    db.run(move |conn| -> Result<Json<Folder>, ApiError> {
        if let Some(Some(parent)) = request.parent_id {
            check_folder_in_company(conn, parent, folder.company_id)?;
            if would_create_cycle(conn, folder_id, parent)
                .map_err(|e| db_error("checking folder hierarchy", e))?
            {
                return Err(api_error(
                    Status::BadRequest,
                    "A folder cannot be moved into itself or one of its subfolders",
                ));
            }
        }
        if let Some(new_name) = &name {
            match get_folder_by_company_and_name(conn, folder.company_id, new_name)
                .map_err(|e| db_error("checking for existing folder", e))?
            {
                Some(other) if other.id != folder_id => {
                    return Err(api_error(
                        Status::Conflict,
                        format!("Folder '{}' already exists in this company", new_name),
                    ));
                }
                _ => {}
            }
        }

        let changes = FolderChanges {
            name,
            description: request.description,
            address: request.address,
            latitude: request.latitude,
            longitude: request.longitude,
            parent_id: request.parent_id,
        };
        update_folder(conn, folder_id, changes)
            .map_err(|e| db_error("updating folder", e))?
            .map(Json)
            .ok_or_else(|| not_found("Folder"))
    })
    .await
}

/// Delete Folder endpoint.
///
/// - **URL:** `/api/1/Folders/<folder_id>`
/// - **Method:** `DELETE`
/// - **Authentication:** admin of the company, or master
///
/// Devices in the folder become unfiled; subfolders move up one level.
#[delete("/1/Folders/<folder_id>")]
pub async fn delete_folder_endpoint(
    db: DbConn,
    folder_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Status, ApiError> {
    let folder = load_folder(&db, &auth_user, folder_id).await?;
    if !auth_user.can_manage_company(folder.company_id) {
        return Err(forbidden("Insufficient permissions to delete this folder"));
    }
    match db.run(move |conn| delete_folder(conn, folder_id)).await {
        Ok(true) => {
            info!("Deleted folder {} '{}'", folder.id, folder.name);
            Ok(Status::NoContent)
        }
        Ok(false) => Err(not_found("Folder")),
        Err(e) => Err(db_error("deleting folder", e)),
    }
}

/// Folder Sensors endpoint: `GET /api/1/Folders/<folder_id>/Sensors`.
#[get("/1/Folders/<folder_id>/Sensors")]
pub async fn list_folder_sensors(
    db: DbConn,
    folder_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<Vec<Sensor>>, ApiError> {
    load_folder(&db, &auth_user, folder_id).await?;
    db.run(move |conn| get_sensors_by_folder(conn, folder_id))
        .await
        .map(Json)
        .map_err(|e| db_error("listing folder sensors", e))
}

/// Folder plugs endpoint: `GET /api/1/Folders/<folder_id>/PowerSensors`.
#[get("/1/Folders/<folder_id>/PowerSensors")]
pub async fn list_folder_power_sensors(
    db: DbConn,
    folder_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<Vec<PowerSensorWithStatus>>, ApiError> {
    load_folder(&db, &auth_user, folder_id).await?;
    db.run(move |conn| -> Result<Vec<PowerSensorWithStatus>, diesel::result::Error> {
        let plugs = get_power_sensors_by_folder(conn, folder_id)?;
        with_status(conn, plugs)
    })
    .await
    .map(Json)
    .map_err(|e| db_error("listing folder plugs", e))
}

pub fn routes() -> Vec<Route> {
    routes![
        create_folder,
        list_folders,
        get_folder,
        update_folder_endpoint,
        delete_folder_endpoint,
        list_folder_sensors,
        list_folder_power_sensors
    ]
}
