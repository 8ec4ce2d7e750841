//! API endpoints for tracking sensors, including bulk CSV import.
//!
//! # Authorization Rules
//! - members of a company read its sensors
//! - admins of the company and masters create, change, delete and import

use chrono::NaiveDateTime;
use rocket::Data;
use rocket::data::ToByteUnit;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::Route;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::api::folder::{check_coordinates, check_folder_in_company};
use crate::api::{ApiError, api_error, db_error, forbidden, is_unique_violation, not_found, nullable};
use crate::csv_import::{ImportError, ImportReport, import_sensors_csv};
use crate::imei::normalize_imei;
use crate::logged_json::LoggedJson;
use crate::models::{Sensor, SensorChanges, SensorInput, SensorStatus};
use crate::orm::DbConn;
use crate::orm::sensor::{
    delete_sensor, get_all_sensors, get_sensor_by_id, get_sensor_by_imei, get_sensors_by_company,
    insert_sensor, update_sensor,
};
use crate::session_guards::AuthenticatedUser;

/// Upper bound for an uploaded CSV file.
const CSV_LIMIT_MIB: u64 = 5;

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CreateSensorRequest {
    pub name: String,
    pub imei: String,
    pub sensor_type: Option<String>,
    pub status: Option<SensorStatus>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub battery_level: Option<i32>,
    pub folder_id: Option<i32>,
    /// Defaults to the caller's company.
    pub company_id: Option<i32>,
}

/// All fields optional; `null` clears a nullable field. The IMEI is fixed
/// once registered.
#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct UpdateSensorRequest {
    pub name: Option<String>,
    pub sensor_type: Option<String>,
    pub status: Option<SensorStatus>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "number | null")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "number | null")]
    pub longitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "number | null")]
    pub battery_level: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "string | null")]
    pub last_seen: Option<Option<NaiveDateTime>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "number | null")]
    pub folder_id: Option<Option<i32>>,
}

fn check_battery(level: Option<i32>) -> Result<(), ApiError> {
    match level {
        Some(l) if !(0..=100).contains(&l) => Err(api_error(
            Status::BadRequest,
            format!("battery_level {} must be between 0 and 100", l),
        )),
        _ => Ok(()),
    }
}

async fn load_sensor(db: &DbConn, auth_user: &AuthenticatedUser, sensor_id: i32) -> Result<Sensor, ApiError> {
    let sensor = db
        .run(move |conn| get_sensor_by_id(conn, sensor_id))
        .await
        .map_err(|e| db_error("fetching sensor", e))?
        .ok_or_else(|| not_found("Sensor"))?;
    if !auth_user.can_access_company(sensor.company_id) {
        return Err(forbidden("Insufficient permissions to access this sensor"));
    }
    Ok(sensor)
}

/// Create Sensor endpoint.
///
/// - **URL:** `/api/1/Sensors`
/// - **Method:** `POST`
/// - **Authentication:** admin of the company, or master
///
/// ```json
/// { "name": "Tractor Tracker", "imei": "35-693803-564380-9", "sensor_type": "gps" }
/// ```
///
/// The IMEI may contain spaces or dashes; 15 digits must remain. Answers 409
/// when the IMEI is already registered.
#[post("/1/Sensors", data = "<request>")]
pub async fn create_sensor(
    db: DbConn,
    request: LoggedJson<CreateSensorRequest>,
    auth_user: AuthenticatedUser,
) -> Result<status::Created<Json<Sensor>>, ApiError> {
    let request = request.into_inner();
    let company_id = request.company_id.unwrap_or(auth_user.user.company_id);
    if !auth_user.can_manage_company(company_id) {
        return Err(forbidden("Insufficient permissions to create sensors"));
    }
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(api_error(Status::BadRequest, "Sensor name must not be empty"));
    }
    let imei = normalize_imei(&request.imei).map_err(|e| api_error(Status::BadRequest, e.to_string()))?;
    check_coordinates(request.latitude, request.longitude)?;
    check_battery(request.battery_level)?;

    db.run(move |conn| -> Result<status::Created<Json<Sensor>>, ApiError> {
        if let Some(folder) = request.folder_id {
            check_folder_in_company(conn, folder, company_id)?;
        }
        if get_sensor_by_imei(conn, &imei)
            .map_err(|e| db_error("checking for existing sensor", e))?
            .is_some()
        {
            return Err(api_error(
                Status::Conflict,
                format!("A sensor with IMEI {} already exists", imei),
            ));
        }

        let input = SensorInput {
            name,
            imei,
            sensor_type: request.sensor_type,
            status: request.status,
            latitude: request.latitude,
            longitude: request.longitude,
            battery_level: request.battery_level,
            folder_id: request.folder_id,
            company_id,
        };
        let sensor = insert_sensor(conn, input).map_err(|e| {
            if is_unique_violation(&e) {
                api_error(Status::Conflict, "A sensor with this IMEI already exists")
            } else {
                db_error("creating sensor", e)
            }
        })?;
        info!("Registered sensor {} ({}) for company {}", sensor.id, sensor.imei, company_id);
        Ok(status::Created::new(format!("/api/1/Sensors/{}", sensor.id)).body(Json(sensor)))
    })
    .await
}

/// List Sensors endpoint.
///
/// - **URL:** `/api/1/Sensors`
/// - **Method:** `GET`
///
/// Masters see every sensor, everybody else the sensors of their company.
#[get("/1/Sensors")]
pub async fn list_sensors(db: DbConn, auth_user: AuthenticatedUser) -> Result<Json<Vec<Sensor>>, ApiError> {
    let is_master = auth_user.is_master();
    let company_id = auth_user.user.company_id;
    db.run(move |conn| {
        if is_master {
            get_all_sensors(conn)
        } else {
            get_sensors_by_company(conn, company_id)
        }
    })
    .await
    .map(Json)
    .map_err(|e| db_error("listing sensors", e))
}

/// Get Sensor endpoint: `GET /api/1/Sensors/<sensor_id>`.
#[get("/1/Sensors/<sensor_id>")]
pub async fn get_sensor(
    db: DbConn,
    sensor_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<Sensor>, ApiError> {
    load_sensor(&db, &auth_user, sensor_id).await.map(Json)
}

/// Update Sensor endpoint.
///
/// - **URL:** `/api/1/Sensors/<sensor_id>`
/// - **Method:** `PUT`
/// - **Authentication:** admin of the company, or master
#[put("/1/Sensors/<sensor_id>", data = "<request>")]
pub async fn update_sensor_endpoint(
    db: DbConn,
    sensor_id: i32,
    request: LoggedJson<UpdateSensorRequest>,
    auth_user: AuthenticatedUser,
) -> Result<Json<Sensor>, ApiError> {
    let sensor = load_sensor(&db, &auth_user, sensor_id).await?;
    if !auth_user.can_manage_company(sensor.company_id) {
        return Err(forbidden("Insufficient permissions to update this sensor"));
    }
    let request = request.into_inner();
    if matches!(&request.name, Some(n) if n.trim().is_empty()) {
        return Err(api_error(Status::BadRequest, "Sensor name must not be empty"));
    }
    check_coordinates(request.latitude.flatten(), request.longitude.flatten())?;
    check_battery(request.battery_level.flatten())?;

    let changes = SensorChanges {
        name: request.name.map(|n| n.trim().to_string()),
        sensor_type: request.sensor_type,
        status: request.status,
        latitude: request.latitude,
        longitude: request.longitude,
        battery_level: request.battery_level,
        last_seen: request.last_seen,
        folder_id: request.folder_id,
    };
    let company_id = sensor.company_id;
    db.run(move |conn| -> Result<Json<Sensor>, ApiError> {
        if let Some(Some(folder)) = changes.folder_id {
            check_folder_in_company(conn, folder, company_id)?;
        }
        update_sensor(conn, sensor_id, changes)
            .map_err(|e| db_error("updating sensor", e))?
            .map(Json)
            .ok_or_else(|| not_found("Sensor"))
    })
    .await
}

/// Delete Sensor endpoint: `DELETE /api/1/Sensors/<sensor_id>`.
#[delete("/1/Sensors/<sensor_id>")]
pub async fn delete_sensor_endpoint(
    db: DbConn,
    sensor_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Status, ApiError> {
    let sensor = load_sensor(&db, &auth_user, sensor_id).await?;
    if !auth_user.can_manage_company(sensor.company_id) {
        return Err(forbidden("Insufficient permissions to delete this sensor"));
    }
    match db.run(move |conn| delete_sensor(conn, sensor_id)).await {
        Ok(true) => {
            info!("Deleted sensor {} ({})", sensor.id, sensor.imei);
            Ok(Status::NoContent)
        }
        Ok(false) => Err(not_found("Sensor")),
        Err(e) => Err(db_error("deleting sensor", e)),
    }
}

/// CSV Import endpoint.
///
/// - **URL:** `/api/1/Sensors/Import?company_id=<id>`
/// - **Method:** `POST`
/// - **Content-Type:** `text/csv`
/// - **Authentication:** admin of the company, or master
///
/// ```text
/// name,imei,sensor_type,latitude,longitude,folder_id
/// Tractor Tracker,356938035643809,gps,52.11,5.11,
/// ```
///
/// `name` and `imei` columns are required. Rows with a known IMEI, or one
/// repeated within the file, are skipped; invalid rows are reported by line
/// and the rest are inserted together.
///
/// ```json
/// { "imported": 12, "skipped_duplicates": 2, "errors": [{ "line": 7, "message": "name is required" }] }
/// ```
#[post("/1/Sensors/Import?<company_id>", format = "text/csv", data = "<data>")]
pub async fn import_sensors(
    db: DbConn,
    company_id: Option<i32>,
    data: Data<'_>,
    auth_user: AuthenticatedUser,
) -> Result<Json<ImportReport>, ApiError> {
    let company_id = company_id.unwrap_or(auth_user.user.company_id);
    if !auth_user.can_manage_company(company_id) {
        return Err(forbidden("Insufficient permissions to import sensors"));
    }

    let body = data
        .open(CSV_LIMIT_MIB.mebibytes())
        .into_string()
        .await
        .map_err(|e| api_error(Status::BadRequest, format!("Could not read CSV body: {}", e)))?;
    if !body.is_complete() {
        return Err(api_error(
            Status::PayloadTooLarge,
            format!("CSV file exceeds {} MiB", CSV_LIMIT_MIB),
        ));
    }
    let csv_text = body.into_inner();

    db.run(move |conn| import_sensors_csv(conn, company_id, &csv_text))
        .await
        .map(Json)
        .map_err(|e| match e {
            ImportError::Database(e) => db_error("importing sensors", e),
            other => api_error(Status::BadRequest, other.to_string()),
        })
}

pub fn routes() -> Vec<Route> {
    routes![
        create_sensor,
        list_sensors,
        get_sensor,
        update_sensor_endpoint,
        delete_sensor_endpoint,
        import_sensors
    ]
}
