//! API endpoints for smart plugs ("power sensors").
//!
//! Listing and reading return each plug with its current switch state.
//! Switching itself lives in [`crate::api::power_toggle`].

use rocket::Route;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::api::folder::check_folder_in_company;
use crate::api::{ApiError, api_error, db_error, forbidden, is_unique_violation, not_found, nullable};
use crate::imei::normalize_imei;
use crate::logged_json::LoggedJson;
use crate::models::{PowerAuditEntry, PowerSensor, PowerSensorInput, PowerSensorWithStatus, PowerStatus};
use crate::orm::DbConn;
use crate::orm::power_sensor::{
    PowerSensorChanges, delete_power_sensor, get_all_power_sensors, get_audit_log,
    get_power_sensor_by_id, get_power_sensor_by_imei, get_power_sensors_by_company,
    get_power_status, insert_power_sensor, update_power_sensor, with_status,
};
use crate::session_guards::AuthenticatedUser;

/// Default and maximum page size for the audit log.
const AUDIT_LOG_DEFAULT_LIMIT: i64 = 100;
const AUDIT_LOG_MAX_LIMIT: i64 = 1000;

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CreatePowerSensorRequest {
    pub name: String,
    pub imei: String,
    pub location: Option<String>,
    pub folder_id: Option<i32>,
    /// Defaults to the caller's company.
    pub company_id: Option<i32>,
}

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct UpdatePowerSensorRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "string | null")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "number | null")]
    pub folder_id: Option<Option<i32>>,
}

/// Fetches a plug and checks read access to it.
pub(crate) async fn load_power_sensor(
    db: &DbConn,
    auth_user: &AuthenticatedUser,
    sensor_id: i32,
) -> Result<PowerSensor, ApiError> {
    let sensor = db
        .run(move |conn| get_power_sensor_by_id(conn, sensor_id))
        .await
        .map_err(|e| db_error("fetching power sensor", e))?
        .ok_or_else(|| not_found("Power sensor"))?;
    if !auth_user.can_access_company(sensor.company_id) {
        return Err(forbidden("Insufficient permissions to access this power sensor"));
    }
    Ok(sensor)
}

/// Create Power Sensor endpoint.
///
/// - **URL:** `/api/1/PowerSensors`
/// - **Method:** `POST`
/// - **Authentication:** admin of the company, or master
///
/// ```json
/// { "name": "Pump Plug", "imei": "867206040000114", "location": "Pump house" }
/// ```
///
/// The plug starts switched off. Answers 409 for a known IMEI.
#[post("/1/PowerSensors", data = "<request>")]
pub async fn create_power_sensor(
    db: DbConn,
    request: LoggedJson<CreatePowerSensorRequest>,
    auth_user: AuthenticatedUser,
) -> Result<status::Created<Json<PowerSensorWithStatus>>, ApiError> {
    let request = request.into_inner();
    let company_id = request.company_id.unwrap_or(auth_user.user.company_id);
    if !auth_user.can_manage_company(company_id) {
        return Err(forbidden("Insufficient permissions to create power sensors"));
    }
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(api_error(Status::BadRequest, "Power sensor name must not be empty"));
    }
    let imei = normalize_imei(&request.imei).map_err(|e| api_error(Status::BadRequest, e.to_string()))?;

    db.run(move |conn| -> Result<status::Created<Json<PowerSensorWithStatus>>, ApiError> {
        if let Some(folder) = request.folder_id {
            check_folder_in_company(conn, folder, company_id)?;
        }
        if get_power_sensor_by_imei(conn, &imei)
            .map_err(|e| db_error("checking for existing power sensor", e))?
            .is_some()
        {
            return Err(api_error(
                Status::Conflict,
                format!("A power sensor with IMEI {} already exists", imei),
            ));
        }

        let input = PowerSensorInput {
            name,
            imei,
            location: request.location,
            folder_id: request.folder_id,
            company_id,
        };
        let sensor = insert_power_sensor(conn, input).map_err(|e| {
            if is_unique_violation(&e) {
                api_error(Status::Conflict, "A power sensor with this IMEI already exists")
            } else {
                db_error("creating power sensor", e)
            }
        })?;
        info!("Registered power sensor {} ({}) for company {}", sensor.id, sensor.imei, company_id);
        let location = format!("/api/1/PowerSensors/{}", sensor.id);
        let created = with_status(conn, vec![sensor])
            .map_err(|e| db_error("fetching power status", e))?
            .pop()
            .ok_or_else(|| not_found("Power sensor"))?;
        Ok(status::Created::new(location).body(Json(created)))
    })
    .await
}

/// List Power Sensors endpoint.
///
/// - **URL:** `/api/1/PowerSensors`
/// - **Method:** `GET`
///
/// ```json
/// [{ "id": 1, "name": "Pump Plug", "imei": "867206040000114", "location": null,
///    "folder_id": 2, "company_id": 2, "power_state": false, "status_updated_at": "..." }]
/// ```
#[get("/1/PowerSensors")]
pub async fn list_power_sensors(
    db: DbConn,
    auth_user: AuthenticatedUser,
) -> Result<Json<Vec<PowerSensorWithStatus>>, ApiError> {
    let is_master = auth_user.is_master();
    let company_id = auth_user.user.company_id;
    db.run(move |conn| -> Result<Vec<PowerSensorWithStatus>, diesel::result::Error> {
        let plugs = if is_master {
            get_all_power_sensors(conn)?
        } else {
            get_power_sensors_by_company(conn, company_id)?
        };
        with_status(conn, plugs)
    })
    .await
    .map(Json)
    .map_err(|e| db_error("listing power sensors", e))
}

/// Get Power Sensor endpoint: `GET /api/1/PowerSensors/<sensor_id>`.
#[get("/1/PowerSensors/<sensor_id>")]
pub async fn get_power_sensor(
    db: DbConn,
    sensor_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<PowerSensorWithStatus>, ApiError> {
    let sensor = load_power_sensor(&db, &auth_user, sensor_id).await?;
    db.run(move |conn| with_status(conn, vec![sensor]))
        .await
        .map_err(|e| db_error("fetching power status", e))?
        .pop()
        .map(Json)
        .ok_or_else(|| not_found("Power sensor"))
}

/// Update Power Sensor endpoint.
///
/// - **URL:** `/api/1/PowerSensors/<sensor_id>`
/// - **Method:** `PUT`
/// - **Authentication:** admin of the company, or master
#[put("/1/PowerSensors/<sensor_id>", data = "<request>")]
pub async fn update_power_sensor_endpoint(
    db: DbConn,
    sensor_id: i32,
    request: LoggedJson<UpdatePowerSensorRequest>,
    auth_user: AuthenticatedUser,
) -> Result<Json<PowerSensor>, ApiError> {
    let sensor = load_power_sensor(&db, &auth_user, sensor_id).await?;
    if !auth_user.can_manage_company(sensor.company_id) {
        return Err(forbidden("Insufficient permissions to update this power sensor"));
    }
    let request = request.into_inner();
    if matches!(&request.name, Some(n) if n.trim().is_empty()) {
        return Err(api_error(Status::BadRequest, "Power sensor name must not be empty"));
    }

    let changes = PowerSensorChanges {
        name: request.name.map(|n| n.trim().to_string()),
        location: request.location,
        folder_id: request.folder_id,
    };
    let company_id = sensor.company_id;
    db.run(move |conn| -> Result<Json<PowerSensor>, ApiError> {
        if let Some(Some(folder)) = changes.folder_id {
            check_folder_in_company(conn, folder, company_id)?;
        }
        update_power_sensor(conn, sensor_id, changes)
            .map_err(|e| db_error("updating power sensor", e))?
            .map(Json)
            .ok_or_else(|| not_found("Power sensor"))
    })
    .await
}

/// Delete Power Sensor endpoint.
///
/// - **URL:** `/api/1/PowerSensors/<sensor_id>`
/// - **Method:** `DELETE`
/// - **Authentication:** admin of the company, or master
///
/// Removes the plug's status row and audit trail with it.
#[delete("/1/PowerSensors/<sensor_id>")]
pub async fn delete_power_sensor_endpoint(
    db: DbConn,
    sensor_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Status, ApiError> {
    let sensor = load_power_sensor(&db, &auth_user, sensor_id).await?;
    if !auth_user.can_manage_company(sensor.company_id) {
        return Err(forbidden("Insufficient permissions to delete this power sensor"));
    }
    match db.run(move |conn| delete_power_sensor(conn, sensor_id)).await {
        Ok(true) => {
            info!("Deleted power sensor {} ({})", sensor.id, sensor.imei);
            Ok(Status::NoContent)
        }
        Ok(false) => Err(not_found("Power sensor")),
        Err(e) => Err(db_error("deleting power sensor", e)),
    }
}

/// Power Status endpoint: `GET /api/1/PowerSensors/<sensor_id>/Status`.
#[get("/1/PowerSensors/<sensor_id>/Status")]
pub async fn get_power_status_endpoint(
    db: DbConn,
    sensor_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<PowerStatus>, ApiError> {
    load_power_sensor(&db, &auth_user, sensor_id).await?;
    db.run(move |conn| get_power_status(conn, sensor_id))
        .await
        .map_err(|e| db_error("fetching power status", e))?
        .map(Json)
        .ok_or_else(|| not_found("Power status"))
}

/// Audit Log endpoint.
///
/// - **URL:** `/api/1/PowerSensors/<sensor_id>/AuditLog?limit=<n>`
/// - **Method:** `GET`
///
/// Newest first; `limit` defaults to 100 and is capped at 1000.
///
/// ```json
/// [{ "id": 3, "power_sensor_id": 1, "user_id": 2, "action": "power_on",
///    "previous_state": false, "new_state": true, "created_at": "..." }]
/// ```
#[get("/1/PowerSensors/<sensor_id>/AuditLog?<limit>")]
pub async fn get_audit_log_endpoint(
    db: DbConn,
    sensor_id: i32,
    limit: Option<i64>,
    auth_user: AuthenticatedUser,
) -> Result<Json<Vec<PowerAuditEntry>>, ApiError> {
    load_power_sensor(&db, &auth_user, sensor_id).await?;
    let limit = limit.unwrap_or(AUDIT_LOG_DEFAULT_LIMIT).clamp(1, AUDIT_LOG_MAX_LIMIT);
    db.run(move |conn| get_audit_log(conn, sensor_id, Some(limit)))
        .await
        .map(Json)
        .map_err(|e| db_error("fetching audit log", e))
}

pub fn routes() -> Vec<Route> {
    routes![
        create_power_sensor,
        list_power_sensors,
        get_power_sensor,
        update_power_sensor_endpoint,
        delete_power_sensor_endpoint,
        get_power_status_endpoint,
        get_audit_log_endpoint
    ]
}
