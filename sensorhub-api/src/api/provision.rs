//! QR provisioning endpoints.
//!
//! The dashboard decodes the QR code on the client and posts the raw text.
//! The server finds the IMEI in it (see [`crate::provisioning`]) and either
//! reports on it or registers the device.

use rocket::Route;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::api::folder::check_folder_in_company;
use crate::api::{ApiError, api_error, db_error, forbidden, is_unique_violation};
use crate::logged_json::LoggedJson;
use crate::models::{PowerSensorInput, PowerSensorWithStatus, Sensor, SensorInput};
use crate::orm::DbConn;
use crate::orm::power_sensor::{get_power_sensor_by_imei, insert_power_sensor, with_status};
use crate::orm::sensor::{get_sensor_by_imei, insert_sensor};
use crate::provisioning::{DeviceKind, PayloadFormat, ScannedImei, extract_imei};
use crate::session_guards::AuthenticatedUser;

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ParseRequest {
    pub payload: String,
}

#[derive(Debug, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ParseResponse {
    pub imei: String,
    pub format: PayloadFormat,
    /// Table already holding this IMEI, if any.
    pub registered_as: Option<DeviceKind>,
}

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ProvisionRequest {
    pub payload: String,
    pub kind: DeviceKind,
    pub name: Option<String>,
    pub folder_id: Option<i32>,
}

/// Exactly one of `sensor` and `power_sensor` is set, matching `kind`.
#[derive(Debug, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ProvisionResponse {
    pub kind: DeviceKind,
    pub imei: String,
    pub format: PayloadFormat,
    pub sensor: Option<Sensor>,
    pub power_sensor: Option<PowerSensorWithStatus>,
}

fn scan(payload: &str) -> Result<ScannedImei, ApiError> {
    extract_imei(payload).map_err(|e| api_error(Status::BadRequest, e.to_string()))
}

fn registered_as(conn: &mut diesel::SqliteConnection, imei: &str) -> Result<Option<DeviceKind>, ApiError> {
    if get_sensor_by_imei(conn, imei)
        .map_err(|e| db_error("checking sensor IMEI", e))?
        .is_some()
    {
        return Ok(Some(DeviceKind::Sensor));
    }
    if get_power_sensor_by_imei(conn, imei)
        .map_err(|e| db_error("checking power sensor IMEI", e))?
        .is_some()
    {
        return Ok(Some(DeviceKind::Power));
    }
    Ok(None)
}

/// Parse QR Payload endpoint.
///
/// - **URL:** `/api/1/Provision/Parse`
/// - **Method:** `POST`
/// - **Authentication:** Required
///
/// ```json
/// { "payload": "https://example.com/activate?imei=356938035643809" }
/// ```
///
/// Answers 400 when no IMEI with a valid check digit is found.
///
/// ```json
/// { "imei": "356938035643809", "format": "url", "registered_as": "sensor" }
/// ```
#[post("/1/Provision/Parse", data = "<request>")]
pub async fn parse_payload(
    db: DbConn,
    request: LoggedJson<ParseRequest>,
    _auth_user: AuthenticatedUser,
) -> Result<Json<ParseResponse>, ApiError> {
    let scanned = scan(&request.payload)?;
    db.run(move |conn| -> Result<Json<ParseResponse>, ApiError> {
        let registered_as = registered_as(conn, &scanned.imei)?;
        Ok(Json(ParseResponse {
            imei: scanned.imei,
            format: scanned.format,
            registered_as,
        }))
    })
    .await
}

/// Provision Device endpoint.
///
/// - **URL:** `/api/1/Provision`
/// - **Method:** `POST`
/// - **Authentication:** admin of the company, or master
///
/// ```json
/// { "payload": "IMEI:867206040000445", "kind": "power", "folder_id": 1 }
/// ```
///
/// Registers the scanned device in the caller's company. Without `name` the
/// device is called `<kind>-<last six IMEI digits>`. Answers 409 when the
/// IMEI is already registered as either kind of device.
#[post("/1/Provision", data = "<request>")]
pub async fn provision_device(
    db: DbConn,
    request: LoggedJson<ProvisionRequest>,
    auth_user: AuthenticatedUser,
) -> Result<status::Created<Json<ProvisionResponse>>, ApiError> {
    let company_id = auth_user.user.company_id;
    if !auth_user.can_manage_company(company_id) {
        return Err(forbidden("Insufficient permissions to provision devices"));
    }
    let request = request.into_inner();
    let scanned = scan(&request.payload)?;
    let kind = request.kind;
    let name = match request.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => kind.default_name(&scanned.imei),
    };
    let folder_id = request.folder_id;

    db.run(move |conn| -> Result<status::Created<Json<ProvisionResponse>>, ApiError> {
        if let Some(folder) = folder_id {
            check_folder_in_company(conn, folder, company_id)?;
        }
        if let Some(existing) = registered_as(conn, &scanned.imei)? {
            return Err(api_error(
                Status::Conflict,
                format!("IMEI {} is already registered as a {} device", scanned.imei, existing.as_str()),
            ));
        }

        let conflict = |e: diesel::result::Error| {
            if is_unique_violation(&e) {
                api_error(Status::Conflict, "A device with this IMEI already exists")
            } else {
                db_error("provisioning device", e)
            }
        };
        let imei = scanned.imei.clone();
        let (location, sensor, power_sensor) = match kind {
            DeviceKind::Sensor => {
                let sensor = insert_sensor(
                    conn,
                    SensorInput {
                        name,
                        imei,
                        sensor_type: None,
                        status: None,
                        latitude: None,
                        longitude: None,
                        battery_level: None,
                        folder_id,
                        company_id,
                    },
                )
                .map_err(conflict)?;
                (format!("/api/1/Sensors/{}", sensor.id), Some(sensor), None)
            }
            DeviceKind::Power => {
                let plug = insert_power_sensor(
                    conn,
                    PowerSensorInput {
                        name,
                        imei,
                        location: None,
                        folder_id,
                        company_id,
                    },
                )
                .map_err(conflict)?;
                let location = format!("/api/1/PowerSensors/{}", plug.id);
                let plug = with_status(conn, vec![plug])
                    .map_err(|e| db_error("fetching power status", e))?
                    .pop();
                (location, None, plug)
            }
        };
        info!(
            "Provisioned {} device {} for company {} from {:?} payload",
            kind.as_str(),
            scanned.imei,
            company_id,
            scanned.format
        );

        Ok(status::Created::new(location).body(Json(ProvisionResponse {
            kind,
            imei: scanned.imei,
            format: scanned.format,
            sensor,
            power_sensor,
        })))
    })
    .await
}

pub fn routes() -> Vec<Route> {
    routes![parse_payload, provision_device]
}
