//! Device control endpoints that switch smart plugs through the gateway.
//!
//! These routes keep the device-facing wire format: camelCase bodies and
//! `{ "success": false, "message": "..." }` errors, including for a missing
//! session, so they answer their own 401 and 400 instead of relying on the
//! JSON catchers.
//!
//! # Switching sequence
//! 1. the plug is looked up by id (404), checked against the caller's company
//!    (403) and, when the body names an IMEI, against that IMEI (400)
//! 2. the new state and one audit entry are written in a single transaction
//! 3. the command is relayed to the gateway; its outcome is reported in the
//!    response and never undoes step 2

use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::{self, Json};
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::gateway::{GatewayClient, GatewayOutcome};
use crate::imei::normalize_imei;
use crate::logged_json::LoggedJson;
use crate::models::PowerSensor;
use crate::orm::DbConn;
use crate::orm::power_sensor::{apply_power_state, get_power_sensor_by_id};
use crate::session_guards::AuthenticatedUser;

/// Requested plug state. Accepts `true`/`false`, `1`/`0` and
/// `"on"`/`"off"`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PowerStateValue {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl PowerStateValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PowerStateValue::Flag(b) => Some(*b),
            PowerStateValue::Number(0) => Some(false),
            PowerStateValue::Number(1) => Some(true),
            PowerStateValue::Number(_) => None,
            PowerStateValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => Some(true),
                "off" | "false" | "0" => Some(false),
                _ => None,
            },
        }
    }
}

/// Body of `power-toggle` and `power-toggle-auth`.
#[derive(Debug, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PowerToggleRequest {
    pub sensor_id: Option<i32>,
    #[ts(type = "boolean | number | string | null")]
    pub power_state: Option<PowerStateValue>,
    pub imei: Option<String>,
}

/// Body of the relay-only `toggle`.
#[derive(Debug, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeviceToggleRequest {
    pub device_id: Option<i32>,
    #[ts(type = "boolean | number | string | null")]
    pub power_state: Option<PowerStateValue>,
    pub imei: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeviceResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayOutcome>,
}

pub type DeviceError = status::Custom<Json<DeviceResponse>>;

fn failure(code: Status, message: impl Into<String>) -> DeviceError {
    status::Custom(
        code,
        Json(DeviceResponse {
            success: false,
            message: message.into(),
            sensor_id: None,
            power_state: None,
            gateway: None,
        }),
    )
}

fn require_user(auth: Result<AuthenticatedUser, ()>) -> Result<AuthenticatedUser, DeviceError> {
    auth.map_err(|_| failure(Status::Unauthorized, "Authentication required"))
}

fn require_body<T>(body: Result<LoggedJson<T>, json::Error<'_>>) -> Result<T, DeviceError> {
    body.map(LoggedJson::into_inner).map_err(|e| {
        warn!("Rejected device request body: {}", e);
        failure(Status::BadRequest, format!("Invalid request body: {}", e))
    })
}

fn require_state(value: Option<PowerStateValue>) -> Result<bool, DeviceError> {
    match value {
        Some(v) => v.as_bool().ok_or_else(|| {
            failure(Status::BadRequest, "powerState must be true/false, 1/0 or \"on\"/\"off\"")
        }),
        None => Err(failure(Status::BadRequest, "powerState is required")),
    }
}

fn state_word(state: bool) -> &'static str {
    if state { "on" } else { "off" }
}

/// Looks up the plug and runs the 404 / 403 / IMEI checks shared by every
/// device route.
async fn resolve_plug(
    db: &DbConn,
    auth_user: &AuthenticatedUser,
    sensor_id: i32,
    imei: Option<&str>,
) -> Result<PowerSensor, DeviceError> {
    let plug = db
        .run(move |conn| get_power_sensor_by_id(conn, sensor_id))
        .await
        .map_err(|e| {
            error!("Database error while fetching power sensor {}: {:?}", sensor_id, e);
            failure(Status::InternalServerError, "Database error while fetching power sensor")
        })?
        .ok_or_else(|| failure(Status::NotFound, "Power sensor not found"))?;

    if !auth_user.can_access_company(plug.company_id) {
        warn!(
            "User {} denied control of power sensor {} (company {})",
            auth_user.user.id, plug.id, plug.company_id
        );
        return Err(failure(Status::Forbidden, "Insufficient permissions to control this power sensor"));
    }

    if let Some(given) = imei {
        let given = normalize_imei(given).map_err(|e| failure(Status::BadRequest, e.to_string()))?;
        if given != plug.imei {
            return Err(failure(Status::BadRequest, "IMEI does not match power sensor"));
        }
    }
    Ok(plug)
}

/// Records the new state, then relays it. Shared by both switching routes.
async fn switch_plug(
    db: DbConn,
    gateway: &GatewayClient,
    auth: Result<AuthenticatedUser, ()>,
    body: Result<LoggedJson<PowerToggleRequest>, json::Error<'_>>,
) -> Result<Json<DeviceResponse>, DeviceError> {
    let auth_user = require_user(auth)?;
    let request = require_body(body)?;
    let sensor_id = request
        .sensor_id
        .ok_or_else(|| failure(Status::BadRequest, "sensorId is required"))?;
    let state = require_state(request.power_state)?;
    let plug = resolve_plug(&db, &auth_user, sensor_id, request.imei.as_deref()).await?;

    let user_id = auth_user.user.id;
    let change = db
        .run(move |conn| apply_power_state(conn, sensor_id, state, Some(user_id)))
        .await
        .map_err(|e| {
            error!("Database error while switching power sensor {}: {:?}", sensor_id, e);
            failure(Status::InternalServerError, "Failed to update power state")
        })?;
    info!(
        "User {} switched power sensor {} {} -> {}",
        user_id,
        sensor_id,
        state_word(change.audit.previous_state),
        state_word(change.audit.new_state)
    );

    let outcome = gateway.send_power_command(&plug.imei, state).await;
    let message = if outcome.delivered {
        format!("Power turned {}", state_word(state))
    } else {
        format!("Power state saved as {}; gateway not reached", state_word(state))
    };

    Ok(Json(DeviceResponse {
        success: true,
        message,
        sensor_id: Some(sensor_id),
        power_state: Some(change.status.power_state),
        gateway: Some(outcome),
    }))
}

/// Power Toggle endpoint.
///
/// - **URL:** `/api/device/power-toggle`
/// - **Method:** `POST`
/// - **Authentication:** Required; members of the plug's company or master
///
/// ```json
/// { "sensorId": 1, "powerState": true, "imei": "867206040000114" }
/// ```
///
/// `imei` is optional; when given it must match the plug. The stored state
/// is updated even when the gateway cannot be reached:
///
/// ```json
/// {
///   "success": true,
///   "message": "Power state saved as on; gateway not reached",
///   "sensorId": 1,
///   "powerState": true,
///   "gateway": { "delivered": false, "protocol": null, "attempts": 2, "error": "..." }
/// }
/// ```
#[post("/device/power-toggle", data = "<body>")]
pub async fn power_toggle(
    db: DbConn,
    gateway: &State<GatewayClient>,
    auth: Result<AuthenticatedUser, ()>,
    body: Result<LoggedJson<PowerToggleRequest>, json::Error<'_>>,
) -> Result<Json<DeviceResponse>, DeviceError> {
    switch_plug(db, gateway, auth, body).await
}

/// Same contract as [`power_toggle`]; kept for clients of the older path.
#[post("/device/power-toggle-auth", data = "<body>")]
pub async fn power_toggle_auth(
    db: DbConn,
    gateway: &State<GatewayClient>,
    auth: Result<AuthenticatedUser, ()>,
    body: Result<LoggedJson<PowerToggleRequest>, json::Error<'_>>,
) -> Result<Json<DeviceResponse>, DeviceError> {
    switch_plug(db, gateway, auth, body).await
}

/// Device Toggle endpoint.
///
/// - **URL:** `/api/device/toggle`
/// - **Method:** `POST`
/// - **Authentication:** Required
///
/// ```json
/// { "deviceId": 1, "powerState": "off" }
/// ```
///
/// Relays the command without touching the stored state. `success` mirrors
/// gateway delivery.
#[post("/device/toggle", data = "<body>")]
pub async fn device_toggle(
    db: DbConn,
    gateway: &State<GatewayClient>,
    auth: Result<AuthenticatedUser, ()>,
    body: Result<LoggedJson<DeviceToggleRequest>, json::Error<'_>>,
) -> Result<Json<DeviceResponse>, DeviceError> {
    let auth_user = require_user(auth)?;
    let request = require_body(body)?;
    let device_id = request
        .device_id
        .ok_or_else(|| failure(Status::BadRequest, "deviceId is required"))?;
    let state = require_state(request.power_state)?;
    let plug = resolve_plug(&db, &auth_user, device_id, request.imei.as_deref()).await?;

    let outcome = gateway.send_power_command(&plug.imei, state).await;
    let message = if outcome.delivered {
        format!("Command {} delivered", state_word(state))
    } else {
        "Gateway not reached".to_string()
    };
    Ok(Json(DeviceResponse {
        success: outcome.delivered,
        message,
        sensor_id: Some(device_id),
        power_state: Some(state),
        gateway: Some(outcome),
    }))
}

pub fn routes() -> Vec<Route> {
    routes![power_toggle, power_toggle_auth, device_toggle]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> PowerStateValue {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_power_state_forms() {
        assert_eq!(parse("true").as_bool(), Some(true));
        assert_eq!(parse("false").as_bool(), Some(false));
        assert_eq!(parse("1").as_bool(), Some(true));
        assert_eq!(parse("0").as_bool(), Some(false));
        assert_eq!(parse("\"ON\"").as_bool(), Some(true));
        assert_eq!(parse("\"off\"").as_bool(), Some(false));
    }

    #[test]
    fn test_power_state_rejects_other_values() {
        assert_eq!(parse("2").as_bool(), None);
        assert_eq!(parse("\"dim\"").as_bool(), None);
    }

    #[test]
    fn test_failure_body_omits_empty_fields() {
        let status::Custom(code, Json(body)) = failure(Status::NotFound, "Power sensor not found");
        assert_eq!(code, Status::NotFound);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "success": false, "message": "Power sensor not found" })
        );
    }
}
