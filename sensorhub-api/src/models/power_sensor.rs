use std::fmt;

use chrono::NaiveDateTime;
use diesel::{Associations, Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::{power_audit_log, power_sensors, power_status};

/// A remotely switchable smart plug.
#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, Serialize, Deserialize, TS,
)]
#[diesel(belongs_to(crate::models::company::Company))]
#[diesel(belongs_to(crate::models::folder::Folder))]
#[diesel(table_name = power_sensors)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct PowerSensor {
    pub id: i32,
    pub name: String,
    pub imei: String,
    pub location: Option<String>,
    pub folder_id: Option<i32>,
    pub company_id: i32,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
    #[ts(type = "string")]
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = power_sensors)]
pub struct NewPowerSensor {
    pub name: String,
    pub imei: String,
    pub location: Option<String>,
    pub folder_id: Option<i32>,
    pub company_id: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct PowerSensorInput {
    pub name: String,
    pub imei: String,
    pub location: Option<String>,
    pub folder_id: Option<i32>,
    pub company_id: i32,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone, Serialize, Deserialize, TS)]
#[diesel(belongs_to(PowerSensor))]
#[diesel(table_name = power_status)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct PowerStatus {
    pub id: i32,
    pub power_sensor_id: i32,
    pub power_state: bool,
    #[ts(type = "string")]
    pub updated_at: NaiveDateTime,
    pub updated_by: Option<i32>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = power_status)]
pub struct NewPowerStatus {
    pub power_sensor_id: i32,
    pub power_state: bool,
    pub updated_by: Option<i32>,
}

/// Direction of a recorded toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PowerAction {
    PowerOn,
    PowerOff,
}

impl PowerAction {
    pub fn for_state(power_state: bool) -> Self {
        if power_state {
            PowerAction::PowerOn
        } else {
            PowerAction::PowerOff
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerAction::PowerOn => "power_on",
            PowerAction::PowerOff => "power_off",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone, Serialize, Deserialize, TS)]
#[diesel(belongs_to(PowerSensor))]
#[diesel(table_name = power_audit_log)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct PowerAuditEntry {
    pub id: i32,
    pub power_sensor_id: i32,
    pub user_id: Option<i32>,
    pub action: String,
    pub previous_state: bool,
    pub new_state: bool,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = power_audit_log)]
pub struct NewPowerAuditEntry {
    pub power_sensor_id: i32,
    pub user_id: Option<i32>,
    pub action: String,
    pub previous_state: bool,
    pub new_state: bool,
}

/// A plug joined with its current switch state.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PowerSensorWithStatus {
    #[serde(flatten)]
    pub sensor: PowerSensor,
    pub power_state: bool,
    #[ts(type = "string | null")]
    pub status_updated_at: Option<NaiveDateTime>,
}
