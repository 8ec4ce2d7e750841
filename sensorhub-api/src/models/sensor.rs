use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::{Associations, Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::sensors;

/// Connectivity state reported for a tracking sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SensorStatus {
    Online,
    Offline,
    Warning,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Online => "online",
            SensorStatus::Offline => "offline",
            SensorStatus::Warning => "warning",
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(SensorStatus::Online),
            "offline" => Ok(SensorStatus::Offline),
            "warning" => Ok(SensorStatus::Warning),
            other => Err(format!("unknown sensor status '{}'", other)),
        }
    }
}

#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, Serialize, Deserialize, TS,
)]
#[diesel(belongs_to(crate::models::company::Company))]
#[diesel(belongs_to(crate::models::folder::Folder))]
#[diesel(table_name = sensors)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Sensor {
    pub id: i32,
    pub name: String,
    pub imei: String,
    pub sensor_type: String,
    pub status: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub battery_level: Option<i32>,
    #[ts(type = "string | null")]
    pub last_seen: Option<NaiveDateTime>,
    pub folder_id: Option<i32>,
    pub company_id: i32,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
    #[ts(type = "string")]
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = sensors)]
pub struct NewSensor {
    pub name: String,
    pub imei: String,
    pub sensor_type: String,
    pub status: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub battery_level: Option<i32>,
    pub folder_id: Option<i32>,
    pub company_id: i32,
}

// For API inputs and validation
#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct SensorInput {
    pub name: String,
    pub imei: String,
    pub sensor_type: Option<String>, // Defaults to "generic"
    pub status: Option<SensorStatus>, // Defaults to offline
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub battery_level: Option<i32>,
    pub folder_id: Option<i32>,
    pub company_id: i32,
}

/// Partial update; `Some(None)` on a nullable field clears it.
#[derive(Debug, Default, Clone)]
pub struct SensorChanges {
    pub name: Option<String>,
    pub sensor_type: Option<String>,
    pub status: Option<SensorStatus>,
    pub latitude: Option<Option<f64>>,
    pub longitude: Option<Option<f64>>,
    pub battery_level: Option<Option<i32>>,
    pub last_seen: Option<Option<NaiveDateTime>>,
    pub folder_id: Option<Option<i32>>,
}
