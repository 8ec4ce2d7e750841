//! Smart plug rows, their switch state and the append-only audit trail.
//!
//! Every plug owns exactly one `power_status` row, created alongside the plug
//! in [`insert_power_sensor`]. State changes go through [`apply_power_state`],
//! which writes the status and its audit entry in a single transaction.

use std::collections::HashSet;

use diesel::prelude::*;

use crate::models::{
    NewPowerAuditEntry, NewPowerSensor, NewPowerStatus, PowerAction, PowerAuditEntry, PowerSensor,
    PowerSensorInput, PowerSensorWithStatus, PowerStatus,
};
use crate::orm::last_insert_id;
use crate::schema::{power_audit_log, power_sensors, power_status};

#[derive(Debug, Default)]
pub struct PowerSensorChanges {
    pub name: Option<String>,
    pub location: Option<Option<String>>,
    pub folder_id: Option<Option<i32>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = power_sensors)]
struct PowerSensorChangeset {
    name: Option<String>,
    location: Option<Option<String>>,
    folder_id: Option<Option<i32>>,
    updated_at: chrono::NaiveDateTime,
}

/// Result of a recorded state change.
#[derive(Debug, Clone)]
pub struct PowerStateChange {
    pub status: PowerStatus,
    pub audit: PowerAuditEntry,
}

/// Inserts a plug together with its initial (off) status row.
pub fn insert_power_sensor(
    conn: &mut SqliteConnection,
    input: PowerSensorInput,
) -> Result<PowerSensor, diesel::result::Error> {
    conn.transaction(|conn| {
        let new_sensor = NewPowerSensor {
            name: input.name,
            imei: input.imei,
            location: input.location,
            folder_id: input.folder_id,
            company_id: input.company_id,
        };
        diesel::insert_into(power_sensors::table)
            .values(&new_sensor)
            .execute(conn)?;
        let sensor_id = last_insert_id(conn)?;

        diesel::insert_into(power_status::table)
            .values(&NewPowerStatus {
                power_sensor_id: sensor_id,
                power_state: false,
                updated_by: None,
            })
            .execute(conn)?;

        power_sensors::table
            .filter(power_sensors::id.eq(sensor_id))
            .select(PowerSensor::as_select())
            .first(conn)
    })
}

pub fn get_power_sensor_by_id(
    conn: &mut SqliteConnection,
    sensor_id: i32,
) -> Result<Option<PowerSensor>, diesel::result::Error> {
    power_sensors::table
        .filter(power_sensors::id.eq(sensor_id))
        .select(PowerSensor::as_select())
        .first(conn)
        .optional()
}

pub fn get_power_sensor_by_imei(
    conn: &mut SqliteConnection,
    sensor_imei: &str,
) -> Result<Option<PowerSensor>, diesel::result::Error> {
    power_sensors::table
        .filter(power_sensors::imei.eq(sensor_imei))
        .select(PowerSensor::as_select())
        .first(conn)
        .optional()
}

/// Returns which of the given IMEIs are already registered as plugs.
pub fn existing_power_sensor_imeis(
    conn: &mut SqliteConnection,
    candidates: &[String],
) -> Result<HashSet<String>, diesel::result::Error> {
    let mut found = HashSet::new();
    for chunk in candidates.chunks(500) {
        let rows: Vec<String> = power_sensors::table
            .filter(power_sensors::imei.eq_any(chunk))
            .select(power_sensors::imei)
            .load(conn)?;
        found.extend(rows);
    }
    Ok(found)
}

pub fn get_all_power_sensors(
    conn: &mut SqliteConnection,
) -> Result<Vec<PowerSensor>, diesel::result::Error> {
    power_sensors::table
        .order(power_sensors::id.asc())
        .select(PowerSensor::as_select())
        .load(conn)
}

pub fn get_power_sensors_by_company(
    conn: &mut SqliteConnection,
    comp_id: i32,
) -> Result<Vec<PowerSensor>, diesel::result::Error> {
    power_sensors::table
        .filter(power_sensors::company_id.eq(comp_id))
        .order(power_sensors::id.asc())
        .select(PowerSensor::as_select())
        .load(conn)
}

pub fn get_power_sensors_by_folder(
    conn: &mut SqliteConnection,
    folder: i32,
) -> Result<Vec<PowerSensor>, diesel::result::Error> {
    power_sensors::table
        .filter(power_sensors::folder_id.eq(folder))
        .order(power_sensors::id.asc())
        .select(PowerSensor::as_select())
        .load(conn)
}

/// Joins each plug with its current state. A plug without a status row
/// reports off.
pub fn with_status(
    conn: &mut SqliteConnection,
    sensors: Vec<PowerSensor>,
) -> Result<Vec<PowerSensorWithStatus>, diesel::result::Error> {
    let ids: Vec<i32> = sensors.iter().map(|s| s.id).collect();
    let statuses: Vec<PowerStatus> = power_status::table
        .filter(power_status::power_sensor_id.eq_any(&ids))
        .select(PowerStatus::as_select())
        .load(conn)?;

    Ok(sensors
        .into_iter()
        .map(|sensor| {
            let status = statuses.iter().find(|s| s.power_sensor_id == sensor.id);
            PowerSensorWithStatus {
                power_state: status.map(|s| s.power_state).unwrap_or(false),
                status_updated_at: status.map(|s| s.updated_at),
                sensor,
            }
        })
        .collect())
}

pub fn get_power_status(
    conn: &mut SqliteConnection,
    sensor_id: i32,
) -> Result<Option<PowerStatus>, diesel::result::Error> {
    power_status::table
        .filter(power_status::power_sensor_id.eq(sensor_id))
        .select(PowerStatus::as_select())
        .first(conn)
        .optional()
}

/// Audit entries for one plug, newest first.
pub fn get_audit_log(
    conn: &mut SqliteConnection,
    sensor_id: i32,
    limit: Option<i64>,
) -> Result<Vec<PowerAuditEntry>, diesel::result::Error> {
    let mut query = power_audit_log::table
        .filter(power_audit_log::power_sensor_id.eq(sensor_id))
        .order((power_audit_log::created_at.desc(), power_audit_log::id.desc()))
        .select(PowerAuditEntry::as_select())
        .into_boxed();
    if let Some(n) = limit {
        query = query.limit(n);
    }
    query.load(conn)
}

/// Records a switch command: upserts the plug's status row and appends one
/// audit entry carrying the previous and new state. Both writes commit or
/// neither does. Repeating the current state still produces an audit entry.
pub fn apply_power_state(
    conn: &mut SqliteConnection,
    sensor_id: i32,
    new_state: bool,
    acting_user: Option<i32>,
) -> Result<PowerStateChange, diesel::result::Error> {
    conn.transaction(|conn| {
        let now = chrono::Utc::now().naive_utc();
        let previous = get_power_status(conn, sensor_id)?;
        let previous_state = previous.as_ref().map(|s| s.power_state).unwrap_or(false);

        match previous {
            Some(row) => {
                diesel::update(power_status::table.filter(power_status::id.eq(row.id)))
                    .set((
                        power_status::power_state.eq(new_state),
                        power_status::updated_at.eq(now),
                        power_status::updated_by.eq(acting_user),
                    ))
                    .execute(conn)?;
            }
            None => {
                diesel::insert_into(power_status::table)
                    .values(&NewPowerStatus {
                        power_sensor_id: sensor_id,
                        power_state: new_state,
                        updated_by: acting_user,
                    })
                    .execute(conn)?;
            }
        }

        diesel::insert_into(power_audit_log::table)
            .values(&NewPowerAuditEntry {
                power_sensor_id: sensor_id,
                user_id: acting_user,
                action: PowerAction::for_state(new_state).as_str().to_string(),
                previous_state,
                new_state,
            })
            .execute(conn)?;
        let audit_id = last_insert_id(conn)?;

        let status = power_status::table
            .filter(power_status::power_sensor_id.eq(sensor_id))
            .select(PowerStatus::as_select())
            .first(conn)?;
        let audit = power_audit_log::table
            .filter(power_audit_log::id.eq(audit_id))
            .select(PowerAuditEntry::as_select())
            .first(conn)?;

        Ok(PowerStateChange { status, audit })
    })
}

/// Applies a partial update. Returns Ok(None) when the plug does not exist.
pub fn update_power_sensor(
    conn: &mut SqliteConnection,
    sensor_id: i32,
    changes: PowerSensorChanges,
) -> Result<Option<PowerSensor>, diesel::result::Error> {
    let changeset = PowerSensorChangeset {
        name: changes.name,
        location: changes.location,
        folder_id: changes.folder_id,
        updated_at: chrono::Utc::now().naive_utc(),
    };

    let rows = diesel::update(power_sensors::table.filter(power_sensors::id.eq(sensor_id)))
        .set(&changeset)
        .execute(conn)?;
    if rows == 0 {
        return Ok(None);
    }
    get_power_sensor_by_id(conn, sensor_id)
}

/// Deletes a plug together with its status row and audit entries.
/// Returns Ok(true) if the plug existed.
pub fn delete_power_sensor(
    conn: &mut SqliteConnection,
    sensor_id: i32,
) -> Result<bool, diesel::result::Error> {
    conn.transaction(|conn| {
        diesel::delete(power_status::table.filter(power_status::power_sensor_id.eq(sensor_id)))
            .execute(conn)?;
        diesel::delete(
            power_audit_log::table.filter(power_audit_log::power_sensor_id.eq(sensor_id)),
        )
        .execute(conn)?;
        let rows = diesel::delete(power_sensors::table.filter(power_sensors::id.eq(sensor_id)))
            .execute(conn)?;
        Ok(rows > 0)
    })
}
