use std::collections::HashSet;

use diesel::prelude::*;

use crate::models::{NewSensor, Sensor, SensorChanges, SensorInput, SensorStatus};
use crate::orm::last_insert_id;

/// Default `sensor_type` for rows created without one.
pub const DEFAULT_SENSOR_TYPE: &str = "generic";

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::sensors)]
struct SensorChangeset {
    name: Option<String>,
    sensor_type: Option<String>,
    status: Option<String>,
    latitude: Option<Option<f64>>,
    longitude: Option<Option<f64>>,
    battery_level: Option<Option<i32>>,
    last_seen: Option<Option<chrono::NaiveDateTime>>,
    folder_id: Option<Option<i32>>,
    updated_at: chrono::NaiveDateTime,
}

impl From<SensorInput> for NewSensor {
    fn from(input: SensorInput) -> Self {
        NewSensor {
            name: input.name,
            imei: input.imei,
            sensor_type: input
                .sensor_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SENSOR_TYPE.to_string()),
            status: input.status.unwrap_or(SensorStatus::Offline).as_str().to_string(),
            latitude: input.latitude,
            longitude: input.longitude,
            battery_level: input.battery_level,
            folder_id: input.folder_id,
            company_id: input.company_id,
        }
    }
}

/// Inserts a sensor. The IMEI is stored as given; callers normalize it.
pub fn insert_sensor(
    conn: &mut SqliteConnection,
    input: SensorInput,
) -> Result<Sensor, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;

    let new_sensor = NewSensor::from(input);
    diesel::insert_into(sensors).values(&new_sensor).execute(conn)?;
    let last_id = last_insert_id(conn)?;

    sensors.filter(id.eq(last_id)).select(Sensor::as_select()).first(conn)
}

/// Inserts many sensors in one transaction; either all land or none do.
pub fn insert_sensors_batch(
    conn: &mut SqliteConnection,
    batch: Vec<NewSensor>,
) -> Result<usize, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;

    if batch.is_empty() {
        return Ok(0);
    }
    conn.transaction(|conn| diesel::insert_into(sensors).values(&batch).execute(conn))
}

pub fn get_sensor_by_id(
    conn: &mut SqliteConnection,
    sensor_id: i32,
) -> Result<Option<Sensor>, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;
    sensors
        .filter(id.eq(sensor_id))
        .select(Sensor::as_select())
        .first(conn)
        .optional()
}

pub fn get_sensor_by_imei(
    conn: &mut SqliteConnection,
    sensor_imei: &str,
) -> Result<Option<Sensor>, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;
    sensors
        .filter(imei.eq(sensor_imei))
        .select(Sensor::as_select())
        .first(conn)
        .optional()
}

/// Returns which of the given IMEIs are already registered as sensors.
pub fn existing_sensor_imeis(
    conn: &mut SqliteConnection,
    candidates: &[String],
) -> Result<HashSet<String>, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;

    if candidates.is_empty() {
        return Ok(HashSet::new());
    }
    let mut found = HashSet::new();
    // Stay well below SQLite's bound-parameter limit.
    for chunk in candidates.chunks(500) {
        let rows: Vec<String> = sensors.filter(imei.eq_any(chunk)).select(imei).load(conn)?;
        found.extend(rows);
    }
    Ok(found)
}

pub fn get_all_sensors(conn: &mut SqliteConnection) -> Result<Vec<Sensor>, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;
    sensors.order(id.asc()).select(Sensor::as_select()).load(conn)
}

pub fn get_sensors_by_company(
    conn: &mut SqliteConnection,
    comp_id: i32,
) -> Result<Vec<Sensor>, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;
    sensors
        .filter(company_id.eq(comp_id))
        .order(id.asc())
        .select(Sensor::as_select())
        .load(conn)
}

pub fn get_sensors_by_folder(
    conn: &mut SqliteConnection,
    folder: i32,
) -> Result<Vec<Sensor>, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;
    sensors
        .filter(folder_id.eq(folder))
        .order(id.asc())
        .select(Sensor::as_select())
        .load(conn)
}

/// Applies a partial update. Returns Ok(None) when the sensor does not exist.
pub fn update_sensor(
    conn: &mut SqliteConnection,
    sensor_id: i32,
    changes: SensorChanges,
) -> Result<Option<Sensor>, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;

    let changeset = SensorChangeset {
        name: changes.name,
        sensor_type: changes.sensor_type,
        status: changes.status.map(|s| s.as_str().to_string()),
        latitude: changes.latitude,
        longitude: changes.longitude,
        battery_level: changes.battery_level,
        last_seen: changes.last_seen,
        folder_id: changes.folder_id,
        updated_at: chrono::Utc::now().naive_utc(),
    };

    let rows = diesel::update(sensors.filter(id.eq(sensor_id)))
        .set(&changeset)
        .execute(conn)?;
    if rows == 0 {
        return Ok(None);
    }
    get_sensor_by_id(conn, sensor_id)
}

/// Returns Ok(true) if the sensor existed.
pub fn delete_sensor(conn: &mut SqliteConnection, sensor_id: i32) -> Result<bool, diesel::result::Error> {
    use crate::schema::sensors::dsl::*;
    let rows = diesel::delete(sensors.filter(id.eq(sensor_id))).execute(conn)?;
    Ok(rows > 0)
}
