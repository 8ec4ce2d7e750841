//! Bulk sensor registration from CSV.
//!
//! The header row must name `name` and `imei`; `sensor_type`, `latitude`,
//! `longitude` and `folder_id` are optional and column order is free. Rows are
//! validated one by one; the valid ones are inserted together.

use std::collections::{HashMap, HashSet};

use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::imei::{ImeiError, normalize_imei};
use crate::models::{NewSensor, SensorStatus};
use crate::orm::folder::get_folders_by_company;
use crate::orm::sensor::{DEFAULT_SENSOR_TYPE, existing_sensor_imeis, insert_sensors_batch};

/// Failure of the import as a whole; nothing was written.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV header must include a '{0}' column")]
    MissingColumn(&'static str),
    #[error("CSV file has no header row")]
    Empty,
    #[error("CSV header repeats the '{0}' column")]
    DuplicateColumn(String),
    #[error("unreadable CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

/// Why a single row was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("name is required")]
    MissingName,
    #[error(transparent)]
    Imei(#[from] ImeiError),
    #[error("{column} '{value}' is not a valid number")]
    InvalidNumber { column: &'static str, value: String },
    #[error("{column} {value} is out of range")]
    OutOfRange { column: &'static str, value: f64 },
    #[error("folder {0} does not exist in this company")]
    UnknownFolder(i32),
    #[error("malformed row: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportRowError {
    pub line: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_duplicates: usize,
    pub errors: Vec<ImportRowError>,
}

/// A row that passed validation, before duplicate screening.
#[derive(Debug, Clone)]
pub struct CsvSensorRow {
    pub line: u64,
    pub name: String,
    pub imei: String,
    pub sensor_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub folder_id: Option<i32>,
}

struct Columns {
    name: usize,
    imei: usize,
    sensor_type: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    folder_id: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ImportError> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(ImportError::Empty);
        }
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            let header = header.trim().to_ascii_lowercase();
            if header.is_empty() {
                continue;
            }
            if index.insert(header.clone(), i).is_some() {
                return Err(ImportError::DuplicateColumn(header));
            }
        }
        Ok(Columns {
            name: *index.get("name").ok_or(ImportError::MissingColumn("name"))?,
            imei: *index.get("imei").ok_or(ImportError::MissingColumn("imei"))?,
            sensor_type: index.get("sensor_type").copied(),
            latitude: index.get("latitude").copied(),
            longitude: index.get("longitude").copied(),
            folder_id: index.get("folder_id").copied(),
        })
    }
}

fn cell(record: &csv::StringRecord, column: Option<usize>) -> Option<&str> {
    column
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_coordinate(
    record: &csv::StringRecord,
    column: Option<usize>,
    name: &'static str,
    limit: f64,
) -> Result<Option<f64>, RowError> {
    let Some(raw) = cell(record, column) else {
        return Ok(None);
    };
    let value: f64 = raw.parse().map_err(|_| RowError::InvalidNumber {
        column: name,
        value: raw.to_string(),
    })?;
    if !value.is_finite() || value.abs() > limit {
        return Err(RowError::OutOfRange { column: name, value });
    }
    Ok(Some(value))
}

fn parse_row(record: &csv::StringRecord, columns: &Columns, line: u64) -> Result<CsvSensorRow, RowError> {
    let name = cell(record, Some(columns.name)).ok_or(RowError::MissingName)?;
    let imei = normalize_imei(record.get(columns.imei).unwrap_or(""))?;
    let folder_id = match cell(record, columns.folder_id) {
        Some(raw) => Some(raw.parse::<i32>().map_err(|_| RowError::InvalidNumber {
            column: "folder_id",
            value: raw.to_string(),
        })?),
        None => None,
    };

    Ok(CsvSensorRow {
        line,
        name: name.to_string(),
        imei,
        sensor_type: cell(record, columns.sensor_type).map(str::to_string),
        latitude: parse_coordinate(record, columns.latitude, "latitude", 90.0)?,
        longitude: parse_coordinate(record, columns.longitude, "longitude", 180.0)?,
        folder_id,
    })
}

/// Parses and validates every row without touching the database.
/// Returns the valid rows and the per-line errors.
pub fn parse_sensor_csv(data: &str) -> Result<(Vec<CsvSensorRow>, Vec<ImportRowError>), ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                errors.push(ImportRowError {
                    line,
                    message: RowError::Malformed(e.to_string()).to_string(),
                });
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        match parse_row(&record, &columns, line) {
            Ok(row) => rows.push(row),
            Err(e) => errors.push(ImportRowError {
                line,
                message: e.to_string(),
            }),
        }
    }
    Ok((rows, errors))
}

/// Imports sensors into `company_id`. Rows whose IMEI is already registered,
/// or repeats an earlier row of the same file, are skipped and counted.
pub fn import_sensors_csv(
    conn: &mut SqliteConnection,
    company_id: i32,
    data: &str,
) -> Result<ImportReport, ImportError> {
    let (rows, mut errors) = parse_sensor_csv(data)?;

    let candidates: Vec<String> = rows.iter().map(|r| r.imei.clone()).collect();
    let registered = existing_sensor_imeis(conn, &candidates)?;
    let folders: HashSet<i32> = get_folders_by_company(conn, company_id)?
        .into_iter()
        .map(|f| f.id)
        .collect();

    let mut seen = HashSet::new();
    let mut skipped_duplicates = 0;
    let mut batch = Vec::new();
    for row in rows {
        if let Some(folder) = row.folder_id {
            if !folders.contains(&folder) {
                errors.push(ImportRowError {
                    line: row.line,
                    message: RowError::UnknownFolder(folder).to_string(),
                });
                continue;
            }
        }
        // Only accepted rows claim their IMEI.
        if registered.contains(&row.imei) || !seen.insert(row.imei.clone()) {
            skipped_duplicates += 1;
            continue;
        }
        batch.push(NewSensor {
            name: row.name,
            imei: row.imei,
            sensor_type: row
                .sensor_type
                .unwrap_or_else(|| DEFAULT_SENSOR_TYPE.to_string()),
            status: SensorStatus::Offline.as_str().to_string(),
            latitude: row.latitude,
            longitude: row.longitude,
            battery_level: None,
            folder_id: row.folder_id,
            company_id,
        });
    }

    let imported = insert_sensors_batch(conn, batch)?;
    errors.sort_by_key(|e| e.line);
    info!(
        "CSV import for company {}: {} imported, {} duplicates skipped, {} rejected",
        company_id,
        imported,
        skipped_duplicates,
        errors.len()
    );

    Ok(ImportReport {
        imported,
        skipped_duplicates,
        errors,
    })
}
