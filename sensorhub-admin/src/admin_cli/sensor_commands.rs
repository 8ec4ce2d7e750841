use std::path::PathBuf;

use clap::Subcommand;
use diesel::sqlite::SqliteConnection;
use sensorhub_api::csv_import::import_sensors_csv;
use sensorhub_api::imei::normalize_imei;
use sensorhub_api::models::{SensorInput, SensorStatus};
use sensorhub_api::orm::{
    folder::get_folder_by_id,
    sensor::{delete_sensor, get_all_sensors, get_sensor_by_imei, get_sensors_by_company, insert_sensor},
};

use super::utils::{confirm, filter_by_term, resolve_company_id};

#[derive(Subcommand)]
pub enum SensorAction {
    #[command(about = "List sensors, optionally filtered by search term on name or IMEI")]
    Ls {
        #[arg(help = "Search term (regex by default, use -F for fixed string)")]
        search_term: Option<String>,
        #[arg(
            short = 'F',
            long = "fixed-string",
            help = "Treat search term as fixed string instead of regex"
        )]
        fixed_string: bool,
        #[arg(short, long, help = "Only sensors of this company (ID or name)")]
        company: Option<String>,
    },
    #[command(about = "Register a sensor")]
    Add {
        #[arg(short, long, help = "Sensor name")]
        name: String,
        #[arg(short, long, help = "15-digit IMEI; spaces and dashes are ignored")]
        imei: String,
        #[arg(short, long, help = "Company ID or name")]
        company: String,
        #[arg(short = 't', long = "type", help = "Sensor type, e.g. gps")]
        sensor_type: Option<String>,
        #[arg(long, help = "Folder ID")]
        folder: Option<i32>,
    },
    #[command(about = "Import sensors from a CSV file")]
    Import {
        #[arg(help = "CSV file with at least name and imei columns")]
        file: PathBuf,
        #[arg(short, long, help = "Company ID or name")]
        company: String,
    },
    #[command(about = "Remove sensors matching search term on name or IMEI")]
    Rm {
        #[arg(help = "Search term (regex by default, use -F for fixed string)")]
        search_term: String,
        #[arg(
            short = 'F',
            long = "fixed-string",
            help = "Treat search term as fixed string instead of regex"
        )]
        fixed_string: bool,
        #[arg(short = 'y', long = "yes", help = "Skip confirmation prompt")]
        yes: bool,
    },
}

pub fn handle_sensor_command_with_conn(
    conn: &mut SqliteConnection,
    action: SensorAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SensorAction::Ls {
            search_term,
            fixed_string,
            company,
        } => {
            sensor_ls_impl(conn, search_term, fixed_string, company)?;
        }
        SensorAction::Add {
            name,
            imei,
            company,
            sensor_type,
            folder,
        } => {
            sensor_add_impl(conn, name, &imei, &company, sensor_type, folder)?;
        }
        SensorAction::Import { file, company } => {
            let data = std::fs::read_to_string(&file)
                .map_err(|e| format!("Cannot read {}: {}", file.display(), e))?;
            sensor_import_impl(conn, &data, &company)?;
        }
        SensorAction::Rm {
            search_term,
            fixed_string,
            yes,
        } => {
            sensor_rm_impl(conn, search_term, fixed_string, yes)?;
        }
    }
    Ok(())
}

fn label(name: &str, imei: &str) -> String {
    format!("{} {}", name, imei)
}

pub fn sensor_ls_impl(
    conn: &mut SqliteConnection,
    search_term: Option<String>,
    fixed_string: bool,
    company: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let sensors = match company {
        Some(c) => {
            let company_id = resolve_company_id(conn, &c)?;
            get_sensors_by_company(conn, company_id)?
        }
        None => get_all_sensors(conn)?,
    };
    let sensors = filter_by_term(sensors, search_term.as_deref(), fixed_string, |s| label(&s.name, &s.imei))?;

    if sensors.is_empty() {
        println!("No sensors found.");
        return Ok(());
    }
    println!("Sensors:");
    for s in sensors {
        let position = match (s.latitude, s.longitude) {
            (Some(lat), Some(lng)) => format!("{:.5},{:.5}", lat, lng),
            _ => "-".to_string(),
        };
        println!(
            "  ID: {}, Name: {}, IMEI: {}, Type: {}, Status: {}, Company ID: {}, Folder: {}, Position: {}",
            s.id,
            s.name,
            s.imei,
            s.sensor_type,
            s.status,
            s.company_id,
            s.folder_id.map(|f| f.to_string()).unwrap_or_else(|| "-".to_string()),
            position
        );
    }
    Ok(())
}

pub fn sensor_add_impl(
    conn: &mut SqliteConnection,
    name: String,
    imei: &str,
    company: &str,
    sensor_type: Option<String>,
    folder: Option<i32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err("Sensor name must not be empty".into());
    }
    let imei = normalize_imei(imei)?;
    let company_id = resolve_company_id(conn, company)?;
    if let Some(folder_id) = folder {
        match get_folder_by_id(conn, folder_id)? {
            Some(f) if f.company_id == company_id => {}
            Some(_) => return Err(format!("Folder {} belongs to another company", folder_id).into()),
            None => return Err(format!("Folder {} does not exist", folder_id).into()),
        }
    }
    if let Some(existing) = get_sensor_by_imei(conn, &imei)? {
        return Err(format!("IMEI {} is already registered as sensor {} ({})", imei, existing.id, existing.name).into());
    }

    let sensor = insert_sensor(
        conn,
        SensorInput {
            name,
            imei,
            sensor_type,
            status: Some(SensorStatus::Offline),
            latitude: None,
            longitude: None,
            battery_level: None,
            folder_id: folder,
            company_id,
        },
    )?;
    println!("Sensor created successfully!");
    println!("ID: {}", sensor.id);
    println!("Name: {}", sensor.name);
    println!("IMEI: {}", sensor.imei);
    Ok(())
}

pub fn sensor_import_impl(
    conn: &mut SqliteConnection,
    data: &str,
    company: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let company_id = resolve_company_id(conn, company)?;
    let report = import_sensors_csv(conn, company_id, data)?;

    println!("Imported: {}", report.imported);
    println!("Skipped duplicates: {}", report.skipped_duplicates);
    if !report.errors.is_empty() {
        println!("Rejected rows:");
        for e in &report.errors {
            println!("  line {}: {}", e.line, e.message);
        }
    }
    Ok(())
}

pub fn sensor_rm_impl(
    conn: &mut SqliteConnection,
    search_term: String,
    fixed_string: bool,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let matching = filter_by_term(get_all_sensors(conn)?, Some(&search_term), fixed_string, |s| {
        label(&s.name, &s.imei)
    })?;

    if matching.is_empty() {
        println!("No sensors found matching the search term.");
        return Ok(());
    }
    println!("Found {} sensor(s) matching the search term:", matching.len());
    for s in &matching {
        println!("  ID: {}, Name: {}, IMEI: {}, Company ID: {}", s.id, s.name, s.imei, s.company_id);
    }

    if !yes && !confirm(&format!("Are you sure you want to delete these {} sensor(s)?", matching.len()))? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let mut deleted_count = 0;
    for s in matching {
        if delete_sensor(conn, s.id)? {
            deleted_count += 1;
            println!("Deleted sensor: {} (ID: {})", s.name, s.id);
        }
    }
    println!("Successfully deleted {} sensor(s).", deleted_count);
    Ok(())
}
