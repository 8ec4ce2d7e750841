//! Test scaffolding shared by unit tests and the integration tests under
//! `tests/`: in-memory databases, a seeded Rocket instance and throwaway
//! gateway servers.

use std::sync::{Arc, Mutex};

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use rocket::figment::{
    util::map,
    value::{Map, Value},
};
use rocket::{Build, Rocket, fairing::AdHoc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::db::{DbConn, run_pending_migrations, set_foreign_keys};
use crate::admin_init_fairing::admin_init_fairing;
use crate::gateway::{GatewayConfig, gateway_fairing};
use crate::models::{
    Company, CompanyInput, FolderInput, PowerSensorInput, ProductInput, SensorInput, SensorStatus,
    UserInput, UserStatus,
};
use crate::orm::company::{get_company_by_name, insert_company};
use crate::orm::folder::insert_folder;
use crate::orm::login::hash_password;
use crate::orm::power_sensor::insert_power_sensor;
use crate::orm::product::insert_product;
use crate::orm::sensor::insert_sensor;
use crate::orm::user::{UserChanges, get_user_by_email, insert_user, update_user};
use crate::orm::user_role::assign_user_role_by_name;

/// Configures SQLite with speed-over-durability settings. Tests only.
fn set_sqlite_test_pragmas(conn: &mut SqliteConnection) {
    conn.batch_execute(
        r#"
        PRAGMA synchronous = OFF;
        PRAGMA journal_mode = OFF;
        "#,
    )
    .expect("Failed to set SQLite PRAGMAs");
}

fn set_sqlite_test_pragmas_fairing() -> AdHoc {
    AdHoc::on_ignite("Set SQLite Test Pragmas", |rocket| async {
        let conn = DbConn::get_one(&rocket)
            .await
            .expect("database connection for test pragmas");
        conn.run(|c| {
            set_sqlite_test_pragmas(c);
        })
        .await;
        rocket
    })
}

/// Seeds the companies, users, folders, devices and products the
/// integration tests rely on.
fn test_data_init_fairing() -> AdHoc {
    AdHoc::on_ignite("Test Data Initialization", |rocket| async {
        let conn = DbConn::get_one(&rocket)
            .await
            .expect("database connection for test data initialization");

        conn.run(|c| {
            if let Err(e) = create_test_data(c) {
                eprintln!("[test-data-init] ERROR: Failed to create test data: {:?}", e);
            }
        })
        .await;

        rocket
    })
}

/// Standard fixture.
///
/// | company | users (password) | folders | sensors | plugs |
/// |---|---|---|---|---|
/// | Acme Farms | admin@acme.com (adminpass, admin), user@acme.com (userpass, user), inactive@acme.com (userpass, user, inactive) | North Field > Barn A | Tractor Tracker 356938035643809, Cow Collar 490154203237518 | Pump Plug 867206040000114, Heater Plug 867206040000221 |
/// | Globex Logistics | admin@globex.com (adminpass, admin), user@globex.com (userpass, user) | Warehouse 1 | Pallet Tracker 860914040012347 | Dock Plug 867206040000338 |
/// | Removable LLC | none | | | |
///
/// Products: Tracker T1 (TRK-T1, 4999), Smart Plug P1 (PLG-P1, 1999),
/// Legacy Beacon (LEG-B0, 999, inactive).
pub fn create_test_data(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    let acme = find_or_create_company(conn, "Acme Farms")?;
    let globex = find_or_create_company(conn, "Globex Logistics")?;
    find_or_create_company(conn, "Removable LLC")?;

    create_test_user(conn, "admin@acme.com", "adminpass", acme.id, "admin")?;
    create_test_user(conn, "user@acme.com", "userpass", acme.id, "user")?;
    let inactive = create_test_user(conn, "inactive@acme.com", "userpass", acme.id, "user")?;
    update_user(
        conn,
        inactive,
        UserChanges {
            status: Some(UserStatus::Inactive),
            ..Default::default()
        },
    )?;
    create_test_user(conn, "admin@globex.com", "adminpass", globex.id, "admin")?;
    create_test_user(conn, "user@globex.com", "userpass", globex.id, "user")?;

    let north_field = insert_folder(
        conn,
        folder_input("North Field", acme.id, None, Some((52.10, 5.10))),
    )?;
    let barn = insert_folder(
        conn,
        folder_input("Barn A", acme.id, Some(north_field.id), Some((52.20, 5.20))),
    )?;
    let warehouse = insert_folder(
        conn,
        folder_input("Warehouse 1", globex.id, None, Some((40.70, -74.00))),
    )?;

    insert_sensor(
        conn,
        SensorInput {
            name: "Tractor Tracker".to_string(),
            imei: "356938035643809".to_string(),
            sensor_type: Some("gps".to_string()),
            status: Some(SensorStatus::Online),
            latitude: Some(52.11),
            longitude: Some(5.11),
            battery_level: Some(88),
            folder_id: Some(north_field.id),
            company_id: acme.id,
        },
    )?;
    insert_sensor(
        conn,
        SensorInput {
            name: "Cow Collar".to_string(),
            imei: "490154203237518".to_string(),
            sensor_type: None,
            status: None,
            latitude: Some(52.15),
            longitude: Some(5.05),
            battery_level: None,
            folder_id: None,
            company_id: acme.id,
        },
    )?;
    insert_sensor(
        conn,
        SensorInput {
            name: "Pallet Tracker".to_string(),
            imei: "860914040012347".to_string(),
            sensor_type: Some("gps".to_string()),
            status: Some(SensorStatus::Warning),
            latitude: Some(40.71),
            longitude: Some(-74.01),
            battery_level: Some(12),
            folder_id: Some(warehouse.id),
            company_id: globex.id,
        },
    )?;

    insert_power_sensor(
        conn,
        plug_input("Pump Plug", "867206040000114", acme.id, Some(barn.id)),
    )?;
    insert_power_sensor(
        conn,
        plug_input("Heater Plug", "867206040000221", acme.id, None),
    )?;
    insert_power_sensor(
        conn,
        plug_input("Dock Plug", "867206040000338", globex.id, Some(warehouse.id)),
    )?;

    for (name, sku, price_cents, active) in [
        ("Tracker T1", "TRK-T1", 4999, true),
        ("Smart Plug P1", "PLG-P1", 1999, true),
        ("Legacy Beacon", "LEG-B0", 999, false),
    ] {
        insert_product(
            conn,
            ProductInput {
                name: name.to_string(),
                description: None,
                price_cents,
                sku: sku.to_string(),
                active: Some(active),
            },
        )?;
    }

    Ok(())
}

fn folder_input(
    name: &str,
    company_id: i32,
    parent_id: Option<i32>,
    coords: Option<(f64, f64)>,
) -> FolderInput {
    FolderInput {
        name: name.to_string(),
        description: None,
        address: None,
        latitude: coords.map(|c| c.0),
        longitude: coords.map(|c| c.1),
        parent_id,
        company_id,
    }
}

fn plug_input(name: &str, imei: &str, company_id: i32, folder_id: Option<i32>) -> PowerSensorInput {
    PowerSensorInput {
        name: name.to_string(),
        imei: imei.to_string(),
        location: None,
        folder_id,
        company_id,
    }
}

fn find_or_create_company(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Company, diesel::result::Error> {
    let company_input = CompanyInput {
        name: name.to_string(),
    };

    match get_company_by_name(conn, &company_input)? {
        Some(company) => Ok(company),
        None => insert_company(conn, name.to_string()),
    }
}

/// Creates a user with one role unless the email is taken. Returns the id.
fn create_test_user(
    conn: &mut SqliteConnection,
    email: &str,
    password: &str,
    company_id: i32,
    role_name: &str,
) -> Result<i32, diesel::result::Error> {
    if let Some(existing) = get_user_by_email(conn, email)? {
        return Ok(existing.id);
    }

    let user = insert_user(
        conn,
        UserInput {
            email: email.to_string(),
            password_hash: hash_password(password),
            first_name: None,
            last_name: None,
            company_id,
        },
    )?;
    assign_user_role_by_name(conn, user.id, role_name)?;
    Ok(user.id)
}

/// Gateway settings for tests that do not care about delivery: a closed
/// local port and a short budget.
pub fn unreachable_gateway() -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        timeout_secs: 1,
        https_fallback: true,
    }
}

/// Creates a Rocket instance backed by a fresh, seeded, shared in-memory
/// SQLite database, with the gateway pointed at a closed port.
pub fn test_rocket() -> Rocket<Build> {
    test_rocket_with_gateway(unreachable_gateway())
}

/// Like [`test_rocket`] but relaying to the given gateway.
pub fn test_rocket_with_gateway(gateway: GatewayConfig) -> Rocket<Build> {
    use uuid::Uuid;

    let unique_db_name = format!("file:test_db_{}?mode=memory&cache=shared", Uuid::new_v4());

    let db_config: Map<_, Value> = map! {
        "url" => unique_db_name.into(),
        "pool_size" => 5.into(),
        "timeout" => 5.into(),
    };

    let figment = rocket::Config::figment()
        .merge(("databases", map!["sqlite_db" => db_config]))
        .merge(("gateway", gateway));

    let rocket = rocket::custom(figment)
        .attach(DbConn::fairing())
        .attach(super::db::set_foreign_keys_fairing())
        .attach(set_sqlite_test_pragmas_fairing())
        .attach(super::db::run_migrations_fairing())
        .attach(admin_init_fairing())
        .attach(test_data_init_fairing())
        .attach(gateway_fairing());

    crate::mount_api_routes(crate::register_catchers(rocket))
}

/// Creates a synchronous in-memory SQLite connection with migrations applied
/// and foreign keys on. Every call returns an independent database.
pub fn setup_test_db() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:")
        .expect("Failed to create in-memory SQLite database");
    set_foreign_keys(&mut conn);
    run_pending_migrations(&mut conn);
    conn
}

/// Async `.run()` facade over a borrowed test connection, so code written
/// against `DbConn` can be exercised with [`setup_test_db`].
pub struct FakeDbConn<'a>(Mutex<&'a mut SqliteConnection>);

impl<'a> FakeDbConn<'a> {
    pub async fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SqliteConnection) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut **guard)
    }
}

pub fn setup_test_dbconn<'a>(conn: &'a mut SqliteConnection) -> FakeDbConn<'a> {
    FakeDbConn(Mutex::new(conn))
}

/// A local HTTP server standing in for the Node-RED gateway. Answers every
/// request with `200 OK` and remembers the request targets.
pub struct FakeGateway {
    pub port: u16,
    requests: Arc<tokio::sync::Mutex<Vec<String>>>,
}

impl FakeGateway {
    pub fn config(&self) -> GatewayConfig {
        GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            timeout_secs: 5,
            https_fallback: true,
        }
    }

    /// Request targets seen so far, e.g. `/powerplug?imei=..&state=1`.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

pub async fn spawn_fake_gateway() -> FakeGateway {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake gateway");
    let port = listener.local_addr().expect("fake gateway address").port();
    let requests = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&head);
                if let Some(target) = text.lines().next().and_then(|l| l.split_whitespace().nth(1)) {
                    seen.lock().await.push(target.to_string());
                }
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\nconnection: close\r\n\r\nOK",
                    )
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });

    FakeGateway { port, requests }
}

/// A gateway that accepts connections and never answers.
pub async fn spawn_silent_gateway() -> FakeGateway {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind silent gateway");
    let port = listener.local_addr().expect("silent gateway address").port();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    FakeGateway {
        port,
        requests: Arc::new(tokio::sync::Mutex::new(Vec::new())),
    }
}
