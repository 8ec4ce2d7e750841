use diesel::prelude::*;
use dotenvy::dotenv;
use rocket::Rocket;
use rocket::fairing::AdHoc;

use crate::models::{Company, CompanyInput, ROLE_MASTER, User, UserInput};
use crate::orm::DbConn;
use crate::orm::company::{get_company_by_name, insert_company};
use crate::orm::login::hash_password;
use crate::orm::user::{get_user_by_email, insert_user};
use crate::orm::user_role::{assign_user_role_by_name, user_has_role};

/// Name of the operator company that owns the bootstrap account.
pub const OPERATOR_COMPANY: &str = "SensorHub";

/// Add the operator company and a master user if needed.
///
/// The master email/password come from SENSORHUB_DEFAULT_EMAIL and
/// SENSORHUB_DEFAULT_PASSWORD.
pub fn admin_init_fairing() -> AdHoc {
    AdHoc::try_on_ignite("Admin User Initialization", |rocket| async {
        dotenv().ok();

        let conn = match get_db_connection(&rocket).await {
            Some(conn) => conn,
            None => return Err(rocket),
        };

        let admin_email = get_admin_email();
        let result = conn
            .run(move |c| {
                c.transaction(|c| {
                    let company = find_or_create_company(c)?;
                    create_admin_user_if_needed(c, &admin_email, &company)
                })
            })
            .await;

        match result {
            Ok(()) => Ok(rocket),
            Err(e) => {
                error!("[admin-init] FATAL: Admin user creation failed: {:?}", e);
                Err(rocket)
            }
        }
    })
}

async fn get_db_connection(rocket: &Rocket<rocket::Build>) -> Option<DbConn> {
    match DbConn::get_one(rocket).await {
        Some(conn) => Some(conn),
        None => {
            error!("[admin-init] ERROR: Could not get DB connection.");
            None
        }
    }
}

fn find_or_create_company(c: &mut SqliteConnection) -> Result<Company, diesel::result::Error> {
    let lookup = CompanyInput {
        name: OPERATOR_COMPANY.to_string(),
    };
    if let Some(found) = get_company_by_name(c, &lookup)? {
        return Ok(found);
    }

    info!("[admin-init] Creating company '{}'", OPERATOR_COMPANY);
    insert_company(c, OPERATOR_COMPANY.to_string())
}

fn get_admin_email() -> String {
    std::env::var("SENSORHUB_DEFAULT_EMAIL")
        .unwrap_or_else(|_| "superadmin@example.com".to_string())
}

fn get_admin_password() -> String {
    std::env::var("SENSORHUB_DEFAULT_PASSWORD").unwrap_or_else(|_| "admin".to_string())
}

fn create_admin_user_if_needed(
    c: &mut SqliteConnection,
    admin_email: &str,
    company: &Company,
) -> Result<(), diesel::result::Error> {
    let user = match get_user_by_email(c, admin_email)? {
        Some(existing) => {
            info!("[admin-init] Admin user '{}' already exists", admin_email);
            existing
        }
        None => create_admin_user(c, admin_email, company)?,
    };

    if !user_has_role(c, user.id, ROLE_MASTER)? {
        assign_user_role_by_name(c, user.id, ROLE_MASTER)?;
        info!("[admin-init] Assigned role '{}' to user '{}'", ROLE_MASTER, admin_email);
    }

    Ok(())
}

fn create_admin_user(
    c: &mut SqliteConnection,
    admin_email: &str,
    company: &Company,
) -> Result<User, diesel::result::Error> {
    let admin_user = UserInput {
        email: admin_email.to_string(),
        password_hash: hash_password(&get_admin_password()),
        first_name: None,
        last_name: None,
        company_id: company.id,
    };

    let user = insert_user(c, admin_user)?;
    info!("[admin-init] Created admin user: '{}'", admin_email);
    Ok(user)
}
