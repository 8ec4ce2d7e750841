//! API endpoints for managing companies (tenants).
//!
//! # Authorization Rules
//! - master users see and manage every company
//! - admins may read and rename their own company
//! - plain users may read their own company

use rocket::Route;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::api::{ApiError, api_error, db_error, forbidden, is_unique_violation, not_found};
use crate::logged_json::LoggedJson;
use crate::models::{Company, CompanyInput};
use crate::orm::DbConn;
use crate::orm::company::{
    delete_company, get_all_companies, get_company_by_id, get_company_by_name_case_insensitive,
    insert_company, rename_company,
};
use crate::session_guards::{AuthenticatedUser, MasterUser};

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct UpdateCompanyRequest {
    pub name: String,
}

fn validated_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(api_error(Status::BadRequest, "Company name must not be empty"));
    }
    Ok(name.to_string())
}

/// Create Company endpoint.
///
/// - **URL:** `/api/1/Companies`
/// - **Method:** `POST`
/// - **Authentication:** master role
///
/// ```json
/// { "name": "Acme Farms" }
/// ```
///
/// Answers 201 with the new company, or 409 when the name is taken
/// (compared case-insensitively).
#[post("/1/Companies", data = "<new_company>")]
pub async fn create_company(
    db: DbConn,
    new_company: LoggedJson<CompanyInput>,
    _master: MasterUser,
) -> Result<status::Created<Json<Company>>, ApiError> {
    let name = validated_name(&new_company.name)?;
    db.run(move |conn| -> Result<status::Created<Json<Company>>, ApiError> {
        if get_company_by_name_case_insensitive(conn, &name)
            .map_err(|e| db_error("checking for existing company", e))?
            .is_some()
        {
            return Err(api_error(
                Status::Conflict,
                format!("Company with name '{}' already exists", name),
            ));
        }

        let company = insert_company(conn, name).map_err(|e| db_error("creating company", e))?;
        info!("Created company {} '{}'", company.id, company.name);
        Ok(status::Created::new(format!("/api/1/Companies/{}", company.id)).body(Json(company)))
    })
    .await
}

/// List Companies endpoint.
///
/// - **URL:** `/api/1/Companies`
/// - **Method:** `GET`
/// - **Authentication:** Required
///
/// Masters get every company ordered by id; everybody else gets a one
/// element list with their own company.
#[get("/1/Companies")]
pub async fn list_companies(db: DbConn, auth_user: AuthenticatedUser) -> Result<Json<Vec<Company>>, ApiError> {
    let is_master = auth_user.is_master();
    let own_company = auth_user.user.company_id;
    db.run(move |conn| {
        if is_master {
            get_all_companies(conn)
        } else {
            get_company_by_id(conn, own_company).map(|c| c.into_iter().collect())
        }
    })
    .await
    .map(Json)
    .map_err(|e| db_error("listing companies", e))
}

/// Get Company endpoint: `GET /api/1/Companies/<company_id>`.
#[get("/1/Companies/<company_id>")]
pub async fn get_company(
    db: DbConn,
    company_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<Company>, ApiError> {
    if !auth_user.can_access_company(company_id) {
        return Err(forbidden("Insufficient permissions to view this company"));
    }
    db.run(move |conn| get_company_by_id(conn, company_id))
        .await
        .map_err(|e| db_error("fetching company", e))?
        .map(Json)
        .ok_or_else(|| not_found("Company"))
}

/// Rename Company endpoint.
///
/// - **URL:** `/api/1/Companies/<company_id>`
/// - **Method:** `PUT`
/// - **Authentication:** master, or admin of that company
#[put("/1/Companies/<company_id>", data = "<request>")]
pub async fn update_company(
    db: DbConn,
    company_id: i32,
    request: LoggedJson<UpdateCompanyRequest>,
    auth_user: AuthenticatedUser,
) -> Result<Json<Company>, ApiError> {
    if !auth_user.can_manage_company(company_id) {
        return Err(forbidden("Insufficient permissions to rename this company"));
    }
    let name = validated_name(&request.name)?;

    db.run(move |conn| -> Result<Json<Company>, ApiError> {
        match get_company_by_name_case_insensitive(conn, &name)
            .map_err(|e| db_error("checking for existing company", e))?
        {
            Some(other) if other.id != company_id => {
                return Err(api_error(
                    Status::Conflict,
                    format!("Company with name '{}' already exists", name),
                ));
            }
            _ => {}
        }

        match rename_company(conn, company_id, name) {
            Ok(Some(company)) => Ok(Json(company)),
            Ok(None) => Err(not_found("Company")),
            Err(e) if is_unique_violation(&e) => {
                Err(api_error(Status::Conflict, "Company name already exists"))
            }
            Err(e) => Err(db_error("renaming company", e)),
        }
    })
    .await
}

/// Delete Company endpoint.
///
/// - **URL:** `/api/1/Companies/<company_id>`
/// - **Method:** `DELETE`
/// - **Authentication:** master role
///
/// Everything the company owns goes with it. A master cannot delete the
/// company they belong to.
#[delete("/1/Companies/<company_id>")]
pub async fn delete_company_endpoint(
    db: DbConn,
    company_id: i32,
    master: MasterUser,
) -> Result<Status, ApiError> {
    if master.0.user.company_id == company_id {
        return Err(api_error(Status::BadRequest, "Cannot delete your own company"));
    }
    match db.run(move |conn| delete_company(conn, company_id)).await {
        Ok(true) => {
            info!("Deleted company {}", company_id);
            Ok(Status::NoContent)
        }
        Ok(false) => Err(not_found("Company")),
        Err(e) => Err(db_error("deleting company", e)),
    }
}

pub fn routes() -> Vec<Route> {
    routes![
        create_company,
        list_companies,
        get_company,
        update_company,
        delete_company_endpoint
    ]
}
