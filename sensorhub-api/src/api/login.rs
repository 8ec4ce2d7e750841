//! API endpoints for user login and authentication.
//!
//! A successful login sets the HTTP-only `session` cookie for the dashboard
//! and also returns the token, which scripts and devices send back as
//! `Authorization: Bearer <token>`.

use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::{Route, get, post};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::DbConn;
use crate::api::{ApiError, api_error};
use crate::logged_json::LoggedJson;
use crate::models::User;
use crate::orm::company::get_company_by_id;
use crate::orm::login::{LoginRequest, process_login};
use crate::orm::user_role::get_user_roles;
use crate::session_guards::AuthenticatedUser;

/// Identity returned by login and hello.
#[derive(Debug, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoginSuccessResponse {
    pub user_id: i32,
    pub email: String,
    pub company_id: i32,
    pub company_name: String,
    pub roles: Vec<String>,
    /// Present only in the login response.
    pub token: Option<String>,
}

/// Builds the same identity payload for login and hello.
async fn build_user_response(db: &DbConn, user: User, token: Option<String>) -> LoginSuccessResponse {
    let user_id = user.id;
    let roles = match db.run(move |conn| get_user_roles(conn, user_id)).await {
        Ok(user_roles) => user_roles.into_iter().map(|role| role.name).collect(),
        Err(e) => {
            warn!("Could not load roles for user {}: {:?}", user_id, e);
            vec![]
        }
    };

    let company_id = user.company_id;
    let company_name = match db.run(move |conn| get_company_by_id(conn, company_id)).await {
        Ok(Some(company)) => company.name,
        _ => "Unknown Company".to_string(),
    };

    LoginSuccessResponse {
        user_id: user.id,
        email: user.email,
        company_id,
        company_name,
        roles,
        token,
    }
}

/// Login endpoint.
///
/// - **URL:** `/api/1/login`
/// - **Method:** `POST`
/// - **Authentication:** None required
///
/// ```json
/// { "email": "user@example.com", "password": "userpassword" }
/// ```
///
/// Returns the caller's identity and session token, and sets the `session`
/// cookie. Unknown users, wrong passwords and inactive accounts all get the
/// same `401 { "error": "Invalid credentials" }`.
#[post("/1/login", data = "<login>")]
pub async fn login(
    db: DbConn,
    cookies: &CookieJar<'_>,
    login: LoggedJson<LoginRequest>,
) -> Result<Json<LoginSuccessResponse>, ApiError> {
    match process_login(&db, cookies, &login).await {
        Ok((user, token)) => {
            info!("User {} logged in", user.email);
            Ok(Json(build_user_response(&db, user, Some(token)).await))
        }
        Err(status) => Err(api_error(status, "Invalid credentials")),
    }
}

/// Hello endpoint; returns the identity behind the current session.
///
/// - **URL:** `/api/1/hello`
/// - **Method:** `GET`
/// - **Authentication:** Required (cookie or bearer)
#[get("/1/hello")]
pub async fn secure_hello(auth_user: AuthenticatedUser, db: DbConn) -> Json<LoginSuccessResponse> {
    Json(build_user_response(&db, auth_user.user, None).await)
}

pub fn routes() -> Vec<Route> {
    routes![login, secure_hello]
}
