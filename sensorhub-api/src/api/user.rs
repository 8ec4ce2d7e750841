//! API endpoints for managing users and their roles.
//!
//! # Authorization Rules
//! - master users manage users of every company and may grant `master`
//! - admins manage users of their own company
//! - every user may read their own record and change their own email,
//!   names and password
//! - nobody can delete themselves, and a user always keeps at least one role

use diesel::Connection;
use rocket::Route;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::api::{ApiError, api_error, db_error, forbidden, is_unique_violation, not_found, nullable};
use crate::logged_json::LoggedJson;
use crate::models::{ROLE_MASTER, Role, User, UserInput, UserStatus, UserWithRoles};
use crate::orm::DbConn;
use crate::orm::company::get_company_by_id;
use crate::orm::login::hash_password;
use crate::orm::logout::revoke_user_sessions;
use crate::orm::role::{get_all_roles, get_role_by_name};
use crate::orm::user::{
    UserChanges, attach_roles, delete_user, get_user, get_user_by_email, get_user_with_roles,
    get_users_by_company, insert_user, list_all_users, update_user,
};
use crate::orm::user_role::{assign_user_role_by_name, get_user_roles, remove_user_role_by_name};
use crate::session_guards::AuthenticatedUser;

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_id: i32,
    pub role_names: Vec<String>,
}

/// All fields optional; `null` clears a name.
#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "string | null")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(type = "string | null")]
    pub last_name: Option<Option<String>>,
    pub status: Option<UserStatus>,
}

#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct UserRoleRequest {
    pub role_name: String,
}

fn validated_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
        _ => Err(api_error(Status::BadRequest, format!("'{}' is not a valid email address", email))),
    }
}

fn validated_password(password: &str) -> Result<&str, ApiError> {
    if password.trim().is_empty() {
        return Err(api_error(Status::BadRequest, "Password must not be empty"));
    }
    Ok(password)
}

/// Only masters may grant or revoke `master`.
fn check_role_grant(auth_user: &AuthenticatedUser, role_name: &str) -> Result<(), ApiError> {
    if role_name == ROLE_MASTER && !auth_user.is_master() {
        return Err(forbidden(format!("Insufficient permissions to assign role '{}'", role_name)));
    }
    Ok(())
}

async fn load_target(db: &DbConn, user_id: i32) -> Result<User, ApiError> {
    db.run(move |conn| get_user(conn, user_id))
        .await
        .map_err(|e| db_error("fetching user", e))?
        .ok_or_else(|| not_found("User"))
}

/// Create User endpoint.
///
/// - **URL:** `/api/1/Users`
/// - **Method:** `POST`
/// - **Authentication:** admin of the target company, or master
///
/// ```json
/// {
///   "email": "new@acme.com",
///   "password": "secret",
///   "first_name": "Ada",
///   "last_name": null,
///   "company_id": 2,
///   "role_names": ["user"]
/// }
/// ```
///
/// Answers 201 with the user and roles; 400 for no roles, an unknown role or
/// company; 403 for a foreign company or a `master` grant by a non-master;
/// 409 for a taken email.
#[post("/1/Users", data = "<new_user>")]
pub async fn create_user(
    db: DbConn,
    new_user: LoggedJson<CreateUserRequest>,
    auth_user: AuthenticatedUser,
) -> Result<status::Created<Json<UserWithRoles>>, ApiError> {
    let request = new_user.into_inner();
    if !auth_user.can_manage_company(request.company_id) {
        return Err(forbidden("Insufficient permissions to create users"));
    }
    if request.role_names.is_empty() {
        return Err(api_error(Status::BadRequest, "At least one role must be provided"));
    }
    for role_name in &request.role_names {
        check_role_grant(&auth_user, role_name)?;
    }
    let email = validated_email(&request.email)?;
    let password_hash = hash_password(validated_password(&request.password)?);

    db.run(move |conn| -> Result<status::Created<Json<UserWithRoles>>, ApiError> {
        if get_company_by_id(conn, request.company_id)
            .map_err(|e| db_error("fetching company", e))?
            .is_none()
        {
            return Err(api_error(Status::BadRequest, format!("Company {} does not exist", request.company_id)));
        }
        for role_name in &request.role_names {
            if get_role_by_name(conn, role_name)
                .map_err(|e| db_error("fetching role", e))?
                .is_none()
            {
                return Err(api_error(Status::BadRequest, format!("Role '{}' does not exist", role_name)));
            }
        }
        if get_user_by_email(conn, &email)
            .map_err(|e| db_error("checking for existing user", e))?
            .is_some()
        {
            return Err(api_error(Status::Conflict, "User with this email already exists"));
        }

        let input = UserInput {
            email,
            password_hash,
            first_name: request.first_name,
            last_name: request.last_name,
            company_id: request.company_id,
        };
        let role_names = request.role_names;
        let created = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                let user = insert_user(conn, input)?;
                for role_name in &role_names {
                    assign_user_role_by_name(conn, user.id, role_name)?;
                }
                let roles = get_user_roles(conn, user.id)?;
                Ok(UserWithRoles::from_parts(user, roles))
            })
            .map_err(|e| {
                if is_unique_violation(&e) {
                    api_error(Status::Conflict, "User with this email already exists")
                } else {
                    db_error("creating user", e)
                }
            })?;

        info!("Created user {} '{}' in company {}", created.id, created.email, created.company_id);
        Ok(status::Created::new(format!("/api/1/Users/{}", created.id)).body(Json(created)))
    })
    .await
}

/// List Users endpoint.
///
/// - **URL:** `/api/1/Users`
/// - **Method:** `GET`
/// - **Authentication:** Required
///
/// Masters see every user; everybody else sees the users of their company.
#[get("/1/Users")]
pub async fn list_users(db: DbConn, auth_user: AuthenticatedUser) -> Result<Json<Vec<UserWithRoles>>, ApiError> {
    let is_master = auth_user.is_master();
    let company_id = auth_user.user.company_id;
    db.run(move |conn| -> Result<Vec<UserWithRoles>, diesel::result::Error> {
        let users = if is_master {
            list_all_users(conn)?
        } else {
            get_users_by_company(conn, company_id)?
        };
        attach_roles(conn, users)
    })
    .await
    .map(Json)
    .map_err(|e| db_error("listing users", e))
}

/// Get User endpoint: `GET /api/1/Users/<user_id>`.
#[get("/1/Users/<user_id>")]
pub async fn get_user_endpoint(
    db: DbConn,
    user_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<UserWithRoles>, ApiError> {
    let user = db
        .run(move |conn| get_user_with_roles(conn, user_id))
        .await
        .map_err(|e| db_error("fetching user", e))?
        .ok_or_else(|| not_found("User"))?;
    if !auth_user.can_access_company(user.company_id) {
        return Err(forbidden("Insufficient permissions to view this user"));
    }
    Ok(Json(user))
}

/// Update User endpoint.
///
/// - **URL:** `/api/1/Users/<user_id>`
/// - **Method:** `PUT`
/// - **Authentication:** the user themselves, an admin of their company, or
///   master
///
/// Only managers may change `status`. Deactivating a user revokes all of
/// their sessions.
#[put("/1/Users/<user_id>", data = "<request>")]
pub async fn update_user_endpoint(
    db: DbConn,
    user_id: i32,
    request: LoggedJson<UpdateUserRequest>,
    auth_user: AuthenticatedUser,
) -> Result<Json<UserWithRoles>, ApiError> {
    let target = load_target(&db, user_id).await?;
    let is_self = auth_user.user.id == target.id;
    let can_manage = auth_user.can_manage_company(target.company_id);
    if !is_self && !can_manage {
        return Err(forbidden("Insufficient permissions to update this user"));
    }

    let request = request.into_inner();
    if request.status.is_some() && !can_manage {
        return Err(forbidden("Insufficient permissions to change account status"));
    }
    let changes = UserChanges {
        email: request.email.as_deref().map(validated_email).transpose()?,
        password_hash: request
            .password
            .as_deref()
            .map(validated_password)
            .transpose()?
            .map(hash_password),
        first_name: request.first_name,
        last_name: request.last_name,
        status: request.status,
        company_id: None,
    };
    let deactivating = changes.status == Some(UserStatus::Inactive);

    db.run(move |conn| {
        let updated = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let updated = update_user(conn, user_id, changes)?;
            if deactivating {
                let revoked = revoke_user_sessions(conn, user_id)?;
                info!("Deactivated user {}, revoked {} session(s)", user_id, revoked);
            }
            match updated {
                Some(user) => {
                    let roles = get_user_roles(conn, user.id)?;
                    Ok(Some(UserWithRoles::from_parts(user, roles)))
                }
                None => Ok(None),
            }
        });
        match updated {
            Ok(Some(user)) => Ok(Json(user)),
            Ok(None) => Err(not_found("User")),
            Err(e) if is_unique_violation(&e) => {
                Err(api_error(Status::Conflict, "User with this email already exists"))
            }
            Err(e) => Err(db_error("updating user", e)),
        }
    })
    .await
}

/// Delete User endpoint.
///
/// - **URL:** `/api/1/Users/<user_id>`
/// - **Method:** `DELETE`
/// - **Authentication:** admin of the user's company, or master
#[delete("/1/Users/<user_id>")]
pub async fn delete_user_endpoint(
    db: DbConn,
    user_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Status, ApiError> {
    if auth_user.user.id == user_id {
        return Err(api_error(Status::BadRequest, "You cannot delete your own account"));
    }
    let target = load_target(&db, user_id).await?;
    if !auth_user.can_manage_company(target.company_id) {
        return Err(forbidden("Insufficient permissions to delete this user"));
    }

    match db.run(move |conn| delete_user(conn, user_id)).await {
        Ok(true) => {
            info!("Deleted user {} '{}'", target.id, target.email);
            Ok(Status::NoContent)
        }
        Ok(false) => Err(not_found("User")),
        Err(e) => Err(db_error("deleting user", e)),
    }
}

/// Get User Roles endpoint: `GET /api/1/Users/<user_id>/Roles`.
#[get("/1/Users/<user_id>/Roles")]
pub async fn get_user_roles_endpoint(
    db: DbConn,
    user_id: i32,
    auth_user: AuthenticatedUser,
) -> Result<Json<Vec<Role>>, ApiError> {
    let target = load_target(&db, user_id).await?;
    if !auth_user.can_access_company(target.company_id) {
        return Err(forbidden("Insufficient permissions to view this user"));
    }
    db.run(move |conn| get_user_roles(conn, user_id))
        .await
        .map(Json)
        .map_err(|e| db_error("fetching user roles", e))
}

/// Add User Role endpoint.
///
/// - **URL:** `/api/1/Users/<user_id>/Roles`
/// - **Method:** `POST`
/// - **Authentication:** admin of the user's company, or master
///
/// ```json
/// { "role_name": "admin" }
/// ```
#[post("/1/Users/<user_id>/Roles", data = "<request>")]
pub async fn add_user_role(
    db: DbConn,
    user_id: i32,
    request: LoggedJson<UserRoleRequest>,
    auth_user: AuthenticatedUser,
) -> Result<Json<Vec<Role>>, ApiError> {
    let target = load_target(&db, user_id).await?;
    if !auth_user.can_manage_company(target.company_id) {
        return Err(forbidden("Insufficient permissions to change roles of this user"));
    }
    let role_name = request.into_inner().role_name;
    check_role_grant(&auth_user, &role_name)?;

    db.run(move |conn| -> Result<Json<Vec<Role>>, ApiError> {
        if get_role_by_name(conn, &role_name)
            .map_err(|e| db_error("fetching role", e))?
            .is_none()
        {
            return Err(api_error(Status::BadRequest, format!("Role '{}' does not exist", role_name)));
        }
        assign_user_role_by_name(conn, user_id, &role_name)
            .and_then(|_| get_user_roles(conn, user_id))
            .map(Json)
            .map_err(|e| db_error("assigning role", e))
    })
    .await
}

/// Remove User Role endpoint.
///
/// - **URL:** `/api/1/Users/<user_id>/Roles`
/// - **Method:** `DELETE`
/// - **Authentication:** admin of the user's company, or master
///
/// Refuses (400) to remove a user's last role. Only masters may take away
/// the `master` role.
#[delete("/1/Users/<user_id>/Roles", data = "<request>")]
pub async fn remove_user_role(
    db: DbConn,
    user_id: i32,
    request: LoggedJson<UserRoleRequest>,
    auth_user: AuthenticatedUser,
) -> Result<Json<Vec<Role>>, ApiError> {
    let target = load_target(&db, user_id).await?;
    if !auth_user.can_manage_company(target.company_id) {
        return Err(forbidden("Insufficient permissions to change roles of this user"));
    }
    let role_name = request.into_inner().role_name;
    check_role_grant(&auth_user, &role_name)?;

    db.run(move |conn| -> Result<Json<Vec<Role>>, ApiError> {
        let current = get_user_roles(conn, user_id).map_err(|e| db_error("fetching user roles", e))?;
        if !current.iter().any(|r| r.name == role_name) {
            return Err(api_error(
                Status::BadRequest,
                format!("User does not have role '{}'", role_name),
            ));
        }
        if current.len() == 1 {
            return Err(api_error(Status::BadRequest, "A user must keep at least one role"));
        }
        remove_user_role_by_name(conn, user_id, &role_name)
            .and_then(|_| get_user_roles(conn, user_id))
            .map(Json)
            .map_err(|e| db_error("removing role", e))
    })
    .await
}

/// List Roles endpoint: `GET /api/1/Roles`.
#[get("/1/Roles")]
pub async fn list_roles(db: DbConn, _auth_user: AuthenticatedUser) -> Result<Json<Vec<Role>>, ApiError> {
    db.run(get_all_roles)
        .await
        .map(Json)
        .map_err(|e| db_error("listing roles", e))
}

pub fn routes() -> Vec<Route> {
    routes![
        create_user,
        list_users,
        get_user_endpoint,
        update_user_endpoint,
        delete_user_endpoint,
        get_user_roles_endpoint,
        add_user_role,
        remove_user_role,
        list_roles
    ]
}
