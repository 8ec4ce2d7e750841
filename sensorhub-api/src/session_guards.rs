//! Session-based authentication and authorization guards for Rocket routes.
//!
//! A request is authenticated by the `session` cookie set at login or, for
//! API clients, by `Authorization: Bearer <session token>`. Both carry the
//! same opaque token from the `sessions` table.
//!
//! ```rust,ignore
//! use rocket::get;
//! use sensorhub_api::session_guards::AuthenticatedUser;
//!
//! #[get("/profile")]
//! fn get_profile(user: AuthenticatedUser) -> String {
//!     let role_names: Vec<&str> = user.roles.iter().map(|r| r.name.as_str()).collect();
//!     format!("Welcome, {}! Roles: {:?}", user.user.email, role_names)
//! }
//! ```

use chrono::Utc;
use diesel::prelude::*;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};

use crate::DbConn;
use crate::models::{ROLE_ADMIN, ROLE_MASTER, Role, Session, User};
use crate::orm::login::SESSION_COOKIE;
use crate::orm::user_role::get_user_roles;
use crate::schema::{sessions, users};

/// A request guard for routes that require an authenticated user.
///
/// Checks, in order:
///
/// 1. A session token is present (cookie first, then bearer header)
/// 2. The session exists, is not revoked and has not expired
/// 3. The user exists and is active
/// 4. The user holds at least one role
///
/// Any failure yields `401 Unauthorized`.
#[derive(Debug)]
pub struct AuthenticatedUser {
    pub user: User,
    pub roles: Vec<Role>,
    /// Token that authenticated this request.
    pub session_id: String,
}

/// Pulls the session token from the cookie or the `Authorization` header.
pub fn session_token(request: &Request<'_>) -> Option<String> {
    if let Some(cookie) = request.cookies().get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    request
        .headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = match request.guard::<DbConn>().await {
            Outcome::Success(db) => db,
            _ => return Outcome::Error((Status::InternalServerError, ())),
        };

        let session_id = match session_token(request) {
            Some(token) => token,
            None => return Outcome::Error((Status::Unauthorized, ())),
        };

        let lookup_id = session_id.clone();
        let session_result = db
            .run(move |conn| {
                sessions::table
                    .filter(sessions::id.eq(&lookup_id))
                    .filter(sessions::revoked.eq(false))
                    .filter(
                        sessions::expires_at
                            .is_null()
                            .or(sessions::expires_at.gt(Utc::now().naive_utc())),
                    )
                    .select(Session::as_select())
                    .first(conn)
                    .optional()
            })
            .await;

        let session = match session_result {
            Ok(Some(sess)) => sess,
            Ok(None) => return Outcome::Error((Status::Unauthorized, ())),
            Err(e) => {
                error!("Database error finding session: {:?}", e);
                return Outcome::Error((Status::Unauthorized, ()));
            }
        };

        let user_result = db
            .run(move |conn| {
                users::table
                    .filter(users::id.eq(session.user_id))
                    .select(User::as_select())
                    .first(conn)
                    .optional()
            })
            .await;

        let user = match user_result {
            Ok(Some(u)) if u.is_active() => u,
            Ok(Some(u)) => {
                warn!("Rejecting session of inactive user {}", u.email);
                return Outcome::Error((Status::Unauthorized, ()));
            }
            Ok(None) => return Outcome::Error((Status::Unauthorized, ())),
            Err(e) => {
                error!("Database error finding user: {:?}", e);
                return Outcome::Error((Status::Unauthorized, ()));
            }
        };

        let user_id = user.id;
        let roles = match db.run(move |conn| get_user_roles(conn, user_id)).await {
            Ok(r) if !r.is_empty() => r,
            Ok(_) => return Outcome::Error((Status::Unauthorized, ())),
            Err(e) => {
                error!("Database error finding user roles: {:?}", e);
                return Outcome::Error((Status::Unauthorized, ()));
            }
        };

        Outcome::Success(AuthenticatedUser {
            user,
            roles,
            session_id,
        })
    }
}

impl AuthenticatedUser {
    pub fn has_role(&self, role_name: &str) -> bool {
        self.roles.iter().any(|r| r.name == role_name)
    }

    pub fn has_any_role(&self, role_names: &[&str]) -> bool {
        role_names.iter().any(|required| self.has_role(required))
    }

    /// Platform operator; sees every company.
    pub fn is_master(&self) -> bool {
        self.has_role(ROLE_MASTER)
    }

    /// Read access to a company's rows.
    pub fn can_access_company(&self, company_id: i32) -> bool {
        self.is_master() || self.user.company_id == company_id
    }

    /// Write access to a company's users, folders, devices and purchases.
    pub fn can_manage_company(&self, company_id: i32) -> bool {
        self.is_master() || (self.has_role(ROLE_ADMIN) && self.user.company_id == company_id)
    }
}

/// Guard that additionally requires the `master` role; 403 otherwise.
#[derive(Debug)]
pub struct MasterUser(pub AuthenticatedUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for MasterUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let auth_user = match AuthenticatedUser::from_request(request).await {
            Outcome::Success(user) => user,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        if auth_user.is_master() {
            Outcome::Success(MasterUser(auth_user))
        } else {
            Outcome::Error((Status::Forbidden, ()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn user_with(company_id: i32, role_names: &[&str]) -> AuthenticatedUser {
        let ts = NaiveDateTime::default();
        AuthenticatedUser {
            user: User {
                id: 1,
                email: "someone@example.com".to_string(),
                password_hash: String::new(),
                first_name: None,
                last_name: None,
                status: "active".to_string(),
                company_id,
                created_at: ts,
                updated_at: ts,
            },
            roles: role_names
                .iter()
                .enumerate()
                .map(|(i, name)| Role {
                    id: i as i32 + 1,
                    name: name.to_string(),
                    description: None,
                })
                .collect(),
            session_id: "token".to_string(),
        }
    }

    #[test]
    fn master_reaches_every_company() {
        let master = user_with(1, &["master"]);
        assert!(master.can_access_company(7));
        assert!(master.can_manage_company(7));
    }

    #[test]
    fn admin_manages_only_own_company() {
        let admin = user_with(2, &["admin"]);
        assert!(admin.can_manage_company(2));
        assert!(!admin.can_manage_company(3));
        assert!(!admin.can_access_company(3));
    }

    #[test]
    fn plain_user_reads_but_cannot_manage() {
        let user = user_with(2, &["user"]);
        assert!(user.can_access_company(2));
        assert!(!user.can_manage_company(2));
        assert!(user.has_any_role(&["admin", "user"]));
        assert!(!user.is_master());
    }
}
