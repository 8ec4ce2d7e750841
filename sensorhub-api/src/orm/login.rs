//! Database operations for user authentication and session management.
//!
//! This module provides database layer functions for user login, session
//! creation, password verification, and session storage. It abstracts database
//! operations to support both production and testing environments.

use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use diesel::prelude::*;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use uuid::Uuid;

use crate::DbConn;
use crate::models::{NewSession, User};
use crate::orm::testing::FakeDbConn;
use crate::schema::{sessions, users};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Trait for abstracting database operations to support both production and
/// testing.
///
/// This trait allows the same functions to work with both `DbConn`
/// (production) and `FakeDbConn` (testing) by providing a unified interface
/// for database operations.
pub trait DbRunner {
    /// Executes a database operation with a connection.
    fn run<F, R>(&self, f: F) -> impl std::future::Future<Output = R>
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> R + Send + 'static,
        R: Send + 'static;
}

impl DbRunner for DbConn {
    fn run<F, R>(&self, f: F) -> impl std::future::Future<Output = R>
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> R + Send + 'static,
        R: Send + 'static,
    {
        DbConn::run(self, f)
    }
}

impl<'a> DbRunner for FakeDbConn<'a> {
    fn run<F, R>(&self, f: F) -> impl std::future::Future<Output = R>
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> R + Send + 'static,
        R: Send + 'static,
    {
        FakeDbConn::run(self, f)
    }
}

/// Credentials submitted to the login endpoint.
#[derive(Clone, serde::Deserialize, serde::Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn generate_session_token() -> String {
    Uuid::new_v4().to_string()
}

/// Finds a user by their email address.
///
/// # Returns
/// * `Ok(Some(User))` - User found with matching email
/// * `Ok(None)` - No user found with that email
/// * `Err(Status::InternalServerError)` - Database query failed
pub async fn find_user_by_email<D: DbRunner>(db: &D, email: &str) -> Result<Option<User>, Status> {
    let email = email.to_owned();
    db.run(move |conn| {
        users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(conn)
            .optional()
    })
    .await
    .map_err(|_| Status::InternalServerError)
}

/// Verifies a password against a stored Argon2 hash. A stored value that is
/// not a valid PHC string never verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(stored_hash) {
        Ok(hash) => hash,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Creates a new session and stores it in the database.
///
/// # Returns
/// * `Ok(String)` - Session token that was created and stored
/// * `Err(Status::InternalServerError)` - Database insertion failed
pub async fn create_and_store_session<D: DbRunner>(db: &D, user_id: i32) -> Result<String, Status> {
    let session_token = generate_session_token();

    let new_session = NewSession {
        id: session_token.clone(),
        user_id,
        created_at: Utc::now().naive_utc(),
        expires_at: None,
        revoked: false,
    };

    db.run(move |conn| {
        diesel::insert_into(sessions::table)
            .values(&new_session)
            .execute(conn)
    })
    .await
    .map_err(|_| Status::InternalServerError)?;

    Ok(session_token)
}

/// Sets the session cookie: HTTP-only, SameSite=Lax, secure outside of
/// tests.
fn set_session_cookie(cookies: &CookieJar<'_>, session_token: &str) {
    let secure_flag = !cfg!(test);
    let cookie = Cookie::build((SESSION_COOKIE, session_token.to_string()))
        .http_only(true)
        .secure(secure_flag)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    cookies.add(cookie);
}

/// Processes a complete login: validates input, finds the user, verifies the
/// password, creates a session and sets the session cookie.
///
/// # Returns
/// * `Ok((User, token))` - Login successful; the token is also in the cookie
/// * `Err(Status::BadRequest)` - Empty email or password provided
/// * `Err(Status::Unauthorized)` - Invalid credentials, unknown or inactive user
/// * `Err(Status::InternalServerError)` - Database operation failed
pub async fn process_login<D: DbRunner>(
    db: &D,
    cookies: &CookieJar<'_>,
    login: &LoginRequest,
) -> Result<(User, String), Status> {
    if login.email.trim().is_empty() || login.password.trim().is_empty() {
        return Err(Status::BadRequest);
    }

    let user = match find_user_by_email(db, login.email.trim()).await? {
        Some(user) => user,
        None => return Err(Status::Unauthorized),
    };

    if !verify_password(&login.password, &user.password_hash) {
        return Err(Status::Unauthorized);
    }

    if !user.is_active() {
        warn!("Login refused for inactive user {}", user.email);
        return Err(Status::Unauthorized);
    }

    let session_token = create_and_store_session(db, user.id).await?;
    set_session_cookie(cookies, &session_token);

    Ok((user, session_token))
}

/// Hashes a password using Argon2 with a random salt.
///
/// # Panics
/// Panics if hashing fails, which does not happen with the default
/// parameters.
pub fn hash_password(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .expect("Hashing should succeed")
        .to_string()
}
