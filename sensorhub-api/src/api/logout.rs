//! API endpoint for user logout and session termination.

use rocket::http::{Cookie, CookieJar};
use rocket::serde::json::{Json, Value, json};
use rocket::{Request, Route, post};

use crate::DbConn;
use crate::orm::login::SESSION_COOKIE;
use crate::orm::logout::revoke_session;
use crate::session_guards::session_token;

/// Logout endpoint.
///
/// - **URL:** `/api/1/logout`
/// - **Method:** `POST`
/// - **Authentication:** None required
///
/// Revokes the session named by the `session` cookie or the bearer token and
/// clears the cookie. Always answers 200, even without a session.
#[post("/1/logout")]
pub async fn logout(db: DbConn, cookies: &CookieJar<'_>, token: SessionToken) -> Json<Value> {
    if let Some(session_id) = token.0 {
        match revoke_session(&db, &session_id).await {
            Ok(0) => debug!("Logout with unknown session token"),
            Ok(_) => info!("Session revoked"),
            Err(e) => error!("Failed to revoke session: {:?}", e),
        }
        cookies.remove(Cookie::from(SESSION_COOKIE));
    }

    Json(json!({
        "message": "Logout successful",
        "status": "ok"
    }))
}

/// The raw session token of a request, if any; never fails.
pub struct SessionToken(pub Option<String>);

#[rocket::async_trait]
impl<'r> rocket::request::FromRequest<'r> for SessionToken {
    type Error = std::convert::Infallible;

    async fn from_request(
        request: &'r Request<'_>,
    ) -> rocket::request::Outcome<Self, Self::Error> {
        rocket::request::Outcome::Success(SessionToken(session_token(request)))
    }
}

pub fn routes() -> Vec<Route> {
    routes![logout]
}
