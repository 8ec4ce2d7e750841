//! Database operations for user logout and session revocation.

use diesel::prelude::*;

use crate::{DbConn, schema::sessions::dsl::*};

/// Revokes a session by marking it as revoked in the database.
///
/// The session row is kept so the history stays available; unknown tokens
/// simply affect zero rows.
///
/// # Returns
/// * `Ok(usize)` - Number of rows affected (1 if the session existed)
/// * `Err(diesel::result::Error)` - Database operation failed
pub async fn revoke_session(db: &DbConn, session_id: &str) -> Result<usize, diesel::result::Error> {
    let session_id = session_id.to_string();
    db.run(move |conn| {
        diesel::update(sessions.filter(id.eq(&session_id)))
            .set(revoked.eq(true))
            .execute(conn)
    })
    .await
}

/// Revokes every open session of a user, e.g. after deactivation.
pub fn revoke_user_sessions(
    conn: &mut SqliteConnection,
    target_user_id: i32,
) -> Result<usize, diesel::result::Error> {
    diesel::update(sessions.filter(user_id.eq(target_user_id)))
        .set(revoked.eq(true))
        .execute(conn)
}
