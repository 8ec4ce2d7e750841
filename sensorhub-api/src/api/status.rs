//! API version 1 - Status endpoints

use rocket::{Route, serde::json::Json};
use serde::Serialize;
use ts_rs::TS;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct HealthStatus {
    status: &'static str,
    version: &'static str,
    built: &'static str,
    git_commit: Option<&'static str>,
}

/// Health Status endpoint.
///
/// - **URL:** `/api/1/status`
/// - **Method:** `GET`
/// - **Authentication:** None required
///
/// ```json
/// {
///   "status": "running",
///   "version": "0.1.0",
///   "built": "Fri, 15 Aug 2025 18:13:43 +0000",
///   "git_commit": "cd51275141a2e7d49737aa7dd4e8ff7c9a804d67"
/// }
/// ```
#[rocket::get("/1/status")]
pub fn health_status() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
        built: built_info::BUILT_TIME_UTC,
        git_commit: built_info::GIT_COMMIT_HASH,
    })
}

pub fn routes() -> Vec<Route> {
    routes![health_status]
}
