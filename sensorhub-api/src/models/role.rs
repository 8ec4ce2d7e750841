use diesel::{Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::roles;

/// Role granting access to every company.
pub const ROLE_MASTER: &str = "master";
/// Role granting management of the holder's own company.
pub const ROLE_ADMIN: &str = "admin";
/// Baseline role: read access to the holder's company and plug toggling.
pub const ROLE_USER: &str = "user";

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize, Deserialize, TS)]
#[diesel(table_name = roles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Role {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Insertable, Debug, Deserialize, Serialize, TS)]
#[diesel(table_name = roles)]
#[ts(export)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
}
