use diesel::prelude::*;

use crate::models::{NewRole, Role};
use crate::orm::last_insert_id;

pub fn insert_role(
    conn: &mut SqliteConnection,
    new_role: NewRole,
) -> Result<Role, diesel::result::Error> {
    use crate::schema::roles::dsl::*;

    diesel::insert_into(roles).values(&new_role).execute(conn)?;
    let last_id = last_insert_id(conn)?;

    roles.filter(id.eq(last_id)).select(Role::as_select()).first(conn)
}

/// Returns all roles in ascending order by id.
pub fn get_all_roles(conn: &mut SqliteConnection) -> Result<Vec<Role>, diesel::result::Error> {
    use crate::schema::roles::dsl::*;
    roles.order(id.asc()).select(Role::as_select()).load(conn)
}

pub fn get_role_by_name(
    conn: &mut SqliteConnection,
    role_name: &str,
) -> Result<Option<Role>, diesel::result::Error> {
    use crate::schema::roles::dsl::*;
    roles
        .filter(name.eq(role_name))
        .select(Role::as_select())
        .first(conn)
        .optional()
}
