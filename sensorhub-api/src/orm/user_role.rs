use diesel::prelude::*;

use crate::models::{NewUserRole, Role};

/// Assigns a role to a user
pub fn assign_user_role(
    conn: &mut SqliteConnection,
    user_id_param: i32,
    role_id_param: i32,
) -> Result<(), diesel::result::Error> {
    use crate::schema::user_roles::dsl::*;

    let new_user_role = NewUserRole {
        user_id: user_id_param,
        role_id: role_id_param,
    };

    diesel::insert_or_ignore_into(user_roles)
        .values(&new_user_role)
        .execute(conn)?;

    Ok(())
}

/// Removes a role from a user
pub fn remove_user_role(
    conn: &mut SqliteConnection,
    user_id_param: i32,
    role_id_param: i32,
) -> Result<(), diesel::result::Error> {
    use crate::schema::user_roles::dsl::*;

    diesel::delete(
        user_roles
            .filter(user_id.eq(user_id_param))
            .filter(role_id.eq(role_id_param)),
    )
    .execute(conn)?;

    Ok(())
}

/// Gets all roles for a specific user
pub fn get_user_roles(
    conn: &mut SqliteConnection,
    user_id_param: i32,
) -> Result<Vec<Role>, diesel::result::Error> {
    use crate::schema::roles;
    use crate::schema::user_roles;

    roles::table
        .inner_join(user_roles::table.on(roles::id.eq(user_roles::role_id)))
        .filter(user_roles::user_id.eq(user_id_param))
        .order(roles::id.asc())
        .select(Role::as_select())
        .load(conn)
}

/// Checks if a user has a specific role by role name
pub fn user_has_role(
    conn: &mut SqliteConnection,
    user_id_param: i32,
    role_name: &str,
) -> Result<bool, diesel::result::Error> {
    use crate::schema::roles;
    use crate::schema::user_roles;

    let count: i64 = roles::table
        .inner_join(user_roles::table.on(roles::id.eq(user_roles::role_id)))
        .filter(user_roles::user_id.eq(user_id_param))
        .filter(roles::name.eq(role_name))
        .count()
        .get_result(conn)?;

    Ok(count > 0)
}

/// Assigns a role to a user by role name (convenience function)
pub fn assign_user_role_by_name(
    conn: &mut SqliteConnection,
    user_id_param: i32,
    role_name: &str,
) -> Result<(), diesel::result::Error> {
    use crate::schema::roles::dsl::*;

    let role = roles.filter(name.eq(role_name)).select(Role::as_select()).first(conn)?;

    assign_user_role(conn, user_id_param, role.id)
}

/// Removes a role from a user by role name (convenience function)
pub fn remove_user_role_by_name(
    conn: &mut SqliteConnection,
    user_id_param: i32,
    role_name: &str,
) -> Result<(), diesel::result::Error> {
    use crate::schema::roles::dsl::*;

    let role = roles.filter(name.eq(role_name)).select(Role::as_select()).first(conn)?;

    remove_user_role(conn, user_id_param, role.id)
}
