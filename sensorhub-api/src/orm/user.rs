use diesel::prelude::*;

use crate::models::{NewUser, User, UserInput, UserStatus, UserWithRoles};
use crate::orm::last_insert_id;
use crate::orm::user_role::get_user_roles;

/// Partial update for a user row. Password arrives already hashed.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub status: Option<UserStatus>,
    pub company_id: Option<i32>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::users)]
struct UserChangeset {
    email: Option<String>,
    password_hash: Option<String>,
    first_name: Option<Option<String>>,
    last_name: Option<Option<String>>,
    status: Option<String>,
    company_id: Option<i32>,
    updated_at: chrono::NaiveDateTime,
}

/// Inserts a new active user and returns the inserted User
pub fn insert_user(
    conn: &mut SqliteConnection,
    new_user: UserInput,
) -> Result<User, diesel::result::Error> {
    use crate::schema::users::dsl::*;

    let insertable_user = NewUser {
        email: new_user.email,
        password_hash: new_user.password_hash,
        first_name: new_user.first_name,
        last_name: new_user.last_name,
        status: UserStatus::Active.as_str().to_string(),
        company_id: new_user.company_id,
    };

    diesel::insert_into(users).values(&insertable_user).execute(conn)?;
    let last_id = last_insert_id(conn)?;

    users.filter(id.eq(last_id)).select(User::as_select()).first(conn)
}

pub fn get_user(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<Option<User>, diesel::result::Error> {
    use crate::schema::users::dsl::*;
    users.filter(id.eq(user_id)).select(User::as_select()).first(conn).optional()
}

pub fn get_user_by_email(
    conn: &mut SqliteConnection,
    user_email: &str,
) -> Result<Option<User>, diesel::result::Error> {
    use crate::schema::users::dsl::*;
    users
        .filter(email.eq(user_email))
        .select(User::as_select())
        .first(conn)
        .optional()
}

/// Returns all users in ascending order by id.
pub fn list_all_users(conn: &mut SqliteConnection) -> Result<Vec<User>, diesel::result::Error> {
    use crate::schema::users::dsl::*;
    users.order(id.asc()).select(User::as_select()).load(conn)
}

pub fn get_users_by_company(
    conn: &mut SqliteConnection,
    comp_id: i32,
) -> Result<Vec<User>, diesel::result::Error> {
    use crate::schema::users::dsl::*;
    users
        .filter(company_id.eq(comp_id))
        .order(id.asc())
        .select(User::as_select())
        .load(conn)
}

pub fn get_user_with_roles(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<Option<UserWithRoles>, diesel::result::Error> {
    let user = match get_user(conn, user_id)? {
        Some(u) => u,
        None => return Ok(None),
    };
    let roles = get_user_roles(conn, user.id)?;
    Ok(Some(UserWithRoles::from_parts(user, roles)))
}

/// Attaches roles to each user in the list.
pub fn attach_roles(
    conn: &mut SqliteConnection,
    user_list: Vec<User>,
) -> Result<Vec<UserWithRoles>, diesel::result::Error> {
    user_list
        .into_iter()
        .map(|u| {
            let roles = get_user_roles(conn, u.id)?;
            Ok(UserWithRoles::from_parts(u, roles))
        })
        .collect()
}

/// Applies a partial update. Returns Ok(None) when the user does not exist.
pub fn update_user(
    conn: &mut SqliteConnection,
    user_id: i32,
    changes: UserChanges,
) -> Result<Option<User>, diesel::result::Error> {
    use crate::schema::users::dsl::*;

    let changeset = UserChangeset {
        email: changes.email,
        password_hash: changes.password_hash,
        first_name: changes.first_name,
        last_name: changes.last_name,
        status: changes.status.map(|s| s.as_str().to_string()),
        company_id: changes.company_id,
        updated_at: chrono::Utc::now().naive_utc(),
    };

    let rows = diesel::update(users.filter(id.eq(user_id)))
        .set(&changeset)
        .execute(conn)?;
    if rows == 0 {
        return Ok(None);
    }
    get_user(conn, user_id)
}

/// Deletes a user; sessions and role links cascade.
/// Returns Ok(true) if the user existed.
pub fn delete_user(conn: &mut SqliteConnection, user_id: i32) -> Result<bool, diesel::result::Error> {
    use crate::schema::users::dsl::*;
    let rows = diesel::delete(users.filter(id.eq(user_id))).execute(conn)?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::company::insert_company;
    use crate::orm::testing::setup_test_db;
    use crate::orm::user_role::assign_user_role_by_name;

    fn input(email: &str, company_id: i32) -> UserInput {
        UserInput {
            email: email.to_string(),
            password_hash: "hashedpassword".to_string(),
            first_name: Some("Test".to_string()),
            last_name: None,
            company_id,
        }
    }

    #[test]
    fn test_insert_user() {
        let mut conn = setup_test_db();
        let company = insert_company(&mut conn, "Test Company".to_string()).unwrap();

        let user = insert_user(&mut conn, input("test@example.com", company.id)).unwrap();
        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.password_hash, "hashedpassword");
        assert_eq!(user.company_id, company.id);
        assert_eq!(user.status, "active");
        assert!(user.is_active());
        assert!(user.id > 0);
    }

    #[test]
    fn test_list_users_by_company() {
        let mut conn = setup_test_db();
        let a = insert_company(&mut conn, "Company A".to_string()).unwrap();
        let b = insert_company(&mut conn, "Company B".to_string()).unwrap();

        insert_user(&mut conn, input("user1@a.com", a.id)).unwrap();
        insert_user(&mut conn, input("user2@a.com", a.id)).unwrap();
        insert_user(&mut conn, input("user1@b.com", b.id)).unwrap();

        let in_a = get_users_by_company(&mut conn, a.id).unwrap();
        assert_eq!(in_a.len(), 2);
        assert_eq!(in_a[0].email, "user1@a.com");
        assert_eq!(list_all_users(&mut conn).unwrap().len(), 3);
    }

    #[test]
    fn test_update_user_partial() {
        let mut conn = setup_test_db();
        let company = insert_company(&mut conn, "Test Company".to_string()).unwrap();
        let user = insert_user(&mut conn, input("before@example.com", company.id)).unwrap();

        let updated = update_user(
            &mut conn,
            user.id,
            UserChanges {
                email: Some("after@example.com".to_string()),
                first_name: Some(None),
                status: Some(UserStatus::Inactive),
                ..Default::default()
            },
        )
        .unwrap()
        .expect("user exists");

        assert_eq!(updated.email, "after@example.com");
        assert_eq!(updated.first_name, None);
        assert_eq!(updated.status, "inactive");
        assert_eq!(updated.password_hash, "hashedpassword");
        assert!(update_user(&mut conn, 4242, UserChanges::default()).unwrap().is_none());
    }

    #[test]
    fn test_user_with_roles_and_delete() {
        let mut conn = setup_test_db();
        let company = insert_company(&mut conn, "Test Company".to_string()).unwrap();
        let user = insert_user(&mut conn, input("roles@example.com", company.id)).unwrap();
        assign_user_role_by_name(&mut conn, user.id, "admin").unwrap();

        let with_roles = get_user_with_roles(&mut conn, user.id).unwrap().expect("user exists");
        assert_eq!(with_roles.roles.len(), 1);
        assert_eq!(with_roles.roles[0].name, "admin");

        assert!(delete_user(&mut conn, user.id).unwrap());
        assert!(get_user(&mut conn, user.id).unwrap().is_none());
        assert!(!delete_user(&mut conn, user.id).unwrap());
    }
}
