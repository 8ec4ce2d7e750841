use diesel::prelude::*;

use crate::models::{Company, CompanyInput, NewCompany};
use crate::orm::last_insert_id;

/// Try to find a company by name (case-sensitive).
/// Returns Ok(Some(Company)) if found, Ok(None) if not, Err on DB error.
pub fn get_company_by_name(
    conn: &mut SqliteConnection,
    comp: &CompanyInput,
) -> Result<Option<Company>, diesel::result::Error> {
    use crate::schema::companies::dsl::*;
    companies
        .filter(name.eq(&comp.name))
        .select(Company::as_select())
        .first(conn)
        .optional()
}

/// Try to find a company by name (case-insensitive).
pub fn get_company_by_name_case_insensitive(
    conn: &mut SqliteConnection,
    company_name: &str,
) -> Result<Option<Company>, diesel::result::Error> {
    diesel::sql_query("SELECT * FROM companies WHERE LOWER(name) = LOWER(?)")
        .bind::<diesel::sql_types::Text, _>(company_name)
        .get_result::<Company>(conn)
        .optional()
}

pub fn insert_company(
    conn: &mut SqliteConnection,
    comp_name: String,
) -> Result<Company, diesel::result::Error> {
    use crate::schema::companies::dsl::*;

    let new_comp = NewCompany { name: comp_name };

    diesel::insert_into(companies).values(&new_comp).execute(conn)?;
    let last_id = last_insert_id(conn)?;

    companies
        .filter(id.eq(last_id))
        .select(Company::as_select())
        .first(conn)
}

/// Try to find a company by id.
/// Returns Ok(Some(Company)) if found, Ok(None) if not, Err on DB error.
pub fn get_company_by_id(
    conn: &mut SqliteConnection,
    company_id: i32,
) -> Result<Option<Company>, diesel::result::Error> {
    use crate::schema::companies::dsl::*;
    companies
        .filter(id.eq(company_id))
        .select(Company::as_select())
        .first(conn)
        .optional()
}

/// Returns all companies in ascending order by id.
pub fn get_all_companies(conn: &mut SqliteConnection) -> Result<Vec<Company>, diesel::result::Error> {
    use crate::schema::companies::dsl::*;
    companies.order(id.asc()).select(Company::as_select()).load(conn)
}

/// Renames a company. Returns Ok(None) when the company does not exist.
pub fn rename_company(
    conn: &mut SqliteConnection,
    company_id: i32,
    new_name: String,
) -> Result<Option<Company>, diesel::result::Error> {
    use crate::schema::companies::dsl::*;

    let rows = diesel::update(companies.filter(id.eq(company_id)))
        .set((name.eq(new_name), updated_at.eq(chrono::Utc::now().naive_utc())))
        .execute(conn)?;

    if rows == 0 {
        return Ok(None);
    }
    get_company_by_id(conn, company_id)
}

/// Delete a company by id. Users, folders, sensors and plugs go with it
/// through the foreign key cascades.
/// Returns Ok(true) if company was found and deleted, Ok(false) if not found.
pub fn delete_company(
    conn: &mut SqliteConnection,
    company_id: i32,
) -> Result<bool, diesel::result::Error> {
    use crate::schema::companies::dsl::*;
    let rows_affected = diesel::delete(companies.filter(id.eq(company_id))).execute(conn)?;
    Ok(rows_affected > 0)
}
