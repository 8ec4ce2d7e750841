use diesel::{prelude::*, sqlite::SqliteConnection};
use dotenvy::dotenv;
use regex::Regex;
use sensorhub_api::orm::company::{get_company_by_id, get_company_by_name_case_insensitive};

pub fn establish_connection() -> Result<SqliteConnection, Box<dyn std::error::Error>> {
    dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set (in the environment or .env)")?;
    let mut conn = SqliteConnection::establish(&database_url)?;
    // Company removal relies on the ON DELETE CASCADE clauses.
    diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
    Ok(conn)
}

/// Keeps the items whose key matches `term`, as a regex or, with
/// `fixed_string`, as a plain substring. No term keeps everything.
pub fn filter_by_term<T>(
    items: Vec<T>,
    term: Option<&str>,
    fixed_string: bool,
    key: impl Fn(&T) -> String,
) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    let Some(term) = term else {
        return Ok(items);
    };
    if fixed_string {
        return Ok(items.into_iter().filter(|item| key(item).contains(term)).collect());
    }
    let regex = Regex::new(term).map_err(|e| format!("Invalid regex pattern '{}': {}", term, e))?;
    Ok(items.into_iter().filter(|item| regex.is_match(&key(item))).collect())
}

/// Asks a y/N question on stdin.
pub fn confirm(prompt: &str) -> Result<bool, Box<dyn std::error::Error>> {
    use std::io::{self, Write};

    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

/// Resolve a company identifier (either ID as string/number or name) to a
/// company ID. Numbers are treated as IDs and must exist; anything else is
/// looked up by name, case-insensitively.
pub fn resolve_company_id(
    conn: &mut SqliteConnection,
    company_identifier: &str,
) -> Result<i32, Box<dyn std::error::Error>> {
    if let Ok(id) = company_identifier.parse::<i32>() {
        match get_company_by_id(conn, id)? {
            Some(_company) => Ok(id),
            None => Err(format!("Company with ID {} does not exist", id).into()),
        }
    } else {
        match get_company_by_name_case_insensitive(conn, company_identifier)? {
            Some(company) => Ok(company.id),
            None => Err(format!("Company with name '{}' does not exist", company_identifier).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorhub_api::orm::company::insert_company;
    use sensorhub_api::orm::testing::setup_test_db;

    #[test]
    fn test_resolve_company_id() {
        let mut conn = setup_test_db();
        let company = insert_company(&mut conn, "Acme Farms".to_string()).unwrap();

        assert_eq!(resolve_company_id(&mut conn, &company.id.to_string()).unwrap(), company.id);
        assert_eq!(resolve_company_id(&mut conn, "acme farms").unwrap(), company.id);
        assert!(resolve_company_id(&mut conn, "9999").is_err());
        assert!(resolve_company_id(&mut conn, "Nobody Inc").is_err());
    }

    #[test]
    fn test_filter_by_term() {
        let names = vec!["North Field".to_string(), "Barn A".to_string(), "Barn B".to_string()];

        let all = filter_by_term(names.clone(), None, false, |n| n.clone()).unwrap();
        assert_eq!(all.len(), 3);

        let barns = filter_by_term(names.clone(), Some("^Barn"), false, |n| n.clone()).unwrap();
        assert_eq!(barns, vec!["Barn A".to_string(), "Barn B".to_string()]);

        let literal = filter_by_term(names.clone(), Some("^Barn"), true, |n| n.clone()).unwrap();
        assert!(literal.is_empty());

        assert!(filter_by_term(names, Some("("), false, |n| n.clone()).is_err());
    }
}
