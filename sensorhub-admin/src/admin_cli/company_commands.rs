use clap::Subcommand;
use diesel::sqlite::SqliteConnection;
use sensorhub_api::orm::{
    company::{
        delete_company, get_all_companies, get_company_by_id, get_company_by_name_case_insensitive,
        insert_company, rename_company,
    },
    power_sensor::get_power_sensors_by_company,
    sensor::get_sensors_by_company,
    user::get_users_by_company,
};

use super::utils::{confirm, filter_by_term};

#[derive(Subcommand)]
pub enum CompanyAction {
    #[command(about = "List companies, optionally filtered by search term")]
    Ls {
        #[arg(help = "Search term (regex by default, use -F for fixed string)")]
        search_term: Option<String>,
        #[arg(
            short = 'F',
            long = "fixed-string",
            help = "Treat search term as fixed string instead of regex"
        )]
        fixed_string: bool,
    },
    #[command(about = "Add a new company")]
    Add {
        #[arg(short, long, help = "Company name")]
        name: String,
    },
    #[command(about = "Remove companies matching search term, with their users and devices")]
    Rm {
        #[arg(
            help = "Search term to match companies for removal (regex by default, use -F for fixed string)"
        )]
        search_term: String,
        #[arg(
            short = 'F',
            long = "fixed-string",
            help = "Treat search term as fixed string instead of regex"
        )]
        fixed_string: bool,
        #[arg(short = 'y', long = "yes", help = "Skip confirmation prompt")]
        yes: bool,
    },
    #[command(about = "Rename a company")]
    Edit {
        #[arg(short, long, help = "Company ID to edit")]
        id: i32,
        #[arg(long, help = "New company name")]
        name: Option<String>,
    },
}

pub fn handle_company_command_with_conn(
    conn: &mut SqliteConnection,
    action: CompanyAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        CompanyAction::Ls { search_term, fixed_string } => {
            company_ls_impl(conn, search_term, fixed_string)?;
        }
        CompanyAction::Add { name } => {
            company_add_impl(conn, name)?;
        }
        CompanyAction::Rm { search_term, fixed_string, yes } => {
            company_rm_impl(conn, search_term, fixed_string, yes)?;
        }
        CompanyAction::Edit { id, name } => {
            company_edit_impl(conn, id, name)?;
        }
    }
    Ok(())
}

pub fn company_ls_impl(
    conn: &mut SqliteConnection,
    search_term: Option<String>,
    fixed_string: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let companies = filter_by_term(get_all_companies(conn)?, search_term.as_deref(), fixed_string, |c| {
        c.name.clone()
    })?;

    if companies.is_empty() {
        println!("No companies found.");
    } else {
        println!("Companies:");
        for company in companies {
            println!(
                "  ID: {}, Name: {}, Created: {}",
                company.id,
                company.name,
                company.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    Ok(())
}

pub fn company_add_impl(conn: &mut SqliteConnection, name: String) -> Result<(), Box<dyn std::error::Error>> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err("Company name must not be empty".into());
    }

    if let Some(existing) = get_company_by_name_case_insensitive(conn, &name)? {
        println!("Company already exists!");
        println!("ID: {}", existing.id);
        println!("Name: {}", existing.name);
        return Ok(());
    }

    let created = insert_company(conn, name)?;
    println!("Company created successfully!");
    println!("ID: {}", created.id);
    println!("Name: {}", created.name);
    Ok(())
}

pub fn company_rm_impl(
    conn: &mut SqliteConnection,
    search_term: String,
    fixed_string: bool,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let matching = filter_by_term(get_all_companies(conn)?, Some(&search_term), fixed_string, |c| {
        c.name.clone()
    })?;

    if matching.is_empty() {
        println!("No companies found matching the search term.");
        return Ok(());
    }

    println!("Found {} company(ies) matching the search term:", matching.len());
    for company in &matching {
        let users = get_users_by_company(conn, company.id)?;
        let sensors = get_sensors_by_company(conn, company.id)?;
        let plugs = get_power_sensors_by_company(conn, company.id)?;
        println!(
            "  ID: {}, Name: {}, Users: {}, Sensors: {}, Power sensors: {}",
            company.id,
            company.name,
            users.len(),
            sensors.len(),
            plugs.len()
        );
    }

    if !yes
        && !confirm(&format!(
            "Are you sure you want to delete these {} company(ies) with all their users and devices?",
            matching.len()
        ))?
    {
        println!("Operation cancelled.");
        return Ok(());
    }

    let mut deleted_count = 0;
    let mut errors = Vec::new();
    for company in matching {
        match delete_company(conn, company.id) {
            Ok(true) => {
                deleted_count += 1;
                println!("Deleted company: {} (ID: {})", company.name, company.id);
            }
            Ok(false) => {}
            Err(e) => errors.push(format!(
                "Failed to delete company {} (ID: {}): {}",
                company.name, company.id, e
            )),
        }
    }

    println!("Successfully deleted {} company(ies).", deleted_count);
    if !errors.is_empty() {
        println!("Errors encountered:");
        for error in errors {
            println!("  {}", error);
        }
        return Err("Some deletions failed".into());
    }
    Ok(())
}

pub fn company_edit_impl(
    conn: &mut SqliteConnection,
    company_id: i32,
    new_name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if get_company_by_id(conn, company_id)?.is_none() {
        return Err(format!("Company with ID {} does not exist", company_id).into());
    }
    let Some(new_name) = new_name else {
        println!("No fields specified for update. Use --name.");
        return Ok(());
    };

    if let Some(other) = get_company_by_name_case_insensitive(conn, &new_name)? {
        if other.id != company_id {
            return Err(format!("Company name '{}' is already taken (ID {})", new_name, other.id).into());
        }
    }

    let company = rename_company(conn, company_id, new_name)?
        .ok_or_else(|| format!("Company with ID {} does not exist", company_id))?;
    println!("Company updated successfully!");
    println!("ID: {}", company.id);
    println!("Name: {}", company.name);
    Ok(())
}
