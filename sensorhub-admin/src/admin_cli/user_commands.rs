use std::io::{self, Write};

use clap::Subcommand;
use diesel::sqlite::SqliteConnection;
use rpassword::read_password;
use sensorhub_api::models::{UserInput, UserStatus};
use sensorhub_api::orm::{
    login::hash_password,
    logout::revoke_user_sessions,
    role::get_role_by_name,
    user::{UserChanges, delete_user, get_user_by_email, insert_user, list_all_users, update_user},
    user_role::{assign_user_role_by_name, get_user_roles, remove_user_role_by_name},
};

use super::utils::{confirm, filter_by_term, resolve_company_id};

#[derive(Subcommand)]
pub enum UserAction {
    #[command(about = "Add a new user")]
    Add {
        #[arg(short, long, help = "Email address")]
        email: String,
        #[arg(short, long, help = "Password (will be prompted securely if not provided)")]
        password: Option<String>,
        #[arg(short, long, help = "Company ID or name")]
        company: String,
        #[arg(short, long, default_value = "user", help = "Initial role (master, admin or user)")]
        role: String,
        #[arg(long, help = "First name")]
        first_name: Option<String>,
        #[arg(long, help = "Last name")]
        last_name: Option<String>,
    },
    #[command(about = "Change user password")]
    ChangePassword {
        #[arg(short, long, help = "Email address")]
        email: String,
        #[arg(short, long, help = "New password (will be prompted securely if not provided)")]
        password: Option<String>,
    },
    #[command(about = "List users, optionally filtered by search term")]
    Ls {
        #[arg(help = "Search term (regex by default, use -F for fixed string)")]
        search_term: Option<String>,
        #[arg(short = 'F', long = "fixed-string", help = "Treat search term as fixed string instead of regex")]
        fixed_string: bool,
    },
    #[command(about = "Remove users matching search term")]
    Rm {
        #[arg(help = "Search term to match users for removal (regex by default, use -F for fixed string)")]
        search_term: String,
        #[arg(short = 'F', long = "fixed-string", help = "Treat search term as fixed string instead of regex")]
        fixed_string: bool,
        #[arg(short = 'y', long = "yes", help = "Skip confirmation prompt")]
        yes: bool,
    },
    #[command(about = "Activate or deactivate a user")]
    SetStatus {
        #[arg(short, long, help = "User email address")]
        email: String,
        #[arg(short, long, help = "active or inactive")]
        status: UserStatus,
    },
    #[command(about = "Add a role to a user")]
    AddRole {
        #[arg(short, long, help = "User email address")]
        email: String,
        #[arg(short, long, help = "Role name to add")]
        role: String,
    },
    #[command(about = "Remove a role from a user")]
    RmRole {
        #[arg(short, long, help = "User email address")]
        email: String,
        #[arg(short, long, help = "Role name to remove")]
        role: String,
    },
}

pub fn handle_user_command_with_conn(
    conn: &mut SqliteConnection,
    action: UserAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        UserAction::Add {
            email,
            password,
            company,
            role,
            first_name,
            last_name,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_for_password()?,
            };
            add_user_impl(conn, &email, &password, &company, &role, first_name, last_name)?;
        }
        UserAction::ChangePassword { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_for_password()?,
            };
            change_password_impl(conn, &email, &password)?;
        }
        UserAction::Ls { search_term, fixed_string } => {
            list_users_impl(conn, search_term, fixed_string)?;
        }
        UserAction::Rm { search_term, fixed_string, yes } => {
            remove_users_impl(conn, search_term, fixed_string, yes)?;
        }
        UserAction::SetStatus { email, status } => {
            set_status_impl(conn, &email, status)?;
        }
        UserAction::AddRole { email, role } => {
            user_add_role_impl(conn, &email, &role)?;
        }
        UserAction::RmRole { email, role } => {
            user_rm_role_impl(conn, &email, &role)?;
        }
    }
    Ok(())
}

fn require_user(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<sensorhub_api::models::User, Box<dyn std::error::Error>> {
    get_user_by_email(conn, email)?.ok_or_else(|| format!("User with email '{}' not found", email).into())
}

pub fn add_user_impl(
    conn: &mut SqliteConnection,
    email: &str,
    password: &str,
    company: &str,
    role_name: &str,
    first_name: Option<String>,
    last_name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if password.is_empty() {
        return Err("Password cannot be empty".into());
    }
    let company_id = resolve_company_id(conn, company)?;
    get_role_by_name(conn, role_name)?.ok_or_else(|| format!("Role '{}' not found", role_name))?;
    if get_user_by_email(conn, email)?.is_some() {
        return Err(format!("A user with email '{}' already exists", email).into());
    }

    let created_user = insert_user(
        conn,
        UserInput {
            email: email.to_string(),
            password_hash: hash_password(password),
            first_name,
            last_name,
            company_id,
        },
    )?;
    assign_user_role_by_name(conn, created_user.id, role_name)?;

    println!("User created successfully!");
    println!("ID: {}", created_user.id);
    println!("Email: {}", created_user.email);
    println!("Company ID: {}", created_user.company_id);
    println!("Role: {}", role_name);
    Ok(())
}

pub fn change_password_impl(
    conn: &mut SqliteConnection,
    email: &str,
    password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if password.is_empty() {
        return Err("Password cannot be empty".into());
    }
    let user = require_user(conn, email)?;
    update_user(
        conn,
        user.id,
        UserChanges {
            password_hash: Some(hash_password(password)),
            ..Default::default()
        },
    )?;
    println!("Password changed successfully for user: {}", email);
    Ok(())
}

pub fn list_users_impl(
    conn: &mut SqliteConnection,
    search_term: Option<String>,
    fixed_string: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let users = filter_by_term(list_all_users(conn)?, search_term.as_deref(), fixed_string, |u| {
        u.email.clone()
    })?;

    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }
    println!("Users:");
    for user in users {
        let roles: Vec<String> = get_user_roles(conn, user.id)?.into_iter().map(|r| r.name).collect();
        println!(
            "  ID: {}, Email: {}, Company ID: {}, Status: {}, Roles: {}",
            user.id,
            user.email,
            user.company_id,
            user.status,
            roles.join(",")
        );
    }
    Ok(())
}

pub fn remove_users_impl(
    conn: &mut SqliteConnection,
    search_term: String,
    fixed_string: bool,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let matching = filter_by_term(list_all_users(conn)?, Some(&search_term), fixed_string, |u| {
        u.email.clone()
    })?;

    if matching.is_empty() {
        println!("No users found matching the search term.");
        return Ok(());
    }
    println!("Found {} user(s) matching the search term:", matching.len());
    for user in &matching {
        println!("  ID: {}, Email: {}, Company ID: {}", user.id, user.email, user.company_id);
    }

    if !yes && !confirm(&format!("Are you sure you want to delete these {} user(s)?", matching.len()))? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let mut deleted_count = 0;
    let mut errors = Vec::new();
    for user in matching {
        match delete_user(conn, user.id) {
            Ok(true) => {
                deleted_count += 1;
                println!("Deleted user: {} (ID: {})", user.email, user.id);
            }
            Ok(false) => {}
            Err(e) => errors.push(format!("Failed to delete user {} (ID: {}): {}", user.email, user.id, e)),
        }
    }

    println!("Successfully deleted {} user(s).", deleted_count);
    if !errors.is_empty() {
        println!("Errors encountered:");
        for error in errors {
            println!("  {}", error);
        }
        return Err("Some deletions failed".into());
    }
    Ok(())
}

pub fn set_status_impl(
    conn: &mut SqliteConnection,
    email: &str,
    status: UserStatus,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = require_user(conn, email)?;
    update_user(
        conn,
        user.id,
        UserChanges {
            status: Some(status),
            ..Default::default()
        },
    )?;
    if status == UserStatus::Inactive {
        let revoked = revoke_user_sessions(conn, user.id)?;
        println!("Revoked {} session(s)", revoked);
    }
    println!("User '{}' is now {}", email, status);
    Ok(())
}

pub fn prompt_for_password() -> Result<String, Box<dyn std::error::Error>> {
    print!("Enter new password: ");
    io::stdout().flush()?;
    let password = read_password()?;

    if password.is_empty() {
        return Err("Password cannot be empty".into());
    }

    print!("Confirm new password: ");
    io::stdout().flush()?;
    let confirm_password = read_password()?;

    if password != confirm_password {
        return Err("Passwords do not match".into());
    }

    Ok(password)
}

pub fn user_add_role_impl(
    conn: &mut SqliteConnection,
    email: &str,
    role_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = require_user(conn, email)?;
    get_role_by_name(conn, role_name)?.ok_or_else(|| format!("Role '{}' not found", role_name))?;

    let current_roles = get_user_roles(conn, user.id)?;
    if current_roles.iter().any(|r| r.name == role_name) {
        println!("User '{}' already has role '{}'", email, role_name);
        return Ok(());
    }

    assign_user_role_by_name(conn, user.id, role_name)?;
    println!("Successfully added role '{}' to user '{}'", role_name, email);
    Ok(())
}

pub fn user_rm_role_impl(
    conn: &mut SqliteConnection,
    email: &str,
    role_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = require_user(conn, email)?;
    get_role_by_name(conn, role_name)?.ok_or_else(|| format!("Role '{}' not found", role_name))?;

    let current_roles = get_user_roles(conn, user.id)?;
    if !current_roles.iter().any(|r| r.name == role_name) {
        println!("User '{}' does not have role '{}'", email, role_name);
        return Ok(());
    }
    if current_roles.len() <= 1 {
        return Err(format!(
            "Cannot remove role '{}' from user '{}': users must have at least one role",
            role_name, email
        )
        .into());
    }

    remove_user_role_by_name(conn, user.id, role_name)?;
    println!("Successfully removed role '{}' from user '{}'", role_name, email);
    Ok(())
}
