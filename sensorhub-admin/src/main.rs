// sensorhub-admin/src/main.rs

use clap::{Parser, Subcommand};

mod admin_cli;

use admin_cli::{
    company_commands::{CompanyAction, handle_company_command_with_conn},
    power_commands::{PowerAction, handle_power_command_with_conn},
    sensor_commands::{SensorAction, handle_sensor_command_with_conn},
    user_commands::{UserAction, handle_user_command_with_conn},
    utils::establish_connection,
};

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Parser)]
#[command(name = "sensorhub-admin")]
#[command(about = "Console administration for the SensorHub database")]
#[command(version)]
struct Cli {
    /// Show extended version information
    #[arg(long, action = clap::ArgAction::SetTrue)]
    version_info: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Company management")]
    Company {
        #[command(subcommand)]
        action: CompanyAction,
    },
    #[command(about = "User management")]
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    #[command(about = "Sensor management")]
    Sensor {
        #[command(subcommand)]
        action: SensorAction,
    },
    #[command(about = "Power sensor control")]
    Power {
        #[command(subcommand)]
        action: PowerAction,
    },
}

fn main() {
    let cli = Cli::parse();

    if cli.version_info {
        println!("sensorhub-admin {}", built_info::PKG_VERSION);
        println!("Built: {}", built_info::BUILT_TIME_UTC);
        if let Some(commit) = built_info::GIT_COMMIT_HASH {
            println!("Git commit: {}", commit);
        }
        return;
    }

    let Some(command) = cli.command else {
        eprintln!("No command given. Run with --help for usage.");
        std::process::exit(2);
    };

    if let Err(e) = run(command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = establish_connection()?;
    match command {
        Commands::Company { action } => handle_company_command_with_conn(&mut conn, action),
        Commands::User { action } => handle_user_command_with_conn(&mut conn, action),
        Commands::Sensor { action } => handle_sensor_command_with_conn(&mut conn, action),
        Commands::Power { action } => handle_power_command_with_conn(&mut conn, action),
    }
}
