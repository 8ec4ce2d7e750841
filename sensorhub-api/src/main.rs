// sensorhub-api/src/main.rs

use clap::Parser;
use rocket::error;
use rocket::info;
use sensorhub_api::api::status::built_info;
use std::env;

#[derive(Parser)]
#[command(name = "sensorhub-api")]
#[command(about = "SensorHub API server for device tracking and smart plug control")]
#[command(version)]
struct Cli {
    /// Show extended version information
    #[arg(long, action = clap::ArgAction::SetTrue)]
    version_info: bool,
}

#[rocket::main]
async fn main() {
    let cli = Cli::parse();

    if cli.version_info {
        println!("sensorhub-api {}", built_info::PKG_VERSION);
        println!("Built: {}", built_info::BUILT_TIME_UTC);
        if let Some(commit) = built_info::GIT_COMMIT_HASH {
            println!("Git commit: {}", commit);
        }
        return;
    }

    dotenvy::dotenv().ok();

    match env::current_dir() {
        Ok(path) => info!("Current directory: {}", path.display()),
        Err(e) => error!("Error getting current directory: {}", e),
    };

    info!("SensorHub API v{} starting", built_info::PKG_VERSION);
    info!("Built: {}", built_info::BUILT_TIME_UTC);
    if let Some(commit) = built_info::GIT_COMMIT_HASH {
        info!("Git commit: {}", commit);
    }

    if let Err(e) = sensorhub_api::rocket().launch().await {
        error!("Rocket server failed to launch: {}", e);
        std::process::exit(1);
    }
}
