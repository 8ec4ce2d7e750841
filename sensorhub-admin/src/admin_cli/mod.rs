pub mod company_commands;
pub mod power_commands;
pub mod sensor_commands;
pub mod user_commands;
pub mod utils;
