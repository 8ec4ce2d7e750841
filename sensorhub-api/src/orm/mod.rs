pub mod company;
mod db;
pub mod folder;
pub mod login;
pub mod logout;
pub mod power_sensor;
pub mod product;
pub mod purchase;
pub mod role;
pub mod sensor;
pub mod testing;
pub mod user;
pub mod user_role;

pub use db::*;
