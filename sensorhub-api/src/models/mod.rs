pub mod company;
pub mod folder;
pub mod power_sensor;
pub mod product;
pub mod purchase;
pub mod role;
pub mod sensor;
pub mod session;
pub mod user;
pub mod user_role;

// Re-export models for easier access
pub use company::*;
pub use folder::*;
pub use power_sensor::*;
pub use product::*;
pub use purchase::*;
pub use role::*;
pub use sensor::*;
pub use session::*;
pub use user::*;
pub use user_role::*;
