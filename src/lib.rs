pub mod config;
pub mod error;
pub mod gatt;
pub mod manager;
pub mod radio;
pub mod uuid;

pub use self::manager::Manager;
