pub mod att;
pub mod characteristic;
pub mod client;
pub mod descriptor;
pub mod peripheral_event;
pub mod properties;
pub mod service;
pub mod standard;
