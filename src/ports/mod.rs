//! Port traits: the boundaries between domain logic and the outside world.

pub mod config_port;
pub mod data_port;
pub mod report_port;
pub mod store_port;
