pub mod config;
pub mod housekeeping;
pub mod server;
pub mod store;
pub mod telemetry;
