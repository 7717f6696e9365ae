pub mod backend;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod monitor;
pub mod shutdown;
