pub mod config;
pub mod constants;
pub mod container;
pub mod cron;
pub mod db;
pub mod error;
pub mod executor;
pub mod runner;
pub mod scheduler;

pub use error::{DataSecError, Result};
