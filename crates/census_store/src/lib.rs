mod analytics;
pub mod config;
mod db;
mod import;
pub mod migration;
mod patch;
pub mod store;

pub use census_core::*;
pub use config::{
    CensusConfig, DatabaseConfig, LimitsConfig, LoggingConfig, PoolConfig, default_sqlite_path,
    load_or_init_config,
};
pub use store::{CensusStore, open_store};
