//! Runtime plumbing for the seedbed binary: layered configuration,
//! logging initialization and home-directory handling.

pub mod config;
pub mod logging;
pub mod paths;

pub use config::{AppConfig, CliArgs, DatabaseConfig, LoggingConfig, SeederConfig};
pub use logging::init_logging_from_config;
pub use paths::resolve_home_dir;
