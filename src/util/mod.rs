//! Utility modules for consilium

pub mod logging;

pub use logging::{init_from_env, init_logging, init_with_level, LoggingConfig};
