//! Logging setup.
//!
//! The crate logs through the `log` facade; the render worker's thread name
//! shows up in the default `env_logger` format, which makes it easy to tell
//! UI-side stages from worker-side ones.

mod init;

pub use init::{init_logging, LoggingConfig};
