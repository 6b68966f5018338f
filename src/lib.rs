//! Shared utilities for the OmniPath toolkit.
//!
//! Layered YAML settings with scoped overrides, per-module sessions pairing
//! settings with a log file, and a few collection helpers.

pub mod cli;
pub mod error;
pub mod logging;
pub mod misc;
pub mod session;
pub mod settings;

pub use error::{Result, SettingsError};
pub use logging::{LabeledLogger, Logger, LoggerConfig};
pub use session::{Session, SessionOptions, SessionRegistry};
pub use settings::{ContextGuard, ModuleLocator, ModuleRoots, Settings, SettingsMap};
