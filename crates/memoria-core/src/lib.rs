//! Core data model and configuration shared by every memoria crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{CoreError, Result};
pub use types::*;
