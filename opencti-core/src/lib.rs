pub mod config;
pub mod error;

pub use config::{ExporterConfig, LogFormat};
pub use error::ExporterError;
