use thiserror::Error;

/// Errors raised while bootstrapping the exporter.
#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config source error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ExporterError {
    fn from(err: figment::Error) -> Self {
        ExporterError::Figment(Box::new(err))
    }
}

impl ExporterError {
    /// Process exit code for a startup failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExporterError::ConfigError(_) | ExporterError::Figment(_) => 78,
            ExporterError::Io(_) => 74,
        }
    }
}
