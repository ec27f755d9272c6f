use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid creation option: {value}. Expected KEY=VALUE")]
    InvalidCreationOption { value: String },

    #[error("Missing required argument: {arg}")]
    MissingArgument { arg: String },

    #[error("Driver {driver} has no known file extension; pass --output explicitly")]
    NoExtension { driver: String },

    #[error("Conversion cancelled by user.")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Conversion(#[from] rasterconv::Error),
}
