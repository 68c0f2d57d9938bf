use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanflowError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Local, pre-network field validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("vendor is required")]
    MissingVendor,

    #[error("amount is required")]
    MissingAmount,

    #[error("amount '{0}' is not a valid number")]
    InvalidAmount(String),
}

impl ValidationError {
    /// Name of the form field the message belongs to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingVendor => "vendor",
            ValidationError::MissingAmount | ValidationError::InvalidAmount(_) => "amount",
        }
    }
}
