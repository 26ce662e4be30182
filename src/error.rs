use thiserror::Error;

#[derive(Error, Debug)]
pub enum HorizonError {
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Missing extract table: {0}")]
    MissingTable(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Validation: {0}")]
    Validation(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, HorizonError>;
