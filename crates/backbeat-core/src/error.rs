//! Error types for backbeat

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackbeatError {
    #[error("step field out of range: {field} = {value}")]
    StepFieldOutOfRange { field: &'static str, value: f64 },
    #[error("step index out of range: {0}")]
    StepIndexOutOfRange(usize),
    #[error("export already in progress")]
    ExportInProgress,
    #[error("audio error: {0}")]
    Audio(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackbeatError>;
