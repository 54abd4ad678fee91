use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid sensor config: {0}")]
    InvalidSensor(&'static str),
    #[error("invalid tracker config: {0}")]
    InvalidTracker(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
