use std::{result, time::Duration};

use thiserror::Error;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] db::StoreError),
    #[error("external service error: {0}")]
    ExternalService(#[from] ExternalServiceError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures talking to the service that reports message reactions.
#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("discord request failed: {0}")]
    Discord(#[from] serenity::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<envconfig::Error> for Error {
    fn from(e: envconfig::Error) -> Error {
        Error::Configuration(e.to_string())
    }
}
