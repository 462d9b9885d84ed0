//! Error types for segment recording and configuration.

use thiserror::Error;

/// Errors raised by the segment recorder.
///
/// The call interceptor never surfaces these to SDK callers: a call that
/// cannot be traced is passed through untouched.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    /// A segment was requested outside of any transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// The transaction has already ended and accepts no new segments.
    #[error("transaction {0} has already ended")]
    TransactionEnded(uuid::Uuid),

    /// The parent segment is closed and cannot receive children.
    #[error("parent segment `{0}` has already ended")]
    ParentEnded(String),
}

/// Configuration loading failed.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One of the figment providers produced an invalid value.
    #[error("invalid configuration")]
    Figment(#[source] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}
