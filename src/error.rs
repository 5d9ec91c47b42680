//! Error types for quotebot.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Timed submission could not hand the task to a worker in time.
    /// The task was never executed.
    #[error("job request timed out")]
    JobTimedOut,

    /// Submission after the pool was stopped.
    #[error("worker pool is stopped")]
    PoolStopped,

    /// The worker executing the task went away without producing a result
    /// (the task panicked).
    #[error("task abandoned without a result")]
    TaskLost,

    #[error("pool concurrency must be at least 1, got {0}")]
    InvalidPoolSize(usize),

    #[error("chat API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("chat API request forbidden")]
    Forbidden,

    #[error("update contains no message")]
    NoMessage,

    #[error("quote not found: {0}")]
    QuoteNotFound(String),

    #[error("session store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
