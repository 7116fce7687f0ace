use thiserror::Error;

/// Unified error type for cdnlog.
#[derive(Error, Debug)]
pub enum CdnLogError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, CdnLogError>;
