use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

/// Errors from the candle source.
///
/// `Empty` is distinct from a failed call: the exchange answered, but had no
/// candles for the request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("rate limited by exchange")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("exchange returned no data")]
    Empty,

    #[error("{0}")]
    Unknown(String),
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited | FetchError::Timeout | FetchError::Unknown(_)
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Unknown(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::Unknown("boom".into()).is_retryable());
        assert!(!FetchError::Empty.is_retryable());
        assert!(!FetchError::InvalidSymbol("XYZ".into()).is_retryable());
    }

    #[test]
    fn test_fetch_error_converts_into_app_error() {
        let err: AppError = FetchError::Empty.into();
        assert_eq!(err.to_string(), "Fetch error: exchange returned no data");
    }
}
