use crate::wallet::provider::ProviderError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// No injected wallet / node provider is available
    #[error("Wallet provider not available")]
    ProviderUnavailable,

    /// A `connect()` call is already pending
    #[error("Connection already in progress, wait for the pending request to finish")]
    ConnectionInProgress,

    #[error("No accounts found. Please connect your wallet.")]
    NoAccounts,

    #[error("Connection rejected by user")]
    UserRejected,

    #[error("Connection request already pending in wallet")]
    RequestPending,

    /// Raw JSON-RPC / provider failure
    #[error("Provider Error ({code}): {message}")]
    Provider { code: i64, message: String },

    /// Rate limiter denied the call
    #[error("Rate limit exceeded for {category}. Try again in {}s", (.retry_after.as_millis() + 999) / 1000)]
    RateLimited {
        category: String,
        retry_after: Duration,
    },

    /// Transport-level failures (connect, timeout, DNS)
    #[error("Network Error: {0}")]
    Network(String),

    /// Non-2xx response from the trading API
    #[error("API Error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A recent failure of the same call is still memoized
    #[error("{label} failed recently: {message}")]
    CachedFailure { label: String, message: String },

    #[error("{label} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    /// Signed blockchain write failed; never retried
    #[error("{label} failed: {message}")]
    TransactionFailed { label: String, message: String },

    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    #[error("Asset {0} not supported")]
    UnsupportedAsset(String),

    #[error("Parse Error: {0}")]
    Parse(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Parse(format!("Response body error: {}", err))
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<ProviderError> for ClientError {
    fn from(err: ProviderError) -> Self {
        match err.code {
            4001 => ClientError::UserRejected,
            -32002 => ClientError::RequestPending,
            code => ClientError::Provider {
                code,
                message: err.message,
            },
        }
    }
}

impl ClientError {
    /// Peels retry annotations off and returns the error that actually happened.
    pub fn root_cause(&self) -> &ClientError {
        match self {
            ClientError::RetriesExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether a later attempt of the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Provider { code, .. } => {
                // JSON-RPC internal / server errors and limit responses
                matches!(code, -32603 | -32005 | -32000 | 429)
            }
            ClientError::Api { status, .. } => *status == 429 || *status >= 500,
            ClientError::RequestPending => true,
            ClientError::RetriesExhausted { source, .. } => source.is_retryable(),
            ClientError::Internal(_) => true,
            ClientError::ProviderUnavailable
            | ClientError::ConnectionInProgress
            | ClientError::NoAccounts
            | ClientError::UserRejected
            | ClientError::RateLimited { .. }
            | ClientError::CachedFailure { .. }
            | ClientError::TransactionFailed { .. }
            | ClientError::InvalidInput(_)
            | ClientError::UnsupportedAsset(_)
            | ClientError::Parse(_)
            | ClientError::Config(_) => false,
        }
    }

    /// Categorizes error for logging and UI messaging
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            ClientError::ProviderUnavailable
            | ClientError::ConnectionInProgress
            | ClientError::NoAccounts
            | ClientError::UserRejected
            | ClientError::RequestPending => ErrorCategory::Wallet,
            ClientError::Provider { .. } | ClientError::Network(_) | ClientError::Api { .. } => {
                ErrorCategory::Network
            }
            ClientError::RateLimited { .. } | ClientError::CachedFailure { .. } => {
                ErrorCategory::Throttled
            }
            ClientError::RetriesExhausted { source, .. } => source.categorize(),
            ClientError::TransactionFailed { .. } => ErrorCategory::Transaction,
            ClientError::InvalidInput(_)
            | ClientError::UnsupportedAsset(_)
            | ClientError::Parse(_) => ErrorCategory::Data,
            ClientError::Config(_) => ErrorCategory::Configuration,
            ClientError::Internal(_) => ErrorCategory::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    Wallet,
    Network,
    Throttled,
    Transaction,
    Data,
    Configuration,
    Critical,
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_codes_map_to_wallet_errors() {
        let rejected: ClientError = ProviderError::new(4001, "User rejected the request.").into();
        assert!(matches!(rejected, ClientError::UserRejected));

        let pending: ClientError = ProviderError::new(-32002, "already pending").into();
        assert!(matches!(pending, ClientError::RequestPending));

        let other: ClientError = ProviderError::new(4902, "Unrecognized chain ID").into();
        assert!(matches!(other, ClientError::Provider { code: 4902, .. }));
    }

    #[test]
    fn test_root_cause_unwraps_retry_annotation() {
        let err = ClientError::RetriesExhausted {
            label: "getUserCopyInfo".to_string(),
            attempts: 3,
            source: Box::new(ClientError::Network("connection reset".to_string())),
        };
        assert!(matches!(err.root_cause(), ClientError::Network(_)));
        assert!(err.is_retryable());
        assert_eq!(err.categorize(), ErrorCategory::Network);
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn test_rate_limited_message_rounds_up_to_a_second() {
        let err = ClientError::RateLimited {
            category: "contract_write".to_string(),
            retry_after: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded for contract_write. Try again in 1s"
        );
        assert!(!err.is_retryable());
    }
}
