//! Error types for the Rent2Repay dashboard

use thiserror::Error;

/// Core errors that can occur in the dashboard backend
#[derive(Debug, Error)]
pub enum Error {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TxError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// JSON-RPC transport and node errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC endpoint unreachable at {url}")]
    Unreachable { url: String },

    /// Error object returned by the node, message kept verbatim
    #[error("RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    #[error("RPC request {method} timed out after {secs}s")]
    Timeout { method: String, secs: u64 },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Connected to chain {actual}, expected {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
}

/// Protocol-level errors: input validation and informational conditions
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid address: {address}")]
    InvalidAddress { address: String },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Invalid transaction hash: {hash}")]
    InvalidTxHash { hash: String },

    #[error("Invalid period: {message}")]
    InvalidPeriod { message: String },

    #[error("Both a date and a time are required")]
    MissingDateTime,

    #[error("Invalid activation time: {message}")]
    InvalidTimestamp { message: String },

    #[error("At most {max} tokens can be configured")]
    TooManyTokens { max: usize },

    #[error("Token {token} is already configured")]
    DuplicateToken { token: String },

    #[error("Token {token} is not a supported repayment token")]
    UnknownToken { token: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("{action} requires the {required} role")]
    PermissionDenied { action: String, required: String },

    #[error("Protocol state unavailable: {reason}")]
    StateUnavailable { reason: String },

    #[error("Failed to decode contract data: {message}")]
    DecodeError { message: String },
}

/// Transaction building errors
#[derive(Debug, Error)]
pub enum TxError {
    #[error("Failed to build transaction: {message}")]
    BuildFailed { message: String },

    #[error("No users provided for batch execution")]
    EmptyBatch,

    #[error("Token and amount lists differ in length ({tokens} vs {amounts})")]
    LengthMismatch { tokens: usize, amounts: usize },

    /// Gas estimation reverted; the node's message is kept verbatim
    #[error("Transaction would revert: {message}")]
    Reverted { message: String },
}

/// Result type alias for dashboard operations
pub type Result<T> = std::result::Result<T, Error>;

impl RpcError {
    /// Get an HTTP-friendly error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "rpc_unreachable",
            Self::JsonRpc { .. } => "rpc_error",
            Self::Timeout { .. } => "rpc_timeout",
            Self::ParseError(_) => "rpc_parse_error",
            Self::ChainMismatch { .. } => "chain_mismatch",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unreachable { .. } | Self::Timeout { .. } => 503,
            Self::JsonRpc { .. } | Self::ParseError(_) => 502,
            Self::ChainMismatch { .. } => 503,
        }
    }
}

impl ProtocolError {
    /// Get an HTTP-friendly error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAddress { .. } => "invalid_address",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::InvalidTxHash { .. } => "invalid_tx_hash",
            Self::InvalidPeriod { .. } => "invalid_period",
            Self::MissingDateTime => "missing_date_time",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::TooManyTokens { .. } => "too_many_tokens",
            Self::DuplicateToken { .. } => "duplicate_token",
            Self::UnknownToken { .. } => "unknown_token",
            Self::NotFound { .. } => "not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::StateUnavailable { .. } => "state_unavailable",
            Self::DecodeError { .. } => "decode_error",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidAddress { .. }
            | Self::InvalidAmount { .. }
            | Self::InvalidTxHash { .. }
            | Self::InvalidPeriod { .. }
            | Self::MissingDateTime
            | Self::InvalidTimestamp { .. }
            | Self::TooManyTokens { .. }
            | Self::DuplicateToken { .. }
            | Self::UnknownToken { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::PermissionDenied { .. } => 403,
            Self::StateUnavailable { .. } => 503,
            Self::DecodeError { .. } => 502,
        }
    }

    /// Validation failures are caught before anything is sent to the chain
    pub fn is_validation(&self) -> bool {
        self.status_code() == 400
    }
}

impl TxError {
    /// Get an HTTP-friendly error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BuildFailed { .. } => "build_failed",
            Self::EmptyBatch => "empty_batch",
            Self::LengthMismatch { .. } => "length_mismatch",
            Self::Reverted { .. } => "reverted",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BuildFailed { .. } | Self::EmptyBatch | Self::LengthMismatch { .. } => 400,
            Self::Reverted { .. } => 502,
        }
    }
}

impl Error {
    /// Get an HTTP-friendly error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Rpc(e) => e.error_code(),
            Self::Protocol(e) => e.error_code(),
            Self::Transaction(e) => e.error_code(),
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Rpc(e) => e.status_code(),
            Self::Protocol(e) => e.status_code(),
            Self::Transaction(e) => e.status_code(),
            Self::Config(_) | Self::Serialization(_) => 500,
        }
    }
}
