use crate::types::FoodSource;
use thiserror::Error;

/// Main error type for the food cache and recommendation service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Key absent in every tier that was consulted
    #[error("Not found: {key}")]
    NotFound { key: String },

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Third-party rate limit exceeded (or local request budget exhausted)
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Transport-level failure talking to the third-party product database
    #[error("Network error: {0}")]
    Network(String),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Local store used before `initialize()`
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Local embedded store failure
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Remote shared store failure
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Failure inside a specific tier, carrying enough context to diagnose without a backtrace
    #[error("{operation} on {tier} tier failed for '{key}': {source}")]
    Tier {
        tier: FoodSource,
        operation: &'static str,
        key: String,
        #[source]
        source: Box<ServiceError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Wrap an error with the tier, operation and key it happened on
    pub fn in_tier(self, tier: FoodSource, operation: &'static str, key: impl Into<String>) -> Self {
        ServiceError::Tier {
            tier,
            operation,
            key: key.into(),
            source: Box::new(self),
        }
    }

    /// Check if error means "absent", looking through tier context
    pub fn is_not_found(&self) -> bool {
        match self {
            ServiceError::NotFound { .. } => true,
            ServiceError::Tier { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Network, rate-limit and timeout failures are routine for the external tier
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::RateLimitExceeded | ServiceError::Network(_) | ServiceError::Timeout => true,
            ServiceError::Tier { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Get error type as string for logging and metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::InvalidRequest(_) => "invalid_request",
            ServiceError::RateLimitExceeded => "rate_limit_exceeded",
            ServiceError::Network(_) => "network_error",
            ServiceError::Timeout => "timeout",
            ServiceError::NotInitialized(_) => "not_initialized",
            ServiceError::CacheError(_) => "cache_error",
            ServiceError::DatabaseError(_) => "database_error",
            ServiceError::Tier { source, .. } => source.error_type(),
            ServiceError::ConfigError(_) => "config_error",
            ServiceError::IoError(_) => "io_error",
            ServiceError::SerializationError(_) => "serialization_error",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::NotFound { .. } => 404,
            ServiceError::InvalidRequest(_) => 400,
            ServiceError::RateLimitExceeded => 429,
            ServiceError::Timeout => 504,
            ServiceError::Network(_) => 503,
            ServiceError::CacheError(_) => 503,
            ServiceError::DatabaseError(_) => 503,
            ServiceError::Tier { source, .. } => source.status_code(),
            ServiceError::NotInitialized(_) => 500,
            ServiceError::ConfigError(_) => 500,
            ServiceError::IoError(_) => 500,
            ServiceError::SerializationError(_) => 500,
            ServiceError::Internal(_) => 500,
        }
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Validation error for request parameters, rejected before any I/O
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::InvalidRequest(err.to_string())
    }
}
