// Constants for retry module
use std::time::Duration;

/// Default maximum number of attempts, the first call included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default growth factor between consecutive delays
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 64;

/// Minimum allowed max_attempts value
pub const MIN_MAX_ATTEMPTS: u32 = 1;

/// Operation label used when a config does not name one
pub const UNNAMED_OPERATION: &str = "unnamed";

/// Identifiers retried when a config lists no retryable errors
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "ECONNREFUSED",
    "ETIMEDOUT",
    "ENOTFOUND",
    "ENETUNREACH",
    "ECONNRESET",
    "EPIPE",
    "NetworkError",
    "TimeoutError",
];

/// Plain-language renderings of the default identifiers
pub const DEFAULT_RETRYABLE_PHRASES: &[&str] = &[
    "connection refused",
    "timed out",
    "name resolution",
    "network unreachable",
    "connection reset",
    "broken pipe",
    "network error",
    "timeout error",
];

/// Database driver codes for unreachable or dropped servers
pub const DATABASE_RETRYABLE_ERRORS: &[&str] =
    &["ECONNREFUSED", "ETIMEDOUT", "P1001", "P1002", "P1008", "P1017"];

/// Transient failures and throttling responses of remote HTTP APIs
pub const EXTERNAL_API_RETRYABLE_ERRORS: &[&str] = &[
    "ECONNREFUSED",
    "ETIMEDOUT",
    "ENOTFOUND",
    "ECONNRESET",
    "429",
    "502",
    "503",
    "504",
    "RATE_LIMIT",
];

/// Contended or exhausted file handles
pub const FILE_OPERATION_RETRYABLE_ERRORS: &[&str] = &["EBUSY", "EMFILE", "ENFILE", "EAGAIN"];
