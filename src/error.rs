//! Error classification shared by the engine's error enums.

/// Stable machine-readable code plus a retry hint for an error value.
pub trait ErrorCode {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
