use std::path::PathBuf;

/// Errors that abandon a single collection cycle.
///
/// # Examples
///
/// ```rust
/// use grotto_collector::error::CollectError;
///
/// let err = CollectError::Parse {
///     token: "abc".to_string(),
///     line: "cpu0 1 abc".to_string(),
/// };
/// assert!(err.to_string().contains("abc"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The counter source could not be read this cycle.
    #[error("Collect: failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A counter token was not a non-negative integer.
    #[error("Collect: could not parse '{token}' to int in line '{line}'")]
    Parse { token: String, line: String },
}

/// Convenience `Result` alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectError>;
