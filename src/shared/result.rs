/// Result alias with anyhow::Error as the error type.
/// Classified failures are `TrackerError` values wrapped in the anyhow chain.
pub type Result<T> = std::result::Result<T, anyhow::Error>;
