use crate::shared::Result;
use std::fs;
use std::path::Path;

/// Maximum size of a single CVE record document (8 MB)
/// Real CVE JSON 5 records are a few kilobytes; anything larger is rejected
/// before parsing.
pub const MAX_RECORD_FILE_SIZE: u64 = 8 * 1024 * 1024;

/// Maximum size of a monitoring feed response body (16 MB)
pub const MAX_FEED_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Validates that a path exists and is a regular file (not a directory or symlink)
///
/// # Security
/// Uses `symlink_metadata()` so the check applies to the link itself. A CVE
/// list checkout is external content; following links out of it is refused.
///
/// # Errors
/// Returns an error if:
/// - The path doesn't exist
/// - The path is a symbolic link
/// - The path is not a regular file
pub fn validate_regular_file(path: &Path, file_description: &str) -> Result<()> {
    let metadata = fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {} metadata: {}", file_description, e))?;

    if metadata.is_symlink() {
        anyhow::bail!(
            "Security: {} is a symbolic link. For security reasons, symbolic links are not allowed.",
            path.display()
        );
    }

    if !metadata.is_file() {
        anyhow::bail!("{} is not a regular file", path.display());
    }

    Ok(())
}

/// Validates file size is within acceptable limits
///
/// # Errors
/// Returns an error if the file size exceeds the maximum
pub fn validate_file_size(file_size: u64, path: &Path, max_size: u64) -> Result<()> {
    if file_size > max_size {
        anyhow::bail!(
            "Security: {} is too large ({} bytes). Maximum allowed size is {} bytes.",
            path.display(),
            file_size,
            max_size
        );
    }
    Ok(())
}

/// Validates a value that is passed as a positional argument to an external
/// program (git, nix-eval-jobs).
///
/// # Security
/// Commands are spawned without a shell, but a leading `-` would still be
/// interpreted as an option by the callee.
pub fn validate_command_argument(value: &str, description: &str) -> Result<()> {
    if value.is_empty() {
        anyhow::bail!("{} must not be empty", description);
    }
    if value.starts_with('-') {
        anyhow::bail!(
            "Security: {} must not start with '-' ({})",
            description,
            value
        );
    }
    if value.chars().any(|c| c.is_control()) {
        anyhow::bail!("Security: {} contains control characters", description);
    }
    Ok(())
}
