//! Project-wide constants.

use std::path::PathBuf;
use std::time::Duration;

/// Default pause between two status observations of the same task.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default ceiling on status observations before a poll session gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Default page size for history listings.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Error message carried by a task that was cancelled rather than failed
/// by the processor itself. Pollers use it to tell the two apart.
pub const CANCELLED_MESSAGE: &str = "cancelled by request";

/// Processor endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8700";

/// Account that owns history when none is configured. Single-user
/// installs never need to think about accounts.
pub const DEFAULT_ACCOUNT: &str = "local";

/// Default database path: `~/.scribe/scribe.db`.
/// Single DB for history and config.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .expect("cannot determine home directory")
        .join(".scribe")
        .join("scribe.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_defaults_match_documented_contract() {
        assert_eq!(DEFAULT_POLL_INTERVAL, Duration::from_millis(2000));
        assert_eq!(DEFAULT_MAX_ATTEMPTS, 30);
    }

    #[test]
    fn cancelled_message_is_non_empty() {
        assert!(!CANCELLED_MESSAGE.is_empty());
    }

    #[test]
    fn default_db_path_lives_under_dotdir() {
        let path = default_db_path();
        assert!(path.to_string_lossy().contains(".scribe"));
        assert!(path.ends_with("scribe.db"));
    }
}
