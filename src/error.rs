use thiserror::Error;

/// Errors from a single download call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("URL cannot be empty")]
    InvalidInput,

    /// yt-dlp could not be started, failed, or its output could not be read
    #[error("{0}")]
    FetchFailed(String),

    /// The session was cancelled and yt-dlp was killed
    #[error("download cancelled")]
    Cancelled,
}

/// Settings file failures. Logged by the store, never shown to the user.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
