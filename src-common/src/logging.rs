//! Platform-specific logging directory resolution.

use std::path::PathBuf;

/// Application name used for config and log directories.
pub const APP_NAME: &str = "generator-bitmaps";

/// Returns the platform-appropriate directory for log files.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_STATE_HOME/generator-bitmaps/logs` or `~/.local/state/generator-bitmaps/logs` |
/// | macOS | `~/Library/Logs/generator-bitmaps` |
/// | Windows | `%LOCALAPPDATA%\generator-bitmaps\logs` |
///
/// Falls back to a `logs` directory under the system temp dir when no home
/// directory can be determined.
pub fn log_dir() -> PathBuf {
    let Some(base) = directories::ProjectDirs::from("", "", APP_NAME) else {
        return std::env::temp_dir().join(APP_NAME).join("logs");
    };

    #[cfg(target_os = "linux")]
    {
        base.state_dir()
            .unwrap_or_else(|| base.data_local_dir())
            .join("logs")
    }

    #[cfg(target_os = "macos")]
    {
        // data_local_dir is ~/Library/Application Support/<app>; logs live
        // in ~/Library/Logs/<app>.
        let library = base
            .data_local_dir()
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().to_path_buf());
        library.join("Logs").join(APP_NAME)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        base.data_local_dir().join("logs")
    }
}

/// Ensures the log directory exists, creating it if necessary.
pub fn ensure_log_dir() -> Result<PathBuf, std::io::Error> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// File name prefix for the rolling plugin log. The appender adds the date
/// (e.g. `generator-bitmaps.log.2026-03-01`).
pub const LOG_FILE_PREFIX: &str = "generator-bitmaps.log";
