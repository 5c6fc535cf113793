//! Platform detection and OS-specific utilities.

use std::path::PathBuf;

use crate::error::{PlError, PlResult};

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Detect the current platform at compile time.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Get the platform-specific application data directory.
    ///
    /// - Windows: `%APPDATA%/PrayLock`
    /// - macOS: `~/Library/Application Support/PrayLock`
    /// - Linux: `~/.local/share/PrayLock`
    pub fn data_dir() -> PlResult<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| PlError::Config("could not determine data directory".into()))?;
        Ok(base.join("PrayLock"))
    }

    /// Get the platform-specific configuration directory.
    pub fn config_dir() -> PlResult<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| PlError::Config("could not determine config directory".into()))?;
        Ok(base.join("PrayLock"))
    }

    /// Get a human-readable platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
        }
    }

    /// Get the system hostname for device name generation.
    pub fn hostname() -> String {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "praylock-client".to_string())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
