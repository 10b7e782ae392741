use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const DEFAULT_UPLOAD_PATH: &str = "/uploadfiles/";
pub const DEFAULT_CHANNEL_PATH: &str = "/ws/";
/// Matches the upload size the backend accepts per file.
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 30 * 1024 * 1024;
/// How long shutdown waits for the server to answer a close frame.
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 2_000;
pub const SETTINGS_DIRECTORY_NAME: &str = "pdfchat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Which lifecycle notices end up in the message log.
///
/// Anything switched off is still logged through `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticePolicy {
    #[serde(default = "enabled")]
    pub announce_ready: bool,
    #[serde(default = "enabled")]
    pub announce_disconnect: bool,
    #[serde(default = "enabled")]
    pub surface_errors: bool,
}

impl Default for NoticePolicy {
    fn default() -> Self {
        Self {
            announce_ready: true,
            announce_disconnect: true,
            surface_errors: true,
        }
    }
}

impl NoticePolicy {
    /// Log-only variant: no open/close notices, failures go to the log only.
    pub fn quiet() -> Self {
        Self {
            announce_ready: false,
            announce_disconnect: false,
            surface_errors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_channel_path")]
    pub channel_path: String,
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
    #[serde(default)]
    pub notices: NoticePolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            upload_path: default_upload_path(),
            channel_path: default_channel_path(),
            max_file_size_bytes: default_max_file_size_bytes(),
            close_grace_ms: default_close_grace_ms(),
            notices: NoticePolicy::default(),
        }
    }
}

impl ClientSettings {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".pdfchat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn load() -> Self {
        Self::load_from(&Self::default_config_path())
    }

    /// Reads settings from `path`, falling back to defaults when the file is missing or
    /// does not parse.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return Self::default();
        }

        let figment =
            Figment::from(Serialized::defaults(Self::default())).merge(Json::file(path));

        match figment.extract::<Self>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                Self::default()
            }
        }
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self.normalized()
    }

    pub fn normalized(mut self) -> Self {
        self.server_url = non_blank_or(self.server_url, default_server_url);
        self.upload_path = non_blank_or(self.upload_path, default_upload_path);
        self.channel_path = non_blank_or(self.channel_path, default_channel_path);
        if self.max_file_size_bytes == 0 {
            self.max_file_size_bytes = default_max_file_size_bytes();
        }
        if self.close_grace_ms == 0 {
            self.close_grace_ms = default_close_grace_ms();
        }
        self
    }
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn enabled() -> bool {
    true
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_upload_path() -> String {
    DEFAULT_UPLOAD_PATH.to_string()
}

fn default_channel_path() -> String {
    DEFAULT_CHANNEL_PATH.to_string()
}

fn default_max_file_size_bytes() -> u64 {
    DEFAULT_MAX_FILE_SIZE_BYTES
}

fn default_close_grace_ms() -> u64 {
    DEFAULT_CLOSE_GRACE_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ClientSettings::load_from(&dir.path().join("absent.json"));
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "server_url": "https://docs.example.com", "notices": { "announce_ready": false } }"#,
        )
        .unwrap();

        let settings = ClientSettings::load_from(&path);
        assert_eq!(settings.server_url, "https://docs.example.com");
        assert_eq!(settings.upload_path, DEFAULT_UPLOAD_PATH);
        assert!(!settings.notices.announce_ready);
        assert!(settings.notices.announce_disconnect);
        assert!(settings.notices.surface_errors);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(ClientSettings::load_from(&path), ClientSettings::default());
    }

    #[test]
    fn blank_fields_are_normalized() {
        let settings = ClientSettings {
            server_url: "  ".to_string(),
            max_file_size_bytes: 0,
            close_grace_ms: 0,
            ..ClientSettings::default()
        }
        .normalized();

        assert_eq!(settings.server_url, DEFAULT_SERVER_URL);
        assert_eq!(settings.max_file_size_bytes, DEFAULT_MAX_FILE_SIZE_BYTES);
        assert_eq!(settings.close_grace(), Duration::from_millis(DEFAULT_CLOSE_GRACE_MS));
    }
}
