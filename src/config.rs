use serde::Deserialize;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const CONFIG_DIR_ENV: &str = "SSH_AWS_SSO_LOGIN_CONFIG_DIR";
const APP_DIR_NAME: &str = "ssh-aws-sso-login";
const SETTINGS_FILE_NAME: &str = "settings.json";

const DEFAULT_SSH_PROGRAM: &str = "ssh";
const DEFAULT_TUNNEL_READY_TIMEOUT_SEC: u64 = 10;
const DEFAULT_TERMINATE_GRACE_SEC: u64 = 5;
const DEFAULT_PROFILE_LIST_TIMEOUT_SEC: u64 = 30;
const DEFAULT_BROWSER_OPEN_DELAY_MS: u64 = 1000;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub ssh_program: String,
    pub tunnel_ready_timeout_sec: u64,
    pub terminate_grace_sec: u64,
    pub profile_list_timeout_sec: u64,
    pub browser_open_delay_ms: u64,
    pub open_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssh_program: DEFAULT_SSH_PROGRAM.to_string(),
            tunnel_ready_timeout_sec: DEFAULT_TUNNEL_READY_TIMEOUT_SEC,
            terminate_grace_sec: DEFAULT_TERMINATE_GRACE_SEC,
            profile_list_timeout_sec: DEFAULT_PROFILE_LIST_TIMEOUT_SEC,
            browser_open_delay_ms: DEFAULT_BROWSER_OPEN_DELAY_MS,
            open_browser: true,
        }
    }
}

impl Settings {
    pub fn tunnel_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.tunnel_ready_timeout_sec)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_sec)
    }

    pub fn profile_list_timeout(&self) -> Duration {
        Duration::from_secs(self.profile_list_timeout_sec)
    }

    pub fn browser_open_delay(&self) -> Duration {
        Duration::from_millis(self.browser_open_delay_ms)
    }

    fn sanitized(mut self) -> Self {
        self.ssh_program = self.ssh_program.trim().to_string();
        if self.ssh_program.is_empty() {
            self.ssh_program = DEFAULT_SSH_PROGRAM.to_string();
        }
        if self.tunnel_ready_timeout_sec == 0 {
            self.tunnel_ready_timeout_sec = DEFAULT_TUNNEL_READY_TIMEOUT_SEC;
        }
        if self.terminate_grace_sec == 0 {
            self.terminate_grace_sec = DEFAULT_TERMINATE_GRACE_SEC;
        }
        if self.profile_list_timeout_sec == 0 {
            self.profile_list_timeout_sec = DEFAULT_PROFILE_LIST_TIMEOUT_SEC;
        }
        self
    }
}

pub fn settings_file_path() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir.trim()).join(SETTINGS_FILE_NAME);
        }
    }
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(SETTINGS_FILE_NAME)
}

/// Reads settings from `path`. A missing file yields the defaults; a file
/// that is not a JSON object is reported and ignored.
pub fn read_settings_from_path(path: &Path) -> Settings {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to read {}: {err}", path.display());
            }
            return Settings::default();
        }
    };

    let root = match serde_json::from_str::<Value>(&raw) {
        Ok(root) if root.is_object() => root,
        Ok(_) => {
            log::warn!("{} is not a JSON object, using defaults", path.display());
            return Settings::default();
        }
        Err(err) => {
            log::warn!("failed to parse {}: {err}", path.display());
            return Settings::default();
        }
    };

    match serde_json::from_value::<Settings>(root) {
        Ok(settings) => settings.sanitized(),
        Err(err) => {
            log::warn!("invalid settings in {}: {err}", path.display());
            Settings::default()
        }
    }
}

pub fn read_settings() -> Settings {
    read_settings_from_path(&settings_file_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let settings = read_settings_from_path(&dir.path().join(SETTINGS_FILE_NAME));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.tunnel_ready_timeout(), Duration::from_secs(10));
        assert_eq!(settings.terminate_grace(), Duration::from_secs(5));
        assert_eq!(settings.profile_list_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(
            &path,
            r#"{"sshProgram": "/usr/local/bin/ssh", "browserOpenDelayMs": 0, "openBrowser": false}"#,
        )
        .expect("write settings");

        let settings = read_settings_from_path(&path);
        assert_eq!(settings.ssh_program, "/usr/local/bin/ssh");
        assert_eq!(settings.browser_open_delay(), Duration::ZERO);
        assert!(!settings.open_browser);
        assert_eq!(settings.tunnel_ready_timeout_sec, 10);
    }

    #[test]
    fn zero_timeouts_and_blank_program_fall_back_to_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(
            &path,
            r#"{"sshProgram": "  ", "tunnelReadyTimeoutSec": 0, "terminateGraceSec": 0}"#,
        )
        .expect("write settings");

        let settings = read_settings_from_path(&path);
        assert_eq!(settings.ssh_program, "ssh");
        assert_eq!(settings.tunnel_ready_timeout_sec, 10);
        assert_eq!(settings.terminate_grace_sec, 5);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "[1, 2").expect("write settings");
        assert_eq!(read_settings_from_path(&path), Settings::default());

        fs::write(&path, r#"{"terminateGraceSec": "soon"}"#).expect("write settings");
        assert_eq!(read_settings_from_path(&path), Settings::default());
    }
}
