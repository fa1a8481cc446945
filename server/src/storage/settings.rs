//! Settings file management

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Listening socket configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Deployment backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// Upper bound on graceful shutdown, in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            server: ServerSettings::default(),
            backend: BackendSettings::default(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

/// Listening socket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Deployment backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendSettings {
    /// Simulated deployments, no environment required
    Sandbox {
        #[serde(default = "default_simulated_duration")]
        simulated_duration_ms: u64,
    },

    /// External deployer executable
    Command {
        program: String,

        #[serde(default)]
        args: Vec<String>,

        #[serde(default = "default_validate_timeout")]
        validate_timeout_secs: u64,

        #[serde(default = "default_import_timeout")]
        import_timeout_secs: u64,
    },
}

fn default_simulated_duration() -> u64 {
    1000
}

fn default_validate_timeout() -> u64 {
    60
}

fn default_import_timeout() -> u64 {
    1800
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings::Sandbox {
            simulated_duration_ms: default_simulated_duration(),
        }
    }
}

/// Read the settings file.
///
/// A missing file falls back to the defaults unless it was asked for
/// explicitly.
pub async fn load_settings(file: &File, required: bool) -> Result<Settings, DeployerError> {
    if !required && !file.exists().await {
        info!(
            "Settings file {} not found, using defaults",
            file.path().display()
        );
        return Ok(Settings::default());
    }

    file.read_json::<Settings>().await.map_err(|e| {
        DeployerError::ConfigError(format!(
            "unable to read settings file {}: {}",
            file.path().display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.log_level, LogLevel::Info);
        assert!(!settings.log_json);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.backend, BackendSettings::default());
        assert_eq!(settings.max_shutdown_delay_secs, 30);
    }

    #[test]
    fn test_command_backend_settings() {
        let raw = r#"{
            "log_level": "debug",
            "server": {"port": 9000},
            "backend": {"kind": "command", "program": "juju-deployer", "args": ["-e", "prod"]}
        }"#;
        let settings: Settings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(
            settings.backend,
            BackendSettings::Command {
                program: "juju-deployer".to_string(),
                args: vec!["-e".to_string(), "prod".to_string()],
                validate_timeout_secs: 60,
                import_timeout_secs: 1800,
            }
        );
    }

    #[test]
    fn test_unknown_backend_kind_is_rejected() {
        let raw = r#"{"backend": {"kind": "kubernetes"}}"#;
        assert!(serde_json::from_str::<Settings>(raw).is_err());
    }

    #[tokio::test]
    async fn test_load_settings() {
        let dir = std::env::temp_dir().join(format!("bundled-settings-{}", std::process::id()));
        let file = File::new(dir.join("settings.json"));

        // Missing optional file
        let settings = load_settings(&file, false).await.unwrap();
        assert_eq!(settings.server.port, 8080);

        // Missing required file
        let err = load_settings(&file, true).await.unwrap_err();
        assert!(matches!(err, DeployerError::ConfigError(_)));

        file.write_string(r#"{"server": {"port": 17070}}"#).await.unwrap();
        let settings = load_settings(&file, true).await.unwrap();
        assert_eq!(settings.server.port, 17070);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
