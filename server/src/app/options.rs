//! Application configuration options

use std::time::Duration;

use crate::storage::settings::{BackendSettings, Settings};

/// Main application options
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Deployment backend
    pub backend: BackendSettings,
}

impl AppOptions {
    /// Build the run options from the settings file
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            backend: settings.backend.clone(),
        }
    }
}

/// Lifecycle options for the server
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.server.port = 17070;
        settings.max_shutdown_delay_secs = 5;

        let options = AppOptions::from_settings(&settings);
        assert_eq!(options.server.host, "127.0.0.1");
        assert_eq!(options.server.port, 17070);
        assert_eq!(options.lifecycle.max_shutdown_delay, Duration::from_secs(5));
        assert_eq!(options.backend, settings.backend);
    }
}
