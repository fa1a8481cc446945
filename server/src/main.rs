//! Bundle deployer - Entry Point
//!
//! Accepts bundle deployment requests over WebSocket, runs them one at a
//! time and streams their progress to watchers.

use std::collections::HashMap;
use std::env;

use bundled::app::options::AppOptions;
use bundled::app::run::run;
use bundled::filesys::file::File;
use bundled::logs::{init_logging, LogLevel, LogOptions};
use bundled::storage::layout::StorageLayout;
use bundled::storage::settings::load_settings;
use bundled::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to encode version info: {e}"),
        }
        return;
    }

    // Retrieve the settings file
    let (settings_file, required) = match cli_args.get("config") {
        Some(path) => (File::new(path), true),
        None => (StorageLayout::default().settings_file(), false),
    };
    let mut settings = match load_settings(&settings_file, required).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(level) = cli_args.get("log-level") {
        match level.parse::<LogLevel>() {
            Ok(level) => settings.log_level = level,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Run the server
    let options = AppOptions::from_settings(&settings);

    info!(
        "Running bundle deployer {} ({}) with options: {:?}",
        version.version, version.git_hash, options
    );
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the bundle deployer: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
