//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Connection settings from the environment
//! - Command-line flag parsing
//! - Logging initialization

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Used when `HASS_URL` is unset.
pub const DEFAULT_URL: &str = "ws://homeassistant.local:8123/api/websocket";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments and environment for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub url: String,
    pub token: String,
    pub debug: bool,
    pub no_wait: bool,
}

impl Args {
    /// Parse flags and read `HASS_URL` / `HASS_TOKEN`.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            url: std::env::var("HASS_URL").unwrap_or_else(|_| DEFAULT_URL.to_string()),
            token: std::env::var("HASS_TOKEN").unwrap_or_default(),
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "hass_websocket=debug"
    } else {
        "hass_websocket=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Wait for Ctrl+C or skip if `--no-wait` flag is set.
pub async fn wait_for_exit(no_wait: bool) {
    if no_wait {
        println!("[--no-wait] Skipping wait");
        return;
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();
}
