//! Connect, subscribe and call a service.
//!
//! Demonstrates:
//! - Building a session with custom timeouts
//! - Authenticating with a long-lived access token
//! - Subscribing to `state_changed` events through a callback
//! - Calling a service and reading its result
//! - Watching connection state transitions
//!
//! Usage:
//!   HASS_TOKEN=... cargo run --example 001_connect
//!   HASS_URL=ws://localhost:8123/api/websocket HASS_TOKEN=... cargo run --example 001_connect -- --debug
//!   HASS_TOKEN=... cargo run --example 001_connect -- --no-wait

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use hass_websocket::{Result, Session};
use serde_json::json;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 001: Connect ===\n");

    // ========================================================================
    // Create Session
    // ========================================================================

    println!("[1] Creating session...");

    let session = Session::builder()
        .command_timeout(Duration::from_secs(5))
        .max_reconnect_attempts(10)
        .build()?;

    println!("    ✓ Session ready\n");

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[2] Connecting to {}...", args.url);

    let mut changes = session.state_changes();
    tokio::spawn(async move {
        while let Ok(state) = changes.recv().await {
            println!("    [state] {state}");
        }
    });

    session.connect(&args.url, args.token).await?;
    session
        .wait_until_authenticated(Duration::from_secs(10))
        .await?;

    println!(
        "    ✓ Authenticated (Home Assistant {})\n",
        session.server_version().as_deref().unwrap_or("unknown")
    );

    // ========================================================================
    // Subscribe
    // ========================================================================

    println!("[3] Subscribing to state_changed...");

    session.register_event_callback("print", |event| {
        let entity = event
            .data()
            .and_then(|data| data.get("entity_id"))
            .and_then(|id| id.as_str())
            .unwrap_or("?");
        println!("    [event] {entity}");
    });
    let subscription = session.subscribe_to_events(Some("state_changed")).await?;

    println!("    ✓ Subscription {subscription}\n");

    // ========================================================================
    // Call Service
    // ========================================================================

    println!("[4] Calling homeassistant.check_config...");

    let result = session
        .call_service("homeassistant", "check_config", Some(json!({})))
        .await?;

    println!("    ✓ Result: {result}\n");

    session.ping().await?;
    println!("[5] Ping ✓\n");

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Cleanup
    // ========================================================================

    session.unsubscribe_from_events(subscription).await?;
    session.disconnect().await;
    println!("\n[Done] Session closed");

    Ok(())
}
