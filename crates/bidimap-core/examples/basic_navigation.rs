//! Basic navigation example demonstrating the BiDi mapper against a locally
//! launched Chromium instance.
//!
//! This example launches headless Chromium, wraps the resulting CDP
//! connection in a [`MapperSession`], and issues a handful of BiDi commands
//! (`session.status`, `browsingContext.create`, `browsingContext.navigate`,
//! `browsingContext.close`) through [`MapperSession::handle_message`].
//!
//! # Running
//!
//! Make sure Chromium is installed and accessible, then run:
//!
//! ```sh
//! cargo run --example basic_navigation
//! ```

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use bidimap_cdp::CdpConnection;
use bidimap_core::session::{MapperSession, MapperSessionOptions};
use serde_json::json;

fn launch_chromium() -> (std::process::Child, String) {
    let chromium_path = std::env::var("CHROMIUM_PATH").unwrap_or_else(|_| "chromium".to_string());

    let mut child = Command::new(&chromium_path)
        .args(["--headless=new", "--remote-debugging-port=0", "--disable-gpu", "--no-sandbox"])
        .stderr(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .expect("failed to spawn Chromium");

    let stderr = child.stderr.take().expect("Chromium stderr");
    let mut ws_url = String::new();
    for line in BufReader::new(stderr).lines() {
        let line = line.expect("read Chromium stderr");
        if let Some(pos) = line.find("DevTools listening on ") {
            ws_url = line[pos + 22..].trim().to_string();
            break;
        }
    }
    assert!(!ws_url.is_empty(), "failed to read Chromium's WebSocket URL");
    (child, ws_url)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Launching Chromium...");
    let (mut chromium, ws_url) = launch_chromium();
    let connection = Arc::new(CdpConnection::connect(&ws_url).await?);
    println!("Connected over CDP.");

    let session = MapperSession::new(connection, MapperSessionOptions::new("mapper-self"));

    let status = session
        .handle_message(json!({ "id": 1, "method": "session.status", "params": {} }))
        .await;
    println!("session.status -> {status}");

    let create = session
        .handle_message(json!({ "id": 2, "method": "browsingContext.create", "params": { "type": "tab" } }))
        .await;
    println!("browsingContext.create -> {create}");
    let context = create["result"]["context"].as_str().expect("created context id").to_string();

    let navigate = session
        .handle_message(json!({
            "id": 3,
            "method": "browsingContext.navigate",
            "params": { "context": context, "url": "https://example.com", "wait": "complete" },
        }))
        .await;
    println!("browsingContext.navigate -> {navigate}");

    let close = session
        .handle_message(json!({ "id": 4, "method": "browsingContext.close", "params": { "context": context } }))
        .await;
    println!("browsingContext.close -> {close}");

    let _ = chromium.kill();
    Ok(())
}
