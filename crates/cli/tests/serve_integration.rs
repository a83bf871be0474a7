//! Integration tests for the `tracechain serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so separate test binaries don't
/// collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// Running server; killed on drop.
struct Server {
    child: Child,
    port: u16,
    _dir: TempDir,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

/// Helper: start `tracechain serve` with a fresh journal and extra args.
fn start_server(extra: &[&str]) -> Server {
    let dir = TempDir::new().unwrap();
    let port = next_port();
    let child = spawn(port, &dir.path().join("chain.jsonl"), extra);
    Server {
        child,
        port,
        _dir: dir,
    }
}

fn spawn(port: u16, journal: &Path, extra: &[&str]) -> Child {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tracechain"));
    cmd.arg("--data")
        .arg(journal)
        .arg("serve")
        .arg("--port")
        .arg(port.to_string());
    cmd.args(extra);
    for var in [
        "TRACECHAIN_API_KEY",
        "TRACECHAIN_RATE_LIMIT",
        "TRACECHAIN_PORT",
        "TRACECHAIN_CONFIG",
    ] {
        cmd.env_remove(var);
    }
    // Redirect stdout/stderr to avoid blocking
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());

    let child = cmd.spawn().expect("failed to start tracechain serve");
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            return child;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    child
}

/// Helper: make an HTTP request and return (status, body).
fn http(
    port: u16,
    method: &str,
    path: &str,
    body: Option<&str>,
    extra_headers: &[(&str, &str)],
) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let mut header_lines = String::new();
    for (name, value) in extra_headers {
        header_lines.push_str(&format!("{}: {}\r\n", name, value));
    }
    let body = body.unwrap_or("");
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        method,
        path,
        port,
        body.len(),
        header_lines,
        body
    );
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    parse_http_response(&response)
}

fn get(port: u16, path: &str) -> (u16, Value) {
    let (status, body) = http(port, "GET", path, None, &[]);
    (status, serde_json::from_str(&body).unwrap_or(Value::Null))
}

fn post(port: u16, path: &str, body: &Value) -> (u16, Value) {
    let (status, body) = http(port, "POST", path, Some(&body.to_string()), &[]);
    (status, serde_json::from_str(&body).unwrap_or(Value::Null))
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let chunked = headers
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked");
    let body = if chunked { decode_chunked(&body) } else { body };
    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;
    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = (chunk_start + size).min(remaining.len());
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }
    result
}

fn lettuce() -> Value {
    json!({
        "lot_id": "LOT-001",
        "farm_name": "Baan Mae Rim Farm",
        "farm_location": "Mae Rim, Chiang Mai",
        "crop": "Hydro Lettuce",
        "harvest_date": "2025-08-15",
    })
}

fn reading(temperature: f64, humidity: f64) -> Value {
    json!({
        "lot_id": "LOT-001",
        "farm_name": "Baan Mae Rim Farm",
        "temperature_c": temperature,
        "humidity_pct": humidity,
        "soil_moisture_pct": 35.0,
        "ph": 6.5,
    })
}

// ──────────────────────────────────────────────
// Health and routing
// ──────────────────────────────────────────────

#[test]
fn health_reports_version() {
    let server = start_server(&[]);
    let (status, body) = get(server.port, "/health");
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[test]
fn unknown_route_is_json_404() {
    let server = start_server(&[]);
    let (status, body) = get(server.port, "/nope");
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not found");
}

// ──────────────────────────────────────────────
// Lots and events
// ──────────────────────────────────────────────

#[test]
fn end_to_end_lot_lifecycle() {
    let server = start_server(&[]);
    let port = server.port;

    let (status, summary) = post(port, "/api/harvests", &lettuce());
    assert_eq!(status, 200);
    assert_eq!(summary["total_events"], 1);
    assert_eq!(summary["chain"][0]["prev_hash"], "GENESIS");

    let (status, body) = post(port, "/api/sensors", &reading(12.5, 90.0));
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, _) = post(
        port,
        "/api/transport",
        &json!({
            "lot_id": "LOT-001",
            "location": "Cold Room #1",
            "temperature_c": 10.5,
            "humidity_pct": 88.0,
        }),
    );
    assert_eq!(status, 200);

    let (status, _) = post(port, "/api/sensors", &reading(25.0, 40.0));
    assert_eq!(status, 200);

    let (status, summary) = get(port, "/api/lots/LOT-001");
    assert_eq!(status, 200);
    assert_eq!(summary["total_events"], 4);
    assert_eq!(summary["verified"], true);
    assert_eq!(summary["quality_score"], 20.5);
    assert_eq!(summary["spoilage_risk"], "HIGH");
    assert_eq!(summary["latest_temperature_c"], 25.0);
    assert_eq!(summary["latest_humidity_pct"], 40.0);
    assert_eq!(summary["latest_ph"], 6.5);

    let (status, verification) = get(port, "/api/lots/LOT-001/verify");
    assert_eq!(status, 200);
    assert_eq!(verification, json!({"verified": true, "events": 4}));

    let (status, lots) = get(port, "/api/lots");
    assert_eq!(status, 200);
    assert_eq!(lots["lots"][0]["lot_id"], "LOT-001");

    let (status, _) = http(port, "DELETE", "/api/lots/LOT-001", None, &[]);
    assert_eq!(status, 200);
    let (status, _) = get(port, "/api/lots/LOT-001");
    assert_eq!(status, 404);
}

#[test]
fn generic_event_appends() {
    let server = start_server(&[]);
    post(server.port, "/api/harvests", &lettuce());
    let (status, _) = post(
        server.port,
        "/api/events",
        &json!({"lot_id": "LOT-001", "type": "packed", "data": {"boxes": 12}}),
    );
    assert_eq!(status, 200);
    let (_, summary) = get(server.port, "/api/lots/LOT-001");
    assert_eq!(summary["chain"][1]["type"], "packed");
    assert_eq!(summary["chain"][1]["payload"]["boxes"], 12);
}

#[test]
fn error_statuses() {
    let server = start_server(&[]);
    let port = server.port;

    // Unknown lot
    let (status, body) = post(port, "/api/sensors", &reading(12.5, 90.0));
    assert_eq!(status, 404);
    assert!(body["error"].as_str().unwrap().contains("LOT-001"));
    let (status, _) = get(port, "/api/lots/LOT-404/verify");
    assert_eq!(status, 404);

    // Duplicate lot
    assert_eq!(post(port, "/api/harvests", &lettuce()).0, 200);
    assert_eq!(post(port, "/api/harvests", &lettuce()).0, 400);

    // Missing fields and malformed bodies
    let (status, body) = post(port, "/api/sensors", &json!({"lot_id": "LOT-001"}));
    assert_eq!(status, 422);
    assert!(body["error"].is_string());
    let (status, _) = http(port, "POST", "/api/harvests", Some("{not json"), &[]);
    assert_eq!(status, 422);

    // Bad timestamp
    let mut bad = reading(12.5, 90.0);
    bad["timestamp"] = json!("yesterday");
    assert_eq!(post(port, "/api/sensors", &bad).0, 422);
}

#[test]
fn seed_is_idempotent() {
    let server = start_server(&[]);
    let (status, body) = post(server.port, "/api/seed", &json!({}));
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "seeded", "lot_id": "LOT-001"}));

    let (_, body) = post(server.port, "/api/seed", &json!({}));
    assert_eq!(body, json!({"status": "exists"}));

    let (_, summary) = get(server.port, "/api/lots/LOT-001");
    assert_eq!(summary["total_events"], 4);
}

#[test]
fn journal_survives_restart() {
    let dir = TempDir::new().unwrap();
    let journal = dir.path().join("chain.jsonl");

    let port = next_port();
    let mut child = spawn(port, &journal, &[]);
    assert_eq!(post(port, "/api/seed", &json!({})).0, 200);
    child.kill().ok();
    child.wait().ok();

    let port = next_port();
    let mut child = spawn(port, &journal, &[]);
    let (status, verification) = get(port, "/api/lots/LOT-001/verify");
    child.kill().ok();
    child.wait().ok();
    assert_eq!(status, 200);
    assert_eq!(verification, json!({"verified": true, "events": 4}));
}

// ──────────────────────────────────────────────
// Auth and rate limiting
// ──────────────────────────────────────────────

#[test]
fn api_key_required_when_configured() {
    let server = start_server(&["--api-key", "s3cret"]);
    let port = server.port;

    assert_eq!(get(port, "/health").0, 200);
    assert_eq!(get(port, "/api/lots").0, 401);

    let (status, _) = http(port, "GET", "/api/lots", None, &[("X-API-Key", "wrong")]);
    assert_eq!(status, 403);
    let (status, _) = http(port, "GET", "/api/lots", None, &[("X-API-Key", "s3cret")]);
    assert_eq!(status, 200);
    let (status, _) = http(
        port,
        "GET",
        "/api/lots",
        None,
        &[("Authorization", "Bearer s3cret")],
    );
    assert_eq!(status, 200);
}

#[test]
fn rate_limit_returns_429() {
    let server = start_server(&["--rate-limit", "3"]);
    for _ in 0..3 {
        assert_eq!(get(server.port, "/health").0, 200);
    }
    let (status, body) = get(server.port, "/health");
    assert_eq!(status, 429);
    assert_eq!(body["error"], "rate limit exceeded");
}
