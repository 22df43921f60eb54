// Integration tests for the dashboard.
//
// These drive the app event loop through its channels the way the TUI does,
// with local TCP servers standing in for the NHTSA and OpenAI endpoints.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use autodash_app::app::{self, AppState};
use autodash_app::self_update::{LlmEnhancer, SelfUpdater};
use autodash_core::config::*;
use autodash_core::db::Database;
use autodash_core::manifest::{load_manifest, parse_manifest};
use autodash_core::protocol::*;
use autodash_llm::LlmClient;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

// ===========================================================================
// Test helpers
// ===========================================================================

const VALID_VIN: &str = "1HGCM82633A004352";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Config with inline values; network endpoints point at `base` (which
/// nothing need be listening on).
fn inline_config(nhtsa_base: &str, openai_base: &str, api_key: Option<&str>) -> Config {
    Config {
        dashboard: DashboardConfig {
            listings: ListingRanges {
                min_year: 1980,
                max_year: 2025,
                min_price: 1000,
                max_price: 100_000,
                default_count: 5,
                max_count: 100,
            },
            catalog: BTreeMap::from([
                (
                    "Honda".to_string(),
                    vec!["Civic".into(), "Accord".into(), "CR-V".into(), "Fit".into()],
                ),
                (
                    "Tesla".to_string(),
                    vec!["Model S".into(), "Model 3".into(), "Model X".into(), "Model Y".into()],
                ),
            ]),
            locations: vec!["New York".into(), "Los Angeles".into(), "Chicago".into()],
        },
        nhtsa: NhtsaConfig {
            decode_url: nhtsa_base.to_string(),
            format: "json".to_string(),
            timeout_secs: 5,
        },
        openai: OpenAiConfig {
            base_url: openai_base.to_string(),
            model: "gpt-4".to_string(),
            review_max_tokens: 512,
            enhance_max_tokens: 2048,
            enhance_temperature: 0.7,
        },
        credentials: CredentialsConfig {
            openai_api_key: api_key.map(str::to_string),
        },
        db_path: PathBuf::from(":memory:"),
        self_update: SelfUpdateConfig {
            target: PathBuf::from("app.py"),
            backup_dir: PathBuf::from("backups"),
        },
    }
}

struct Running {
    cmd_tx: mpsc::Sender<UserCommand>,
    ui_rx: mpsc::Receiver<UiUpdate>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Running {
    async fn next_update(&mut self) -> UiUpdate {
        tokio::time::timeout(Duration::from_secs(5), self.ui_rx.recv())
            .await
            .expect("timed out waiting for a UI update")
            .expect("UI channel closed")
    }

    async fn quit(self) {
        self.cmd_tx.send(UserCommand::Quit).await.unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

/// Spawn the event loop with the same channel layout `main` uses.
fn start(config: Config, db: Database) -> Running {
    let (llm_tx, llm_rx) = mpsc::channel(256);
    let (vin_tx, vin_rx) = mpsc::channel(16);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let llm_client = LlmClient::from_config(&config);
    let state = AppState::new(config, db, llm_client, llm_tx, vin_tx).unwrap();
    let handle = tokio::spawn(app::run(llm_rx, vin_rx, cmd_rx, ui_tx, state));
    Running {
        cmd_tx,
        ui_rx,
        handle,
    }
}

/// Read one full HTTP request (headers plus Content-Length body).
async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

/// Accept exactly one connection, answer it with `response`, and hand back
/// the request text.
async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        request
    });
    (format!("http://{addr}"), handle)
}

fn json_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

// ===========================================================================
// Manifest
// ===========================================================================

#[test]
fn dashboard_manifest_fixture_is_fully_pinned() {
    let manifest = load_manifest(&fixture("requirements.txt")).expect("fixture should validate");
    assert!(manifest.len() >= 15);
    assert!(manifest.find("apscheduler").is_some());
    assert!(manifest.find("python_dotenv").is_some());
    for entry in &manifest.entries {
        assert!(!entry.version.is_empty(), "line {} has no version", entry.line);
    }
}

#[test]
fn manifest_with_loose_pins_reports_each_line() {
    let text = std::fs::read_to_string(fixture("requirements.txt")).unwrap()
        + "pandas>=2.0\nrequests==latest\nNumPy==1.26.4\n";
    let report = parse_manifest(&text).unwrap_err();
    let rendered = report.to_string();
    assert_eq!(report.issues.len(), 3, "{rendered}");
    assert!(rendered.contains("not an exact pin"));
    assert!(rendered.contains("invalid version"));
    assert!(rendered.contains("duplicate of line"));
}

// ===========================================================================
// Event loop
// ===========================================================================

#[tokio::test]
async fn event_loop_generates_and_exports_listings() {
    let dir = scratch("autodash_it_export");
    let mut running = start(
        inline_config("http://127.0.0.1:9/", "http://127.0.0.1:9/v1", None),
        Database::open(":memory:").unwrap(),
    );

    running
        .cmd_tx
        .send(UserCommand::GenerateListings(6))
        .await
        .unwrap();
    let listings = match running.next_update().await {
        UiUpdate::ListingsGenerated(listings) => listings,
        other => panic!("unexpected update: {other:?}"),
    };
    assert_eq!(listings.len(), 6);
    for listing in &listings {
        assert!((1980..=2025).contains(&listing.year));
        assert!((1000..=100_000).contains(&listing.price));
    }

    let path = dir.join("listings.csv");
    running
        .cmd_tx
        .send(UserCommand::ExportListings(path.clone()))
        .await
        .unwrap();
    assert_eq!(
        running.next_update().await,
        UiUpdate::ListingsExported {
            path: path.clone(),
            rows: 6
        }
    );

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let rows: Vec<autodash_core::listings::Listing> =
        reader.deserialize().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows, listings);

    running.quit().await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn event_loop_decodes_vin_then_serves_from_cache() {
    let body = r#"{"Count":1,"Message":"Results returned successfully","Results":[{"Make":"HONDA","Model":"Accord","ModelYear":"2003","ErrorCode":"0","ErrorText":"0 - VIN decoded clean."}]}"#;
    let (base, server) = serve_once(json_response(body)).await;

    let mut running = start(
        inline_config(&format!("{base}/api/vehicles/DecodeVinValuesExtended/"), "http://127.0.0.1:9/v1", None),
        Database::open(":memory:").unwrap(),
    );

    let decode = |year| UserCommand::DecodeVin {
        vin: VALID_VIN.to_lowercase(),
        year,
    };

    running.cmd_tx.send(decode(Some(2003))).await.unwrap();
    assert_eq!(running.next_update().await, UiUpdate::VinStarted(VALID_VIN.into()));
    match running.next_update().await {
        UiUpdate::VinDecoded(decode) => {
            assert!(!decode.cached);
            assert_eq!(decode.query.model_year, Some(2003));
            assert_eq!(decode.fields[0], ("Make".to_string(), "HONDA".to_string()));
            assert!(decode.warning.is_none());
        }
        other => panic!("unexpected update: {other:?}"),
    }

    let request = server.await.unwrap();
    assert!(
        request.starts_with(&format!(
            "GET /api/vehicles/DecodeVinValuesExtended/{VALID_VIN}?format=json&modelyear=2003 "
        )),
        "{request}"
    );

    // The mock server is gone; a second decode must come from the cache.
    running.cmd_tx.send(decode(Some(2003))).await.unwrap();
    match running.next_update().await {
        UiUpdate::VinDecoded(decode) => assert!(decode.cached),
        other => panic!("unexpected update: {other:?}"),
    }

    running.quit().await;
}

#[tokio::test]
async fn event_loop_reports_vin_http_errors() {
    let (base, server) = serve_once(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;
    let mut running = start(
        inline_config(&format!("{base}/"), "http://127.0.0.1:9/v1", None),
        Database::open(":memory:").unwrap(),
    );

    running
        .cmd_tx
        .send(UserCommand::DecodeVin {
            vin: VALID_VIN.into(),
            year: None,
        })
        .await
        .unwrap();
    assert!(matches!(running.next_update().await, UiUpdate::VinStarted(_)));
    assert_eq!(
        running.next_update().await,
        UiUpdate::VinError("Error decoding VIN: API request failed with status 404".into())
    );

    let _ = server.await;
    running.quit().await;
}

#[tokio::test]
async fn event_loop_streams_review_from_openai() {
    let mut sse = String::from("HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\n");
    for chunk in [
        r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"Rename "},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"`x`.\n"},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ] {
        sse.push_str(&format!("data: {chunk}\n\n"));
    }
    let (base, server) = serve_once(sse).await;

    let mut running = start(
        inline_config("http://127.0.0.1:9/", &format!("{base}/v1"), Some("sk-test")),
        Database::open(":memory:").unwrap(),
    );

    running
        .cmd_tx
        .send(UserCommand::ReviewCode("x = 1\nprint(x)".into()))
        .await
        .unwrap();

    assert_eq!(running.next_update().await, UiUpdate::ReviewStarted);
    assert_eq!(running.next_update().await, UiUpdate::ReviewToken("Rename ".into()));
    assert_eq!(running.next_update().await, UiUpdate::ReviewToken("`x`.\n".into()));
    assert_eq!(
        running.next_update().await,
        UiUpdate::ReviewComplete("Rename `x`.".into())
    );

    let request = server.await.unwrap();
    assert!(request.contains("Please review this code and provide feedback:"));
    assert!(request.contains(r#""max_tokens":512"#));

    running.quit().await;
}

#[tokio::test]
async fn event_loop_exits_when_command_channel_closes() {
    let running = start(
        inline_config("http://127.0.0.1:9/", "http://127.0.0.1:9/v1", None),
        Database::open(":memory:").unwrap(),
    );
    drop(running.cmd_tx);
    running.handle.await.unwrap().unwrap();
}

// ===========================================================================
// Persistence across restarts
// ===========================================================================

#[tokio::test]
async fn listings_survive_restart() {
    let dir = scratch("autodash_it_restart");
    let db_path = dir.join("autodash.db");
    let db_str = db_path.to_str().unwrap().to_string();
    let config = inline_config("http://127.0.0.1:9/", "http://127.0.0.1:9/v1", None);

    let mut running = start(config.clone(), Database::open(&db_str).unwrap());
    running
        .cmd_tx
        .send(UserCommand::GenerateListings(9))
        .await
        .unwrap();
    let generated = match running.next_update().await {
        UiUpdate::ListingsGenerated(listings) => listings,
        other => panic!("unexpected update: {other:?}"),
    };
    running.quit().await;

    let (llm_tx, _llm_rx) = mpsc::channel(1);
    let (vin_tx, _vin_rx) = mpsc::channel(1);
    let mut state = AppState::new(
        config,
        Database::open(&db_str).unwrap(),
        LlmClient::Disabled,
        llm_tx,
        vin_tx,
    )
    .unwrap();
    assert!(app::restore_from_db(&mut state).unwrap());
    assert_eq!(state.listings, generated);
    assert_eq!(state.initial_listing_count(), 9);

    drop(state);
    let _ = std::fs::remove_dir_all(&dir);
}

// ===========================================================================
// Self-update against a mock OpenAI endpoint
// ===========================================================================

#[tokio::test]
async fn self_update_through_llm_client() {
    let dir = scratch("autodash_it_self_update");
    let target = dir.join("app.py");
    std::fs::write(&target, "print('old')\n").unwrap();

    let reply = serde_json::json!({
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "```python\nprint('new')\n```"},
            "finish_reason": "stop"
        }]
    })
    .to_string();
    let (base, server) = serve_once(json_response(&reply)).await;

    let config = inline_config("http://127.0.0.1:9/", &format!("{base}/v1"), Some("sk-test"));
    let client = LlmClient::from_config(&config);
    let enhancer = LlmEnhancer::new(&client, &config.openai);
    let updater = SelfUpdater::new(target.clone(), dir.join("backups"))
        .with_instruction("Add logging.");

    let outcome = updater.run(&enhancer).await.unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "print('new')\n");
    assert_eq!(
        std::fs::read_to_string(&outcome.backup_path).unwrap(),
        "print('old')\n"
    );

    let request = server.await.unwrap();
    assert!(request.contains("Add logging."));
    assert!(request.contains(r#""temperature":0.7"#));
    assert!(request.contains(r#""role":"system""#));

    let _ = std::fs::remove_dir_all(&dir);
}
