// TUI dashboard: layout, input handling, and widget rendering.
//
// The TUI owns a `ViewState` that mirrors relevant parts of the application
// state. The app orchestrator pushes `UiUpdate` messages over an mpsc channel;
// the TUI applies them to `ViewState` and re-renders at ~30 fps.

pub mod cli;
pub mod input;
pub mod layout;
pub mod widgets;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use ratatui::Frame;
use tokio::sync::mpsc;
use tracing::{info, warn};

use autodash_core::config::Config;
use autodash_core::listings::Listing;
use autodash_core::protocol::{LlmStatus, TabId, UiUpdate, UserCommand};
use autodash_core::vin::VinDecode;

use layout::build_layout;

/// Default file written by the export key.
pub const DEFAULT_EXPORT_PATH: &str = "car_listings.csv";

// ---------------------------------------------------------------------------
// DashboardInfo
// ---------------------------------------------------------------------------

/// Static settings shown in the Configuration sidebar.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardInfo {
    pub min_year: u16,
    pub max_year: u16,
    pub min_price: u32,
    pub max_price: u32,
    pub max_count: usize,
    /// Model name when an API key is configured.
    pub llm_model: Option<String>,
    pub export_path: PathBuf,
}

impl DashboardInfo {
    pub fn from_config(config: &Config, llm_model: Option<&str>) -> Self {
        let ranges = &config.dashboard.listings;
        DashboardInfo {
            min_year: ranges.min_year,
            max_year: ranges.max_year,
            min_price: ranges.min_price,
            max_price: ranges.max_price,
            max_count: ranges.max_count,
            llm_model: llm_model.map(str::to_string),
            export_path: PathBuf::from(DEFAULT_EXPORT_PATH),
        }
    }
}

impl Default for DashboardInfo {
    fn default() -> Self {
        DashboardInfo {
            min_year: 1980,
            max_year: 2025,
            min_price: 1000,
            max_price: 100_000,
            max_count: 100,
            llm_model: None,
            export_path: PathBuf::from(DEFAULT_EXPORT_PATH),
        }
    }
}

// ---------------------------------------------------------------------------
// InputMode
// ---------------------------------------------------------------------------

/// Which text field, if any, is receiving keystrokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    EditVin,
    EditYear,
    EditCode,
}

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// TUI-local state that mirrors the application state for rendering.
///
/// Updated incrementally via `UiUpdate` messages from the app orchestrator
/// and by the input handler.
pub struct ViewState {
    pub info: DashboardInfo,
    pub active_tab: TabId,
    pub input_mode: InputMode,
    /// Scratch text for the VIN and year fields while they are edited.
    pub edit_buffer: String,
    /// Whether the quit confirmation dialog is showing.
    pub confirm_quit: bool,
    /// One-line message shown in the status bar.
    pub notice: Option<String>,

    /// Number of listings the next generate request asks for.
    pub listing_count: usize,
    pub listings: Vec<Listing>,
    pub listings_error: Option<String>,

    pub vin_input: String,
    pub year_input: String,
    /// VIN whose decode is in flight.
    pub vin_pending: Option<String>,
    pub vin_decode: Option<VinDecode>,
    pub vin_error: Option<String>,

    pub review_code: String,
    pub review_text: String,
    pub review_status: LlmStatus,
    pub review_error: Option<String>,

    /// Per-widget scroll offsets (keyed by widget name).
    pub scroll_offset: HashMap<String, usize>,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState::new(DashboardInfo::default(), 5)
    }
}

impl ViewState {
    pub fn new(info: DashboardInfo, listing_count: usize) -> Self {
        ViewState {
            info,
            active_tab: TabId::Listings,
            input_mode: InputMode::Normal,
            edit_buffer: String::new(),
            confirm_quit: false,
            notice: None,
            listing_count,
            listings: Vec::new(),
            listings_error: None,
            vin_input: String::new(),
            year_input: String::new(),
            vin_pending: None,
            vin_decode: None,
            vin_error: None,
            review_code: String::new(),
            review_text: String::new(),
            review_status: LlmStatus::Idle,
            review_error: None,
            scroll_offset: HashMap::new(),
        }
    }

    /// Scroll offset for `key`, zero when never scrolled.
    pub fn scroll(&self, key: &str) -> usize {
        self.scroll_offset.get(key).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// UiUpdate processing
// ---------------------------------------------------------------------------

/// Apply a single UiUpdate to the ViewState.
pub fn apply_ui_update(state: &mut ViewState, update: UiUpdate) {
    match update {
        UiUpdate::ListingsGenerated(listings) => {
            state.notice = Some(format!("Generated {} listings", listings.len()));
            state.listings = listings;
            state.listings_error = None;
            state.scroll_offset.remove("listings");
        }
        UiUpdate::ListingsRestored(listings) => {
            state.notice = Some(format!(
                "Restored {} listings from the last session",
                listings.len()
            ));
            state.listings = listings;
            state.listings_error = None;
        }
        UiUpdate::ListingsError(message) => {
            state.listings_error = Some(message);
        }
        UiUpdate::ListingsExported { path, rows } => {
            state.listings_error = None;
            state.notice = Some(format!("Exported {} rows to {}", rows, path.display()));
        }
        UiUpdate::VinStarted(vin) => {
            state.vin_pending = Some(vin);
            state.vin_decode = None;
            state.vin_error = None;
        }
        UiUpdate::VinDecoded(decode) => {
            state.vin_pending = None;
            state.vin_error = None;
            state.vin_decode = Some(*decode);
            state.scroll_offset.remove("vin");
        }
        UiUpdate::VinError(message) => {
            state.vin_pending = None;
            state.vin_decode = None;
            state.vin_error = Some(message);
        }
        UiUpdate::ReviewStarted => {
            state.review_text.clear();
            state.review_error = None;
            state.review_status = LlmStatus::Streaming;
            state.scroll_offset.remove("review");
        }
        UiUpdate::ReviewToken(token) => {
            state.review_text.push_str(&token);
            state.review_status = LlmStatus::Streaming;
        }
        UiUpdate::ReviewComplete(text) => {
            state.review_text = text;
            state.review_status = LlmStatus::Complete;
        }
        UiUpdate::ReviewError(message) => {
            state.review_error = Some(message);
            state.review_status = LlmStatus::Error;
        }
        UiUpdate::ReviewCancelled => {
            state.review_status = LlmStatus::Idle;
            state.notice = Some("Review cancelled".to_string());
        }
        UiUpdate::Notice(message) => {
            state.notice = Some(message);
        }
    }
}

// ---------------------------------------------------------------------------
// Render frame
// ---------------------------------------------------------------------------

/// Render the complete dashboard frame.
pub fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());

    widgets::status_bar::render(frame, layout.status_bar, state);
    widgets::sidebar::render(frame, layout.sidebar, state);
    match state.active_tab {
        TabId::Listings => widgets::listings::render(frame, layout.main_panel, state),
        TabId::Vin => widgets::vin::render(frame, layout.main_panel, state),
        TabId::Review => widgets::review::render(frame, layout.main_panel, state),
    }
    widgets::help_bar::render(frame, layout.help_bar, state);

    if state.confirm_quit {
        widgets::quit_confirm::render(frame, frame.area());
    }
}

// ---------------------------------------------------------------------------
// Main TUI loop
// ---------------------------------------------------------------------------

/// Run the TUI event loop.
///
/// 1. Initializes the terminal (raw mode, alternate screen).
/// 2. Installs a panic hook to restore the terminal on crash.
/// 3. Runs an async select loop: UI updates, keyboard input, render ticks.
/// 4. Restores the terminal on exit.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
    mut view_state: ViewState,
) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = ratatui::restore();
        original_hook(panic_info);
    }));

    let mut event_stream = EventStream::new();

    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let result = loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(ui_update) => apply_ui_update(&mut view_state, ui_update),
                    None => {
                        info!("UI channel closed");
                        break Ok(());
                    }
                }
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        if let Some(cmd) = input::handle_key(key_event, &mut view_state) {
                            let quit = cmd == UserCommand::Quit;
                            let _ = cmd_tx.send(cmd).await;
                            if quit {
                                break Ok(());
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Terminal input error: {}", e);
                        break Err(e.into());
                    }
                    None => break Ok(()),
                }
            }

            _ = render_tick.tick() => {
                if let Err(e) = terminal.draw(|frame| render_frame(frame, &view_state)) {
                    break Err(e.into());
                }
            }
        }
    };

    ratatui::restore();
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use autodash_core::vin::VinQuery;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use serde_json::json;

    fn listing(make: &str) -> Listing {
        Listing {
            make: make.to_string(),
            model: "Model 3".to_string(),
            year: 2020,
            price: 35_000,
            location: "Chicago".to_string(),
        }
    }

    fn sample_decode(cached: bool) -> VinDecode {
        let query = VinQuery::new("1HGCM82633A004352", Some(2003)).unwrap();
        let raw = json!({"Results": [{"Make": "HONDA", "Model": "Accord", "ErrorCode": "0"}]});
        VinDecode::from_response(query, raw, cached)
    }

    fn render_to_text(state: &ViewState, width: u16, height: u16) -> String {
        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render_frame(frame, state)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(width as usize)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn view_state_default_is_sensible() {
        let state = ViewState::default();
        assert_eq!(state.active_tab, TabId::Listings);
        assert_eq!(state.input_mode, InputMode::Normal);
        assert_eq!(state.listing_count, 5);
        assert_eq!(state.review_status, LlmStatus::Idle);
        assert!(state.listings.is_empty());
        assert!(state.vin_decode.is_none());
        assert!(!state.confirm_quit);
        assert!(state.scroll_offset.is_empty());
        assert_eq!(state.info.export_path, PathBuf::from(DEFAULT_EXPORT_PATH));
    }

    #[test]
    fn listings_generated_replaces_rows_and_clears_error() {
        let mut state = ViewState::default();
        state.listings_error = Some("old".into());
        apply_ui_update(
            &mut state,
            UiUpdate::ListingsGenerated(vec![listing("Tesla"), listing("Ford")]),
        );
        assert_eq!(state.listings.len(), 2);
        assert!(state.listings_error.is_none());
        assert_eq!(state.notice.as_deref(), Some("Generated 2 listings"));
    }

    #[test]
    fn listings_error_keeps_previous_rows() {
        let mut state = ViewState::default();
        state.listings = vec![listing("Tesla")];
        apply_ui_update(&mut state, UiUpdate::ListingsError("bad count".into()));
        assert_eq!(state.listings.len(), 1);
        assert_eq!(state.listings_error.as_deref(), Some("bad count"));
    }

    #[test]
    fn export_sets_notice() {
        let mut state = ViewState::default();
        apply_ui_update(
            &mut state,
            UiUpdate::ListingsExported {
                path: PathBuf::from("out.csv"),
                rows: 3,
            },
        );
        assert_eq!(state.notice.as_deref(), Some("Exported 3 rows to out.csv"));
    }

    #[test]
    fn vin_lifecycle() {
        let mut state = ViewState::default();
        apply_ui_update(&mut state, UiUpdate::VinStarted("1HGCM82633A004352".into()));
        assert_eq!(state.vin_pending.as_deref(), Some("1HGCM82633A004352"));

        apply_ui_update(&mut state, UiUpdate::VinDecoded(Box::new(sample_decode(false))));
        assert!(state.vin_pending.is_none());
        assert!(state.vin_decode.is_some());

        apply_ui_update(&mut state, UiUpdate::VinError("Error decoding VIN: boom".into()));
        assert!(state.vin_decode.is_none());
        assert_eq!(state.vin_error.as_deref(), Some("Error decoding VIN: boom"));
    }

    #[test]
    fn review_tokens_accumulate_then_complete() {
        let mut state = ViewState::default();
        state.review_text = "stale".into();
        apply_ui_update(&mut state, UiUpdate::ReviewStarted);
        assert!(state.review_text.is_empty());
        assert_eq!(state.review_status, LlmStatus::Streaming);

        apply_ui_update(&mut state, UiUpdate::ReviewToken("Looks ".into()));
        apply_ui_update(&mut state, UiUpdate::ReviewToken("good".into()));
        assert_eq!(state.review_text, "Looks good");

        apply_ui_update(&mut state, UiUpdate::ReviewComplete("Looks good.".into()));
        assert_eq!(state.review_text, "Looks good.");
        assert_eq!(state.review_status, LlmStatus::Complete);
    }

    #[test]
    fn review_error_sets_status() {
        let mut state = ViewState::default();
        apply_ui_update(&mut state, UiUpdate::ReviewError("LLM not configured".into()));
        assert_eq!(state.review_status, LlmStatus::Error);
        assert_eq!(state.review_error.as_deref(), Some("LLM not configured"));
    }

    #[test]
    fn cancel_returns_review_to_idle() {
        let mut state = ViewState::default();
        state.review_status = LlmStatus::Streaming;
        apply_ui_update(&mut state, UiUpdate::ReviewCancelled);
        assert_eq!(state.review_status, LlmStatus::Idle);
        assert_eq!(state.notice.as_deref(), Some("Review cancelled"));
    }

    #[test]
    fn render_each_tab_without_panicking() {
        let mut state = ViewState::default();
        state.listings = vec![listing("Tesla")];
        state.vin_decode = Some(sample_decode(true));
        state.review_text = "Use a context manager.".into();
        for tab in TabId::ALL {
            state.active_tab = tab;
            let text = render_to_text(&state, 120, 30);
            assert!(text.contains("Configuration"));
        }
    }

    #[test]
    fn render_shows_quit_dialog() {
        let mut state = ViewState::default();
        state.confirm_quit = true;
        let text = render_to_text(&state, 100, 30);
        assert!(text.contains("Really quit?"));
    }

    #[test]
    fn render_tiny_terminal_does_not_panic() {
        let state = ViewState::default();
        let _ = render_to_text(&state, 20, 6);
    }
}
