// Application state and orchestration logic.
//
// The central event loop coordinating user commands from the TUI, streamed
// review events from the LLM task, and VIN decode results. Owns all mutable
// state and pushes UI updates to the TUI render loop.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use autodash_core::config::Config;
use autodash_core::db::Database;
use autodash_core::listings::{self, Listing, ListingGenerator};
use autodash_core::protocol::{LlmEvent, LlmStatus, TabId, UiUpdate, UserCommand};
use autodash_core::vin::{VinDecode, VinDecoder, VinError, VinQuery};
use autodash_llm::LlmClient;

use crate::reviewer;

/// Key in the dashboard state table holding the last requested listing count.
pub const LISTING_COUNT_KEY: &str = "listing_count";

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Result of a spawned VIN decode, sent back to the event loop.
#[derive(Debug)]
pub struct VinOutcome {
    pub query: VinQuery,
    pub result: Result<Value, VinError>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub generator: ListingGenerator,
    pub decoder: VinDecoder,
    pub rng: StdRng,
    /// Most recent batch, generated or restored.
    pub listings: Vec<Listing>,
    /// The decode the UI is waiting for. Results for any other query are
    /// cached but not shown.
    pub pending_vin: Option<VinQuery>,
    pub review_text: String,
    pub review_status: LlmStatus,
    pub review_task: Option<tokio::task::JoinHandle<()>>,
    /// Incremented on every new or cancelled review; events carrying an
    /// older generation are discarded in `handle_llm_event`.
    pub llm_generation: u64,
    pub active_tab: TabId,
    /// Shared with spawned streaming tasks.
    pub llm_client: Arc<LlmClient>,
    pub llm_tx: mpsc::Sender<LlmEvent>,
    pub vin_tx: mpsc::Sender<VinOutcome>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Database,
        llm_client: LlmClient,
        llm_tx: mpsc::Sender<LlmEvent>,
        vin_tx: mpsc::Sender<VinOutcome>,
    ) -> anyhow::Result<Self> {
        let generator = ListingGenerator::new(&config.dashboard)
            .context("failed to build listing generator")?;
        let decoder = VinDecoder::new(&config.nhtsa).context("failed to build VIN decoder")?;

        Ok(AppState {
            config,
            db,
            generator,
            decoder,
            rng: StdRng::from_os_rng(),
            listings: Vec::new(),
            pending_vin: None,
            review_text: String::new(),
            review_status: LlmStatus::Idle,
            review_task: None,
            llm_generation: 0,
            active_tab: TabId::Listings,
            llm_client: Arc::new(llm_client),
            llm_tx,
            vin_tx,
        })
    }

    /// Replace the RNG, e.g. with a seeded one for reproducible listings.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Listing count to start the UI with: the last one requested, or the
    /// configured default.
    pub fn initial_listing_count(&self) -> usize {
        let ranges = &self.config.dashboard.listings;
        match self.db.load_state(LISTING_COUNT_KEY) {
            Ok(Some(value)) => value
                .as_u64()
                .map(|n| n as usize)
                .filter(|n| (1..=ranges.max_count).contains(n))
                .unwrap_or(ranges.default_count),
            Ok(None) => ranges.default_count,
            Err(e) => {
                warn!("Failed to load saved listing count: {:#}", e);
                ranges.default_count
            }
        }
    }

    /// Generate `count` listings, persist them as a batch and keep them as
    /// the current set.
    pub fn generate_listings(&mut self, count: usize) -> Result<&[Listing], String> {
        let max = self.config.dashboard.listings.max_count;
        if !(1..=max).contains(&count) {
            return Err(format!("count must be between 1 and {max}, got {count}"));
        }

        let listings = self
            .generator
            .generate_listings(count, &mut self.rng)
            .map_err(|e| e.to_string())?;

        if let Err(e) = self.db.record_listings(&listings) {
            warn!("Failed to persist listings: {:#}", e);
        }
        if let Err(e) = self.db.save_state(LISTING_COUNT_KEY, &Value::from(count)) {
            warn!("Failed to save listing count: {:#}", e);
        }

        self.listings = listings;
        Ok(&self.listings)
    }

    /// Write the current listings to `path` as CSV, returning the row count.
    pub fn export_listings(&self, path: &Path) -> Result<usize, String> {
        if self.listings.is_empty() {
            return Err("no listings to export; generate some first".to_string());
        }
        let file = std::fs::File::create(path)
            .map_err(|e| format!("failed to create {}: {e}", path.display()))?;
        listings::write_csv(&self.listings, file).map_err(|e| e.to_string())?;
        info!("Exported {} listings to {}", self.listings.len(), path.display());
        Ok(self.listings.len())
    }

    /// Cancel the in-flight review task, if any.
    pub fn cancel_review_task(&mut self) -> bool {
        match self.review_task.take() {
            Some(handle) => {
                handle.abort();
                info!("Cancelled review task (gen: {})", self.llm_generation);
                true
            }
            None => false,
        }
    }

    /// Start streaming a review of `code`. Any running review is cancelled
    /// first.
    pub fn trigger_review(&mut self, code: &str) -> Result<(), reviewer::ReviewError> {
        let prepared = reviewer::prepare_review(code)?;

        self.cancel_review_task();
        self.review_text.clear();

        let messages = reviewer::review_messages(prepared);
        let max_tokens = self.config.openai.review_max_tokens;
        let client = Arc::clone(&self.llm_client);
        let tx = self.llm_tx.clone();

        self.llm_generation += 1;
        let generation = self.llm_generation;
        self.review_status = LlmStatus::Streaming;

        let handle = tokio::spawn(async move {
            if let Err(e) = client.stream_chat(&messages, max_tokens, tx, generation).await {
                warn!("Review task failed: {}", e);
            }
        });
        self.review_task = Some(handle);
        info!("Triggered code review (gen: {})", generation);
        Ok(())
    }

    /// Look up `query` in the cache, or spawn a decode. Returns the cached
    /// decode when there is one.
    pub fn start_vin_decode(&mut self, query: VinQuery) -> Option<VinDecode> {
        match self.db.cached_vin(&query) {
            Ok(Some(raw)) => {
                info!("VIN {} served from cache", query.vin);
                self.pending_vin = None;
                return Some(VinDecode::from_response(query, raw, true));
            }
            Ok(None) => {}
            Err(e) => warn!("VIN cache lookup failed: {:#}", e),
        }

        self.pending_vin = Some(query.clone());
        let decoder = self.decoder.clone();
        let tx = self.vin_tx.clone();
        tokio::spawn(async move {
            let result = decoder.decode(&query).await;
            let _ = tx.send(VinOutcome { query, result }).await;
        });
        None
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the main application event loop.
///
/// Listens on three channels using `tokio::select!`:
/// 1. LLM streaming events
/// 2. VIN decode results
/// 3. User commands from the TUI
///
/// Pushes UI updates through `ui_tx` for the TUI render loop.
pub async fn run(
    mut llm_rx: mpsc::Receiver<LlmEvent>,
    mut vin_rx: mpsc::Receiver<VinOutcome>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    // A closed channel is swapped out of the select so it never spins.
    let mut llm_open = true;
    let mut vin_open = true;

    loop {
        tokio::select! {
            // --- LLM events ---
            llm_event = llm_rx.recv(), if llm_open => {
                match llm_event {
                    Some(event) => handle_llm_event(&mut state, event, &ui_tx).await,
                    None => {
                        info!("LLM channel closed");
                        llm_open = false;
                    }
                }
            }

            // --- VIN decode results ---
            outcome = vin_rx.recv(), if vin_open => {
                match outcome {
                    Some(outcome) => handle_vin_outcome(&mut state, outcome, &ui_tx).await,
                    None => {
                        info!("VIN channel closed");
                        vin_open = false;
                    }
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => handle_user_command(&mut state, cmd, &ui_tx).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup
    state.cancel_review_task();
    info!("Application event loop exiting");
    Ok(())
}

/// Apply a streamed review event, discarding events from stale generations.
async fn handle_llm_event(state: &mut AppState, event: LlmEvent, ui_tx: &mpsc::Sender<UiUpdate>) {
    let event_generation = event.generation();
    if event_generation != state.llm_generation || state.review_status != LlmStatus::Streaming {
        debug!(
            "Discarding stale LLM event (event gen: {}, current gen: {})",
            event_generation, state.llm_generation
        );
        return;
    }

    match event {
        LlmEvent::Token { text, .. } => {
            state.review_text.push_str(&text);
            let _ = ui_tx.send(UiUpdate::ReviewToken(text)).await;
        }
        LlmEvent::Complete {
            full_text,
            finish_reason,
            ..
        } => {
            let text = reviewer::finish_review(&full_text, finish_reason.as_deref());
            info!("Received review ({} chars)", text.len());
            state.review_text = text.clone();
            state.review_status = LlmStatus::Complete;
            state.review_task = None;
            let _ = ui_tx.send(UiUpdate::ReviewComplete(text)).await;
        }
        LlmEvent::Error { message, .. } => {
            warn!("Review error: {}", message);
            state.review_status = LlmStatus::Error;
            state.review_task = None;
            let _ = ui_tx.send(UiUpdate::ReviewError(message)).await;
        }
    }
}

/// Cache a finished decode and report it if the UI is still waiting for it.
async fn handle_vin_outcome(
    state: &mut AppState,
    outcome: VinOutcome,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    let VinOutcome { query, result } = outcome;
    let is_pending = state.pending_vin.as_ref() == Some(&query);

    match result {
        Ok(raw) => {
            if let Err(e) = state.db.cache_vin(&query, &raw) {
                warn!("Failed to cache VIN decode: {:#}", e);
            }
            if is_pending {
                state.pending_vin = None;
                let decode = VinDecode::from_response(query, raw, false);
                let _ = ui_tx.send(UiUpdate::VinDecoded(Box::new(decode))).await;
            }
        }
        Err(e) => {
            warn!("VIN decode for {} failed: {}", query.vin, e);
            if is_pending {
                state.pending_vin = None;
                let _ = ui_tx
                    .send(UiUpdate::VinError(format!("Error decoding VIN: {e}")))
                    .await;
            }
        }
    }

    if !is_pending {
        debug!("Ignoring result for superseded VIN query");
    }
}

/// Handle a user command from the TUI.
async fn handle_user_command(
    state: &mut AppState,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    match cmd {
        UserCommand::GenerateListings(count) => {
            let update = match state.generate_listings(count) {
                Ok(listings) => UiUpdate::ListingsGenerated(listings.to_vec()),
                Err(message) => {
                    warn!("Listing generation rejected: {}", message);
                    UiUpdate::ListingsError(message)
                }
            };
            let _ = ui_tx.send(update).await;
        }
        UserCommand::ExportListings(path) => {
            let update = match state.export_listings(&path) {
                Ok(rows) => UiUpdate::ListingsExported { path, rows },
                Err(message) => UiUpdate::ListingsError(message),
            };
            let _ = ui_tx.send(update).await;
        }
        UserCommand::DecodeVin { vin, year } => {
            let ranges = state.config.dashboard.listings;
            let query = match VinQuery::bounded(&vin, year, ranges.min_year, ranges.max_year) {
                Ok(q) => q,
                Err(e) => {
                    // The UI now shows this error, not the earlier decode.
                    state.pending_vin = None;
                    let _ = ui_tx.send(UiUpdate::VinError(e.to_string())).await;
                    return;
                }
            };
            let vin = query.vin.clone();
            let update = match state.start_vin_decode(query) {
                Some(decode) => UiUpdate::VinDecoded(Box::new(decode)),
                None => UiUpdate::VinStarted(vin),
            };
            let _ = ui_tx.send(update).await;
        }
        UserCommand::ClearVinCache => {
            let update = match state.db.clear_vin_cache() {
                Ok(n) => UiUpdate::Notice(format!("Cleared {n} cached VIN decodes")),
                Err(e) => UiUpdate::Notice(format!("Failed to clear VIN cache: {e:#}")),
            };
            let _ = ui_tx.send(update).await;
        }
        UserCommand::ReviewCode(code) => {
            let update = match state.trigger_review(&code) {
                Ok(()) => UiUpdate::ReviewStarted,
                Err(e) => UiUpdate::ReviewError(e.to_string()),
            };
            let _ = ui_tx.send(update).await;
        }
        UserCommand::CancelReview => {
            if state.cancel_review_task() {
                // Bump so anything the aborted task already queued is dropped.
                state.llm_generation += 1;
                state.review_status = LlmStatus::Idle;
                let _ = ui_tx.send(UiUpdate::ReviewCancelled).await;
            }
        }
        UserCommand::SwitchTab(tab) => {
            state.active_tab = tab;
            info!("Switched to tab: {:?}", tab);
        }
        UserCommand::Quit => {
            // Handled in the main loop
        }
    }
}

// ---------------------------------------------------------------------------
// Startup restore
// ---------------------------------------------------------------------------

/// Reload the most recent listing batch from the database.
///
/// Returns `true` if a batch was restored.
pub fn restore_from_db(state: &mut AppState) -> anyhow::Result<bool> {
    match state.db.latest_listings()? {
        Some(listings) if !listings.is_empty() => {
            info!("Restored {} listings from the last session", listings.len());
            state.listings = listings;
            Ok(true)
        }
        _ => {
            info!("No previous listings to restore, starting fresh");
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
