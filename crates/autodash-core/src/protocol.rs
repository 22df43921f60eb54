// Messages exchanged between the TUI, the app loop and the LLM tasks.

use std::path::PathBuf;

use crate::listings::Listing;
use crate::vin::VinDecode;

/// Tabs of the main panel, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TabId {
    #[default]
    Listings,
    Vin,
    Review,
}

impl TabId {
    pub const ALL: [TabId; 3] = [TabId::Listings, TabId::Vin, TabId::Review];

    pub fn title(self) -> &'static str {
        match self {
            TabId::Listings => "Listings",
            TabId::Vin => "VIN Decoder",
            TabId::Review => "Code Review",
        }
    }

    pub fn index(self) -> usize {
        match self {
            TabId::Listings => 0,
            TabId::Vin => 1,
            TabId::Review => 2,
        }
    }
}

/// Lifecycle of a streamed LLM response as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmStatus {
    #[default]
    Idle,
    Streaming,
    Complete,
    Error,
}

/// Events emitted by a streaming LLM task. Every variant carries the
/// generation of the task that produced it so stale events can be dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    Token {
        text: String,
        generation: u64,
    },
    Complete {
        full_text: String,
        finish_reason: Option<String>,
        generation: u64,
    },
    Error {
        message: String,
        generation: u64,
    },
}

impl LlmEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LlmEvent::Token { generation, .. }
            | LlmEvent::Complete { generation, .. }
            | LlmEvent::Error { generation, .. } => *generation,
        }
    }
}

/// Commands sent from the TUI (or CLI) to the app loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    GenerateListings(usize),
    ExportListings(PathBuf),
    DecodeVin { vin: String, year: Option<u16> },
    ClearVinCache,
    ReviewCode(String),
    CancelReview,
    SwitchTab(TabId),
    Quit,
}

/// Updates pushed from the app loop to the TUI.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    ListingsGenerated(Vec<Listing>),
    /// Listings reloaded from the database at startup.
    ListingsRestored(Vec<Listing>),
    ListingsError(String),
    ListingsExported { path: PathBuf, rows: usize },
    VinStarted(String),
    VinDecoded(Box<VinDecode>),
    VinError(String),
    ReviewStarted,
    ReviewToken(String),
    ReviewComplete(String),
    ReviewError(String),
    ReviewCancelled,
    Notice(String),
}
