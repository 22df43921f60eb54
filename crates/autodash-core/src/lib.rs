// Core library: configuration, domain types and persistence shared by the
// app, LLM and TUI crates.

pub mod config;
pub mod db;
pub mod listings;
pub mod manifest;
pub mod protocol;
pub mod vin;
