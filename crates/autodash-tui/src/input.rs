// Keyboard input handling and command dispatch.
//
// Translates crossterm key events into UserCommand messages sent to the
// app orchestrator, or into local ViewState mutations (tab switching,
// scrolling, text editing).

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use autodash_core::protocol::{LlmStatus, TabId, UserCommand};

use super::{InputMode, ViewState};

/// Lines moved by PageUp/PageDown.
const PAGE_SIZE: usize = 20;

/// Longest model year the year field accepts.
const YEAR_DIGITS: usize = 4;

/// Handle a keyboard event.
///
/// Returns `Some(UserCommand)` when the key press should be forwarded to the
/// app orchestrator. Returns `None` when the key press was handled locally.
pub fn handle_key(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    // Windows reports Release events as well.
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    // Ctrl+C always quits immediately regardless of mode.
    if key_event.modifiers.contains(KeyModifiers::CONTROL)
        && key_event.code == KeyCode::Char('c')
    {
        return Some(UserCommand::Quit);
    }

    if view_state.confirm_quit {
        return handle_confirm_quit(key_event, view_state);
    }

    match view_state.input_mode {
        InputMode::EditVin | InputMode::EditYear => handle_field_edit(key_event, view_state),
        InputMode::EditCode => handle_code_edit(key_event, view_state),
        InputMode::Normal => handle_normal(key_event, view_state),
    }
}

fn handle_normal(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('1') => switch_tab(view_state, TabId::Listings),
        KeyCode::Char('2') => switch_tab(view_state, TabId::Vin),
        KeyCode::Char('3') => switch_tab(view_state, TabId::Review),
        KeyCode::Tab => {
            let next = TabId::ALL[(view_state.active_tab.index() + 1) % TabId::ALL.len()];
            switch_tab(view_state, next)
        }
        KeyCode::BackTab => {
            let len = TabId::ALL.len();
            let prev = TabId::ALL[(view_state.active_tab.index() + len - 1) % len];
            switch_tab(view_state, prev)
        }

        // Listings
        KeyCode::Char('g') => Some(UserCommand::GenerateListings(view_state.listing_count)),
        KeyCode::Char('+') | KeyCode::Char('=') => {
            view_state.listing_count = (view_state.listing_count + 1).min(view_state.info.max_count);
            None
        }
        KeyCode::Char('-') => {
            view_state.listing_count = view_state.listing_count.saturating_sub(1).max(1);
            None
        }
        KeyCode::Char('e') => Some(UserCommand::ExportListings(
            view_state.info.export_path.clone(),
        )),

        // VIN decoder
        KeyCode::Char('v') => {
            view_state.active_tab = TabId::Vin;
            view_state.edit_buffer = view_state.vin_input.clone();
            view_state.input_mode = InputMode::EditVin;
            Some(UserCommand::SwitchTab(TabId::Vin))
        }
        KeyCode::Char('y') => {
            view_state.active_tab = TabId::Vin;
            view_state.edit_buffer = view_state.year_input.clone();
            view_state.input_mode = InputMode::EditYear;
            Some(UserCommand::SwitchTab(TabId::Vin))
        }
        KeyCode::Char('d') => Some(UserCommand::ClearVinCache),

        // Code review
        KeyCode::Char('c') => {
            view_state.active_tab = TabId::Review;
            view_state.input_mode = InputMode::EditCode;
            Some(UserCommand::SwitchTab(TabId::Review))
        }
        KeyCode::Char('x') => {
            if view_state.review_status == LlmStatus::Streaming {
                Some(UserCommand::CancelReview)
            } else {
                None
            }
        }

        KeyCode::Enter => submit_active_tab(view_state),

        KeyCode::Up | KeyCode::Char('k') => {
            scroll_up(view_state, 1);
            None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            scroll_down(view_state, 1);
            None
        }
        KeyCode::PageUp => {
            scroll_up(view_state, PAGE_SIZE);
            None
        }
        KeyCode::PageDown => {
            scroll_down(view_state, PAGE_SIZE);
            None
        }

        KeyCode::Esc => {
            view_state.notice = None;
            None
        }

        // Quit: enter confirmation mode instead of quitting immediately
        KeyCode::Char('q') => {
            view_state.confirm_quit = true;
            None
        }

        _ => None,
    }
}

/// Handle key events while in quit confirmation mode.
///
/// - `y` or `q` confirms quit (sends UserCommand::Quit)
/// - `n` or `Esc` cancels (returns to normal mode)
/// - All other keys are blocked
fn handle_confirm_quit(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Char('q') | KeyCode::Char('Q') => {
            Some(UserCommand::Quit)
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            view_state.confirm_quit = false;
            None
        }
        _ => None,
    }
}

/// Single-line VIN and year fields. Edits go to `edit_buffer` and only
/// replace the field on Enter.
fn handle_field_edit(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Esc => {
            view_state.edit_buffer.clear();
            view_state.input_mode = InputMode::Normal;
            None
        }
        KeyCode::Enter => {
            let value = std::mem::take(&mut view_state.edit_buffer);
            let mode = view_state.input_mode;
            view_state.input_mode = InputMode::Normal;
            if mode == InputMode::EditVin {
                view_state.vin_input = value.trim().to_string();
                submit_vin(view_state)
            } else {
                view_state.year_input = value;
                None
            }
        }
        KeyCode::Backspace => {
            view_state.edit_buffer.pop();
            None
        }
        KeyCode::Char(c) if !key_event.modifiers.contains(KeyModifiers::CONTROL) => {
            if view_state.input_mode == InputMode::EditYear {
                if c.is_ascii_digit() && view_state.edit_buffer.len() < YEAR_DIGITS {
                    view_state.edit_buffer.push(c);
                }
            } else {
                view_state.edit_buffer.push(c);
            }
            None
        }
        _ => None,
    }
}

/// Multi-line code editor. Edits apply directly to `review_code`.
fn handle_code_edit(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    let ctrl = key_event.modifiers.contains(KeyModifiers::CONTROL);
    match key_event.code {
        KeyCode::Char('s') if ctrl => {
            view_state.input_mode = InputMode::Normal;
            submit_review(view_state)
        }
        KeyCode::Char('u') if ctrl => {
            view_state.review_code.clear();
            None
        }
        KeyCode::Esc => {
            view_state.input_mode = InputMode::Normal;
            None
        }
        KeyCode::Enter => {
            view_state.review_code.push('\n');
            None
        }
        KeyCode::Tab => {
            view_state.review_code.push_str("    ");
            None
        }
        KeyCode::Backspace => {
            view_state.review_code.pop();
            None
        }
        KeyCode::Char(c) if !ctrl => {
            view_state.review_code.push(c);
            None
        }
        _ => None,
    }
}

fn switch_tab(view_state: &mut ViewState, tab: TabId) -> Option<UserCommand> {
    if view_state.active_tab == tab {
        return None;
    }
    view_state.active_tab = tab;
    Some(UserCommand::SwitchTab(tab))
}

/// Enter in normal mode runs the primary action of the current tab.
fn submit_active_tab(view_state: &mut ViewState) -> Option<UserCommand> {
    match view_state.active_tab {
        TabId::Listings => Some(UserCommand::GenerateListings(view_state.listing_count)),
        TabId::Vin => submit_vin(view_state),
        TabId::Review => submit_review(view_state),
    }
}

/// Blank code never reaches the app, so a running review keeps streaming.
fn submit_review(view_state: &mut ViewState) -> Option<UserCommand> {
    if view_state.review_code.trim().is_empty() {
        view_state.notice = Some("Nothing to review; press c to enter code".to_string());
        return None;
    }
    Some(UserCommand::ReviewCode(view_state.review_code.clone()))
}

fn submit_vin(view_state: &mut ViewState) -> Option<UserCommand> {
    let year_text = view_state.year_input.trim();
    let year = if year_text.is_empty() {
        None
    } else {
        match year_text.parse::<u16>() {
            Ok(year) => Some(year),
            Err(_) => {
                view_state.vin_error = Some(format!("Invalid model year: {year_text}"));
                return None;
            }
        }
    };
    Some(UserCommand::DecodeVin {
        vin: view_state.vin_input.clone(),
        year,
    })
}

/// Get the widget key for scroll state based on the active tab.
fn active_widget_key(view_state: &ViewState) -> &'static str {
    match view_state.active_tab {
        TabId::Listings => "listings",
        TabId::Vin => "vin",
        TabId::Review => "review",
    }
}

fn scroll_up(view_state: &mut ViewState, lines: usize) {
    let key = active_widget_key(view_state);
    let offset = view_state.scroll_offset.entry(key.to_string()).or_insert(0);
    *offset = offset.saturating_sub(lines);
}

fn scroll_down(view_state: &mut ViewState, lines: usize) {
    let key = active_widget_key(view_state);
    let limit = scroll_limit(view_state);
    let offset = view_state.scroll_offset.entry(key.to_string()).or_insert(0);
    *offset = offset.saturating_add(lines).min(limit);
}

/// Largest useful offset for the active tab: its last row or line.
fn scroll_limit(view_state: &ViewState) -> usize {
    let len = match view_state.active_tab {
        TabId::Listings => view_state.listings.len(),
        TabId::Vin => view_state
            .vin_decode
            .as_ref()
            .map_or(0, |decode| decode.fields.len()),
        TabId::Review => view_state.review_text.lines().count(),
    };
    len.saturating_sub(1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
