// Code review widget: code editor on top, streamed review below.
//
// Review header: "AI Review -- idle/streaming.../complete/error"
// Auto-scroll to bottom while streaming

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use autodash_core::protocol::LlmStatus;

use super::{field_border_style, field_text};
use crate::{InputMode, ViewState};

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let [editor_area, review_area] =
        Layout::vertical([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(area);

    render_editor(frame, editor_area, state);
    render_review(frame, review_area, state);
}

fn render_editor(frame: &mut Frame, area: Rect, state: &ViewState) {
    let editing = state.input_mode == InputMode::EditCode;
    let title = if editing {
        "Code (Ctrl+S review, Esc done)"
    } else {
        "Code (c to edit)"
    };

    // Keep the cursor line in view.
    let inner_height = area.height.saturating_sub(2) as usize;
    let line_count = state.review_code.split('\n').count();
    let scroll = line_count.saturating_sub(inner_height) as u16;

    let paragraph = Paragraph::new(field_text(&state.review_code, editing))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(field_border_style(editing)),
        )
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_review(frame: &mut Frame, area: Rect, state: &ViewState) {
    let content = match (&state.review_error, state.review_text.is_empty()) {
        (Some(message), _) if state.review_status == LlmStatus::Error => {
            format!("Error: {message}")
        }
        (_, true) => placeholder_text(state.review_status).to_string(),
        _ => state.review_text.clone(),
    };

    let inner_height = area.height.saturating_sub(2) as usize;
    let line_count = content.lines().count();
    let scroll = if state.review_status == LlmStatus::Streaming && line_count > inner_height {
        line_count - inner_height
    } else {
        state.scroll("review").min(line_count.saturating_sub(1))
    };
    let scroll = u16::try_from(scroll).unwrap_or(u16::MAX);

    let paragraph = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(build_title(state.review_status))
                .border_style(border_style(state.review_status)),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

fn build_title(status: LlmStatus) -> Line<'static> {
    let (status_text, status_color) = status_indicator(status);
    Line::from(vec![
        Span::styled("AI Review", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(" -- ", Style::default().fg(Color::DarkGray)),
        Span::styled(status_text, Style::default().fg(status_color)),
    ])
}

/// Return status text and color for the review stream.
pub fn status_indicator(status: LlmStatus) -> (&'static str, Color) {
    match status {
        LlmStatus::Idle => ("idle", Color::DarkGray),
        LlmStatus::Streaming => ("streaming...", Color::Yellow),
        LlmStatus::Complete => ("complete", Color::Green),
        LlmStatus::Error => ("error", Color::Red),
    }
}

fn border_style(status: LlmStatus) -> Style {
    match status {
        LlmStatus::Streaming => Style::default().fg(Color::Yellow),
        LlmStatus::Error => Style::default().fg(Color::Red),
        _ => Style::default(),
    }
}

fn placeholder_text(status: LlmStatus) -> &'static str {
    match status {
        LlmStatus::Idle => "Paste or type code above, then press Enter to request a review.",
        LlmStatus::Streaming => "Waiting for the model...",
        LlmStatus::Complete => "Review complete (empty).",
        LlmStatus::Error => "Review failed.",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
