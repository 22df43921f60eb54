// VIN decoder widget: VIN and model year fields above the decode result.

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap};
use ratatui::Frame;

use autodash_core::vin::{VinDecode, VIN_LENGTH};

use super::{field_border_style, field_text};
use crate::{InputMode, ViewState};

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let [fields_area, result_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(3)]).areas(area);
    let [vin_area, year_area] =
        Layout::horizontal([Constraint::Percentage(70), Constraint::Percentage(30)])
            .areas(fields_area);

    render_vin_field(frame, vin_area, state);
    render_year_field(frame, year_area, state);

    if let Some(vin) = &state.vin_pending {
        let paragraph = Paragraph::new(format!("Decoding {vin}..."))
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL).title("Result"));
        frame.render_widget(paragraph, result_area);
    } else if let Some(message) = &state.vin_error {
        let paragraph = Paragraph::new(message.clone())
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Result")
                    .border_style(Style::default().fg(Color::Red)),
            );
        frame.render_widget(paragraph, result_area);
    } else if let Some(decode) = &state.vin_decode {
        render_decode(frame, result_area, decode, state.scroll("vin"));
    } else {
        let paragraph = Paragraph::new(
            "Press v to enter a VIN, y for an optional model year, Enter to decode.",
        )
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Result"));
        frame.render_widget(paragraph, result_area);
    }
}

fn render_vin_field(frame: &mut Frame, area: Rect, state: &ViewState) {
    let editing = state.input_mode == InputMode::EditVin;
    let value = if editing {
        &state.edit_buffer
    } else {
        &state.vin_input
    };
    let title = format!("VIN ({}/{})", value.chars().count(), VIN_LENGTH);
    let paragraph = Paragraph::new(field_text(value, editing)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(field_border_style(editing)),
    );
    frame.render_widget(paragraph, area);
}

fn render_year_field(frame: &mut Frame, area: Rect, state: &ViewState) {
    let editing = state.input_mode == InputMode::EditYear;
    let value = if editing {
        &state.edit_buffer
    } else {
        &state.year_input
    };
    let text = if value.is_empty() && !editing {
        Span::styled("any", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw(field_text(value, editing))
    };
    let paragraph = Paragraph::new(Line::from(text)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Model Year")
            .border_style(field_border_style(editing)),
    );
    frame.render_widget(paragraph, area);
}

fn render_decode(frame: &mut Frame, area: Rect, decode: &VinDecode, scroll: usize) {
    let (table_area, warning_area) = match &decode.warning {
        Some(_) => {
            let [table, warning] =
                Layout::vertical([Constraint::Min(3), Constraint::Length(2)]).areas(area);
            (table, Some(warning))
        }
        None => (area, None),
    };

    let header = Row::new(vec![Cell::from("Variable"), Cell::from("Value")]).style(
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let offset = scroll.min(decode.fields.len().saturating_sub(1));
    let rows: Vec<Row> = decode
        .fields
        .iter()
        .skip(offset)
        .map(|(name, value)| Row::new(vec![Cell::from(name.clone()), Cell::from(value.clone())]))
        .collect();

    let table = Table::new(rows, [Constraint::Length(28), Constraint::Min(10)])
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(decode_title(decode)),
        );
    frame.render_widget(table, table_area);

    if let (Some(warning), Some(area)) = (&decode.warning, warning_area) {
        let paragraph = Paragraph::new(format!("NHTSA: {warning}"))
            .style(Style::default().fg(Color::Yellow))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

/// "Decoded 1HG... (2003, cached)"
pub fn decode_title(decode: &VinDecode) -> String {
    let mut tags = Vec::new();
    if let Some(year) = decode.query.model_year {
        tags.push(year.to_string());
    }
    if decode.cached {
        tags.push("cached".to_string());
    }
    if tags.is_empty() {
        format!("Decoded {}", decode.query.vin)
    } else {
        format!("Decoded {} ({})", decode.query.vin, tags.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
