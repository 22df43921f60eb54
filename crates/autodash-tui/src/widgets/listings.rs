// Listings widget: table of generated car listings.
//
// Columns: #, Make, Model, Year, Price, Location
// An error line sits under the table when the last request was rejected.

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Frame;

use autodash_core::listings::Listing;

use crate::ViewState;

/// Render the listings table into the given area.
pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let (table_area, message_area) = match &state.listings_error {
        Some(_) => {
            let [table, message] =
                Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(area);
            (table, Some(message))
        }
        None => (area, None),
    };

    let title = build_title(state);
    let block = Block::default().borders(Borders::ALL).title(title);

    if state.listings.is_empty() {
        let paragraph = Paragraph::new("No listings yet. Press g to generate.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, table_area);
    } else {
        let header = Row::new(vec![
            Cell::from("#"),
            Cell::from("Make"),
            Cell::from("Model"),
            Cell::from("Year"),
            Cell::from("Price"),
            Cell::from("Location"),
        ])
        .style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );

        let offset = clamp_offset(state.scroll("listings"), state.listings.len());
        let rows: Vec<Row> = state
            .listings
            .iter()
            .enumerate()
            .skip(offset)
            .map(|(i, listing)| listing_row(i, listing))
            .collect();

        let widths = [
            Constraint::Length(4),
            Constraint::Length(10),
            Constraint::Min(10),
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Min(12),
        ];

        let table = Table::new(rows, widths).header(header).block(block);
        frame.render_widget(table, table_area);
    }

    if let (Some(message), Some(area)) = (&state.listings_error, message_area) {
        let paragraph = Paragraph::new(format!(" Error: {message}"))
            .style(Style::default().fg(Color::Red));
        frame.render_widget(paragraph, area);
    }
}

fn listing_row(index: usize, listing: &Listing) -> Row<'static> {
    Row::new(vec![
        Cell::from(format!("{}", index + 1)),
        Cell::from(listing.make.clone()),
        Cell::from(listing.model.clone()),
        Cell::from(listing.year.to_string()),
        Cell::from(format_price(listing.price)),
        Cell::from(listing.location.clone()),
    ])
}

fn build_title(state: &ViewState) -> Line<'static> {
    if state.listings.is_empty() {
        Line::from("Car Listings")
    } else {
        Line::from(format!("Car Listings ({})", state.listings.len()))
    }
}

/// Keep at least one row visible.
fn clamp_offset(offset: usize, len: usize) -> usize {
    offset.min(len.saturating_sub(1))
}

/// Whole dollars with thousands separators, e.g. `$12,345`.
pub fn format_price(price: u32) -> String {
    let digits = price.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("${out}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn sample(n: usize) -> Vec<Listing> {
        (0..n)
            .map(|i| Listing {
                make: "Honda".into(),
                model: format!("Civic {i}"),
                year: 2010 + i as u16,
                price: 15_000 + i as u32,
                location: "Phoenix".into(),
            })
            .collect()
    }

    fn render_text(state: &ViewState) -> String {
        let backend = TestBackend::new(90, 12);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal
            .draw(|frame| render(frame, frame.area(), state))
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn format_price_groups_thousands() {
        assert_eq!(format_price(0), "$0");
        assert_eq!(format_price(999), "$999");
        assert_eq!(format_price(1000), "$1,000");
        assert_eq!(format_price(35_500), "$35,500");
        assert_eq!(format_price(1_234_567), "$1,234,567");
    }

    #[test]
    fn clamp_offset_keeps_last_row() {
        assert_eq!(clamp_offset(0, 5), 0);
        assert_eq!(clamp_offset(9, 5), 4);
        assert_eq!(clamp_offset(3, 0), 0);
    }

    #[test]
    fn empty_state_shows_hint() {
        let text = render_text(&ViewState::default());
        assert!(text.contains("Press g to generate"));
    }

    #[test]
    fn rows_render_with_formatted_price() {
        let mut state = ViewState::default();
        state.listings = sample(2);
        let text = render_text(&state);
        assert!(text.contains("Car Listings (2)"));
        assert!(text.contains("Civic 1"));
        assert!(text.contains("$15,001"));
    }

    #[test]
    fn scrolled_table_skips_rows() {
        let mut state = ViewState::default();
        state.listings = sample(3);
        state.scroll_offset.insert("listings".into(), 2);
        let text = render_text(&state);
        assert!(!text.contains("Civic 0"));
        assert!(text.contains("Civic 2"));
    }

    #[test]
    fn error_line_is_rendered() {
        let mut state = ViewState::default();
        state.listings_error = Some("count must be between 1 and 100, got 0".into());
        let text = render_text(&state);
        assert!(text.contains("Error: count must be between 1 and 100, got 0"));
    }
}
