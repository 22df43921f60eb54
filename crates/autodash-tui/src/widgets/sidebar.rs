// Configuration sidebar: listing count, generator ranges, export target and
// LLM state.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::widgets::listings::format_price;
use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let paragraph = Paragraph::new(build_lines(state))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Configuration"),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn heading(text: &'static str) -> Line<'static> {
    Line::from(Span::styled(
        text,
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))
}

fn entry(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
        Span::raw(value),
    ])
}

pub fn build_lines(state: &ViewState) -> Vec<Line<'static>> {
    let info = &state.info;
    let (llm_text, llm_color) = match &info.llm_model {
        Some(model) => (format!("enabled ({model})"), Color::Green),
        None => ("disabled (no API key)".to_string(), Color::Red),
    };

    vec![
        heading("Listings"),
        entry(
            "Count",
            format!("{} (1-{}, +/-)", state.listing_count, info.max_count),
        ),
        entry("Years", format!("{}-{}", info.min_year, info.max_year)),
        entry(
            "Prices",
            format!("{}-{}", format_price(info.min_price), format_price(info.max_price)),
        ),
        entry("Export", info.export_path.display().to_string()),
        Line::default(),
        heading("Code Review"),
        Line::from(vec![
            Span::styled("LLM: ", Style::default().fg(Color::Gray)),
            Span::styled(llm_text, Style::default().fg(llm_color)),
        ]),
    ]
}
