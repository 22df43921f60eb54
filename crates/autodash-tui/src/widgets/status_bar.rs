// Status bar widget: title, tab indicator, LLM state, last notice.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use autodash_core::protocol::TabId;

use crate::ViewState;

/// Render the status bar into the given area.
///
/// Layout: [title] [tab bar] | [llm indicator] | [notice]
pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let mut spans = vec![Span::styled(
        " AutoDash ",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];

    spans.extend(tab_spans(state.active_tab));

    spans.push(Span::styled("| ", Style::default().fg(Color::Gray)));
    let (llm_text, llm_color) = llm_indicator(state.info.llm_model.as_deref());
    spans.push(Span::styled(llm_text, Style::default().fg(llm_color)));

    if let Some(notice) = &state.notice {
        spans.push(Span::styled(" | ", Style::default().fg(Color::Gray)));
        spans.push(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

/// Build tab indicator spans with the active tab highlighted.
/// E.g. "[1:Listings] [2:VIN Decoder] [3:Code Review]"
pub fn tab_spans(active: TabId) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for tab in TabId::ALL {
        let style = if tab == active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(
            format!("[{}:{}]", tab.index() + 1, tab.title()),
            style,
        ));
        spans.push(Span::raw(" "));
    }
    spans
}

/// LLM indicator text and color.
pub fn llm_indicator(model: Option<&str>) -> (String, Color) {
    match model {
        Some(model) => (format!("\u{25cf} {model}"), Color::Green),
        None => ("\u{25cf} LLM off".to_string(), Color::Red),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_spans_highlight_active() {
        let spans = tab_spans(TabId::Vin);
        // 0=[1:Listings], 1=" ", 2=[2:VIN Decoder]
        assert!(spans[2].style.add_modifier.contains(Modifier::BOLD));
        assert!(!spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn tab_spans_contain_numbered_labels() {
        let labels: Vec<String> = tab_spans(TabId::Listings)
            .iter()
            .step_by(2)
            .map(|s| s.content.to_string())
            .collect();
        assert_eq!(
            labels,
            vec!["[1:Listings]", "[2:VIN Decoder]", "[3:Code Review]"]
        );
    }

    #[test]
    fn llm_indicator_values() {
        assert_eq!(
            llm_indicator(Some("gpt-4")),
            ("\u{25cf} gpt-4".to_string(), Color::Green)
        );
        assert_eq!(llm_indicator(None).1, Color::Red);
    }

    #[test]
    fn render_does_not_panic_with_notice() {
        let backend = ratatui::backend::TestBackend::new(80, 1);
        let mut terminal = ratatui::Terminal::new(backend).unwrap();
        let mut state = ViewState::default();
        state.notice = Some("Exported 5 rows to car_listings.csv".into());
        terminal
            .draw(|frame| render(frame, frame.area(), &state))
            .unwrap();
    }
}
