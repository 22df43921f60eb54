// Help bar widget: key hints for the current mode and tab.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use autodash_core::protocol::TabId;

use crate::{InputMode, ViewState};

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let paragraph = Paragraph::new(Line::from(vec![Span::styled(
        hint_text(state),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::DIM),
    )]))
    .style(Style::default().bg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

pub fn hint_text(state: &ViewState) -> &'static str {
    if state.confirm_quit {
        return " y:Quit | n/Esc:Stay";
    }
    match state.input_mode {
        InputMode::EditVin | InputMode::EditYear => " Enter:Commit | Esc:Cancel | Backspace:Delete",
        InputMode::EditCode => " Ctrl+S:Review | Esc:Done | Ctrl+U:Clear | Enter:Newline",
        InputMode::Normal => match state.active_tab {
            TabId::Listings => " q:Quit | 1-3:Tabs | g/Enter:Generate | +/-:Count | e:Export CSV",
            TabId::Vin => " q:Quit | 1-3:Tabs | v:VIN | y:Year | Enter:Decode | d:Clear cache",
            TabId::Review => " q:Quit | 1-3:Tabs | c:Edit code | Enter:Review | x:Cancel",
        },
    }
}
