// TUI widget modules for each dashboard panel.

pub mod help_bar;
pub mod listings;
pub mod quit_confirm;
pub mod review;
pub mod sidebar;
pub mod status_bar;
pub mod vin;

use ratatui::style::{Color, Modifier, Style};

/// Border style for a text field: highlighted while it is being edited.
pub fn field_border_style(editing: bool) -> Style {
    if editing {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

/// Text of a field with a block cursor appended while editing.
pub fn field_text(value: &str, editing: bool) -> String {
    if editing {
        format!("{value}\u{2588}")
    } else {
        value.to_string()
    }
}
