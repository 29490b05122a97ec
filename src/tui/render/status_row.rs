use ratatui::Frame;
use ratatui::layout::{Position, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::tui::app::{App, Mode};
use crate::util::text::{display_width, truncate_to_width};

const HINTS: &[(&str, &str)] = &[
    ("a", "add"),
    ("space", "toggle"),
    ("d", "delete"),
    ("s", "sync"),
    ("r", "refresh"),
    ("q", "quit"),
];

/// Key hints that fit in `width` cells
fn hint_text(width: usize) -> String {
    let mut out = String::new();
    for (key, label) in HINTS {
        let sep = if out.is_empty() { " " } else { "  " };
        let item = format!("{sep}{key} {label}");
        if display_width(&out) + display_width(&item) > width {
            break;
        }
        out.push_str(&item);
    }
    out
}

/// New-task prompt while typing, key hints otherwise
pub fn render_input_line(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let bg = theme.background;
    let width = area.width as usize;

    let line = match app.mode {
        Mode::Navigate => Line::from(Span::styled(
            hint_text(width),
            Style::default().fg(theme.dim).bg(bg),
        )),
        Mode::Input => {
            let prompt = " > ";
            let prompt_width = display_width(prompt);
            let cursor_x = (prompt_width + app.input.cursor_col()).min(width.saturating_sub(1));
            frame.set_cursor_position(Position::new(area.x + cursor_x as u16, area.y));
            Line::from(vec![
                Span::styled(prompt, Style::default().fg(theme.highlight).bg(bg)),
                Span::styled(
                    app.input.as_str().to_string(),
                    Style::default().fg(theme.text_bright).bg(bg),
                ),
            ])
        }
    };
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(bg)), area);
}

/// Last message, red for errors
pub fn render_status_row(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let bg = theme.background;
    let width = area.width as usize;

    let line = match &app.status {
        Some(msg) => {
            let fg = if msg.error { theme.red } else { theme.dim };
            Line::from(Span::styled(
                truncate_to_width(&format!(" {}", msg.text), width),
                Style::default().fg(fg).bg(bg),
            ))
        }
        None if app.mode == Mode::Input => Line::from(Span::styled(
            " Enter add  Esc cancel",
            Style::default().fg(theme.dim).bg(bg),
        )),
        None => Line::default(),
    };
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(bg)), area);
}
