pub mod list_view;
pub mod status_row;

#[cfg(test)]
pub mod test_helpers;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};

use super::app::App;
use crate::util::text::display_width;

/// Main render function, dispatches to sub-renderers
pub fn render(frame: &mut Frame, app: &mut App) {
    let area = frame.area();

    // Background fill
    frame.render_widget(Block::default().style(app.theme.base()), area);

    // Layout: header | list | input line | status row
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(frame, app, chunks[0]);
    list_view::render_list(frame, app, chunks[1]);
    status_row::render_input_line(frame, app, chunks[2]);
    status_row::render_status_row(frame, app, chunks[3]);
}

/// Title on the left; connectivity and pending count on the right
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let bg = theme.background;
    let width = area.width as usize;

    let connection = match (app.forced_offline, app.online) {
        (true, _) => "\u{25CB} offline (forced)",
        (false, Some(true)) => "\u{25CF} online",
        (false, Some(false)) => "\u{25CB} offline",
        (false, None) => "\u{25CB} checking",
    };
    let mut right = vec![Span::styled(
        connection,
        Style::default().fg(theme.connection_color(app.online)).bg(bg),
    )];
    if app.pending_count > 0 {
        right.push(Span::styled(
            format!("  {} pending", app.pending_count),
            Style::default().fg(theme.yellow).bg(bg),
        ));
    }
    right.push(Span::styled(" ", Style::default().bg(bg)));

    let title = " todo-sync";
    let mut spans = vec![Span::styled(
        title,
        Style::default()
            .fg(theme.highlight)
            .bg(bg)
            .add_modifier(Modifier::BOLD),
    )];
    let left_width = display_width(title);
    let right_width: usize = right.iter().map(|s| display_width(&s.content)).sum();
    if left_width + right_width < width {
        spans.push(Span::styled(
            " ".repeat(width - left_width - right_width),
            Style::default().bg(bg),
        ));
        spans.extend(right);
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
