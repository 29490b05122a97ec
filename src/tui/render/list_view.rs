use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::tui::app::App;
use crate::util::text::{display_width, truncate_to_width};

/// Keep the cursor row inside a window of `height` rows
pub fn adjust_scroll(app: &mut App, height: usize) {
    if height == 0 {
        return;
    }
    if app.cursor < app.scroll_offset {
        app.scroll_offset = app.cursor;
    } else if app.cursor >= app.scroll_offset + height {
        app.scroll_offset = app.cursor + 1 - height;
    }
    let max_offset = app.todos.len().saturating_sub(height);
    app.scroll_offset = app.scroll_offset.min(max_offset);
}

/// Task list: ` [x] title *`, with `*` marking a change waiting to sync
pub fn render_list(frame: &mut Frame, app: &mut App, area: Rect) {
    let height = area.height as usize;
    let width = area.width as usize;
    adjust_scroll(app, height);

    let theme = &app.theme;
    if app.todos.is_empty() {
        let hint = Line::from(Span::styled(
            " No tasks. Press a to add one.",
            Style::default().fg(theme.dim).bg(theme.background),
        ));
        frame.render_widget(Paragraph::new(hint), area);
        return;
    }

    let mut lines = Vec::with_capacity(height);
    for (idx, todo) in app
        .todos
        .iter()
        .enumerate()
        .skip(app.scroll_offset)
        .take(height)
    {
        let selected = idx == app.cursor;
        let pending = app.pending.contains(&todo.id);
        let style = theme.todo_style(todo.is_completed, selected);
        let row_bg = if selected { theme.selection_bg } else { theme.background };

        let check = if todo.is_completed { " [x] " } else { " [ ] " };
        let marker = if pending { " *" } else { "" };
        let title_budget = width.saturating_sub(display_width(check) + display_width(marker));
        let title = truncate_to_width(&todo.title, title_budget);

        let mut spans = vec![
            Span::styled(check, Style::default().fg(theme.dim).bg(row_bg)),
            Span::styled(title, style),
        ];
        if pending {
            spans.push(Span::styled(marker, Style::default().fg(theme.yellow).bg(row_bg)));
        }
        // Fill the rest of a selected row so the highlight spans the width
        let used: usize = spans.iter().map(|s| display_width(&s.content)).sum();
        if selected && used < width {
            spans.push(Span::styled(" ".repeat(width - used), Style::default().bg(row_bg)));
        }
        lines.push(Line::from(spans));
    }

    frame.render_widget(Paragraph::new(lines), area);
}
