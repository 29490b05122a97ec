use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::app::{App, Mode};

/// A user intent that needs the store (and possibly the network)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Add(String),
    Toggle(String),
    Delete(String),
    Sync,
    Refresh,
}

/// Handle a key event in the current mode. Returns the intent to run, if any.
pub fn handle_key(app: &mut App, key: KeyEvent) -> Option<Action> {
    // Ignore bare modifier key presses (Shift, Ctrl, Alt, etc.)
    if matches!(key.code, KeyCode::Modifier(_)) {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return None;
    }

    match app.mode {
        Mode::Navigate => handle_navigate(app, key),
        Mode::Input => handle_input(app, key),
    }
}

fn handle_navigate(app: &mut App, key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => {
            if app.cursor + 1 < app.todos.len() {
                app.cursor += 1;
            }
        }
        KeyCode::Char('k') | KeyCode::Up => app.cursor = app.cursor.saturating_sub(1),
        KeyCode::Char('g') | KeyCode::Home => app.cursor = 0,
        KeyCode::Char('G') | KeyCode::End => {
            app.cursor = app.todos.len().saturating_sub(1);
        }
        KeyCode::Char(' ') | KeyCode::Char('x') | KeyCode::Enter => {
            return app.selected().map(|t| Action::Toggle(t.id.clone()));
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            return app.selected().map(|t| Action::Delete(t.id.clone()));
        }
        KeyCode::Char('a') | KeyCode::Char('i') => {
            app.mode = Mode::Input;
            app.status = None;
        }
        KeyCode::Char('s') => return Some(Action::Sync),
        KeyCode::Char('r') => return Some(Action::Refresh),
        _ => {}
    }
    None
}

fn handle_input(app: &mut App, key: KeyEvent) -> Option<Action> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => {
            app.input.take();
            app.mode = Mode::Navigate;
        }
        KeyCode::Enter => {
            let title = app.input.take();
            app.mode = Mode::Navigate;
            if title.trim().is_empty() {
                app.error("task title cannot be empty");
                return None;
            }
            return Some(Action::Add(title.trim().to_string()));
        }
        KeyCode::Char('w') if ctrl => app.input.delete_word(),
        KeyCode::Char('a') if ctrl => app.input.home(),
        KeyCode::Char('e') if ctrl => app.input.end(),
        KeyCode::Char('u') if ctrl => {
            app.input.take();
        }
        KeyCode::Char(c) if !ctrl => app.input.insert(c),
        KeyCode::Backspace => app.input.backspace(),
        KeyCode::Delete => app.input.delete(),
        KeyCode::Left => app.input.left(),
        KeyCode::Right => app.input.right(),
        KeyCode::Home => app.input.home(),
        KeyCode::End => app.input.end(),
        _ => {}
    }
    None
}
