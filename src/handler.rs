use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::app::App;
use crate::session::SessionState;
use crate::tui::AppEvent;

/// Convert a char index to a byte index for safe string manipulation
fn char_to_byte_index(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => app.follow = true,
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Engine(engine_event) => app.handle_engine_event(engine_event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.session.state() == SessionState::Closed {
        handle_bubble_key(app, key);
        return;
    }

    if app.confirm_clear {
        handle_confirm_key(app, key);
        return;
    }

    match app.session.state() {
        SessionState::AwaitingModelChoice => handle_picker_key(app, key),
        _ => handle_chat_key(app, key),
    }
}

/// Closed state: only the bubble is on screen.
fn handle_bubble_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter | KeyCode::Char('o') | KeyCode::Char(' ') => app.open_widget(),
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        _ => {}
    }
}

fn handle_confirm_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Enter => app.resolve_clear(true),
        KeyCode::Char('n') | KeyCode::Esc => app.resolve_clear(false),
        _ => {}
    }
}

fn handle_picker_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => app.picker_down(),
        KeyCode::Up | KeyCode::Char('k') => app.picker_up(),
        KeyCode::Enter => app.select_highlighted_model(),
        KeyCode::Esc => app.close_widget(),
        _ => {}
    }
}

fn handle_chat_key(app: &mut App, key: KeyEvent) {
    // Typing is live while Ready or Streaming; only sending is gated.
    let editable = matches!(
        app.session.state(),
        SessionState::Ready | SessionState::Streaming
    );

    match key.code {
        KeyCode::Esc => app.close_widget(),
        KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.toggle_dark_mode();
        }
        KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.request_clear();
        }
        KeyCode::PageUp => app.scroll_up_by(app.chat_height.max(1) / 2 + 1),
        KeyCode::PageDown => app.scroll_down_by(app.chat_height.max(1) / 2 + 1),
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
            if editable {
                insert_char(app, '\n');
            }
        }
        KeyCode::Enter => app.submit(),
        KeyCode::Char('r') if app.session.state() == SessionState::Error => app.retry(),
        KeyCode::Char(c) if editable => insert_char(app, c),
        KeyCode::Backspace if editable => {
            if app.input_cursor > 0 {
                let byte_index = char_to_byte_index(&app.input, app.input_cursor - 1);
                app.input.remove(byte_index);
                app.input_cursor -= 1;
            }
        }
        KeyCode::Delete if editable => {
            if app.input_cursor < app.input.chars().count() {
                let byte_index = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_index);
            }
        }
        KeyCode::Left => app.input_cursor = app.input_cursor.saturating_sub(1),
        KeyCode::Right => {
            app.input_cursor = (app.input_cursor + 1).min(app.input.chars().count());
        }
        KeyCode::Home => app.input_cursor = 0,
        KeyCode::End => app.input_cursor = app.input.chars().count(),
        _ => {}
    }
}

fn insert_char(app: &mut App, c: char) {
    let byte_index = char_to_byte_index(&app.input, app.input_cursor);
    app.input.insert(byte_index, c);
    app.input_cursor += 1;
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.session.state() == SessionState::Closed {
        return;
    }
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up_by(3),
        MouseEventKind::ScrollDown => app.scroll_down_by(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineClient, EngineEvent};
    use crate::storage::WidgetStore;
    use crate::transcript::ChatRole;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn key_with(code: KeyCode, modifiers: KeyModifiers) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, modifiers))
    }

    fn ready_app(dir: &TempDir) -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        WidgetStore::at(dir.path())
            .save_selected_model("TinyLlama-1.1B-Chat-v0.4-q4f16_1-MLC")
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = App::new(WidgetStore::at(dir.path()), EngineClient::default_local(), tx);
        app.open_widget();
        app.handle_engine_event(EngineEvent::LoadComplete);
        assert_eq!(app.session.state(), SessionState::Ready);
        (app, rx)
    }

    #[test]
    fn char_to_byte_index_multibyte() {
        let s = "aé日b";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), 1);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 3), 6);
        assert_eq!(char_to_byte_index(s, 4), 7);
    }

    #[tokio::test]
    async fn enter_submits_message() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = ready_app(&dir);

        for c in "hi".chars() {
            handle_event(&mut app, key(KeyCode::Char(c))).unwrap();
        }
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();

        assert_eq!(app.session.state(), SessionState::Streaming);
        let user_turn = app
            .transcript
            .messages()
            .iter()
            .find(|m| m.role == ChatRole::User)
            .unwrap();
        assert_eq!(user_turn.content, "hi");
        assert!(app.input.is_empty());
    }

    #[tokio::test]
    async fn alt_enter_inserts_newline() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = ready_app(&dir);
        let turns_before = app.transcript.len();

        handle_event(&mut app, key(KeyCode::Char('h'))).unwrap();
        handle_event(&mut app, key_with(KeyCode::Enter, KeyModifiers::ALT)).unwrap();
        handle_event(&mut app, key(KeyCode::Char('i'))).unwrap();

        assert_eq!(app.input, "h\ni");
        assert_eq!(app.session.state(), SessionState::Ready);
        assert_eq!(app.transcript.len(), turns_before);
    }

    #[tokio::test]
    async fn typing_ignored_while_loading() {
        let dir = TempDir::new().unwrap();
        WidgetStore::at(dir.path())
            .save_selected_model("TinyLlama-1.1B-Chat-v0.4-q4f16_1-MLC")
            .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(WidgetStore::at(dir.path()), EngineClient::default_local(), tx);
        app.open_widget();
        assert_eq!(app.session.state(), SessionState::Loading);

        handle_event(&mut app, key(KeyCode::Char('x'))).unwrap();
        assert!(app.input.is_empty());
    }

    #[tokio::test]
    async fn retry_key_only_in_error_state() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = ready_app(&dir);

        // 'r' is ordinary input while Ready
        handle_event(&mut app, key(KeyCode::Char('r'))).unwrap();
        assert_eq!(app.input, "r");
        assert_eq!(app.session.state(), SessionState::Ready);

        app.input.clear();
        app.input_cursor = 0;
        app.input = "hello".to_string();
        app.input_cursor = 5;
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        handle_event(
            &mut app,
            AppEvent::Engine(EngineEvent::StreamFailed("boom".to_string())),
        )
        .unwrap();
        assert_eq!(app.session.state(), SessionState::Error);

        handle_event(&mut app, key(KeyCode::Char('r'))).unwrap();
        assert_eq!(app.session.state(), SessionState::Ready);
        assert!(app.input.is_empty());
    }

    #[tokio::test]
    async fn confirm_dialog_consumes_keys() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = ready_app(&dir);

        handle_event(&mut app, key_with(KeyCode::Char('l'), KeyModifiers::CONTROL)).unwrap();
        assert!(app.confirm_clear);

        // 'n' cancels instead of landing in the input line
        handle_event(&mut app, key(KeyCode::Char('n'))).unwrap();
        assert!(!app.confirm_clear);
        assert!(app.input.is_empty());
    }

    #[test]
    fn bubble_keys_open_and_quit() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(WidgetStore::at(dir.path()), EngineClient::default_local(), tx);
        assert_eq!(app.session.state(), SessionState::Closed);

        handle_event(&mut app, key(KeyCode::Char('o'))).unwrap();
        assert_eq!(app.session.state(), SessionState::AwaitingModelChoice);

        handle_event(&mut app, key(KeyCode::Esc)).unwrap();
        assert_eq!(app.session.state(), SessionState::Closed);

        handle_event(&mut app, key(KeyCode::Char('q'))).unwrap();
        assert!(app.should_quit);
    }
}
