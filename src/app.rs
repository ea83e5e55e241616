//! Widget controller state and operations.
//!
//! One `App` owns the session state machine, the transcript, the engine
//! handle and the store. Long-running engine work is spawned onto tokio and
//! reports back through the shared event channel; every mutation happens on
//! the event loop, so fragments apply in production order and user actions
//! never overlap an unfinished turn.

use std::sync::atomic::{AtomicBool, Ordering};

use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;

use crate::catalog::{self, CATALOG};
use crate::engine::{self, EngineClient, EngineEvent};
use crate::session::{Session, SessionState};
use crate::storage::WidgetStore;
use crate::transcript::{ChatMessage, ChatRole, Transcript};
use crate::tui::AppEvent;

const STATUS_READY: &str = "Ready to chat!";
const STATUS_THINKING: &str = "Thinking...";
const STATUS_CHOOSE: &str = "Choose a model";

static WIDGET_SLOT: AtomicBool = AtomicBool::new(false);

/// The widget registers once per process; embedding it a second time is a
/// no-op.
pub fn claim_widget_slot() -> bool {
    WIDGET_SLOT
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// An assistant response still being streamed. Stays visible after an abort
/// (with the typing indicator removed) but is never committed.
pub struct PendingResponse {
    pub content: String,
    pub active: bool,
}

pub struct App {
    pub should_quit: bool,
    pub session: Session,
    pub transcript: Transcript,
    pub dark_mode: bool,
    pub status: String,

    // Input line
    pub input: String,
    pub input_cursor: usize, // cursor position in chars

    // In-progress assistant turn
    pub pending: Option<PendingResponse>,

    // Overlays
    pub picker_state: ListState,
    pub confirm_clear: bool,

    // Transcript scroll state (dimensions updated during render)
    pub chat_scroll: u16,
    pub follow: bool,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_total_lines: u16,

    // Animation state (0-2 for the ellipsis)
    pub animation_frame: u8,

    store: WidgetStore,
    engine: EngineClient,
    events_tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(store: WidgetStore, engine: EngineClient, events_tx: UnboundedSender<AppEvent>) -> Self {
        let prefs = store.load_preferences();
        let transcript = store.load_history();

        Self {
            should_quit: false,
            session: Session::new(prefs.selected_model),
            transcript,
            dark_mode: prefs.dark_mode,
            status: "Initializing...".to_string(),

            input: String::new(),
            input_cursor: 0,

            pending: None,

            picker_state: ListState::default(),
            confirm_clear: false,

            chat_scroll: 0,
            follow: true,
            chat_height: 0,
            chat_width: 0,
            chat_total_lines: 0,

            animation_frame: 0,

            store,
            engine,
            events_tx,
        }
    }

    fn selected_model_name(&self) -> String {
        self.session
            .selected_model()
            .map(|id| catalog::display_name(id).to_string())
            .unwrap_or_else(|| "model".to_string())
    }

    pub fn open_widget(&mut self) {
        match self.session.open() {
            SessionState::AwaitingModelChoice => {
                self.picker_state.select(Some(0));
                self.status = STATUS_CHOOSE.to_string();
            }
            SessionState::Loading => {
                self.status = format!("Loading {}...", self.selected_model_name());
                self.spawn_load_if_needed();
            }
            SessionState::Ready => self.status = STATUS_READY.to_string(),
            SessionState::Streaming => self.status = STATUS_THINKING.to_string(),
            _ => {}
        }
        self.follow = true;
    }

    pub fn close_widget(&mut self) {
        self.session.close();
    }

    pub fn toggle_dark_mode(&mut self) {
        self.dark_mode = !self.dark_mode;
        let _ = self.store.save_dark_mode(self.dark_mode);
    }

    // Picker navigation
    pub fn picker_down(&mut self) {
        let i = self.picker_state.selected().unwrap_or(0);
        self.picker_state.select(Some((i + 1).min(CATALOG.len() - 1)));
    }

    pub fn picker_up(&mut self) {
        let i = self.picker_state.selected().unwrap_or(0);
        self.picker_state.select(Some(i.saturating_sub(1)));
    }

    /// User picked a model card: persist the choice and start loading.
    pub fn select_highlighted_model(&mut self) {
        if self.session.state() != SessionState::AwaitingModelChoice {
            return;
        }
        let Some(model) = self.picker_state.selected().and_then(|i| CATALOG.get(i)) else {
            return;
        };
        self.session.model_selected(model.id.to_string());
        let _ = self.store.save_selected_model(model.id);
        self.transcript.append(ChatMessage::system(format!(
            "Selected: {} ({}). Loading model...",
            model.name, model.size
        )));
        self.status = format!("Loading {}...", model.name);
        self.follow = true;
        self.spawn_load_if_needed();
    }

    fn spawn_load_if_needed(&mut self) {
        let Some(model) = self.session.start_load() else {
            return;
        };
        let engine = self.engine.clone();
        let tx = self.events_tx.clone();
        let progress_tx = tx.clone();
        tokio::spawn(async move {
            let result = engine
                .initialize(&model, |percent| {
                    let _ = progress_tx.send(AppEvent::Engine(EngineEvent::LoadProgress(percent)));
                })
                .await;
            let event = match result {
                Ok(()) => EngineEvent::LoadComplete,
                Err(e) => EngineEvent::LoadFailed(e.to_string()),
            };
            let _ = tx.send(AppEvent::Engine(event));
        });
    }

    /// Submit the input line as a user turn. Ignored unless the session is
    /// Ready, so no fragment from a later turn can interleave with an
    /// unfinished one.
    pub fn submit(&mut self) {
        let message = self.input.trim().to_string();
        if message.is_empty() || !self.session.begin_stream() {
            return;
        }

        self.transcript.append(ChatMessage::user(message));
        self.input.clear();
        self.input_cursor = 0;
        self.pending = Some(PendingResponse { content: String::new(), active: true });
        self.status = STATUS_THINKING.to_string();
        self.follow = true;

        let messages = self.transcript.request_messages(engine::SYSTEM_PROMPT);
        let model = self
            .session
            .selected_model()
            .unwrap_or_default()
            .to_string();
        let engine = self.engine.clone();
        let tx = self.events_tx.clone();
        let delta_tx = tx.clone();
        tokio::spawn(async move {
            let result = engine
                .complete(&model, &messages, |delta| {
                    let _ = delta_tx.send(AppEvent::Engine(EngineEvent::Delta(delta.to_string())));
                })
                .await;
            let event = match result {
                Ok(_) => EngineEvent::StreamComplete,
                Err(e) => EngineEvent::StreamFailed(e.to_string()),
            };
            let _ = tx.send(AppEvent::Engine(event));
        });
    }

    pub fn request_clear(&mut self) {
        self.confirm_clear = true;
    }

    /// Resolve the clear confirmation. Clearing truncates the transcript and
    /// removes the persisted entry entirely.
    pub fn resolve_clear(&mut self, confirmed: bool) {
        self.confirm_clear = false;
        if confirmed {
            self.transcript.clear();
            let _ = self.store.clear_history();
            self.status = "Chat cleared".to_string();
            self.follow = true;
        }
    }

    /// User-initiated retry from the Error state.
    pub fn retry(&mut self) {
        match self.session.retry() {
            SessionState::Loading => {
                self.status = format!("Loading {}...", self.selected_model_name());
                self.spawn_load_if_needed();
            }
            SessionState::Ready => self.status = STATUS_READY.to_string(),
            SessionState::AwaitingModelChoice => {
                self.picker_state.select(Some(0));
                self.status = STATUS_CHOOSE.to_string();
            }
            _ => {}
        }
    }

    /// True when the transcript holds actual conversation turns, not just
    /// widget notices.
    fn has_conversation(&self) -> bool {
        self.transcript
            .messages()
            .iter()
            .any(|m| m.role != ChatRole::System)
    }

    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LoadProgress(percent) => {
                if self.session.state() == SessionState::Loading {
                    self.status = format!("Loading {}: {}%", self.selected_model_name(), percent);
                }
            }
            EngineEvent::LoadComplete => {
                let first_conversation = !self.has_conversation();
                self.session.load_succeeded();
                if self.session.state() == SessionState::Ready {
                    self.status = STATUS_READY.to_string();
                }
                if first_conversation {
                    self.transcript.append(ChatMessage::assistant(format!(
                        "Hello! I'm your local AI assistant running {}. How can I help you?",
                        self.selected_model_name()
                    )));
                    self.follow = true;
                }
            }
            EngineEvent::LoadFailed(message) => {
                self.session.load_failed();
                self.status = "Failed to load".to_string();
                self.transcript
                    .append(ChatMessage::system(format!("Error: {message}")));
                self.follow = true;
            }
            EngineEvent::Delta(text) => {
                if let Some(pending) = self.pending.as_mut() {
                    if pending.active {
                        pending.content.push_str(&text);
                        self.follow = true;
                    }
                }
            }
            EngineEvent::StreamComplete => {
                // The completed turn is the only point history is persisted.
                if let Some(pending) = self.pending.take() {
                    self.transcript.append(ChatMessage::assistant(pending.content));
                    let _ = self.store.save_history(&self.transcript);
                }
                self.session.finish_stream();
                if self.session.state() == SessionState::Ready {
                    self.status = STATUS_READY.to_string();
                }
            }
            EngineEvent::StreamFailed(message) => {
                // Partial text stays on screen but is never committed; only
                // the typing indicator comes off.
                if let Some(pending) = self.pending.as_mut() {
                    pending.active = false;
                }
                self.session.fail_stream();
                self.status = "Error".to_string();
                self.transcript
                    .append(ChatMessage::system(format!("Error: {message}")));
                self.follow = true;
            }
        }
    }

    pub fn tick_animation(&mut self) {
        if matches!(
            self.session.state(),
            SessionState::Loading | SessionState::Streaming
        ) {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Transcript scrolling; scrolling up detaches from the bottom, scrolling
    // back down past the end re-attaches.
    pub fn scroll_up_by(&mut self, lines: u16) {
        self.follow = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down_by(&mut self, lines: u16) {
        let max = self.chat_total_lines.saturating_sub(self.chat_height);
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
        if self.chat_scroll >= max {
            self.follow = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const TINYLLAMA: &str = "TinyLlama-1.1B-Chat-v0.4-q4f16_1-MLC";

    fn test_app(dir: &TempDir) -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(WidgetStore::at(dir.path()), EngineClient::default_local(), tx);
        (app, rx)
    }

    fn assistant_count(app: &App) -> usize {
        app.transcript
            .messages()
            .iter()
            .filter(|m| m.role == ChatRole::Assistant)
            .count()
    }

    /// Drive the session to Ready with a stored model, without touching the
    /// network: the load task's real outcome is superseded by the synthetic
    /// LoadComplete below.
    async fn ready_app(dir: &TempDir) -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        WidgetStore::at(dir.path())
            .save_selected_model(TINYLLAMA)
            .unwrap();
        let (mut app, rx) = test_app(dir);
        app.open_widget();
        assert_eq!(app.session.state(), SessionState::Loading);
        app.handle_engine_event(EngineEvent::LoadComplete);
        assert_eq!(app.session.state(), SessionState::Ready);
        (app, rx)
    }

    #[test]
    fn widget_slot_claimed_exactly_once() {
        assert!(claim_widget_slot());
        assert!(!claim_widget_slot());
    }

    #[test]
    fn fresh_session_opens_model_selector() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = test_app(&dir);
        app.open_widget();
        assert_eq!(app.session.state(), SessionState::AwaitingModelChoice);
        assert_eq!(app.picker_state.selected(), Some(0));
        assert_eq!(app.status, STATUS_CHOOSE);
    }

    #[tokio::test]
    async fn stored_model_skips_selector_and_greets_once() {
        let dir = TempDir::new().unwrap();
        let (app, _rx) = ready_app(&dir).await;
        assert_eq!(app.status, STATUS_READY);
        assert_eq!(assistant_count(&app), 1);
        let greeting = &app.transcript.messages()[0];
        assert!(greeting.content.contains("TinyLlama 1.1B"));
    }

    #[tokio::test]
    async fn greeting_skipped_when_history_present() {
        let dir = TempDir::new().unwrap();
        let store = WidgetStore::at(dir.path());
        store.save_selected_model(TINYLLAMA).unwrap();
        let mut history = Transcript::new();
        history.append(ChatMessage::user("hello"));
        history.append(ChatMessage::assistant("Hi there!"));
        store.save_history(&history).unwrap();

        let (mut app, _rx) = test_app(&dir);
        app.open_widget();
        app.handle_engine_event(EngineEvent::LoadComplete);
        assert_eq!(app.transcript, history);
    }

    #[tokio::test]
    async fn send_rejected_unless_ready() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = test_app(&dir);

        // Closed
        app.input = "hello".to_string();
        app.submit();
        assert!(app.transcript.is_empty());

        // AwaitingModelChoice
        app.open_widget();
        app.input = "hello".to_string();
        app.submit();
        assert!(app.transcript.is_empty());

        // Loading
        app.select_highlighted_model();
        assert_eq!(app.session.state(), SessionState::Loading);
        let before = app.transcript.len();
        app.input = "hello".to_string();
        app.submit();
        assert_eq!(app.transcript.len(), before);
    }

    #[tokio::test]
    async fn completed_stream_commits_and_persists_one_message() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = ready_app(&dir).await;
        let before = app.transcript.len();

        app.input = "hello".to_string();
        app.submit();
        assert_eq!(app.session.state(), SessionState::Streaming);

        for delta in ["Hi", " there", "!"] {
            app.handle_engine_event(EngineEvent::Delta(delta.to_string()));
        }
        app.handle_engine_event(EngineEvent::StreamComplete);

        assert_eq!(app.session.state(), SessionState::Ready);
        // user turn plus exactly one committed assistant message
        assert_eq!(app.transcript.len(), before + 2);
        let last = app.transcript.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Hi there!");
        assert!(app.pending.is_none());

        let persisted = WidgetStore::at(dir.path()).load_history();
        assert_eq!(persisted, app.transcript);
    }

    #[tokio::test]
    async fn aborted_stream_commits_nothing() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = ready_app(&dir).await;
        let assistants_before = assistant_count(&app);

        app.input = "hello".to_string();
        app.submit();
        app.handle_engine_event(EngineEvent::Delta("Hi".to_string()));
        app.handle_engine_event(EngineEvent::StreamFailed("connection reset".to_string()));

        assert_eq!(app.session.state(), SessionState::Error);
        // No assistant message was committed...
        assert_eq!(assistant_count(&app), assistants_before);
        // ...nothing was persisted...
        assert!(WidgetStore::at(dir.path()).load_history().is_empty());
        // ...the partial stays visible without its typing indicator...
        let pending = app.pending.as_ref().unwrap();
        assert_eq!(pending.content, "Hi");
        assert!(!pending.active);
        // ...and the failure surfaced as a local notice.
        let last = app.transcript.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::System);
        assert!(last.content.contains("connection reset"));

        // Model is loaded, so retry returns straight to Ready.
        app.retry();
        assert_eq!(app.session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn load_failure_surfaces_notice_and_error_state() {
        let dir = TempDir::new().unwrap();
        WidgetStore::at(dir.path())
            .save_selected_model(TINYLLAMA)
            .unwrap();
        let (mut app, _rx) = test_app(&dir);
        app.open_widget();
        app.handle_engine_event(EngineEvent::LoadFailed(
            "Model runtime unreachable. Install Ollama and start it with: ollama serve".to_string(),
        ));
        assert_eq!(app.session.state(), SessionState::Error);
        assert_eq!(app.status, "Failed to load");
        let last = app.transcript.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::System);
        assert!(last.content.contains("ollama serve"));
    }

    #[tokio::test]
    async fn clear_confirmed_truncates_and_removes_entry() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = ready_app(&dir).await;
        app.input = "hello".to_string();
        app.submit();
        app.handle_engine_event(EngineEvent::Delta("Hi".to_string()));
        app.handle_engine_event(EngineEvent::StreamComplete);
        assert!(!WidgetStore::at(dir.path()).load_history().is_empty());

        app.request_clear();
        assert!(app.confirm_clear);
        app.resolve_clear(true);
        assert!(app.transcript.is_empty());
        assert!(WidgetStore::at(dir.path()).load_history().is_empty());

        // Idempotent: clearing again observes the same result
        app.request_clear();
        app.resolve_clear(true);
        assert!(app.transcript.is_empty());
    }

    #[tokio::test]
    async fn clear_declined_keeps_transcript() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = ready_app(&dir).await;
        let before = app.transcript.clone();
        app.request_clear();
        app.resolve_clear(false);
        assert_eq!(app.transcript, before);
    }

    #[test]
    fn dark_mode_toggle_persists() {
        let dir = TempDir::new().unwrap();
        let (mut app, _rx) = test_app(&dir);
        assert!(!app.dark_mode);
        app.toggle_dark_mode();
        assert!(app.dark_mode);
        assert!(WidgetStore::at(dir.path()).load_preferences().dark_mode);
    }

    #[tokio::test]
    async fn load_progress_updates_status() {
        let dir = TempDir::new().unwrap();
        WidgetStore::at(dir.path())
            .save_selected_model(TINYLLAMA)
            .unwrap();
        let (mut app, _rx) = test_app(&dir);
        app.open_widget();
        app.handle_engine_event(EngineEvent::LoadProgress(42));
        assert_eq!(app.status, "Loading TinyLlama 1.1B: 42%");
    }
}
