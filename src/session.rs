//! The widget's session state machine.
//!
//! One `Session` lives for the process lifetime and gates every action: the
//! picker only shows in `AwaitingModelChoice`, sends are only accepted in
//! `Ready`, and closing the window never resets loaded-model or in-flight
//! status, so reopening resumes where the user left off.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    AwaitingModelChoice,
    Loading,
    Ready,
    Streaming,
    Error,
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    selected: Option<String>,
    model_loaded: bool,
    load_in_flight: bool,
    stream_in_flight: bool,
}

impl Session {
    /// `selected` must already be validated against the catalog; unknown
    /// stored ids are dropped before this point.
    pub fn new(selected: Option<String>) -> Self {
        Self {
            state: SessionState::Closed,
            selected,
            model_loaded: false,
            load_in_flight: false,
            stream_in_flight: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.model_loaded
    }

    /// Send actions are only accepted while Ready.
    pub fn can_send(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Open the widget window. Resumes in-flight work instead of restarting
    /// it: a stream still running puts us back in Streaming, a load still
    /// running back in Loading.
    pub fn open(&mut self) -> SessionState {
        if self.state == SessionState::Closed {
            self.state = if self.stream_in_flight {
                SessionState::Streaming
            } else if self.model_loaded {
                SessionState::Ready
            } else if self.load_in_flight || self.selected.is_some() {
                SessionState::Loading
            } else {
                SessionState::AwaitingModelChoice
            };
        }
        self.state
    }

    /// Close the window. State persists for reopening, nothing is reset and
    /// nothing in flight is cancelled.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// User picked a model card.
    pub fn model_selected(&mut self, id: String) {
        if self.state == SessionState::AwaitingModelChoice {
            self.selected = Some(id);
            self.state = SessionState::Loading;
        }
    }

    /// Returns the model id when a new initialization should be spawned.
    /// Initialization runs at most once per load attempt; reopening while a
    /// load is already in flight yields `None`.
    pub fn start_load(&mut self) -> Option<String> {
        if self.state == SessionState::Loading && !self.load_in_flight {
            self.load_in_flight = true;
            self.selected.clone()
        } else {
            None
        }
    }

    pub fn load_succeeded(&mut self) {
        self.load_in_flight = false;
        self.model_loaded = true;
        if self.state == SessionState::Loading {
            self.state = SessionState::Ready;
        }
    }

    pub fn load_failed(&mut self) {
        self.load_in_flight = false;
        if self.state == SessionState::Loading {
            self.state = SessionState::Error;
        }
    }

    /// Accept a send. Returns false (and changes nothing) unless Ready.
    pub fn begin_stream(&mut self) -> bool {
        if self.state != SessionState::Ready {
            return false;
        }
        self.state = SessionState::Streaming;
        self.stream_in_flight = true;
        true
    }

    /// Stream ended normally. The in-flight flag clears on every exit path
    /// so input is always re-enabled.
    pub fn finish_stream(&mut self) {
        self.stream_in_flight = false;
        if self.state == SessionState::Streaming {
            self.state = SessionState::Ready;
        }
    }

    /// Stream failed. Recoverable: the next successful action returns to
    /// Ready.
    pub fn fail_stream(&mut self) {
        self.stream_in_flight = false;
        if self.state == SessionState::Streaming {
            self.state = SessionState::Error;
        }
    }

    /// User-initiated retry from Error. Re-invokes initialization only when
    /// the model never finished loading; a loaded model goes straight back
    /// to Ready.
    pub fn retry(&mut self) -> SessionState {
        if self.state == SessionState::Error {
            self.state = if self.model_loaded {
                SessionState::Ready
            } else if self.selected.is_some() {
                SessionState::Loading
            } else {
                SessionState::AwaitingModelChoice
            };
        }
        self.state
    }
}
