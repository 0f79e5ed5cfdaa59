use crate::api::ApiClient;
use crate::config::Config;
use crate::state::ConversationState;
use crate::types::{Message, StreamEvent, ThreadInfo, UiEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Submitting,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Updates pushed to the rendering layer. Message and UI-event payloads stay
/// in the session's state; these carry just enough for a frontend to know
/// what to re-read, plus the cumulative text of the streaming assistant
/// message for typing-effect consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    RunStarted { request_id: String },
    AssistantMessage { message_id: String, text: String },
    MessagesChanged,
    UiEventsChanged,
    ThreadHandoff { thread_id: String },
    Error(String),
    RunFinished { outcome: RunOutcome },
}

/// A frame from the transport reader, stamped with the run epoch it belongs
/// to. Frames from a superseded epoch are dropped unprocessed.
pub(super) struct TaggedFrame {
    pub epoch: u64,
    pub event: StreamEvent,
}

/// Cancels whichever run is currently in flight. Cloneable into UI callbacks;
/// cancelling when no run is active does nothing.
#[derive(Clone)]
pub struct StopHandle {
    pub(super) current: Arc<Mutex<CancellationToken>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.current.lock().unwrap().cancel();
    }
}

/// Provisional local turns applied before the server confirms them, keyed by
/// the request id they belong to. Merged away once authoritative state
/// confirms the turns; re-applied on top of any authoritative snapshot that
/// predates them, so an early `values` frame cannot erase the user's turn.
pub(super) struct ProvisionalOverlay {
    pub request_id: String,
    pub turns: Vec<Message>,
}

pub struct StreamSession {
    pub(super) client: Arc<ApiClient>,
    pub(super) state: ConversationState,
    pub(super) phase: RunPhase,
    pub(super) epoch: u64,
    pub(super) thread_id: Option<String>,
    pub(super) run_id: Option<String>,
    pub(super) cancel: Arc<Mutex<CancellationToken>>,
    pub(super) update_tx: Option<mpsc::UnboundedSender<SessionUpdate>>,
    pub(super) thread_directory: Arc<Mutex<Vec<ThreadInfo>>>,
    pub(super) quiet_window: Option<Duration>,
    pub(super) thread_refresh_delay: Duration,
    pub(super) pending_turns: usize,
    pub(super) last_error_notice: Option<String>,
    pub(super) health_warning: Option<String>,
    pub(super) provisional: Option<ProvisionalOverlay>,
}

impl StreamSession {
    pub fn new(client: ApiClient, config: &Config) -> Self {
        Self {
            client: Arc::new(client),
            state: ConversationState::new(),
            phase: RunPhase::Idle,
            epoch: 0,
            thread_id: None,
            run_id: None,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            update_tx: None,
            thread_directory: Arc::new(Mutex::new(Vec::new())),
            quiet_window: config.quiet_window,
            thread_refresh_delay: config.thread_refresh_delay,
            pending_turns: 0,
            last_error_notice: None,
            health_warning: None,
            provisional: None,
        }
    }

    pub fn with_updates(mut self, update_tx: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.update_tx = Some(update_tx);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            current: Arc::clone(&self.cancel),
        }
    }

    /// Cancel the in-flight run, if any. Local state resolves to Idle without
    /// waiting for the server to acknowledge.
    pub fn stop(&mut self) {
        self.cancel.lock().unwrap().cancel();
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.state.visible_messages()
    }

    pub fn ui_events(&self) -> &[UiEvent] {
        &self.state.ui_events
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Submissions awaiting their first token; regeneration never adds here,
    /// so a regenerate does not flip the "new reply pending" indicator.
    pub fn pending_turns(&self) -> usize {
        self.pending_turns
    }

    pub fn health_warning(&self) -> Option<&str> {
        self.health_warning.as_deref()
    }

    pub fn dismiss_health_warning(&mut self) {
        self.health_warning = None;
    }

    /// Shared, eventually-consistent registry of known threads. Other UI
    /// surfaces read and write it too; the session only refreshes it.
    pub fn thread_directory(&self) -> Arc<Mutex<Vec<ThreadInfo>>> {
        Arc::clone(&self.thread_directory)
    }

    /// Request id of the submission whose turns are still provisional, if
    /// any. Renderers can use this to style yet-unconfirmed turns.
    pub fn provisional_request_id(&self) -> Option<&str> {
        self.provisional
            .as_ref()
            .map(|overlay| overlay.request_id.as_str())
    }
}
