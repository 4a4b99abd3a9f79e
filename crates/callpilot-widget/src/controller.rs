//! Call session state machine.
//!
//! One controller owns the call lifecycle for one widget:
//!
//! ```text
//! Idle --start_call--> Connecting --Started--> Active --end_call/Ended--> Idle
//!                          |                     |
//!                          +----failure----> Error ----> Idle
//! ```
//!
//! The credential request runs on its own task and reports back through an
//! internal channel, so the controller keeps processing commands while it
//! is in flight. Each attempt is numbered; a result for an attempt the
//! controller has since abandoned is dropped.

use crate::api::CredentialFetcher;
use crate::error::WidgetError;
use callpilot_types::{CallCredentials, CallSnapshot, CallState, TranscriptChange, TranscriptEntry};
use callpilot_voice::{SessionEvent, VoiceError, VoiceSdk, VoiceSessionAdapter};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, trace};

const NOTICE_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 16;

/// User intents forwarded to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartCall,
    EndCall,
    ToggleMute,
    Shutdown,
}

/// What observers are told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    StateChanged(CallSnapshot),
    /// A failed attempt, with the alert text for the visitor.
    Failure(String),
    Transcript(Vec<TranscriptChange>),
}

enum Internal {
    Credentials {
        attempt: u64,
        result: Result<CallCredentials, WidgetError>,
    },
}

enum Step {
    Command(Option<Command>),
    Internal(Internal),
    Session(SessionEvent),
}

pub struct CallSessionController<F, S: VoiceSdk> {
    agent_id: Option<String>,
    fetcher: Arc<F>,
    adapter: VoiceSessionAdapter<S>,
    state: CallState,
    access_token: Option<String>,
    muted: bool,
    attempt: u64,
    transcript: Vec<TranscriptEntry>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    state_tx: watch::Sender<CallSnapshot>,
    notices: broadcast::Sender<Notice>,
}

impl<F, S> CallSessionController<F, S>
where
    F: CredentialFetcher,
    S: VoiceSdk + 'static,
{
    /// Creates an idle controller. Without an `agent_id` every
    /// `start_call` is refused.
    pub fn new(agent_id: Option<String>, fetcher: F, sdk: S) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(CallSnapshot::default());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            agent_id,
            fetcher: Arc::new(fetcher),
            adapter: VoiceSessionAdapter::new(sdk),
            state: CallState::Idle,
            access_token: None,
            muted: false,
            attempt: 0,
            transcript: Vec::new(),
            internal_tx,
            internal_rx,
            state_tx,
            notices,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            state: self.state,
            muted: self.muted,
        }
    }

    /// Transcript of the current call, kept in step with the adapter.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn adapter(&self) -> &VoiceSessionAdapter<S> {
        &self.adapter
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CallSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Begins a call attempt. Ignored unless idle.
    ///
    /// Must be called from within a tokio runtime: the credential request
    /// is spawned.
    pub fn start_call(&mut self) {
        if self.state != CallState::Idle {
            debug!(state = %self.state, "start_call ignored, call already in progress");
            return;
        }
        let Some(agent_id) = self.agent_id.clone() else {
            error!("agent id not configured, cannot start a call");
            return;
        };

        self.attempt += 1;
        let attempt = self.attempt;
        self.set_state(CallState::Connecting);
        info!(attempt, %agent_id, "starting call");

        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = fetcher.register_call(&agent_id).await;
            let _ = tx.send(Internal::Credentials { attempt, result });
        });
    }

    /// Ends the call, or abandons the attempt in progress. Safe in any state.
    pub fn end_call(&mut self) {
        match self.state {
            CallState::Idle | CallState::Error => {
                trace!("end_call with no call in progress");
            }
            CallState::Connecting | CallState::Active => {
                info!(state = %self.state, attempt = self.attempt, "ending call");
                self.adapter.stop();
                self.reset_to_idle();
            }
        }
    }

    /// Flips mute. Only forwarded to the SDK while the call is active.
    pub fn toggle_mute(&mut self) {
        if self.state != CallState::Active {
            debug!(state = %self.state, "toggle_mute ignored, no active call");
            return;
        }
        if self.muted {
            self.adapter.unmute();
        } else {
            self.adapter.mute();
        }
        self.muted = !self.muted;
        debug!(muted = self.muted, "mute toggled");
        self.publish();
    }

    /// Waits for the next credential result or session event and applies
    /// it.
    pub async fn process_next(&mut self) {
        let step = tokio::select! {
            Some(internal) = self.internal_rx.recv() => Step::Internal(internal),
            Some(event) = self.adapter.next_event() => Step::Session(event),
        };
        self.apply(step).await;
    }

    /// Runs the controller until `Shutdown` arrives or every command
    /// sender is dropped. Any call still in progress is ended on the way
    /// out.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                Some(internal) = self.internal_rx.recv() => Step::Internal(internal),
                Some(event) = self.adapter.next_event() => Step::Session(event),
            };
            if matches!(step, Step::Command(None | Some(Command::Shutdown))) {
                self.end_call();
                debug!("call controller stopped");
                return;
            }
            self.apply(step).await;
        }
    }

    /// Moves the controller onto its own task and returns a handle to it.
    pub fn spawn(self) -> ControllerHandle {
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = ControllerHandle {
            commands,
            state: self.subscribe_state(),
            notices: self.notices.clone(),
        };
        tokio::spawn(self.run(rx));
        handle
    }

    async fn apply(&mut self, step: Step) {
        match step {
            Step::Command(Some(Command::StartCall)) => self.start_call(),
            Step::Command(Some(Command::EndCall)) => self.end_call(),
            Step::Command(Some(Command::ToggleMute)) => self.toggle_mute(),
            Step::Command(_) => {}
            Step::Internal(Internal::Credentials { attempt, result }) => {
                self.on_credentials(attempt, result).await;
            }
            Step::Session(event) => self.on_session_event(event),
        }
    }

    async fn on_credentials(&mut self, attempt: u64, result: Result<CallCredentials, WidgetError>) {
        if attempt != self.attempt || self.state != CallState::Connecting {
            debug!(
                attempt,
                current = self.attempt,
                state = %self.state,
                "discarding stale credential result"
            );
            return;
        }

        let credentials = match result {
            Ok(credentials) => credentials,
            Err(e) => return self.fail(e),
        };

        info!(call_id = %credentials.call_id, "call credentials received");
        let token = self.access_token.insert(credentials.access_token).clone();
        let started = self.adapter.start(&token).await;
        if let Err(e) = started {
            self.fail(WidgetError::Session(e));
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match (self.state, event) {
            (CallState::Connecting, SessionEvent::Started) => {
                info!("call started");
                self.set_state(CallState::Active);
            }
            (CallState::Connecting | CallState::Active, SessionEvent::Ended) => {
                info!("call ended by remote");
                self.adapter.stop();
                self.reset_to_idle();
            }
            (CallState::Connecting | CallState::Active, SessionEvent::Error(message)) => {
                self.fail(WidgetError::Session(VoiceError::Sdk(message)));
            }
            (
                CallState::Connecting | CallState::Active,
                SessionEvent::TranscriptUpdate(changes),
            ) => {
                self.apply_transcript(&changes);
                let _ = self.notices.send(Notice::Transcript(changes));
            }
            (state, event) => {
                trace!(%state, ?event, "ignoring session event");
            }
        }
    }

    /// Mirrors the adapter's transcript. Changes are positional; a change
    /// past the end means this copy missed something, so it resyncs.
    fn apply_transcript(&mut self, changes: &[TranscriptChange]) {
        for change in changes {
            match change.index.cmp(&self.transcript.len()) {
                Ordering::Less => self.transcript[change.index] = change.entry.clone(),
                Ordering::Equal => self.transcript.push(change.entry.clone()),
                Ordering::Greater => {
                    debug!(
                        index = change.index,
                        len = self.transcript.len(),
                        "transcript out of step, resyncing"
                    );
                    self.transcript = self.adapter.transcript().to_vec();
                    return;
                }
            }
        }
    }

    /// Error excursion: publish `Error`, alert once, settle back in `Idle`.
    fn fail(&mut self, err: WidgetError) {
        error!(error = %err, attempt = self.attempt, "call attempt failed");
        self.adapter.stop();
        self.set_state(CallState::Error);
        let _ = self
            .notices
            .send(Notice::Failure(err.user_message().to_string()));
        self.reset_to_idle();
    }

    fn reset_to_idle(&mut self) {
        self.access_token = None;
        self.muted = false;
        self.transcript.clear();
        self.set_state(CallState::Idle);
    }

    fn set_state(&mut self, state: CallState) {
        if self.state != state {
            trace!(from = %self.state, to = %state, "call state transition");
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.state_tx.send_replace(snapshot);
        let _ = self.notices.send(Notice::StateChanged(snapshot));
    }
}

/// Cloneable front for a spawned controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<CallSnapshot>,
    notices: broadcast::Sender<Notice>,
}

impl ControllerHandle {
    pub async fn send(&self, command: Command) -> Result<(), WidgetError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WidgetError::ControllerClosed)
    }

    pub async fn start_call(&self) -> Result<(), WidgetError> {
        self.send(Command::StartCall).await
    }

    pub async fn end_call(&self) -> Result<(), WidgetError> {
        self.send(Command::EndCall).await
    }

    pub async fn toggle_mute(&self) -> Result<(), WidgetError> {
        self.send(Command::ToggleMute).await
    }

    pub async fn shutdown(&self) -> Result<(), WidgetError> {
        self.send(Command::Shutdown).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> CallSnapshot {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CallSnapshot> {
        self.state.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }
}

impl<F, S: VoiceSdk> std::fmt::Debug for CallSessionController<F, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionController")
            .field("state", &self.state)
            .field("muted", &self.muted)
            .field("attempt", &self.attempt)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}
