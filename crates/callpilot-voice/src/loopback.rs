//! An in-process stand-in for the real-time voice SDK.
//!
//! The terminal front end has no audio stack, so calls are simulated: the
//! loopback client "connects" after a short delay, greets the caller and
//! reports the call as ended when stopped. A [`LoopbackRemote`] plays the
//! far side of the call (hang up, error, speech) and exposes counters, which
//! is also what the controller tests drive it with.

use crate::error::VoiceError;
use crate::sdk::{Listener, SdkEvent, SdkEventKind, VoiceSdk};
use callpilot_types::TranscriptEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::info;

/// Calls the loopback client has received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopbackStats {
    pub starts: usize,
    pub stops: usize,
    pub mutes: usize,
    pub unmutes: usize,
    pub last_token: Option<String>,
}

#[derive(Default)]
struct LoopbackState {
    listeners: HashMap<SdkEventKind, Vec<Listener>>,
    active: bool,
    muted: bool,
    transcript: Vec<TranscriptEntry>,
    fail_next_start: Option<String>,
    stats: LoopbackStats,
}

impl LoopbackState {
    fn emit(&self, event: SdkEvent) {
        if let Some(listeners) = self.listeners.get(&event.kind()) {
            for listener in listeners {
                listener(event.clone());
            }
        }
    }
}

fn lock(state: &Mutex<LoopbackState>) -> MutexGuard<'_, LoopbackState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated SDK client.
pub struct LoopbackSdk {
    state: Arc<Mutex<LoopbackState>>,
    connect_delay: Duration,
    greeting: Option<String>,
    auto_connect: bool,
}

impl LoopbackSdk {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopbackState::default())),
            connect_delay: Duration::from_millis(50),
            greeting: None,
            auto_connect: true,
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Has the agent say `greeting` as soon as the call is live.
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    /// Leaves `call_started` to [`LoopbackRemote::connect`].
    pub fn manual_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    pub fn remote(&self) -> LoopbackRemote {
        LoopbackRemote {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for LoopbackSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceSdk for LoopbackSdk {
    fn on(&mut self, kind: SdkEventKind, listener: Listener) {
        lock(&self.state)
            .listeners
            .entry(kind)
            .or_default()
            .push(listener);
    }

    fn remove_all_listeners(&mut self, kind: SdkEventKind) {
        lock(&self.state).listeners.remove(&kind);
    }

    async fn start_call(&mut self, access_token: &str) -> Result<(), VoiceError> {
        {
            let mut state = lock(&self.state);
            state.stats.starts += 1;
            state.stats.last_token = Some(access_token.to_string());
            if let Some(message) = state.fail_next_start.take() {
                return Err(VoiceError::Sdk(message));
            }
        }
        if access_token.is_empty() {
            return Err(VoiceError::Sdk("access token is empty".to_string()));
        }

        tokio::time::sleep(self.connect_delay).await;

        if !self.auto_connect {
            return Ok(());
        }

        let mut state = lock(&self.state);
        state.active = true;
        state.muted = false;
        state.emit(SdkEvent::CallStarted);
        if let Some(greeting) = &self.greeting {
            state.transcript = vec![TranscriptEntry::assistant(greeting.clone())];
            let transcript = state.transcript.clone();
            state.emit(SdkEvent::Update { transcript });
        }
        info!("loopback call connected");
        Ok(())
    }

    fn stop_call(&mut self) {
        let mut state = lock(&self.state);
        state.stats.stops += 1;
        if state.active {
            state.active = false;
            state.transcript.clear();
            state.emit(SdkEvent::CallEnded);
        }
    }

    fn mute(&mut self) {
        let mut state = lock(&self.state);
        state.stats.mutes += 1;
        state.muted = true;
    }

    fn unmute(&mut self) {
        let mut state = lock(&self.state);
        state.stats.unmutes += 1;
        state.muted = false;
    }
}

/// The far side of a loopback call.
#[derive(Clone)]
pub struct LoopbackRemote {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackRemote {
    /// Reports the pending call as live.
    pub fn connect(&self) {
        let mut state = lock(&self.state);
        state.active = true;
        state.emit(SdkEvent::CallStarted);
    }

    /// Ends the call from the agent's side.
    pub fn hang_up(&self) {
        let mut state = lock(&self.state);
        state.active = false;
        state.transcript.clear();
        state.emit(SdkEvent::CallEnded);
    }

    pub fn fail(&self, message: impl Into<String>) {
        lock(&self.state).emit(SdkEvent::Error(message.into()));
    }

    /// Makes the next `start_call` reject with `message`.
    pub fn fail_next_start(&self, message: impl Into<String>) {
        lock(&self.state).fail_next_start = Some(message.into());
    }

    /// Appends a turn to the call transcript and publishes the full
    /// transcript, the way the SDK's `update` event does.
    pub fn say(&self, entry: TranscriptEntry) {
        let mut state = lock(&self.state);
        state.transcript.push(entry);
        let transcript = state.transcript.clone();
        state.emit(SdkEvent::Update { transcript });
    }

    /// Publishes an arbitrary transcript snapshot.
    pub fn update(&self, transcript: Vec<TranscriptEntry>) {
        let mut state = lock(&self.state);
        state.transcript = transcript.clone();
        state.emit(SdkEvent::Update { transcript });
    }

    /// Emits an event on the raw listener set.
    pub fn emit(&self, event: SdkEvent) {
        lock(&self.state).emit(event);
    }

    pub fn listener_count(&self, kind: SdkEventKind) -> usize {
        lock(&self.state)
            .listeners
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    pub fn is_muted(&self) -> bool {
        lock(&self.state).muted
    }

    pub fn stats(&self) -> LoopbackStats {
        lock(&self.state).stats.clone()
    }
}

impl std::fmt::Debug for LoopbackSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackSdk")
            .field("connect_delay", &self.connect_delay)
            .field("auto_connect", &self.auto_connect)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for LoopbackRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackRemote").finish_non_exhaustive()
    }
}
