use crate::error::VoiceError;
use crate::sdk::{SdkEvent, SdkEventKind, VoiceSdk};
use crate::transcript::TranscriptDiff;
use callpilot_types::{TranscriptChange, TranscriptEntry};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Controller-level notification derived from an SDK event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    Ended,
    Error(String),
    /// Only the transcript entries that are new or changed since the last
    /// update of the same session.
    TranscriptUpdate(Vec<TranscriptChange>),
}

/// Owns the SDK client and normalises its events.
///
/// Every session gets a generation number. Listeners tag the events they
/// forward with the generation they were registered for, and
/// [`next_event`](Self::next_event) drops anything that is not from the
/// live generation.
pub struct VoiceSessionAdapter<S: VoiceSdk> {
    sdk: S,
    generation: u64,
    live: Option<u64>,
    events_tx: mpsc::UnboundedSender<(u64, SdkEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, SdkEvent)>,
    transcript: TranscriptDiff,
}

impl<S: VoiceSdk> VoiceSessionAdapter<S> {
    pub fn new(sdk: S) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            sdk,
            generation: 0,
            live: None,
            events_tx,
            events_rx,
            transcript: TranscriptDiff::new(),
        }
    }

    /// Starts a new session with `access_token`.
    ///
    /// Any previous session is stopped and its listeners removed first.
    /// `Ok` means the SDK accepted the request; [`SessionEvent::Started`]
    /// follows once the SDK reports the call as live.
    pub async fn start(&mut self, access_token: &str) -> Result<(), VoiceError> {
        if self.live.is_some() {
            debug!("stopping previous voice session before starting a new one");
            self.sdk.stop_call();
        }
        for kind in SdkEventKind::ALL {
            self.sdk.remove_all_listeners(kind);
        }

        self.generation += 1;
        let generation = self.generation;
        self.live = Some(generation);
        self.transcript.reset();

        for kind in SdkEventKind::ALL {
            let tx = self.events_tx.clone();
            self.sdk.on(
                kind,
                Box::new(move |event| {
                    let _ = tx.send((generation, event));
                }),
            );
        }

        info!(
            generation,
            token_len = access_token.len(),
            "starting voice session"
        );

        self.sdk.start_call(access_token).await.inspect_err(|e| {
            warn!(generation, error = %e, "voice SDK rejected session start");
        })
    }

    /// Stops the live session. Safe to call when nothing is running.
    pub fn stop(&mut self) {
        if let Some(generation) = self.live.take() {
            info!(generation, "stopping voice session");
            self.sdk.stop_call();
        }
    }

    pub fn mute(&mut self) {
        self.sdk.mute();
    }

    pub fn unmute(&mut self) {
        self.sdk.unmute();
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// The full transcript of the live session as last reported.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.transcript.snapshot()
    }

    pub fn sdk(&self) -> &S {
        &self.sdk
    }

    /// Waits for the next event of the live session.
    ///
    /// Cancel safe: nothing is lost if the future is dropped before it
    /// resolves.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let (generation, event) = self.events_rx.recv().await?;
            if self.live != Some(generation) {
                trace!(
                    generation,
                    event = %event.kind(),
                    "dropping event from stale voice session"
                );
                continue;
            }

            let normalized = match event {
                SdkEvent::CallStarted => SessionEvent::Started,
                SdkEvent::CallEnded => SessionEvent::Ended,
                SdkEvent::Error(message) => SessionEvent::Error(message),
                SdkEvent::Update { transcript } => {
                    let changes = self.transcript.apply(transcript);
                    if changes.is_empty() {
                        continue;
                    }
                    SessionEvent::TranscriptUpdate(changes)
                }
            };
            return Some(normalized);
        }
    }
}

impl<S: VoiceSdk> std::fmt::Debug for VoiceSessionAdapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSessionAdapter")
            .field("generation", &self.generation)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}
