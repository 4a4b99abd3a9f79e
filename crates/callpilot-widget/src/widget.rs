//! Presentation model for the widget.
//!
//! Holds the state a renderer needs (button look, which dialogs are open)
//! and turns clicks into controller commands. Voice calls are gated behind
//! the visitor's data-collection consent: without it, a click opens the
//! consent dialog and the call is remembered as the pending action.

use crate::api::GuideFetcher;
use crate::controller::ControllerHandle;
use crate::error::WidgetError;
use crate::guide::GuideConversation;
use callpilot_store::ConsentStore;
use callpilot_types::{CallSnapshot, CallState, ConsentStatus, TranscriptEntry};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Phone,
    Spinner,
    HangUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Neutral,
    Amber,
    Red,
}

/// How the call button looks for a given call snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonAppearance {
    pub icon: Icon,
    pub tint: Tint,
    pub muted_badge: bool,
    pub label: &'static str,
}

impl ButtonAppearance {
    pub fn for_snapshot(snapshot: CallSnapshot) -> Self {
        let (icon, tint, label) = match snapshot.state {
            CallState::Idle | CallState::Error => (Icon::Phone, Tint::Neutral, "Call AI"),
            CallState::Connecting => (Icon::Spinner, Tint::Amber, "Connecting..."),
            CallState::Active => (Icon::HangUp, Tint::Red, "End call"),
        };
        Self {
            icon,
            tint,
            muted_badge: snapshot.state == CallState::Active && snapshot.muted,
            label,
        }
    }
}

/// What to do once the visitor has answered the consent dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Call,
    EnableSharing,
}

pub struct Widget<G> {
    calls: ControllerHandle,
    consent: ConsentStore,
    user_email: Option<String>,
    consent_status: ConsentStatus,
    pending: Option<PendingAction>,
    consent_dialog_open: bool,
    palette_open: bool,
    text_modal_open: bool,
    guide: GuideConversation<G>,
}

impl<G: GuideFetcher> Widget<G> {
    /// Builds the widget and loads the stored consent for `user_email`.
    pub fn new(
        calls: ControllerHandle,
        consent: ConsentStore,
        guide: GuideConversation<G>,
        user_email: Option<String>,
    ) -> Result<Self, WidgetError> {
        let consent_status = consent.get(user_email.as_deref())?;
        debug!(?consent_status, identified = user_email.is_some(), "widget initialised");
        Ok(Self {
            calls,
            consent,
            user_email,
            consent_status,
            pending: None,
            consent_dialog_open: false,
            palette_open: false,
            text_modal_open: false,
            guide,
        })
    }

    pub fn button(&self) -> ButtonAppearance {
        ButtonAppearance::for_snapshot(self.calls.snapshot())
    }

    pub fn calls(&self) -> &ControllerHandle {
        &self.calls
    }

    pub fn consent_status(&self) -> ConsentStatus {
        self.consent_status
    }

    pub fn consent_dialog_open(&self) -> bool {
        self.consent_dialog_open
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        self.pending
    }

    pub fn palette_open(&self) -> bool {
        self.palette_open
    }

    pub fn text_modal_open(&self) -> bool {
        self.text_modal_open
    }

    pub fn guide(&self) -> &GuideConversation<G> {
        &self.guide
    }

    /// The floating help button is hidden while a call or the text modal
    /// is on screen.
    pub fn launcher_visible(&self) -> bool {
        !(self.calls.snapshot().state.is_busy() || self.text_modal_open)
    }

    pub fn toggle_palette(&mut self) {
        self.palette_open = !self.palette_open;
    }

    /// The "Call AI" entry: toggles the call, or asks for consent first.
    pub async fn click_call(&mut self) -> Result<(), WidgetError> {
        if self.consent_status.is_granted() {
            self.toggle_call().await
        } else {
            self.open_consent_dialog(PendingAction::Call);
            Ok(())
        }
    }

    async fn toggle_call(&mut self) -> Result<(), WidgetError> {
        self.palette_open = false;
        match self.calls.snapshot().state {
            CallState::Connecting => {
                debug!("call click ignored while connecting");
                Ok(())
            }
            CallState::Active => self.calls.end_call().await,
            CallState::Idle | CallState::Error => self.calls.start_call().await,
        }
    }

    pub async fn toggle_mute(&self) -> Result<(), WidgetError> {
        self.calls.toggle_mute().await
    }

    /// Records the answer from the consent dialog and, on acceptance, runs
    /// whatever was waiting for it.
    pub async fn answer_consent(&mut self, granted: bool) -> Result<(), WidgetError> {
        self.consent.set(granted, self.user_email.as_deref())?;
        self.consent_status = ConsentStatus::from(granted);
        self.consent_dialog_open = false;
        info!(granted, "consent answered");

        let pending = self.pending.take();
        match (granted, pending) {
            (true, Some(PendingAction::Call)) => self.toggle_call().await,
            _ => Ok(()),
        }
    }

    /// "Back" in the consent dialog: close it and forget the pending action.
    pub fn consent_back(&mut self) {
        self.consent_dialog_open = false;
        self.pending = None;
    }

    /// The data-sharing switch. Turning it on goes through the consent
    /// dialog; turning it off takes effect immediately.
    pub fn toggle_data_sharing(&mut self) -> Result<(), WidgetError> {
        if self.consent_status.is_granted() {
            self.consent.revoke()?;
            self.consent_status = ConsentStatus::Denied;
            info!("data sharing turned off");
        } else {
            self.open_consent_dialog(PendingAction::EnableSharing);
        }
        Ok(())
    }

    fn open_consent_dialog(&mut self, action: PendingAction) {
        self.pending = Some(action);
        self.consent_dialog_open = true;
    }

    /// Opens the text modal with a new question.
    pub async fn ask(&mut self, question: &str) -> Result<Option<TranscriptEntry>, WidgetError> {
        self.palette_open = false;
        self.text_modal_open = true;
        self.guide.ask(question).await
    }

    pub async fn follow_up(
        &mut self,
        question: &str,
    ) -> Result<Option<TranscriptEntry>, WidgetError> {
        self.guide.follow_up(question).await
    }

    pub fn close_text_modal(&mut self) {
        self.text_modal_open = false;
        self.guide.reset();
    }

    /// Escape or the close button: end any call and close everything.
    pub async fn escape(&mut self) -> Result<(), WidgetError> {
        self.palette_open = false;
        self.close_text_modal();
        self.calls.end_call().await
    }
}

impl<G> std::fmt::Debug for Widget<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Widget")
            .field("consent_status", &self.consent_status)
            .field("pending", &self.pending)
            .field("consent_dialog_open", &self.consent_dialog_open)
            .field("text_modal_open", &self.text_modal_open)
            .finish_non_exhaustive()
    }
}
