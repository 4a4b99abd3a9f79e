//! Text question/answer conversation with the agent.

use crate::api::GuideFetcher;
use crate::error::WidgetError;
use callpilot_types::TranscriptEntry;
use tracing::{debug, error};

/// Alert text shown when the agent could not be reached.
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch response.";

/// One text-modal conversation.
///
/// The whole history is sent with every request so the agent can answer
/// follow-ups in context. Opening the modal with a new question starts over.
#[derive(Debug)]
pub struct GuideConversation<G> {
    fetcher: G,
    agent_id: String,
    turns: Vec<TranscriptEntry>,
    last_error: Option<&'static str>,
}

impl<G: GuideFetcher> GuideConversation<G> {
    pub fn new(fetcher: G, agent_id: impl Into<String>) -> Self {
        Self {
            fetcher,
            agent_id: agent_id.into(),
            turns: Vec::new(),
            last_error: None,
        }
    }

    /// Starts a fresh conversation with `question`. Blank questions are
    /// ignored.
    pub async fn ask(&mut self, question: &str) -> Result<Option<TranscriptEntry>, WidgetError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(None);
        }
        self.reset();
        self.exchange(question.to_string()).await.map(Some)
    }

    /// Continues the current conversation. Blank input is ignored.
    pub async fn follow_up(
        &mut self,
        question: &str,
    ) -> Result<Option<TranscriptEntry>, WidgetError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(None);
        }
        self.exchange(question.to_string()).await.map(Some)
    }

    async fn exchange(&mut self, question: String) -> Result<TranscriptEntry, WidgetError> {
        self.last_error = None;
        self.turns.push(TranscriptEntry::user(question));
        debug!(turns = self.turns.len(), "requesting guide reply");

        match self.fetcher.get_guide(&self.agent_id, &self.turns).await {
            Ok(reply) => {
                self.turns.push(reply.clone());
                Ok(reply)
            }
            Err(e) => {
                error!(error = %e, "error fetching guide");
                self.last_error = Some(FETCH_FAILED_MESSAGE);
                Err(e)
            }
        }
    }

    pub fn turns(&self) -> &[TranscriptEntry] {
        &self.turns
    }

    /// The alert from the most recent failed request, cleared by the next
    /// request.
    pub fn last_error(&self) -> Option<&'static str> {
        self.last_error
    }

    pub fn reset(&mut self) {
        self.turns.clear();
        self.last_error = None;
    }
}
