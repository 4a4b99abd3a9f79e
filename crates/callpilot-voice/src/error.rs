use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("voice SDK error: {0}")]
    Sdk(String),
}
