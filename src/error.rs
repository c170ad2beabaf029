//! Error types surfaced past the orchestration boundary.

use crate::status::CallStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    /// Caller-supplied parameters were rejected before any engine call.
    #[error("invalid parameter: {0}")]
    Validation(String),

    /// Opaque failure from the calling engine. Session state has already
    /// been reset to idle when this is returned.
    #[error("engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),

    /// A chat/collaborator lookup failed.
    #[error("chat integration error: {0}")]
    Integration(#[from] crate::chat::IntegrationError),

    /// The service has no logged-in engine yet.
    #[error("call service not initialized")]
    NotInitialized,

    /// No chat integration was supplied at construction.
    #[error("no chat integration configured")]
    NoChatIntegration,

    /// Teardown requested while a session is still live.
    #[error("cannot destroy while status is {0:?}")]
    NotIdle(CallStatus),
}
