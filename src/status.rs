//! Call session status and status-change tag derivation.

use crate::types::CallMediaType;
use serde::{Deserialize, Serialize};

/// Authoritative session status. Exactly one value lives in the store.
///
/// Transitions: IDLE → CALLING on call/group-call initiation, CALLING →
/// CONNECTED on accept or join confirmation, anything → IDLE on hangup,
/// reject, or a terminal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallStatus {
    #[default]
    Idle,
    Calling,
    Connected,
}

/// Discriminated tag describing the observable call state, consumed by the
/// host's `status_changed` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusChange {
    Idle,
    DialingC2c,
    DialingGroup,
    CallingC2cAudio,
    CallingC2cVideo,
    CallingGroupAudio,
    CallingGroupVideo,
}

/// Derives the status-change tag from the three store values that determine
/// it. Pure and deterministic so callers can assert exact before/after
/// pairs.
pub fn status_change_tag(
    is_group: bool,
    media_type: CallMediaType,
    status: CallStatus,
) -> StatusChange {
    match status {
        CallStatus::Idle => StatusChange::Idle,
        CallStatus::Calling => {
            if is_group {
                StatusChange::DialingGroup
            } else {
                StatusChange::DialingC2c
            }
        }
        CallStatus::Connected => match (is_group, media_type) {
            (false, CallMediaType::Audio) => StatusChange::CallingC2cAudio,
            (false, CallMediaType::Video) => StatusChange::CallingC2cVideo,
            (true, CallMediaType::Audio) => StatusChange::CallingGroupAudio,
            (true, CallMediaType::Video) => StatusChange::CallingGroupVideo,
        },
    }
}
