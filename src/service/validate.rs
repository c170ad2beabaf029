//! Parameter precondition checks.
//!
//! Each user-facing operation validates its parameters after the
//! repeated-call guard and before the status guard, rejecting bad input
//! with [`CallError::Validation`] before any engine call.

use crate::engine::{
    CallParams, GroupCallParams, InitParams, InviteUserParams, JoinInGroupCallParams,
};
use crate::error::CallError;

pub(crate) fn validate_init(params: &InitParams) -> Result<(), CallError> {
    if params.user_id.is_empty() {
        return Err(CallError::Validation("init: userId is empty".into()));
    }
    if params.user_sig.is_empty() {
        return Err(CallError::Validation("init: userSig is empty".into()));
    }
    if params.sdk_app_id == 0 {
        return Err(CallError::Validation("init: sdkAppId is zero".into()));
    }
    Ok(())
}

pub(crate) fn validate_call(params: &CallParams) -> Result<(), CallError> {
    if params.user_id.is_empty() {
        return Err(CallError::Validation("call: userId is empty".into()));
    }
    Ok(())
}

pub(crate) fn validate_group_call(params: &GroupCallParams) -> Result<(), CallError> {
    if params.group_id.is_empty() {
        return Err(CallError::Validation("groupCall: groupId is empty".into()));
    }
    if params.user_id_list.is_empty() {
        return Err(CallError::Validation(
            "groupCall: userIdList is empty".into(),
        ));
    }
    if params.user_id_list.iter().any(|id| id.is_empty()) {
        return Err(CallError::Validation(
            "groupCall: userIdList contains an empty id".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_invite_user(params: &InviteUserParams) -> Result<(), CallError> {
    if params.user_id_list.is_empty() {
        return Err(CallError::Validation(
            "inviteUser: userIdList is empty".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_join_in_group_call(
    params: &JoinInGroupCallParams,
) -> Result<(), CallError> {
    if params.group_id.is_empty() {
        return Err(CallError::Validation(
            "joinInGroupCall: groupId is empty".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallMediaType, RoomId};

    #[test]
    fn test_init_rejects_missing_credentials() {
        let params = InitParams {
            user_id: "alice".into(),
            user_sig: String::new(),
            sdk_app_id: 1,
            is_from_chat: false,
        };
        assert!(matches!(
            validate_init(&params),
            Err(CallError::Validation(_))
        ));
    }

    #[test]
    fn test_call_rejects_empty_user_id() {
        let params = CallParams {
            user_id: String::new(),
            media_type: CallMediaType::Audio,
            timeout: None,
            offline_push_info: None,
        };
        assert!(matches!(
            validate_call(&params),
            Err(CallError::Validation(_))
        ));
    }

    #[test]
    fn test_group_call_rejects_empty_member_ids() {
        let params = GroupCallParams {
            user_id_list: vec!["bob".into(), String::new()],
            group_id: "g1".into(),
            media_type: CallMediaType::Video,
            timeout: None,
            offline_push_info: None,
        };
        assert!(matches!(
            validate_group_call(&params),
            Err(CallError::Validation(_))
        ));
    }

    #[test]
    fn test_join_accepts_minimal_params() {
        let params = JoinInGroupCallParams {
            media_type: CallMediaType::Audio,
            group_id: "g1".into(),
            room_id: RoomId::Numeric(7),
        };
        assert!(validate_join_in_group_call(&params).is_ok());
    }
}
