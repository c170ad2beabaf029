//! Opaque calling-engine interface.
//!
//! The engine owns signaling, media negotiation, and transport; the kit
//! only sequences its operations and mirrors its state into the store.
//! Every operation gets a typed parameter/response pair — optional fields
//! are an explicit contract, never a dynamic lookup.

use crate::types::{
    CallMediaType, CameraPosition, ChatMessage, DeviceInfo, DeviceKind, OfflinePushInfo, RoomId,
    VideoResolution,
};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Blur strength applied when the virtual background is enabled; 0 turns
/// blurring off.
pub const DEFAULT_BLUR_LEVEL: u32 = 3;

/// Engine failures, pre-classified so the orchestration layer can decide
/// what is recoverable.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Camera/microphone access denied by the platform.
    #[error("device permission denied for {media:?}")]
    PermissionDenied { media: CallMediaType },

    /// The engine already has this operation in flight. Not a failure from
    /// the user's point of view.
    #[error("call already in progress: {0}")]
    RepeatedCall(String),

    /// Anything else. Opaque to the kit.
    #[error("engine failure (code {code}): {message}")]
    Other { code: i32, message: String },
}

#[derive(Debug, Clone)]
pub struct InitParams {
    pub user_id: String,
    pub user_sig: String,
    pub sdk_app_id: u64,
    /// Whether the kit is embedded in a chat product.
    pub is_from_chat: bool,
}

#[derive(Debug, Clone)]
pub struct CallParams {
    pub user_id: String,
    pub media_type: CallMediaType,
    /// Ring timeout in seconds; engine default when unset.
    pub timeout: Option<u32>,
    pub offline_push_info: Option<OfflinePushInfo>,
}

#[derive(Debug, Clone)]
pub struct GroupCallParams {
    pub user_id_list: Vec<String>,
    pub group_id: String,
    pub media_type: CallMediaType,
    pub timeout: Option<u32>,
    pub offline_push_info: Option<OfflinePushInfo>,
}

#[derive(Debug, Clone)]
pub struct InviteUserParams {
    pub user_id_list: Vec<String>,
    pub offline_push_info: Option<OfflinePushInfo>,
}

#[derive(Debug, Clone)]
pub struct JoinInGroupCallParams {
    pub media_type: CallMediaType,
    pub group_id: String,
    pub room_id: RoomId,
}

#[derive(Debug, Clone)]
pub struct SwitchDeviceParams {
    pub kind: DeviceKind,
    pub device_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct SelfInfoParams {
    pub nick_name: Option<String>,
    pub avatar: Option<String>,
}

/// Structured log record forwarded to the engine's reporting channel.
#[derive(Debug, Clone, Serialize)]
pub struct ReportLogEntry {
    pub name: &'static str,
    pub data: serde_json::Value,
}

/// Response to `call`/`group_call`. The engine may resolve without a
/// response at all (legacy platforms), which the service treats as a
/// failed dial.
#[derive(Debug, Clone)]
pub struct DialResponse {
    pub code: i32,
    pub room_id: Option<RoomId>,
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct AcceptResponse {
    pub message: Option<ChatMessage>,
}

/// Response to reject/hangup/media-switch signals.
#[derive(Debug, Clone)]
pub struct SignalResponse {
    pub code: i32,
    pub message: Option<ChatMessage>,
}

/// Events pushed by the engine. Consumed by the service's event loop.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Incoming call invitation.
    Invited {
        sponsor: String,
        user_id_list: Vec<String>,
        group_id: Option<String>,
        media_type: CallMediaType,
    },
    UserEnter {
        user_id: String,
    },
    UserLeave {
        user_id: String,
    },
    RejectedByUser {
        user_id: String,
        line_busy: bool,
    },
    NoResponse {
        user_id_list: Vec<String>,
    },
    /// The caller cancelled before anyone answered.
    CallCancelled {
        user_id: String,
    },
    CallEnded,
    UserVideoAvailable {
        user_id: String,
        available: bool,
    },
    UserAudioAvailable {
        user_id: String,
        available: bool,
    },
    /// Volume samples, one per speaking participant. Only the
    /// volume-carrying store lists are updated from these.
    UserVoiceVolume {
        volumes: Vec<(String, u32)>,
    },
    /// This login was kicked out by a concurrent login elsewhere.
    Kicked,
    /// The engine sent a call record message on our behalf.
    MessageSentByMe(ChatMessage),
    Error {
        code: i32,
        message: String,
    },
}

#[async_trait]
pub trait CallEngine: Send + Sync {
    async fn login(&self, params: &InitParams) -> Result<(), EngineError>;

    async fn logout(&self) -> Result<(), EngineError>;

    async fn call(&self, params: &CallParams) -> Result<Option<DialResponse>, EngineError>;

    async fn group_call(
        &self,
        params: &GroupCallParams,
    ) -> Result<Option<DialResponse>, EngineError>;

    async fn accept(&self) -> Result<Option<AcceptResponse>, EngineError>;

    async fn reject(&self) -> Result<Option<SignalResponse>, EngineError>;

    /// One result per participant notified of the hangup.
    async fn hangup(&self) -> Result<Vec<SignalResponse>, EngineError>;

    async fn invite_user(&self, params: &InviteUserParams) -> Result<(), EngineError>;

    async fn join_in_group_call(&self, params: &JoinInGroupCallParams)
    -> Result<(), EngineError>;

    async fn open_camera(&self, view_id: &str, front: bool) -> Result<(), EngineError>;

    async fn close_camera(&self) -> Result<(), EngineError>;

    async fn open_microphone(&self) -> Result<(), EngineError>;

    async fn close_microphone(&self) -> Result<(), EngineError>;

    async fn switch_camera(&self, position: CameraPosition) -> Result<(), EngineError>;

    async fn switch_call_media_type(
        &self,
        media_type: CallMediaType,
    ) -> Result<Option<SignalResponse>, EngineError>;

    async fn switch_device(&self, params: &SwitchDeviceParams) -> Result<(), EngineError>;

    async fn set_video_quality(&self, resolution: VideoResolution) -> Result<(), EngineError>;

    async fn get_device_list(&self, kind: DeviceKind) -> Result<Vec<DeviceInfo>, EngineError>;

    async fn set_blur_background(&self, level: u32) -> Result<(), EngineError>;

    async fn set_self_info(&self, params: &SelfInfoParams) -> Result<(), EngineError>;

    /// Mutes/unmutes playback of all remote audio (speaker mute).
    async fn mute_all_remote_audio(&self, mute: bool) -> Result<(), EngineError>;

    async fn destroy_instance(&self) -> Result<(), EngineError>;

    /// Fire-and-forget structured log reporting.
    fn report_log(&self, entry: ReportLogEntry);

    /// Subscribes to the engine's event stream. The service consumes one
    /// subscription for its lifetime.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent>;
}
