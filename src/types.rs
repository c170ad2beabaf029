//! Shared call-domain types.

use serde::{Deserialize, Serialize};

/// Media kind of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallMediaType {
    #[default]
    Audio,
    Video,
}

/// Role of the local user in the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallRole {
    /// No session in progress.
    #[default]
    Unknown,
    Caller,
    Callee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraPosition {
    #[default]
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoResolution {
    R360p,
    R480p,
    #[default]
    R720p,
    R1080p,
}

/// How a video tile scales its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoDisplayMode {
    #[default]
    Cover,
    Contain,
}

/// UI language. Kept as an opaque tag; the kit never renders text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    En,
    Zh,
}

/// Typed tip shown while a call is being set up. Consumers map tags to
/// their own localized strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTips {
    CallerCalling,
    CallerGroupCalling,
    CalleeCalling,
}

/// A toast the UI should surface to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToastInfo {
    NoDevicePermission { media_type: CallMediaType },
}

/// Room identifier returned by the engine. Rooms are addressed either by a
/// numeric id or by an opaque string id, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomId {
    Numeric(u64),
    Str(String),
}

/// One participant (local or remote) as the UI sees them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    pub nick: String,
    pub avatar: String,
    pub is_video_available: bool,
    pub is_audio_available: bool,
    /// Whether the participant has entered the room.
    pub is_enter: bool,
    /// DOM node id the participant's video tile renders into.
    pub dom_id: String,
    /// Latest voice volume sample, 0..=100.
    pub volume: u32,
}

impl UserInfo {
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            dom_id: user_id.clone(),
            user_id,
            ..Default::default()
        }
    }

    /// Display name for push notifications and rosters.
    pub fn display_name(&self) -> &str {
        if self.nick.is_empty() {
            &self.user_id
        } else {
            &self.nick
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Camera,
    Microphone,
    Speaker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
    pub kind: DeviceKind,
}

/// Snapshot of available media devices, refreshed around call setup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceList {
    pub cameras: Vec<DeviceInfo>,
    pub microphones: Vec<DeviceInfo>,
    pub speakers: Vec<DeviceInfo>,
}

/// Opaque chat message produced by the engine for call signaling records
/// (invitations, hangup notices). Forwarded to the chat integration as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub payload: serde_json::Value,
}

/// Push payload attached to call invitations for offline recipients.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OfflinePushInfo {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: String,
    pub nick: String,
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupProfile {
    pub group_id: String,
    pub name: String,
    pub avatar: String,
    pub member_count: u32,
}
