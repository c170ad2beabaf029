//! Reactive keyed state container shared between orchestration and UI.
//!
//! Every key has a default populated at construction. Watchers registered
//! for a key run synchronously, in registration order, before the mutating
//! call returns; batched updates notify only after the whole batch is
//! written, so a watcher reading a sibling key observes the new values.

use crate::status::CallStatus;
use crate::types::{
    CallMediaType, CallRole, CallTips, CameraPosition, DeviceList, Language, RoomId, ToastInfo,
    UserInfo, VideoDisplayMode, VideoResolution,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Logical store name. The kit currently keeps all call state under one
/// name; the keying exists so independent state domains never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StoreName {
    Call,
}

/// Every key the call store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CallKey {
    CallStatus,
    CallMediaType,
    CallRole,
    LocalUserInfo,
    /// Shadow of `LocalUserInfo` that never receives volume-only updates,
    /// for UI surfaces that must not re-render per volume sample.
    LocalUserInfoExcludeVolume,
    RemoteUserInfoList,
    RemoteUserInfoExcludeVolumeList,
    IsGroup,
    GroupId,
    RoomId,
    CallTips,
    CallDuration,
    IsClickable,
    IsMinimized,
    IsEarPhone,
    IsMuteSpeaker,
    EnableVirtualBackground,
    ShowVirtualBackgroundButton,
    EnableFloatWindow,
    CameraPosition,
    VideoResolution,
    DisplayMode,
    Language,
    BigScreenUserId,
    DeviceList,
    ToastInfo,
}

impl CallKey {
    pub const ALL: [CallKey; 26] = [
        CallKey::CallStatus,
        CallKey::CallMediaType,
        CallKey::CallRole,
        CallKey::LocalUserInfo,
        CallKey::LocalUserInfoExcludeVolume,
        CallKey::RemoteUserInfoList,
        CallKey::RemoteUserInfoExcludeVolumeList,
        CallKey::IsGroup,
        CallKey::GroupId,
        CallKey::RoomId,
        CallKey::CallTips,
        CallKey::CallDuration,
        CallKey::IsClickable,
        CallKey::IsMinimized,
        CallKey::IsEarPhone,
        CallKey::IsMuteSpeaker,
        CallKey::EnableVirtualBackground,
        CallKey::ShowVirtualBackgroundButton,
        CallKey::EnableFloatWindow,
        CallKey::CameraPosition,
        CallKey::VideoResolution,
        CallKey::DisplayMode,
        CallKey::Language,
        CallKey::BigScreenUserId,
        CallKey::DeviceList,
        CallKey::ToastInfo,
    ];

    /// Keys whose watchers fire on `reset` even when notification is
    /// suppressed. These drive UI teardown and must never be missed.
    pub fn force_notify_on_reset(self) -> bool {
        matches!(
            self,
            CallKey::CallStatus
                | CallKey::IsMinimized
                | CallKey::IsEarPhone
                | CallKey::EnableVirtualBackground
                | CallKey::IsMuteSpeaker
        )
    }

    /// Keys that survive a full session reset: cross-session configuration
    /// and local identity. `CallStatus` is handled separately by the
    /// service with its own notify guard.
    pub fn sticky_on_reset(self) -> bool {
        matches!(
            self,
            CallKey::CallStatus
                | CallKey::Language
                | CallKey::IsGroup
                | CallKey::DisplayMode
                | CallKey::VideoResolution
                | CallKey::EnableFloatWindow
                | CallKey::LocalUserInfo
                | CallKey::LocalUserInfoExcludeVolume
                | CallKey::ShowVirtualBackgroundButton
        )
    }

    fn default_value(self) -> Value {
        match self {
            CallKey::CallStatus => Value::Status(CallStatus::Idle),
            CallKey::CallMediaType => Value::Media(CallMediaType::Audio),
            CallKey::CallRole => Value::Role(CallRole::Unknown),
            CallKey::LocalUserInfo | CallKey::LocalUserInfoExcludeVolume => {
                Value::User(UserInfo::default())
            }
            CallKey::RemoteUserInfoList | CallKey::RemoteUserInfoExcludeVolumeList => {
                Value::UserList(Vec::new())
            }
            CallKey::IsGroup
            | CallKey::IsMinimized
            | CallKey::IsEarPhone
            | CallKey::IsMuteSpeaker
            | CallKey::EnableVirtualBackground
            | CallKey::ShowVirtualBackgroundButton
            | CallKey::IsClickable => Value::Bool(false),
            CallKey::EnableFloatWindow => Value::Bool(true),
            CallKey::GroupId | CallKey::BigScreenUserId => Value::OptText(None),
            CallKey::RoomId => Value::Room(None),
            CallKey::CallTips => Value::Tips(None),
            CallKey::CallDuration => Value::Text(String::from("00:00")),
            CallKey::CameraPosition => Value::Camera(CameraPosition::Front),
            CallKey::VideoResolution => Value::Resolution(VideoResolution::default()),
            CallKey::DisplayMode => Value::DisplayMode(VideoDisplayMode::default()),
            CallKey::Language => Value::Language(Language::default()),
            CallKey::DeviceList => Value::Devices(DeviceList::default()),
            CallKey::ToastInfo => Value::Toast(None),
        }
    }
}

/// Sum type of every value shape the store can hold. One variant per
/// shape; no dynamic typing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Status(CallStatus),
    Media(CallMediaType),
    Role(CallRole),
    Bool(bool),
    Text(String),
    OptText(Option<String>),
    User(UserInfo),
    UserList(Vec<UserInfo>),
    Camera(CameraPosition),
    Resolution(VideoResolution),
    DisplayMode(VideoDisplayMode),
    Language(Language),
    Room(Option<RoomId>),
    Tips(Option<CallTips>),
    Toast(Option<ToastInfo>),
    Devices(DeviceList),
}

/// Handle returned by [`Store::watch`], used to unregister the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchId(u64);

type WatchHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// The reactive store. Mutations come only from the orchestration service;
/// UI components subscribe read-only. Watcher dispatch happens after all
/// internal locks are released, so handlers may freely read or update the
/// store.
pub struct Store {
    tables: RwLock<HashMap<StoreName, HashMap<CallKey, Value>>>,
    watchers: RwLock<HashMap<(StoreName, CallKey), Vec<(WatchId, WatchHandler)>>>,
    next_watch_id: AtomicU64,
}

impl Store {
    pub fn new() -> Arc<Self> {
        let mut call_table = HashMap::new();
        for key in CallKey::ALL {
            call_table.insert(key, key.default_value());
        }
        let mut tables = HashMap::new();
        tables.insert(StoreName::Call, call_table);
        Arc::new(Self {
            tables: RwLock::new(tables),
            watchers: RwLock::new(HashMap::new()),
            next_watch_id: AtomicU64::new(1),
        })
    }

    /// Current value for `key`, or its default. Never fails.
    pub fn get_data(&self, store: StoreName, key: CallKey) -> Value {
        self.tables
            .read()
            .expect("store lock poisoned")
            .get(&store)
            .and_then(|table| table.get(&key).cloned())
            .unwrap_or_else(|| key.default_value())
    }

    /// Replaces the value and notifies watchers of that key, synchronously,
    /// in registration order.
    pub fn update(&self, store: StoreName, key: CallKey, value: Value) {
        {
            let mut tables = self.tables.write().expect("store lock poisoned");
            tables.entry(store).or_default().insert(key, value.clone());
        }
        self.notify(store, key, &value);
    }

    /// Atomic multi-key update: all values are written before any watcher
    /// fires, so a watcher reading a sibling key sees the full batch.
    pub fn update_store(&self, entries: Vec<(CallKey, Value)>, store: StoreName) {
        {
            let mut tables = self.tables.write().expect("store lock poisoned");
            let table = tables.entry(store).or_default();
            for (key, value) in &entries {
                table.insert(*key, value.clone());
            }
        }
        for (key, value) in &entries {
            self.notify(store, *key, value);
        }
    }

    /// Restores each key to its default. Watchers are suppressed when
    /// `notify` is false, except for the force-notify set
    /// ([`CallKey::force_notify_on_reset`]).
    pub fn reset(&self, store: StoreName, keys: &[CallKey], notify: bool) {
        {
            let mut tables = self.tables.write().expect("store lock poisoned");
            let table = tables.entry(store).or_default();
            for key in keys {
                table.insert(*key, key.default_value());
            }
        }
        for key in keys {
            if notify || key.force_notify_on_reset() {
                self.notify(store, *key, &key.default_value());
            }
        }
    }

    /// Registers a watcher invoked with the new value whenever `key`
    /// changes through `update`, `update_store`, or a notifying `reset`.
    pub fn watch(
        &self,
        store: StoreName,
        key: CallKey,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> WatchId {
        let id = WatchId(self.next_watch_id.fetch_add(1, Ordering::Relaxed));
        self.watchers
            .write()
            .expect("store lock poisoned")
            .entry((store, key))
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn unwatch(&self, store: StoreName, key: CallKey, id: WatchId) {
        if let Some(list) = self
            .watchers
            .write()
            .expect("store lock poisoned")
            .get_mut(&(store, key))
        {
            list.retain(|(watch_id, _)| *watch_id != id);
        }
    }

    fn notify(&self, store: StoreName, key: CallKey, value: &Value) {
        let handlers: Vec<WatchHandler> = self
            .watchers
            .read()
            .expect("store lock poisoned")
            .get(&(store, key))
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(value);
        }
    }

    // Typed accessors for the keys orchestration code reads constantly.
    // Each returns the default when the stored variant is unexpected,
    // which cannot happen through the public API.

    pub fn call_status(&self) -> CallStatus {
        match self.get_data(StoreName::Call, CallKey::CallStatus) {
            Value::Status(status) => status,
            _ => CallStatus::Idle,
        }
    }

    pub fn call_media_type(&self) -> CallMediaType {
        match self.get_data(StoreName::Call, CallKey::CallMediaType) {
            Value::Media(media) => media,
            _ => CallMediaType::Audio,
        }
    }

    pub fn call_role(&self) -> CallRole {
        match self.get_data(StoreName::Call, CallKey::CallRole) {
            Value::Role(role) => role,
            _ => CallRole::Unknown,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(
            self.get_data(StoreName::Call, CallKey::IsGroup),
            Value::Bool(true)
        )
    }

    pub fn is_minimized(&self) -> bool {
        matches!(
            self.get_data(StoreName::Call, CallKey::IsMinimized),
            Value::Bool(true)
        )
    }

    pub fn local_user(&self) -> UserInfo {
        match self.get_data(StoreName::Call, CallKey::LocalUserInfo) {
            Value::User(user) => user,
            _ => UserInfo::default(),
        }
    }

    pub fn local_user_exclude_volume(&self) -> UserInfo {
        match self.get_data(StoreName::Call, CallKey::LocalUserInfoExcludeVolume) {
            Value::User(user) => user,
            _ => UserInfo::default(),
        }
    }

    pub fn remote_users(&self) -> Vec<UserInfo> {
        match self.get_data(StoreName::Call, CallKey::RemoteUserInfoList) {
            Value::UserList(list) => list,
            _ => Vec::new(),
        }
    }

    pub fn remote_users_exclude_volume(&self) -> Vec<UserInfo> {
        match self.get_data(StoreName::Call, CallKey::RemoteUserInfoExcludeVolumeList) {
            Value::UserList(list) => list,
            _ => Vec::new(),
        }
    }

    pub fn camera_position(&self) -> CameraPosition {
        match self.get_data(StoreName::Call, CallKey::CameraPosition) {
            Value::Camera(position) => position,
            _ => CameraPosition::Front,
        }
    }

    pub fn video_resolution(&self) -> VideoResolution {
        match self.get_data(StoreName::Call, CallKey::VideoResolution) {
            Value::Resolution(resolution) => resolution,
            _ => VideoResolution::default(),
        }
    }

    pub fn group_id(&self) -> Option<String> {
        match self.get_data(StoreName::Call, CallKey::GroupId) {
            Value::OptText(id) => id,
            _ => None,
        }
    }
}
