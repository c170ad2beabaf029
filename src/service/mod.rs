//! Call orchestration facade.
//!
//! [`CallService`] is the single mutation path for call state: it sequences
//! engine operations, applies optimistic store updates, and rolls the whole
//! session back to idle on failure. Every user-facing operation follows the
//! same shape: repeated-call guard, parameter validation, status guard,
//! optimistic store writes, engine call, confirmed writes or reset.

mod events;
mod validate;

pub mod callbacks;

use crate::bell::{BellContext, BellProperties, BellSink, local_mp3_exists};
use crate::chat::ChatIntegration;
use crate::duration::DurationTimer;
use crate::engine::{
    CallEngine, CallParams, DEFAULT_BLUR_LEVEL, DialResponse, EngineError, GroupCallParams,
    InitParams, InviteUserParams, JoinInGroupCallParams, ReportLogEntry, SelfInfoParams,
    SwitchDeviceParams,
};
use crate::error::CallError;
use crate::status::{CallStatus, StatusChange, status_change_tag};
use crate::store::{CallKey, Store, StoreName, Value};
use crate::types::{
    CallMediaType, CallRole, CallTips, CameraPosition, ChatMessage, DeviceInfo, DeviceKind,
    DeviceList, GroupMember, GroupProfile, Language, OfflinePushInfo, ToastInfo, UserInfo,
    VideoDisplayMode, VideoResolution,
};
use callbacks::{CallbackParams, Callbacks};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, error, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// View id the local camera preview renders into.
pub const LOCAL_VIDEO_VIEW: &str = "local-video";

#[derive(Debug, Clone)]
pub struct CallServiceConfig {
    /// Component name attached to engine log reports.
    pub component: String,
}

impl Default for CallServiceConfig {
    fn default() -> Self {
        Self {
            component: String::from("call-kit"),
        }
    }
}

/// The orchestration facade. Cheap to clone through its inner [`Arc`]; all
/// state lives in the store and the engine.
pub struct CallService {
    inner: Arc<ServiceInner>,
}

pub(crate) struct ServiceInner {
    pub(crate) store: Arc<Store>,
    pub(crate) engine: Arc<dyn CallEngine>,
    pub(crate) chat: Option<Arc<dyn ChatIntegration>>,
    pub(crate) bell: BellContext,
    pub(crate) callbacks: Callbacks,
    pub(crate) timer: DurationTimer,
    config: CallServiceConfig,
    /// Operation names currently in flight; a second invocation while the
    /// first is pending is a silent no-op.
    in_flight: DashMap<&'static str, ()>,
    initialized: AtomicBool,
    is_from_chat: AtomicBool,
    current_group_id: Mutex<String>,
    default_offline_push: Mutex<Option<OfflinePushInfo>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl CallService {
    /// Builds the service, registers the status watcher, and spawns the
    /// engine event loop. Must be called inside a tokio runtime.
    pub fn new(
        store: Arc<Store>,
        engine: Arc<dyn CallEngine>,
        chat: Option<Arc<dyn ChatIntegration>>,
        bell_sink: Arc<dyn BellSink>,
        config: CallServiceConfig,
    ) -> Arc<Self> {
        let inner = Arc::new(ServiceInner {
            bell: BellContext::new(bell_sink),
            callbacks: Callbacks::default(),
            timer: DurationTimer::new(),
            in_flight: DashMap::new(),
            initialized: AtomicBool::new(false),
            is_from_chat: AtomicBool::new(false),
            current_group_id: Mutex::new(String::new()),
            default_offline_push: Mutex::new(None),
            event_task: Mutex::new(None),
            store,
            engine,
            chat,
            config,
        });

        // Bell, tips, and chat reconciliation all key off status changes.
        let weak = Arc::downgrade(&inner);
        inner
            .store
            .watch(StoreName::Call, CallKey::CallStatus, move |value| {
                if let Value::Status(status) = value {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_call_status_change(*status);
                    }
                }
            });

        let mut events = inner.engine.subscribe();
        let weak = Arc::downgrade(&inner);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_engine_event(event).await;
            }
        });
        *inner
            .event_task
            .lock()
            .expect("event task lock poisoned") = Some(task);

        Arc::new(Self { inner })
    }

    /// Validates credentials, logs the engine in, and seeds the local user.
    /// A second init while one is pending, or after success, is a no-op.
    pub async fn init(&self, params: InitParams) -> Result<(), CallError> {
        let inner = &self.inner;
        let Some(_op) = inner.begin_op("init") else {
            debug!("init ignored: already in flight");
            return Ok(());
        };
        validate::validate_init(&params)?;
        if inner.initialized.load(Ordering::SeqCst) {
            debug!("init ignored: already initialized");
            return Ok(());
        }

        let local = UserInfo::new(&params.user_id);
        inner.store.update_store(
            vec![
                (CallKey::LocalUserInfo, Value::User(local.clone())),
                (CallKey::LocalUserInfoExcludeVolume, Value::User(local)),
            ],
            StoreName::Call,
        );

        inner.engine.login(&params).await?;
        inner.initialized.store(true, Ordering::SeqCst);
        inner
            .is_from_chat
            .store(params.is_from_chat, Ordering::SeqCst);
        inner.engine.report_log(ReportLogEntry {
            name: "callkit.init",
            data: serde_json::json!({
                "component": inner.config.component,
                "version": VERSION,
            }),
        });
        Ok(())
    }

    /// Tears the service down. Refused while a session is live so a stray
    /// page teardown cannot drop an active call.
    pub async fn destroyed(&self) -> Result<(), CallError> {
        let inner = &self.inner;
        let status = inner.store.call_status();
        if status != CallStatus::Idle {
            return Err(CallError::NotIdle(status));
        }
        if inner.initialized.swap(false, Ordering::SeqCst) {
            inner.engine.logout().await?;
            inner.engine.destroy_instance().await?;
        }
        inner.bell.stop();
        inner.timer.stop();
        if let Some(task) = inner
            .event_task
            .lock()
            .expect("event task lock poisoned")
            .take()
        {
            task.abort();
        }
        Ok(())
    }

    /// Starts a one-to-one call.
    pub async fn call(&self, params: CallParams) -> Result<(), CallError> {
        let inner = &self.inner;
        let Some(_op) = inner.begin_op("call") else {
            debug!("call ignored: already in flight");
            return Ok(());
        };
        validate::validate_call(&params)?;
        inner.ensure_initialized()?;
        if inner.store.call_status() != CallStatus::Idle {
            warn!(
                "call ignored: session status is {:?}",
                inner.store.call_status()
            );
            return Ok(());
        }

        inner
            .update_call_store_before_call(
                params.media_type,
                vec![UserInfo::new(&params.user_id)],
                None,
            )
            .await;
        inner.callbacks.before_calling();

        let mut params = params;
        if params.offline_push_info.is_none() {
            params.offline_push_info = Some(inner.default_offline_push());
        }
        match inner.engine.call(&params).await {
            Ok(response) => {
                inner.update_call_store_after_call(response).await;
                Ok(())
            }
            Err(e) => inner.handle_call_error(e, "call"),
        }
    }

    /// Starts a group call with the given members.
    pub async fn group_call(&self, params: GroupCallParams) -> Result<(), CallError> {
        let inner = &self.inner;
        let Some(_op) = inner.begin_op("group_call") else {
            debug!("group call ignored: already in flight");
            return Ok(());
        };
        validate::validate_group_call(&params)?;
        inner.ensure_initialized()?;
        if inner.store.call_status() != CallStatus::Idle {
            warn!(
                "group call ignored: session status is {:?}",
                inner.store.call_status()
            );
            return Ok(());
        }

        let local_id = inner.store.local_user().user_id;
        let remote: Vec<UserInfo> = params
            .user_id_list
            .iter()
            .filter(|id| **id != local_id)
            .map(UserInfo::new)
            .collect();
        inner
            .update_call_store_before_call(
                params.media_type,
                remote,
                Some(params.group_id.clone()),
            )
            .await;
        inner.callbacks.before_calling();

        let mut params = params;
        if params.offline_push_info.is_none() {
            params.offline_push_info = Some(inner.default_offline_push());
        }
        match inner.engine.group_call(&params).await {
            Ok(response) => {
                inner.update_call_store_after_call(response).await;
                Ok(())
            }
            Err(e) => inner.handle_call_error(e, "group_call"),
        }
    }

    /// Invites additional users into the live group session. Failures never
    /// tear the session down; they only leave the roster unchanged.
    pub async fn invite_user(&self, params: InviteUserParams) -> Result<(), CallError> {
        let inner = &self.inner;
        let Some(_op) = inner.begin_op("invite_user") else {
            debug!("invite ignored: already in flight");
            return Ok(());
        };
        validate::validate_invite_user(&params)?;
        if inner.store.call_status() == CallStatus::Idle {
            warn!("invite ignored: no live session");
            return Ok(());
        }

        match inner.engine.invite_user(&params).await {
            Ok(()) => {
                let existing = inner.store.remote_users();
                let new_ids: Vec<String> = params
                    .user_id_list
                    .iter()
                    .filter(|id| !existing.iter().any(|u| &u.user_id == *id))
                    .cloned()
                    .collect();
                if !new_ids.is_empty() {
                    inner.append_remote_users(&new_ids).await;
                }
            }
            Err(e) => error!("invite failed: {e}"),
        }
        Ok(())
    }

    /// Joins an already-running group call directly in the connected state.
    pub async fn join_in_group_call(
        &self,
        params: JoinInGroupCallParams,
    ) -> Result<(), CallError> {
        let inner = &self.inner;
        let Some(_op) = inner.begin_op("join_in_group_call") else {
            debug!("join ignored: already in flight");
            return Ok(());
        };
        validate::validate_join_in_group_call(&params)?;
        inner.ensure_initialized()?;
        if inner.store.call_status() == CallStatus::Connected {
            debug!("join ignored: already connected");
            return Ok(());
        }

        inner.store.update_store(
            vec![
                (CallKey::CallRole, Value::Role(CallRole::Callee)),
                (CallKey::IsGroup, Value::Bool(true)),
                (CallKey::CallMediaType, Value::Media(params.media_type)),
                (CallKey::GroupId, Value::OptText(Some(params.group_id.clone()))),
                (CallKey::RoomId, Value::Room(Some(params.room_id.clone()))),
                (CallKey::CallStatus, Value::Status(CallStatus::Connected)),
            ],
            StoreName::Call,
        );

        match inner.engine.join_in_group_call(&params).await {
            Ok(()) => {
                if params.media_type == CallMediaType::Video {
                    inner.open_camera_impl(LOCAL_VIDEO_VIEW).await;
                }
                inner
                    .store
                    .update(StoreName::Call, CallKey::IsClickable, Value::Bool(true));
                inner.timer.start(inner.store.clone());
                inner.update_device_list().await;
                if let Err(e) = inner
                    .engine
                    .set_video_quality(inner.store.video_resolution())
                    .await
                {
                    warn!("set video quality failed: {e}");
                }
                inner.mark_local_entered();
                inner.set_local_av_available(true, CallMediaType::Audio);
                Ok(())
            }
            Err(e) => inner.handle_call_error(e, "join_in_group_call"),
        }
    }

    /// Accepts the incoming invitation. Failures are absorbed: the session
    /// resets to idle and the caller sees `Ok`, matching the UI contract
    /// that an accept button press never surfaces an error dialog.
    pub async fn accept(&self) -> Result<(), CallError> {
        let inner = &self.inner;
        let Some(_op) = inner.begin_op("accept") else {
            debug!("accept ignored: already in flight");
            return Ok(());
        };
        inner.engine.report_log(ReportLogEntry {
            name: "callkit.accept.start",
            data: serde_json::json!({}),
        });
        if inner.store.call_status() == CallStatus::Connected {
            debug!("accept ignored: already connected");
            return Ok(());
        }

        inner.store.update(
            StoreName::Call,
            CallKey::CallStatus,
            Value::Status(CallStatus::Connected),
        );
        inner.update_device_list().await;

        match inner.engine.accept().await {
            Ok(Some(response)) => {
                if let Some(message) = response.message {
                    inner.deliver_call_message(message).await;
                }
                inner
                    .store
                    .update(StoreName::Call, CallKey::IsClickable, Value::Bool(true));
                inner.timer.start(inner.store.clone());
                if inner.store.call_media_type() == CallMediaType::Video {
                    inner.open_camera_impl(LOCAL_VIDEO_VIEW).await;
                }
                if let Err(e) = inner
                    .engine
                    .set_video_quality(inner.store.video_resolution())
                    .await
                {
                    warn!("set video quality failed: {e}");
                }
                inner.mark_local_entered();
                inner.set_local_av_available(true, CallMediaType::Audio);
            }
            Ok(None) => {
                debug!("accept resolved without a response; skipping confirmation");
            }
            Err(e) => {
                inner.engine.report_log(ReportLogEntry {
                    name: "callkit.accept.fail",
                    data: serde_json::json!({ "error": e.to_string() }),
                });
                match e {
                    EngineError::RepeatedCall(msg) => {
                        debug!("accept already in progress: {msg}");
                    }
                    EngineError::PermissionDenied { media } => {
                        error!("accept failed: device permission denied");
                        inner.store.update(
                            StoreName::Call,
                            CallKey::ToastInfo,
                            Value::Toast(Some(ToastInfo::NoDevicePermission {
                                media_type: media,
                            })),
                        );
                        inner.reset_call_store();
                    }
                    other => {
                        error!("accept failed: {other}");
                        inner.reset_call_store();
                    }
                }
            }
        }
        Ok(())
    }

    /// Rejects the incoming invitation and resets to idle.
    pub async fn reject(&self) -> Result<(), CallError> {
        let inner = &self.inner;
        let Some(_op) = inner.begin_op("reject") else {
            debug!("reject ignored: already in flight");
            return Ok(());
        };
        if inner.store.call_status() == CallStatus::Idle {
            return Ok(());
        }
        match inner.engine.reject().await {
            Ok(Some(response)) if response.code == 0 => {
                if let Some(message) = response.message {
                    inner.deliver_call_message(message).await;
                }
            }
            Ok(_) => {}
            Err(e) => debug!("reject signalling failed: {e}"),
        }
        inner.reset_call_store();
        Ok(())
    }

    /// Hangs up the live session and resets to idle. Signalling failures
    /// never keep the session alive.
    pub async fn hangup(&self) -> Result<(), CallError> {
        let inner = &self.inner;
        let Some(_op) = inner.begin_op("hangup") else {
            debug!("hangup ignored: already in flight");
            return Ok(());
        };
        if inner.store.call_status() == CallStatus::Idle {
            return Ok(());
        }
        match inner.engine.hangup().await {
            Ok(responses) => {
                for response in responses {
                    if response.code == 0 {
                        if let Some(message) = response.message {
                            inner.deliver_call_message(message).await;
                        }
                    } else {
                        debug!("hangup signal rejected with code {}", response.code);
                    }
                }
            }
            Err(e) => debug!("hangup signalling failed: {e}"),
        }
        inner.reset_call_store();
        Ok(())
    }

    /// Opens the local camera into the given view. Permission denial
    /// surfaces as a toast, never an error.
    pub async fn open_camera(&self, view_id: &str) -> Result<(), CallError> {
        self.inner.open_camera_impl(view_id).await;
        Ok(())
    }

    pub async fn close_camera(&self) -> Result<(), CallError> {
        let inner = &self.inner;
        match inner.engine.close_camera().await {
            Ok(()) => inner.set_local_av_available(false, CallMediaType::Video),
            Err(e) => error!("close camera failed: {e}"),
        }
        Ok(())
    }

    pub async fn open_microphone(&self) -> Result<(), CallError> {
        let inner = &self.inner;
        match inner.engine.open_microphone().await {
            Ok(()) => inner.set_local_av_available(true, CallMediaType::Audio),
            Err(EngineError::PermissionDenied { media }) => {
                error!("microphone permission denied");
                inner.store.update(
                    StoreName::Call,
                    CallKey::ToastInfo,
                    Value::Toast(Some(ToastInfo::NoDevicePermission { media_type: media })),
                );
            }
            Err(e) => error!("open microphone failed: {e}"),
        }
        Ok(())
    }

    pub async fn close_microphone(&self) -> Result<(), CallError> {
        let inner = &self.inner;
        match inner.engine.close_microphone().await {
            Ok(()) => inner.set_local_av_available(false, CallMediaType::Audio),
            Err(e) => error!("close microphone failed: {e}"),
        }
        Ok(())
    }

    pub async fn mute_speaker(&self) -> Result<(), CallError> {
        self.inner.set_speaker_mute(true).await;
        Ok(())
    }

    pub async fn unmute_speaker(&self) -> Result<(), CallError> {
        self.inner.set_speaker_mute(false).await;
        Ok(())
    }

    /// Moves the given participant onto the big screen.
    pub fn switch_screen(&self, user_id: &str) {
        if user_id.is_empty() {
            return;
        }
        self.inner.store.update(
            StoreName::Call,
            CallKey::BigScreenUserId,
            Value::OptText(Some(user_id.to_string())),
        );
    }

    /// Downgrades a video session to audio. The opposite direction is not
    /// supported.
    pub async fn switch_call_media_type(&self) -> Result<(), CallError> {
        let inner = &self.inner;
        if inner.store.call_media_type() == CallMediaType::Audio {
            warn!("media switch ignored: session is already audio");
            return Ok(());
        }
        match inner
            .engine
            .switch_call_media_type(CallMediaType::Audio)
            .await
        {
            Ok(response) => {
                if let Some(response) = response {
                    if response.code == 0 {
                        if let Some(message) = response.message {
                            inner.deliver_call_message(message).await;
                        }
                    } else {
                        warn!("media switch signal rejected with code {}", response.code);
                    }
                }
                let old = if inner.store.is_group() {
                    StatusChange::CallingGroupVideo
                } else {
                    StatusChange::CallingC2cVideo
                };
                inner.store.update(
                    StoreName::Call,
                    CallKey::CallMediaType,
                    Value::Media(CallMediaType::Audio),
                );
                inner
                    .callbacks
                    .status_changed(old, inner.current_status_tag());
            }
            Err(e) => warn!("media switch failed: {e}"),
        }
        Ok(())
    }

    /// Flips between the front and back camera.
    pub async fn switch_camera(&self) -> Result<(), CallError> {
        let inner = &self.inner;
        let target = match inner.store.camera_position() {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back => CameraPosition::Front,
        };
        match inner.engine.switch_camera(target).await {
            Ok(()) => inner.store.update(
                StoreName::Call,
                CallKey::CameraPosition,
                Value::Camera(target),
            ),
            Err(e) => warn!("camera switch failed: {e}"),
        }
        Ok(())
    }

    pub async fn switch_device(&self, params: SwitchDeviceParams) -> Result<(), CallError> {
        if let Err(e) = self.inner.engine.switch_device(&params).await {
            warn!("device switch failed: {e}");
        }
        Ok(())
    }

    /// Enables or disables the blurred virtual background.
    pub async fn set_blur_background(&self, enable: bool) -> Result<(), CallError> {
        let inner = &self.inner;
        let level = if enable { DEFAULT_BLUR_LEVEL } else { 0 };
        match inner.engine.set_blur_background(level).await {
            Ok(()) => inner.store.update(
                StoreName::Call,
                CallKey::EnableVirtualBackground,
                Value::Bool(enable),
            ),
            Err(e) => warn!("blur background failed: {e}"),
        }
        Ok(())
    }

    /// Enumerates devices of one kind. The only device operation that
    /// propagates engine failures, so pickers can show their own error
    /// state; the session is left untouched.
    pub async fn get_device_list(
        &self,
        kind: DeviceKind,
    ) -> Result<Vec<DeviceInfo>, CallError> {
        Ok(self.inner.engine.get_device_list(kind).await?)
    }

    pub async fn set_video_resolution(
        &self,
        resolution: VideoResolution,
    ) -> Result<(), CallError> {
        let inner = &self.inner;
        inner.store.update(
            StoreName::Call,
            CallKey::VideoResolution,
            Value::Resolution(resolution),
        );
        if let Err(e) = inner.engine.set_video_quality(resolution).await {
            warn!("set video quality failed: {e}");
        }
        Ok(())
    }

    pub fn set_video_display_mode(&self, mode: VideoDisplayMode) {
        self.inner.store.update(
            StoreName::Call,
            CallKey::DisplayMode,
            Value::DisplayMode(mode),
        );
    }

    pub fn set_language(&self, language: Language) {
        self.inner.store.update(
            StoreName::Call,
            CallKey::Language,
            Value::Language(language),
        );
    }

    pub fn enable_float_window(&self, enable: bool) {
        self.inner.store.update(
            StoreName::Call,
            CallKey::EnableFloatWindow,
            Value::Bool(enable),
        );
    }

    /// Shows or hides the virtual-background button in the call UI.
    pub fn enable_virtual_background(&self, enable: bool) {
        self.inner.store.update(
            StoreName::Call,
            CallKey::ShowVirtualBackgroundButton,
            Value::Bool(enable),
        );
    }

    /// Publishes the local user's display profile to the engine and mirrors
    /// it into the store.
    pub async fn set_self_info(&self, params: SelfInfoParams) -> Result<(), CallError> {
        let inner = &self.inner;
        inner.engine.set_self_info(&params).await?;
        for key in [CallKey::LocalUserInfo, CallKey::LocalUserInfoExcludeVolume] {
            let mut user = match inner.store.get_data(StoreName::Call, key) {
                Value::User(user) => user,
                _ => UserInfo::default(),
            };
            if let Some(nick) = &params.nick_name {
                user.nick = nick.clone();
            }
            if let Some(avatar) = &params.avatar {
                user.avatar = avatar.clone();
            }
            inner.store.update(StoreName::Call, key, Value::User(user));
        }
        Ok(())
    }

    /// Sets a custom callee ringtone. Only existing local `.mp3` files are
    /// accepted.
    pub fn set_calling_bell(&self, path: PathBuf) {
        if !local_mp3_exists(&path) {
            warn!("calling bell rejected: {} is not a local mp3", path.display());
            return;
        }
        self.inner.bell.set_callee_bell_file(path);
    }

    /// Mutes or unmutes the ringtone. Persists across calls.
    pub fn enable_mute_mode(&self, mute: bool) {
        self.inner.bell.set_mute(mute);
    }

    pub fn toggle_minimize(&self) {
        let old = self.inner.store.is_minimized();
        let new = !old;
        self.inner
            .store
            .update(StoreName::Call, CallKey::IsMinimized, Value::Bool(new));
        self.inner.callbacks.on_minimized(old, new);
        debug!("minimize toggled: {old} -> {new}");
    }

    /// Registers host callbacks. Hooks left unset keep their previous
    /// handler.
    pub fn set_callback(&self, params: CallbackParams) {
        self.inner.callbacks.set(params);
    }

    pub fn set_default_offline_push_info(&self, info: OfflinePushInfo) {
        *self
            .inner
            .default_offline_push
            .lock()
            .expect("push info lock poisoned") = Some(info);
    }

    pub fn set_is_from_chat(&self, is_from_chat: bool) {
        self.inner
            .is_from_chat
            .store(is_from_chat, Ordering::SeqCst);
    }

    pub fn set_current_group_id(&self, group_id: impl Into<String>) {
        *self
            .inner
            .current_group_id
            .lock()
            .expect("group id lock poisoned") = group_id.into();
    }

    pub fn current_group_id(&self) -> String {
        self.inner
            .current_group_id
            .lock()
            .expect("group id lock poisoned")
            .clone()
    }

    /// Fetches a page of the current session's group roster.
    pub async fn get_group_member_list(
        &self,
        count: u32,
        offset: u32,
    ) -> Result<Vec<GroupMember>, CallError> {
        let chat = self
            .inner
            .chat
            .as_ref()
            .ok_or(CallError::NoChatIntegration)?;
        let group_id = self.inner.store.group_id().unwrap_or_default();
        Ok(chat.group_member_list(&group_id, count, offset).await?)
    }

    pub async fn get_group_profile(&self) -> Result<GroupProfile, CallError> {
        let chat = self
            .inner
            .chat
            .as_ref()
            .ok_or(CallError::NoChatIntegration)?;
        let group_id = self.inner.store.group_id().unwrap_or_default();
        Ok(chat.group_profile(&group_id).await?)
    }

    /// Starts the duration timer. Normally driven by connect transitions;
    /// exposed for hosts that render their own connected surface.
    pub fn start_timer(&self) {
        self.inner.timer.start(self.inner.store.clone());
    }

    pub fn store(&self) -> Arc<Store> {
        self.inner.store.clone()
    }
}

impl ServiceInner {
    /// Claims `name` for the duration of the returned guard. `None` means
    /// an identical operation is already pending.
    fn begin_op(&self, name: &'static str) -> Option<impl Drop + '_> {
        match self.in_flight.entry(name) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(());
                Some(scopeguard::guard((), move |_| {
                    self.in_flight.remove(name);
                }))
            }
        }
    }

    fn ensure_initialized(&self) -> Result<(), CallError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CallError::NotInitialized)
        }
    }

    pub(crate) fn current_status_tag(&self) -> StatusChange {
        status_change_tag(
            self.store.is_group(),
            self.store.call_media_type(),
            self.store.call_status(),
        )
    }

    /// Optimistic writes before the engine dial: roster, role, tips, and
    /// the CALLING transition, then device and profile enrichment.
    async fn update_call_store_before_call(
        &self,
        media_type: CallMediaType,
        remote: Vec<UserInfo>,
        group_id: Option<String>,
    ) {
        let is_group = group_id.is_some();
        let tips = if is_group || self.store.is_minimized() {
            CallTips::CallerGroupCalling
        } else {
            CallTips::CallerCalling
        };
        self.store.update_store(
            vec![
                (CallKey::CallMediaType, Value::Media(media_type)),
                (CallKey::CallRole, Value::Role(CallRole::Caller)),
                (CallKey::RemoteUserInfoList, Value::UserList(remote.clone())),
                (
                    CallKey::RemoteUserInfoExcludeVolumeList,
                    Value::UserList(remote.clone()),
                ),
                (CallKey::IsGroup, Value::Bool(is_group)),
                (CallKey::CallTips, Value::Tips(Some(tips))),
                (CallKey::GroupId, Value::OptText(group_id)),
                (CallKey::CallStatus, Value::Status(CallStatus::Calling)),
            ],
            StoreName::Call,
        );
        let new_tag = if is_group {
            StatusChange::DialingGroup
        } else {
            StatusChange::DialingC2c
        };
        self.callbacks.status_changed(StatusChange::Idle, new_tag);

        self.update_device_list().await;

        if let Some(chat) = &self.chat {
            let ids: Vec<String> = remote.iter().map(|u| u.user_id.clone()).collect();
            match chat.remote_user_profiles(&ids).await {
                Ok(profiles) if !profiles.is_empty() => {
                    self.store.update_store(
                        vec![
                            (
                                CallKey::RemoteUserInfoList,
                                Value::UserList(profiles.clone()),
                            ),
                            (
                                CallKey::RemoteUserInfoExcludeVolumeList,
                                Value::UserList(profiles),
                            ),
                        ],
                        StoreName::Call,
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("remote profile lookup failed: {e}"),
            }
        }
    }

    /// Confirmed writes after a successful dial. A missing or rejecting
    /// response rolls the session back to idle.
    async fn update_call_store_after_call(&self, response: Option<DialResponse>) {
        let Some(response) = response else {
            warn!("dial resolved without a response; resetting");
            self.reset_call_store();
            return;
        };
        self.store
            .update(StoreName::Call, CallKey::IsClickable, Value::Bool(true));
        if let Some(room_id) = response.room_id.clone() {
            self.store
                .update(StoreName::Call, CallKey::RoomId, Value::Room(Some(room_id)));
        }
        if response.code != 0 {
            warn!("dial rejected with code {}; resetting", response.code);
            self.reset_call_store();
            return;
        }
        if let Some(message) = response.message {
            self.deliver_call_message(message).await;
        }
        if let Err(e) = self
            .engine
            .set_video_quality(self.store.video_resolution())
            .await
        {
            warn!("set video quality failed: {e}");
        }
        if self.store.call_media_type() == CallMediaType::Video {
            self.open_camera_impl(LOCAL_VIDEO_VIEW).await;
        }
        self.mark_local_entered();
        self.set_local_av_available(true, CallMediaType::Audio);
    }

    /// Classifies a dial failure. Repeated calls are silent; permission
    /// denials toast and reset; anything else resets and propagates.
    fn handle_call_error(&self, error: EngineError, op: &str) -> Result<(), CallError> {
        match error {
            EngineError::RepeatedCall(msg) => {
                debug!("{op} already in progress: {msg}");
                Ok(())
            }
            EngineError::PermissionDenied { media } => {
                error!("{op} failed: device permission denied");
                self.store.update(
                    StoreName::Call,
                    CallKey::ToastInfo,
                    Value::Toast(Some(ToastInfo::NoDevicePermission { media_type: media })),
                );
                self.reset_call_store();
                Ok(())
            }
            other => {
                error!("{op} failed: {other}");
                self.reset_call_store();
                Err(CallError::Engine(other))
            }
        }
    }

    /// Restores per-session state to defaults while keeping cross-session
    /// configuration and local identity. Fires `status_changed` exactly
    /// once when the observable tag actually changed.
    pub(crate) fn reset_call_store(&self) {
        let old_tag = self.current_status_tag();
        self.timer.stop();

        let non_sticky: Vec<CallKey> = CallKey::ALL
            .iter()
            .copied()
            .filter(|key| !key.sticky_on_reset())
            .collect();
        self.store.reset(StoreName::Call, &non_sticky, false);
        if self.store.call_status() != CallStatus::Idle {
            self.store
                .reset(StoreName::Call, &[CallKey::CallStatus], true);
        }

        // Local identity is sticky; its per-session flags are not.
        for key in [CallKey::LocalUserInfo, CallKey::LocalUserInfoExcludeVolume] {
            let mut user = match self.store.get_data(StoreName::Call, key) {
                Value::User(user) => user,
                _ => UserInfo::default(),
            };
            user.is_video_available = false;
            user.is_audio_available = false;
            user.is_enter = false;
            user.volume = 0;
            self.store.update(StoreName::Call, key, Value::User(user));
        }

        let new_tag = self.current_status_tag();
        if old_tag != new_tag {
            self.callbacks.status_changed(old_tag, new_tag);
        }
    }

    /// Status watcher body. Runs synchronously inside store notification,
    /// after all store locks are released.
    fn handle_call_status_change(&self, status: CallStatus) {
        self.bell.set_properties(BellProperties {
            call_role: Some(self.store.call_role()),
            ..Default::default()
        });
        match status {
            CallStatus::Calling => {
                self.bell.play();
                return;
            }
            CallStatus::Connected => {
                self.store
                    .update(StoreName::Call, CallKey::CallTips, Value::Tips(None));
                let is_group = self.store.is_group();
                let old = if is_group {
                    StatusChange::DialingGroup
                } else {
                    StatusChange::DialingC2c
                };
                self.callbacks.status_changed(old, self.current_status_tag());
                if !is_group && self.store.call_media_type() == CallMediaType::Video {
                    if let Some(first) = self.store.remote_users().first() {
                        self.store.update(
                            StoreName::Call,
                            CallKey::BigScreenUserId,
                            Value::OptText(Some(first.dom_id.clone())),
                        );
                    }
                }
            }
            CallStatus::Idle => {
                if self.is_from_chat.load(Ordering::SeqCst) {
                    if let Some(chat) = self.chat.clone() {
                        let store = self.store.clone();
                        let group_id = self
                            .current_group_id
                            .lock()
                            .expect("group id lock poisoned")
                            .clone();
                        tokio::spawn(async move {
                            let attributes = if group_id.is_empty() {
                                serde_json::json!({})
                            } else {
                                match chat.group_attributes(&group_id).await {
                                    Ok(attributes) => attributes,
                                    Err(e) => {
                                        warn!("group attribute lookup failed: {e}");
                                        serde_json::json!({})
                                    }
                                }
                            };
                            chat.reconcile_group_attributes(attributes, &store).await;
                        });
                    }
                }
            }
        }
        self.bell.stop();
    }

    async fn open_camera_impl(&self, view_id: &str) {
        let front = self.store.camera_position() == CameraPosition::Front;
        match self.engine.open_camera(view_id, front).await {
            Ok(()) => self.set_local_av_available(true, CallMediaType::Video),
            Err(EngineError::PermissionDenied { .. }) => {
                error!("camera permission denied");
                self.store.update(
                    StoreName::Call,
                    CallKey::ToastInfo,
                    Value::Toast(Some(ToastInfo::NoDevicePermission {
                        media_type: CallMediaType::Video,
                    })),
                );
            }
            Err(e) => error!("open camera failed: {e}"),
        }
    }

    async fn set_speaker_mute(&self, mute: bool) {
        if let Err(e) = self.engine.mute_all_remote_audio(mute).await {
            warn!("speaker mute failed: {e}");
            return;
        }
        self.store
            .update(StoreName::Call, CallKey::IsMuteSpeaker, Value::Bool(mute));
    }

    async fn update_device_list(&self) {
        let mut list = DeviceList::default();
        for kind in [DeviceKind::Camera, DeviceKind::Microphone, DeviceKind::Speaker] {
            match self.engine.get_device_list(kind).await {
                Ok(devices) => match kind {
                    DeviceKind::Camera => list.cameras = devices,
                    DeviceKind::Microphone => list.microphones = devices,
                    DeviceKind::Speaker => list.speakers = devices,
                },
                Err(e) => debug!("device enumeration failed for {kind:?}: {e}"),
            }
        }
        self.store
            .update(StoreName::Call, CallKey::DeviceList, Value::Devices(list));
    }

    /// Appends the given users to both remote rosters, enriched with chat
    /// profiles when available.
    async fn append_remote_users(&self, user_ids: &[String]) {
        let mut added: Vec<UserInfo> = user_ids.iter().map(UserInfo::new).collect();
        if let Some(chat) = &self.chat {
            match chat.remote_user_profiles(user_ids).await {
                Ok(profiles) if !profiles.is_empty() => added = profiles,
                Ok(_) => {}
                Err(e) => warn!("invitee profile lookup failed: {e}"),
            }
        }
        let mut remote = self.store.remote_users();
        remote.extend(added.clone());
        let mut remote_excl = self.store.remote_users_exclude_volume();
        remote_excl.extend(added);
        self.store.update_store(
            vec![
                (CallKey::RemoteUserInfoList, Value::UserList(remote)),
                (
                    CallKey::RemoteUserInfoExcludeVolumeList,
                    Value::UserList(remote_excl),
                ),
            ],
            StoreName::Call,
        );
    }

    fn set_local_av_available(&self, available: bool, media: CallMediaType) {
        for key in [CallKey::LocalUserInfo, CallKey::LocalUserInfoExcludeVolume] {
            let mut user = match self.store.get_data(StoreName::Call, key) {
                Value::User(user) => user,
                _ => UserInfo::default(),
            };
            match media {
                CallMediaType::Audio => user.is_audio_available = available,
                CallMediaType::Video => user.is_video_available = available,
            }
            self.store.update(StoreName::Call, key, Value::User(user));
        }
    }

    fn mark_local_entered(&self) {
        for key in [CallKey::LocalUserInfo, CallKey::LocalUserInfoExcludeVolume] {
            let mut user = match self.store.get_data(StoreName::Call, key) {
                Value::User(user) => user,
                _ => UserInfo::default(),
            };
            user.is_enter = true;
            self.store.update(StoreName::Call, key, Value::User(user));
        }
    }

    async fn deliver_call_message(&self, message: ChatMessage) {
        if let Some(chat) = &self.chat {
            if let Err(e) = chat.deliver_call_message(message).await {
                warn!("call record delivery failed: {e}");
            }
        }
    }

    fn default_offline_push(&self) -> OfflinePushInfo {
        if let Some(info) = self
            .default_offline_push
            .lock()
            .expect("push info lock poisoned")
            .clone()
        {
            return info;
        }
        let local = self.store.local_user();
        OfflinePushInfo {
            title: local.display_name().to_string(),
            description: String::from("you have a new call"),
        }
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        if let Some(task) = self
            .event_task
            .lock()
            .expect("event task lock poisoned")
            .take()
        {
            task.abort();
        }
        self.timer.stop();
    }
}
