//! Engine event loop.
//!
//! One background task per service consumes the engine's event stream and
//! mirrors it into the store: participant enter/leave, per-user media
//! availability, volume samples, incoming invitations, and terminal events
//! (cancel, end, kicked, error).

use super::ServiceInner;
use crate::engine::EngineEvent;
use crate::status::CallStatus;
use crate::store::{CallKey, StoreName, Value};
use crate::types::{CallRole, CallTips, UserInfo};
use log::{debug, error, warn};

impl ServiceInner {
    pub(super) async fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Invited {
                sponsor,
                user_id_list,
                group_id,
                media_type,
            } => {
                self.handle_invited(sponsor, user_id_list, group_id, media_type)
                    .await;
            }
            EngineEvent::UserEnter { user_id } => {
                self.mark_remote_entered(&user_id);
                // First participant entering confirms the caller's session.
                if self.store.call_status() == CallStatus::Calling
                    && self.store.call_role() == CallRole::Caller
                {
                    self.store.update(
                        StoreName::Call,
                        CallKey::CallStatus,
                        Value::Status(CallStatus::Connected),
                    );
                    self.store
                        .update(StoreName::Call, CallKey::IsClickable, Value::Bool(true));
                    self.timer.start(self.store.clone());
                }
            }
            EngineEvent::UserLeave { user_id } => {
                self.remove_remote_users(&[user_id]);
            }
            EngineEvent::RejectedByUser { user_id, line_busy } => {
                debug!("call rejected by {user_id} (line busy: {line_busy})");
                self.remove_remote_users(&[user_id]);
            }
            EngineEvent::NoResponse { user_id_list } => {
                debug!("no response from {user_id_list:?}");
                self.remove_remote_users(&user_id_list);
            }
            EngineEvent::CallCancelled { user_id } => {
                debug!("call cancelled by {user_id}");
                self.end_session();
            }
            EngineEvent::CallEnded => {
                self.end_session();
            }
            EngineEvent::UserVideoAvailable { user_id, available } => {
                self.set_remote_availability(&user_id, available, true);
            }
            EngineEvent::UserAudioAvailable { user_id, available } => {
                self.set_remote_availability(&user_id, available, false);
            }
            EngineEvent::UserVoiceVolume { volumes } => {
                self.apply_voice_volumes(&volumes);
            }
            EngineEvent::Kicked => {
                warn!("kicked out by a concurrent login");
                self.callbacks.kicked_out();
                self.reset_call_store();
            }
            EngineEvent::MessageSentByMe(message) => {
                self.callbacks.message_sent_by_me(&message);
            }
            EngineEvent::Error { code, message } => {
                error!("engine error {code}: {message}");
                self.reset_call_store();
            }
        }
    }

    async fn handle_invited(
        &self,
        sponsor: String,
        user_id_list: Vec<String>,
        group_id: Option<String>,
        media_type: crate::types::CallMediaType,
    ) {
        if self.store.call_status() != CallStatus::Idle {
            debug!("invitation from {sponsor} ignored: session already live");
            return;
        }

        let local_id = self.store.local_user().user_id;
        let mut ids = vec![sponsor.clone()];
        ids.extend(
            user_id_list
                .into_iter()
                .filter(|id| *id != sponsor && *id != local_id),
        );

        let mut remote: Vec<UserInfo> = ids.iter().map(UserInfo::new).collect();
        if let Some(chat) = &self.chat {
            match chat.remote_user_profiles(&ids).await {
                Ok(profiles) if !profiles.is_empty() => remote = profiles,
                Ok(_) => {}
                Err(e) => warn!("profile lookup for invitation failed: {e}"),
            }
        }

        let is_group = group_id.is_some();
        self.store.update_store(
            vec![
                (CallKey::CallRole, Value::Role(CallRole::Callee)),
                (CallKey::CallMediaType, Value::Media(media_type)),
                (CallKey::IsGroup, Value::Bool(is_group)),
                (CallKey::GroupId, Value::OptText(group_id)),
                (CallKey::CallTips, Value::Tips(Some(CallTips::CalleeCalling))),
                (CallKey::RemoteUserInfoList, Value::UserList(remote.clone())),
                (
                    CallKey::RemoteUserInfoExcludeVolumeList,
                    Value::UserList(remote),
                ),
                (CallKey::CallStatus, Value::Status(CallStatus::Calling)),
            ],
            StoreName::Call,
        );
    }

    /// Terminal engine events: notify the host and tear the session down.
    fn end_session(&self) {
        if self.store.call_status() == CallStatus::Idle {
            return;
        }
        self.callbacks.after_calling();
        self.reset_call_store();
    }

    fn mark_remote_entered(&self, user_id: &str) {
        for key in [
            CallKey::RemoteUserInfoList,
            CallKey::RemoteUserInfoExcludeVolumeList,
        ] {
            let mut list = match self.store.get_data(StoreName::Call, key) {
                Value::UserList(list) => list,
                _ => Vec::new(),
            };
            if let Some(user) = list.iter_mut().find(|u| u.user_id == user_id) {
                user.is_enter = true;
            } else {
                let mut user = UserInfo::new(user_id);
                user.is_enter = true;
                list.push(user);
            }
            self.store.update(StoreName::Call, key, Value::UserList(list));
        }
    }

    fn remove_remote_users(&self, user_ids: &[String]) {
        for key in [
            CallKey::RemoteUserInfoList,
            CallKey::RemoteUserInfoExcludeVolumeList,
        ] {
            let mut list = match self.store.get_data(StoreName::Call, key) {
                Value::UserList(list) => list,
                _ => Vec::new(),
            };
            list.retain(|u| !user_ids.contains(&u.user_id));
            self.store.update(StoreName::Call, key, Value::UserList(list));
        }
        if self.store.remote_users().is_empty() {
            self.end_session();
        }
    }

    fn set_remote_availability(&self, user_id: &str, available: bool, video: bool) {
        for key in [
            CallKey::RemoteUserInfoList,
            CallKey::RemoteUserInfoExcludeVolumeList,
        ] {
            let mut list = match self.store.get_data(StoreName::Call, key) {
                Value::UserList(list) => list,
                _ => Vec::new(),
            };
            if let Some(user) = list.iter_mut().find(|u| u.user_id == user_id) {
                if video {
                    user.is_video_available = available;
                } else {
                    user.is_audio_available = available;
                }
                self.store.update(StoreName::Call, key, Value::UserList(list));
            }
        }
    }

    /// Volume samples only touch the volume-carrying keys; the
    /// exclude-volume shadows stay untouched so their watchers stay quiet.
    fn apply_voice_volumes(&self, volumes: &[(String, u32)]) {
        let mut local = self.store.local_user();
        let mut remote = self.store.remote_users();
        let mut local_changed = false;
        let mut remote_changed = false;

        for (user_id, volume) in volumes {
            if *user_id == local.user_id {
                local.volume = *volume;
                local_changed = true;
            } else if let Some(user) = remote.iter_mut().find(|u| u.user_id == *user_id) {
                user.volume = *volume;
                remote_changed = true;
            }
        }

        if local_changed {
            self.store
                .update(StoreName::Call, CallKey::LocalUserInfo, Value::User(local));
        }
        if remote_changed {
            self.store.update(
                StoreName::Call,
                CallKey::RemoteUserInfoList,
                Value::UserList(remote),
            );
        }
    }
}
