use callkit::bell::{BellSink, BellSource};
use callkit::engine::{
    AcceptResponse, CallEngine, CallParams, DialResponse, EngineError, EngineEvent,
    GroupCallParams, InitParams, InviteUserParams, JoinInGroupCallParams, ReportLogEntry,
    SelfInfoParams, SignalResponse, SwitchDeviceParams,
};
use callkit::types::{
    CallMediaType, CallRole, CallTips, CameraPosition, DeviceInfo, DeviceKind, RoomId, ToastInfo,
    VideoResolution,
};
use callkit::{
    CallKey, CallService, CallServiceConfig, CallStatus, CallbackParams, StatusChange, Store,
    StoreName, Value,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

struct NullBellSink;

impl BellSink for NullBellSink {
    fn play(&self, _source: BellSource) {}
    fn stop(&self) {}
    fn set_muted(&self, _muted: bool) {}
}

/// Scripted engine: records invocations, replays configured dial results,
/// and exposes its event sender so tests can inject remote-side events.
struct MockEngine {
    invocations: Mutex<Vec<&'static str>>,
    dial_result: Mutex<Result<Option<DialResponse>, EngineError>>,
    /// When set, `call` blocks until notified, so tests can overlap a
    /// second invocation with a pending first one.
    dial_gate: Mutex<Option<Arc<Notify>>>,
    hangup_gate: Mutex<Option<Arc<Notify>>>,
    accept_result: Mutex<Result<Option<AcceptResponse>, EngineError>>,
    switch_result: Mutex<Result<Option<SignalResponse>, EngineError>>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<EngineEvent>>>,
}

impl MockEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            invocations: Mutex::new(Vec::new()),
            dial_result: Mutex::new(Ok(Some(DialResponse {
                code: 0,
                room_id: Some(RoomId::Numeric(42)),
                message: None,
            }))),
            dial_gate: Mutex::new(None),
            hangup_gate: Mutex::new(None),
            accept_result: Mutex::new(Ok(Some(AcceptResponse { message: None }))),
            switch_result: Mutex::new(Ok(Some(SignalResponse {
                code: 0,
                message: None,
            }))),
            event_tx: Mutex::new(None),
        })
    }

    fn record(&self, name: &'static str) {
        self.invocations.lock().unwrap().push(name);
    }

    fn count(&self, name: &'static str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|n| **n == name)
            .count()
    }

    fn set_dial_result(&self, result: Result<Option<DialResponse>, EngineError>) {
        *self.dial_result.lock().unwrap() = result;
    }

    fn set_dial_gate(&self, gate: Arc<Notify>) {
        *self.dial_gate.lock().unwrap() = Some(gate);
    }

    fn set_hangup_gate(&self, gate: Arc<Notify>) {
        *self.hangup_gate.lock().unwrap() = Some(gate);
    }

    fn set_accept_result(&self, result: Result<Option<AcceptResponse>, EngineError>) {
        *self.accept_result.lock().unwrap() = result;
    }

    fn set_switch_result(&self, result: Result<Option<SignalResponse>, EngineError>) {
        *self.switch_result.lock().unwrap() = result;
    }

    fn send_event(&self, event: EngineEvent) {
        self.event_tx
            .lock()
            .unwrap()
            .as_ref()
            .expect("no subscriber")
            .send(event)
            .expect("event loop gone");
    }
}

#[async_trait]
impl CallEngine for MockEngine {
    async fn login(&self, _params: &InitParams) -> Result<(), EngineError> {
        self.record("login");
        Ok(())
    }

    async fn logout(&self) -> Result<(), EngineError> {
        self.record("logout");
        Ok(())
    }

    async fn call(&self, _params: &CallParams) -> Result<Option<DialResponse>, EngineError> {
        self.record("call");
        let gate = self.dial_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.dial_result.lock().unwrap().clone()
    }

    async fn group_call(
        &self,
        _params: &GroupCallParams,
    ) -> Result<Option<DialResponse>, EngineError> {
        self.record("group_call");
        self.dial_result.lock().unwrap().clone()
    }

    async fn accept(&self) -> Result<Option<AcceptResponse>, EngineError> {
        self.record("accept");
        self.accept_result.lock().unwrap().clone()
    }

    async fn reject(&self) -> Result<Option<SignalResponse>, EngineError> {
        self.record("reject");
        Ok(Some(SignalResponse {
            code: 0,
            message: None,
        }))
    }

    async fn hangup(&self) -> Result<Vec<SignalResponse>, EngineError> {
        self.record("hangup");
        let gate = self.hangup_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(Vec::new())
    }

    async fn invite_user(&self, _params: &InviteUserParams) -> Result<(), EngineError> {
        self.record("invite_user");
        Ok(())
    }

    async fn join_in_group_call(
        &self,
        _params: &JoinInGroupCallParams,
    ) -> Result<(), EngineError> {
        self.record("join_in_group_call");
        Ok(())
    }

    async fn open_camera(&self, _view_id: &str, _front: bool) -> Result<(), EngineError> {
        self.record("open_camera");
        Ok(())
    }

    async fn close_camera(&self) -> Result<(), EngineError> {
        self.record("close_camera");
        Ok(())
    }

    async fn open_microphone(&self) -> Result<(), EngineError> {
        self.record("open_microphone");
        Ok(())
    }

    async fn close_microphone(&self) -> Result<(), EngineError> {
        self.record("close_microphone");
        Ok(())
    }

    async fn switch_camera(&self, _position: CameraPosition) -> Result<(), EngineError> {
        self.record("switch_camera");
        Ok(())
    }

    async fn switch_call_media_type(
        &self,
        _media_type: CallMediaType,
    ) -> Result<Option<SignalResponse>, EngineError> {
        self.record("switch_call_media_type");
        self.switch_result.lock().unwrap().clone()
    }

    async fn switch_device(&self, _params: &SwitchDeviceParams) -> Result<(), EngineError> {
        self.record("switch_device");
        Ok(())
    }

    async fn set_video_quality(&self, _resolution: VideoResolution) -> Result<(), EngineError> {
        self.record("set_video_quality");
        Ok(())
    }

    async fn get_device_list(&self, _kind: DeviceKind) -> Result<Vec<DeviceInfo>, EngineError> {
        self.record("get_device_list");
        Ok(Vec::new())
    }

    async fn set_blur_background(&self, _level: u32) -> Result<(), EngineError> {
        self.record("set_blur_background");
        Ok(())
    }

    async fn set_self_info(&self, _params: &SelfInfoParams) -> Result<(), EngineError> {
        self.record("set_self_info");
        Ok(())
    }

    async fn mute_all_remote_audio(&self, _mute: bool) -> Result<(), EngineError> {
        self.record("mute_all_remote_audio");
        Ok(())
    }

    async fn destroy_instance(&self) -> Result<(), EngineError> {
        self.record("destroy_instance");
        Ok(())
    }

    fn report_log(&self, _entry: ReportLogEntry) {}

    fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.event_tx.lock().unwrap() = Some(tx);
        rx
    }
}

fn make_service(engine: Arc<MockEngine>) -> (Arc<CallService>, Arc<Store>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Store::new();
    let service = CallService::new(
        store.clone(),
        engine,
        None,
        Arc::new(NullBellSink),
        CallServiceConfig::default(),
    );
    (service, store)
}

async fn init_service(service: &CallService) {
    service
        .init(InitParams {
            user_id: "alice".into(),
            user_sig: "sig".into(),
            sdk_app_id: 1,
            is_from_chat: false,
        })
        .await
        .expect("init failed");
}

fn call_params(user_id: &str, media_type: CallMediaType) -> CallParams {
    CallParams {
        user_id: user_id.into(),
        media_type,
        timeout: None,
        offline_push_info: None,
    }
}

/// Polls until the condition holds, yielding to let background tasks run.
async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test]
async fn test_call_transitions_to_calling() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .call(call_params("bob", CallMediaType::Audio))
        .await
        .unwrap();

    assert_eq!(store.call_status(), CallStatus::Calling);
    assert_eq!(store.call_role(), CallRole::Caller);
    assert!(!store.is_group());
    let remote = store.remote_users();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].user_id, "bob");
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::CallTips),
        Value::Tips(Some(CallTips::CallerCalling))
    );
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::RoomId),
        Value::Room(Some(RoomId::Numeric(42)))
    );
    assert_eq!(engine.count("call"), 1);
}

#[tokio::test]
async fn test_rapid_double_call_is_a_silent_noop() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    let gate = Arc::new(Notify::new());
    engine.set_dial_gate(gate.clone());

    let first = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .call(call_params("bob", CallMediaType::Audio))
                .await
        })
    };
    wait_for("first dial to reach the engine", || {
        engine.count("call") == 1
    })
    .await;

    // Second press while the first dial is pending: resolved, no effect.
    service
        .call(call_params("bob", CallMediaType::Audio))
        .await
        .unwrap();
    assert_eq!(engine.count("call"), 1);

    gate.notify_one();
    first.await.unwrap().unwrap();

    assert_eq!(engine.count("call"), 1);
    assert_eq!(store.call_status(), CallStatus::Calling);
}

#[tokio::test]
async fn test_invited_then_accept_connects() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    engine.send_event(EngineEvent::Invited {
        sponsor: "bob".into(),
        user_id_list: vec!["alice".into()],
        group_id: None,
        media_type: CallMediaType::Audio,
    });
    wait_for("invitation to land", || {
        store.call_status() == CallStatus::Calling
    })
    .await;

    assert_eq!(store.call_role(), CallRole::Callee);
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::CallTips),
        Value::Tips(Some(CallTips::CalleeCalling))
    );
    let remote = store.remote_users();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].user_id, "bob");

    service.accept().await.unwrap();
    assert_eq!(store.call_status(), CallStatus::Connected);
    assert_eq!(engine.count("accept"), 1);
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::IsClickable),
        Value::Bool(true)
    );
    // Tips clear on connect.
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::CallTips),
        Value::Tips(None)
    );
    assert!(store.local_user().is_enter);
    assert!(store.local_user().is_audio_available);
}

#[tokio::test]
async fn test_hangup_resets_session_state() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .call(call_params("bob", CallMediaType::Audio))
        .await
        .unwrap();
    assert_eq!(store.call_status(), CallStatus::Calling);

    service.hangup().await.unwrap();

    assert_eq!(store.call_status(), CallStatus::Idle);
    assert_eq!(engine.count("hangup"), 1);
    assert!(store.remote_users().is_empty());
    assert!(store.remote_users_exclude_volume().is_empty());
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::CallTips),
        Value::Tips(None)
    );
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::IsClickable),
        Value::Bool(false)
    );
    assert_eq!(store.camera_position(), CameraPosition::Front);
    // Local identity survives; its per-session flags do not.
    assert_eq!(store.local_user().user_id, "alice");
    assert!(!store.local_user().is_enter);
}

#[tokio::test]
async fn test_status_changed_fires_once_per_transition() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    let transitions = Arc::new(Mutex::new(Vec::new()));
    let seen = transitions.clone();
    service.set_callback(CallbackParams {
        status_changed: Some(Arc::new(move |info| {
            seen.lock().unwrap().push((info.old_status, info.new_status));
        })),
        ..Default::default()
    });

    service
        .call(call_params("bob", CallMediaType::Audio))
        .await
        .unwrap();
    service.hangup().await.unwrap();

    assert_eq!(store.call_status(), CallStatus::Idle);
    assert_eq!(
        *transitions.lock().unwrap(),
        vec![
            (StatusChange::Idle, StatusChange::DialingC2c),
            (StatusChange::DialingC2c, StatusChange::Idle),
        ]
    );

    // A hangup with no live session must not fire the hook again.
    service.hangup().await.unwrap();
    assert_eq!(transitions.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_permission_denied_dial_toasts_and_resets() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    engine.set_dial_result(Err(EngineError::PermissionDenied {
        media: CallMediaType::Video,
    }));

    let toasts = Arc::new(Mutex::new(Vec::new()));
    let seen = toasts.clone();
    store.watch(StoreName::Call, CallKey::ToastInfo, move |value| {
        if let Value::Toast(Some(toast)) = value {
            seen.lock().unwrap().push(*toast);
        }
    });

    let result = service.call(call_params("bob", CallMediaType::Video)).await;
    assert!(result.is_ok(), "permission denial must not surface an error");
    assert_eq!(store.call_status(), CallStatus::Idle);
    assert_eq!(
        *toasts.lock().unwrap(),
        vec![ToastInfo::NoDevicePermission {
            media_type: CallMediaType::Video
        }]
    );
}

#[tokio::test]
async fn test_repeated_call_error_is_swallowed() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    engine.set_dial_result(Err(EngineError::RepeatedCall("pending".into())));

    let result = service.call(call_params("bob", CallMediaType::Audio)).await;
    assert!(result.is_ok());
    // The optimistic transition stands; the engine-side dial is the one
    // already in progress.
    assert_eq!(store.call_status(), CallStatus::Calling);
}

#[tokio::test]
async fn test_engine_failure_resets_and_propagates() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    engine.set_dial_result(Err(EngineError::Other {
        code: -1,
        message: "signalling down".into(),
    }));

    let result = service.call(call_params("bob", CallMediaType::Audio)).await;
    assert!(result.is_err());
    assert_eq!(store.call_status(), CallStatus::Idle);
}

#[tokio::test]
async fn test_call_requires_init() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());

    let result = service.call(call_params("bob", CallMediaType::Audio)).await;
    assert!(result.is_err());
    assert_eq!(store.call_status(), CallStatus::Idle);
    assert_eq!(engine.count("call"), 0);
}

#[tokio::test]
async fn test_destroyed_refused_while_session_live() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .call(call_params("bob", CallMediaType::Audio))
        .await
        .unwrap();
    assert!(service.destroyed().await.is_err());
    assert_eq!(store.call_status(), CallStatus::Calling);

    service.hangup().await.unwrap();
    service.destroyed().await.unwrap();
    assert_eq!(engine.count("destroy_instance"), 1);
}

#[tokio::test]
async fn test_video_call_connects_on_first_enter_and_ends() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    let ended = Arc::new(AtomicUsize::new(0));
    let count = ended.clone();
    service.set_callback(CallbackParams {
        after_calling: Some(Arc::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })),
        ..Default::default()
    });

    service
        .call(call_params("bob", CallMediaType::Video))
        .await
        .unwrap();
    assert_eq!(store.call_status(), CallStatus::Calling);
    assert_eq!(engine.count("open_camera"), 1);

    engine.send_event(EngineEvent::UserEnter {
        user_id: "bob".into(),
    });
    wait_for("callee to enter", || {
        store.call_status() == CallStatus::Connected
    })
    .await;

    let remote = store.remote_users();
    assert!(remote[0].is_enter);
    // One-to-one video promotes the remote participant to the big screen.
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::BigScreenUserId),
        Value::OptText(Some("bob".into()))
    );

    engine.send_event(EngineEvent::CallEnded);
    wait_for("session to end", || {
        store.call_status() == CallStatus::Idle
    })
    .await;
    assert_eq!(ended.load(Ordering::SeqCst), 1);
    assert!(store.remote_users().is_empty());
}

#[tokio::test]
async fn test_all_remotes_leaving_ends_the_session() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .group_call(GroupCallParams {
            user_id_list: vec!["bob".into(), "carol".into()],
            group_id: "g1".into(),
            media_type: CallMediaType::Audio,
            timeout: None,
            offline_push_info: None,
        })
        .await
        .unwrap();
    assert_eq!(store.call_status(), CallStatus::Calling);
    assert!(store.is_group());
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::CallTips),
        Value::Tips(Some(CallTips::CallerGroupCalling))
    );

    engine.send_event(EngineEvent::RejectedByUser {
        user_id: "bob".into(),
        line_busy: false,
    });
    engine.send_event(EngineEvent::NoResponse {
        user_id_list: vec!["carol".into()],
    });
    wait_for("session to end once the roster empties", || {
        store.call_status() == CallStatus::Idle
    })
    .await;
    assert!(store.remote_users().is_empty());
}

#[tokio::test]
async fn test_voice_volume_skips_the_exclude_lists() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .call(call_params("bob", CallMediaType::Audio))
        .await
        .unwrap();

    let excl_updates = Arc::new(AtomicUsize::new(0));
    let count = excl_updates.clone();
    store.watch(
        StoreName::Call,
        CallKey::RemoteUserInfoExcludeVolumeList,
        move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        },
    );

    engine.send_event(EngineEvent::UserVoiceVolume {
        volumes: vec![("bob".into(), 55), ("alice".into(), 20)],
    });
    wait_for("volume sample to land", || {
        store.remote_users().first().is_some_and(|u| u.volume == 55)
    })
    .await;

    assert_eq!(store.local_user().volume, 20);
    assert_eq!(store.local_user_exclude_volume().volume, 0);
    assert_eq!(excl_updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_media_switch_downgrades_to_audio() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .call(call_params("bob", CallMediaType::Video))
        .await
        .unwrap();
    engine.send_event(EngineEvent::UserEnter {
        user_id: "bob".into(),
    });
    wait_for("callee to enter", || {
        store.call_status() == CallStatus::Connected
    })
    .await;

    let transitions = Arc::new(Mutex::new(Vec::new()));
    let seen = transitions.clone();
    service.set_callback(CallbackParams {
        status_changed: Some(Arc::new(move |info| {
            seen.lock().unwrap().push((info.old_status, info.new_status));
        })),
        ..Default::default()
    });

    service.switch_call_media_type().await.unwrap();
    assert_eq!(store.call_media_type(), CallMediaType::Audio);
    assert_eq!(
        *transitions.lock().unwrap(),
        vec![(
            StatusChange::CallingC2cVideo,
            StatusChange::CallingC2cAudio
        )]
    );

    // Already audio: a second switch is a no-op.
    service.switch_call_media_type().await.unwrap();
    assert_eq!(engine.count("switch_call_media_type"), 1);
}

#[tokio::test]
async fn test_minimize_toggle_reports_both_states() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());

    let toggles = Arc::new(Mutex::new(Vec::new()));
    let seen = toggles.clone();
    service.set_callback(CallbackParams {
        on_minimized: Some(Arc::new(move |old, new| {
            seen.lock().unwrap().push((old, new));
        })),
        ..Default::default()
    });

    service.toggle_minimize();
    service.toggle_minimize();
    assert!(!store.is_minimized());
    assert_eq!(*toggles.lock().unwrap(), vec![(false, true), (true, false)]);
}

#[tokio::test]
async fn test_invite_appends_only_absent_users() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .group_call(GroupCallParams {
            user_id_list: vec!["bob".into()],
            group_id: "g1".into(),
            media_type: CallMediaType::Audio,
            timeout: None,
            offline_push_info: None,
        })
        .await
        .unwrap();

    service
        .invite_user(InviteUserParams {
            user_id_list: vec!["bob".into(), "carol".into()],
            offline_push_info: None,
        })
        .await
        .unwrap();

    let ids: Vec<String> = store.remote_users().into_iter().map(|u| u.user_id).collect();
    assert_eq!(ids, vec!["bob".to_string(), "carol".to_string()]);
    assert_eq!(engine.count("invite_user"), 1);
}

#[tokio::test]
async fn test_join_in_group_call_connects_directly() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .join_in_group_call(JoinInGroupCallParams {
            media_type: CallMediaType::Audio,
            group_id: "g1".into(),
            room_id: RoomId::Numeric(7),
        })
        .await
        .unwrap();

    assert_eq!(store.call_status(), CallStatus::Connected);
    assert_eq!(store.call_role(), CallRole::Callee);
    assert!(store.is_group());
    assert_eq!(store.group_id().as_deref(), Some("g1"));
    assert!(store.local_user().is_enter);
    assert_eq!(engine.count("join_in_group_call"), 1);
}

#[tokio::test]
async fn test_kicked_resets_and_notifies() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    let kicked = Arc::new(AtomicUsize::new(0));
    let count = kicked.clone();
    service.set_callback(CallbackParams {
        kicked_out: Some(Arc::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })),
        ..Default::default()
    });

    service
        .call(call_params("bob", CallMediaType::Audio))
        .await
        .unwrap();
    engine.send_event(EngineEvent::Kicked);
    wait_for("kick to land", || store.call_status() == CallStatus::Idle).await;
    assert_eq!(kicked.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rapid_double_hangup_signals_once() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .call(call_params("bob", CallMediaType::Audio))
        .await
        .unwrap();

    let gate = Arc::new(Notify::new());
    engine.set_hangup_gate(gate.clone());

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.hangup().await })
    };
    wait_for("first hangup to reach the engine", || {
        engine.count("hangup") == 1
    })
    .await;

    // Second press while the first hangup is pending: resolved, no effect.
    service.hangup().await.unwrap();
    assert_eq!(engine.count("hangup"), 1);

    gate.notify_one();
    first.await.unwrap().unwrap();

    assert_eq!(engine.count("hangup"), 1);
    assert_eq!(store.call_status(), CallStatus::Idle);
}

#[tokio::test]
async fn test_accept_without_response_skips_confirmation() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    engine.send_event(EngineEvent::Invited {
        sponsor: "bob".into(),
        user_id_list: vec!["alice".into()],
        group_id: None,
        media_type: CallMediaType::Video,
    });
    wait_for("invitation to land", || {
        store.call_status() == CallStatus::Calling
    })
    .await;

    engine.set_accept_result(Ok(None));
    service.accept().await.unwrap();

    // The optimistic transition stands, but nothing is confirmed.
    assert_eq!(store.call_status(), CallStatus::Connected);
    assert_eq!(
        store.get_data(StoreName::Call, CallKey::IsClickable),
        Value::Bool(false)
    );
    assert_eq!(engine.count("open_camera"), 0);
    assert!(!store.local_user().is_enter);
    assert!(!store.local_user().is_audio_available);
}

#[tokio::test]
async fn test_media_switch_applies_despite_rejected_signal() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .call(call_params("bob", CallMediaType::Video))
        .await
        .unwrap();
    engine.send_event(EngineEvent::UserEnter {
        user_id: "bob".into(),
    });
    wait_for("callee to enter", || {
        store.call_status() == CallStatus::Connected
    })
    .await;

    engine.set_switch_result(Ok(Some(SignalResponse {
        code: -102,
        message: None,
    })));
    service.switch_call_media_type().await.unwrap();

    // The signal record is skipped but the downgrade still applies.
    assert_eq!(store.call_media_type(), CallMediaType::Audio);
}

#[tokio::test]
async fn test_late_invitation_is_ignored_while_live() {
    let engine = MockEngine::new();
    let (service, store) = make_service(engine.clone());
    init_service(&service).await;

    service
        .call(call_params("bob", CallMediaType::Audio))
        .await
        .unwrap();

    engine.send_event(EngineEvent::Invited {
        sponsor: "mallory".into(),
        user_id_list: vec!["alice".into()],
        group_id: None,
        media_type: CallMediaType::Video,
    });
    // Let the event loop drain.
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }

    assert_eq!(store.call_role(), CallRole::Caller);
    assert_eq!(store.call_media_type(), CallMediaType::Audio);
    let remote = store.remote_users();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].user_id, "bob");
}
