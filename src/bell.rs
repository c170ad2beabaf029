//! Bell (ringtone) playback tied to call status transitions.
//!
//! The actual audio backend is injected behind [`BellSink`]; the context
//! only decides which bell plays and whether it is muted.

use crate::types::CallRole;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Which sound the sink should play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BellSource {
    /// Built-in dial tone played on the caller side.
    DefaultCaller,
    /// Built-in ringtone played on the callee side.
    DefaultCallee,
    /// Host-supplied local ringtone file (callee side only).
    File(PathBuf),
}

/// Injected audio backend. Implementations must tolerate redundant stops.
pub trait BellSink: Send + Sync {
    fn play(&self, source: BellSource);
    fn stop(&self);
    fn set_muted(&self, muted: bool);
}

/// Partial property update, mirroring how the orchestration layer feeds
/// role/status changes into the bell. Unset fields keep their value.
#[derive(Debug, Default, Clone)]
pub struct BellProperties {
    pub call_role: Option<CallRole>,
    pub is_mute: Option<bool>,
    pub callee_bell_file: Option<PathBuf>,
}

#[derive(Default)]
struct BellState {
    call_role: CallRole,
    is_mute: bool,
    callee_bell_file: Option<PathBuf>,
    playing: bool,
}

pub struct BellContext {
    sink: Arc<dyn BellSink>,
    state: Mutex<BellState>,
}

impl BellContext {
    pub fn new(sink: Arc<dyn BellSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(BellState::default()),
        }
    }

    pub fn set_properties(&self, properties: BellProperties) {
        let mut state = self.state.lock().expect("bell lock poisoned");
        if let Some(role) = properties.call_role {
            state.call_role = role;
        }
        if let Some(mute) = properties.is_mute {
            state.is_mute = mute;
        }
        if let Some(file) = properties.callee_bell_file {
            state.callee_bell_file = Some(file);
        }
    }

    /// Starts playback for the current role. The callee hears the custom
    /// bell when one is configured.
    pub fn play(&self) {
        let source;
        {
            let mut state = self.state.lock().expect("bell lock poisoned");
            source = match state.call_role {
                CallRole::Callee => state
                    .callee_bell_file
                    .clone()
                    .map(BellSource::File)
                    .unwrap_or(BellSource::DefaultCallee),
                _ => BellSource::DefaultCaller,
            };
            self.sink.set_muted(state.is_mute);
            state.playing = true;
        }
        debug!("bell play: {source:?}");
        self.sink.play(source);
    }

    pub fn stop(&self) {
        let was_playing = {
            let mut state = self.state.lock().expect("bell lock poisoned");
            std::mem::replace(&mut state.playing, false)
        };
        if was_playing {
            self.sink.stop();
        }
    }

    /// Mute mode persists across calls.
    pub fn set_mute(&self, muted: bool) {
        self.state.lock().expect("bell lock poisoned").is_mute = muted;
        self.sink.set_muted(muted);
    }

    pub fn set_callee_bell_file(&self, path: PathBuf) {
        self.state
            .lock()
            .expect("bell lock poisoned")
            .callee_bell_file = Some(path);
    }
}

/// Only local `.mp3` files are accepted as custom bells.
pub(crate) fn local_mp3_exists(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "mp3") && path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<BellSource>>,
        stops: Mutex<usize>,
        muted: Mutex<bool>,
    }

    impl BellSink for RecordingSink {
        fn play(&self, source: BellSource) {
            self.played.lock().unwrap().push(source);
        }
        fn stop(&self) {
            *self.stops.lock().unwrap() += 1;
        }
        fn set_muted(&self, muted: bool) {
            *self.muted.lock().unwrap() = muted;
        }
    }

    #[test]
    fn test_caller_hears_dial_tone_callee_hears_ringtone() {
        let sink = Arc::new(RecordingSink::default());
        let bell = BellContext::new(sink.clone());

        bell.set_properties(BellProperties {
            call_role: Some(CallRole::Caller),
            ..Default::default()
        });
        bell.play();

        bell.set_properties(BellProperties {
            call_role: Some(CallRole::Callee),
            ..Default::default()
        });
        bell.play();

        assert_eq!(
            *sink.played.lock().unwrap(),
            vec![BellSource::DefaultCaller, BellSource::DefaultCallee]
        );
    }

    #[test]
    fn test_custom_bell_applies_to_callee_only() {
        let sink = Arc::new(RecordingSink::default());
        let bell = BellContext::new(sink.clone());
        bell.set_callee_bell_file(PathBuf::from("ring.mp3"));

        bell.set_properties(BellProperties {
            call_role: Some(CallRole::Caller),
            ..Default::default()
        });
        bell.play();
        bell.set_properties(BellProperties {
            call_role: Some(CallRole::Callee),
            ..Default::default()
        });
        bell.play();

        assert_eq!(
            *sink.played.lock().unwrap(),
            vec![
                BellSource::DefaultCaller,
                BellSource::File(PathBuf::from("ring.mp3"))
            ]
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let sink = Arc::new(RecordingSink::default());
        let bell = BellContext::new(sink.clone());

        bell.play();
        bell.stop();
        bell.stop();
        assert_eq!(*sink.stops.lock().unwrap(), 1);
    }

    #[test]
    fn test_mute_mode_reaches_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let bell = BellContext::new(sink.clone());
        bell.set_mute(true);
        assert!(*sink.muted.lock().unwrap());
        bell.play();
        assert!(*sink.muted.lock().unwrap());
    }

    #[test]
    fn test_local_mp3_check() {
        let dir = tempfile::tempdir().unwrap();
        let mp3 = dir.path().join("bell.mp3");
        std::fs::write(&mp3, b"ID3").unwrap();
        let wav = dir.path().join("bell.wav");
        std::fs::write(&wav, b"RIFF").unwrap();

        assert!(local_mp3_exists(&mp3));
        assert!(!local_mp3_exists(&wav));
        assert!(!local_mp3_exists(&dir.path().join("missing.mp3")));
    }
}
