//! Host callback registration.
//!
//! Zero-or-one handler per named hook, registered through
//! [`crate::service::CallService::set_callback`] and invoked defensively:
//! an unset hook is a no-op. Handlers are cloned out of the lock before
//! invocation so a hook may re-enter the service.

use crate::status::StatusChange;
use crate::types::ChatMessage;
use std::sync::{Arc, Mutex};

/// Payload of the `status_changed` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChangedInfo {
    pub old_status: StatusChange,
    pub new_status: StatusChange,
}

type Hook = Arc<dyn Fn() + Send + Sync>;
type MinimizedHook = Arc<dyn Fn(bool, bool) + Send + Sync>;
type MessageHook = Arc<dyn Fn(&ChatMessage) + Send + Sync>;
type StatusHook = Arc<dyn Fn(StatusChangedInfo) + Send + Sync>;

/// Registration payload. Unset fields leave the existing handler in place.
#[derive(Default, Clone)]
pub struct CallbackParams {
    pub before_calling: Option<Hook>,
    pub after_calling: Option<Hook>,
    pub on_minimized: Option<MinimizedHook>,
    pub on_message_sent_by_me: Option<MessageHook>,
    pub kicked_out: Option<Hook>,
    pub status_changed: Option<StatusHook>,
}

#[derive(Default)]
pub(crate) struct Callbacks {
    inner: Mutex<CallbackParams>,
}

impl Callbacks {
    pub fn set(&self, params: CallbackParams) {
        let mut inner = self.inner.lock().expect("callbacks lock poisoned");
        if params.before_calling.is_some() {
            inner.before_calling = params.before_calling;
        }
        if params.after_calling.is_some() {
            inner.after_calling = params.after_calling;
        }
        if params.on_minimized.is_some() {
            inner.on_minimized = params.on_minimized;
        }
        if params.on_message_sent_by_me.is_some() {
            inner.on_message_sent_by_me = params.on_message_sent_by_me;
        }
        if params.kicked_out.is_some() {
            inner.kicked_out = params.kicked_out;
        }
        if params.status_changed.is_some() {
            inner.status_changed = params.status_changed;
        }
    }

    fn snapshot(&self) -> CallbackParams {
        self.inner.lock().expect("callbacks lock poisoned").clone()
    }

    pub fn before_calling(&self) {
        if let Some(hook) = self.snapshot().before_calling {
            hook();
        }
    }

    pub fn after_calling(&self) {
        if let Some(hook) = self.snapshot().after_calling {
            hook();
        }
    }

    pub fn on_minimized(&self, old_minimized: bool, new_minimized: bool) {
        if let Some(hook) = self.snapshot().on_minimized {
            hook(old_minimized, new_minimized);
        }
    }

    pub fn message_sent_by_me(&self, message: &ChatMessage) {
        if let Some(hook) = self.snapshot().on_message_sent_by_me {
            hook(message);
        }
    }

    pub fn kicked_out(&self) {
        if let Some(hook) = self.snapshot().kicked_out {
            hook();
        }
    }

    pub fn status_changed(&self, old_status: StatusChange, new_status: StatusChange) {
        if let Some(hook) = self.snapshot().status_changed {
            hook(StatusChangedInfo {
                old_status,
                new_status,
            });
        }
    }
}
