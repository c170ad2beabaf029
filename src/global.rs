//! Process-wide service handle.
//!
//! Hosts that embed the kit behind a singleton install the service once at
//! startup; UI components reach it through [`service`] without threading
//! the handle through every layer.

use crate::service::CallService;
use once_cell::sync::OnceCell;
use std::sync::Arc;

static SERVICE: OnceCell<Arc<CallService>> = OnceCell::new();

/// Installs the process-wide service. Fails with the rejected handle if one
/// is already installed.
pub fn install(service: Arc<CallService>) -> Result<(), Arc<CallService>> {
    SERVICE.set(service)
}

/// The installed service, if any.
pub fn service() -> Option<Arc<CallService>> {
    SERVICE.get().cloned()
}
