//! Core of a call UI kit: a reactive keyed store, a three-state call
//! status machine, and an orchestration facade over an opaque calling
//! engine.
//!
//! The engine (signaling, media, transport) and the chat product (profiles,
//! rosters, message timelines) are both injected behind traits; everything
//! observable by a UI flows through [`store::Store`], mutated only by
//! [`service::CallService`].

pub mod bell;
pub mod chat;
pub mod duration;
pub mod engine;
pub mod error;
pub mod global;
pub mod service;
pub mod status;
pub mod store;
pub mod types;

pub use error::CallError;
pub use service::callbacks::{CallbackParams, StatusChangedInfo};
pub use service::{CallService, CallServiceConfig, LOCAL_VIDEO_VIEW};
pub use status::{CallStatus, StatusChange};
pub use store::{CallKey, Store, StoreName, Value, WatchId};
