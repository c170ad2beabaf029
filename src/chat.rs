//! Chat/messaging integration seam.
//!
//! The kit can run standalone; when embedded next to a chat product the
//! host supplies an implementation so call sessions can resolve user
//! profiles, group rosters, and reconcile group attributes when a session
//! ends. Lookup failures degrade the call UI (missing nicks/avatars) but
//! never abort an operation.

use crate::store::Store;
use crate::types::{ChatMessage, GroupMember, GroupProfile, UserInfo};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("profile lookup failed: {0}")]
    ProfileLookup(String),

    #[error("group lookup failed: {0}")]
    GroupLookup(String),

    #[error("chat service unavailable")]
    Unavailable,
}

#[async_trait]
pub trait ChatIntegration: Send + Sync {
    /// Resolves display profiles for the given user ids, in order.
    async fn remote_user_profiles(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<UserInfo>, IntegrationError>;

    async fn group_member_list(
        &self,
        group_id: &str,
        count: u32,
        offset: u32,
    ) -> Result<Vec<GroupMember>, IntegrationError>;

    async fn group_profile(&self, group_id: &str) -> Result<GroupProfile, IntegrationError>;

    /// Opaque chat-side group attributes for the given group.
    async fn group_attributes(
        &self,
        group_id: &str,
    ) -> Result<serde_json::Value, IntegrationError>;

    /// Called on the transition to idle when the session originated from
    /// chat, so the chat side can fold its group attributes back into the
    /// store.
    async fn reconcile_group_attributes(&self, attributes: serde_json::Value, store: &Store);

    /// Delivers an engine-produced call record message into the chat
    /// timeline.
    async fn deliver_call_message(&self, message: ChatMessage) -> Result<(), IntegrationError>;
}
