//! Inbox: received push messages kept on the device so the host can list them later.
//!
//! Inbox messages live in the same [`CacheState`](crate::CacheState) as in-app messages and are
//! changed only by the engine. Expired messages are never listed and are dropped on the next
//! write.
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    message::{Timestamp, TryParse},
    Error, Result,
};

/// A message saved to the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxMessage {
    /// Unique identifier of the message within the inbox.
    pub id: String,
    /// Title shown in the inbox list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Message body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Image or video attached to the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Deep link opened when the message is tapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    /// When the message was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_date: Option<Timestamp>,
    /// The message is not listed at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_date: Option<Timestamp>,
    /// Set by [`mark_as_read`].
    #[serde(default)]
    pub is_read: bool,
}

impl InboxMessage {
    /// Returns `true` if the message must no longer be listed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expire_date, Some(expire_date) if expire_date <= now)
    }

    /// Checks invariants that the type system does not capture.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidMessage("inbox message id is empty".to_owned()));
        }
        Ok(())
    }
}

/// Messages that have not expired at `now`, soonest expiry first. Messages without an expiry come
/// last, in the order they were saved.
pub fn list_messages(now: Timestamp, inbox: &[InboxMessage]) -> Vec<InboxMessage> {
    let mut messages: Vec<InboxMessage> = inbox
        .iter()
        .filter(|m| !m.is_expired(now))
        .cloned()
        .collect();
    // Stable sort keeps save order between equal keys.
    messages.sort_by_key(|m| (m.expire_date.is_none(), m.expire_date));
    messages
}

/// Save `message` unless the inbox already holds one with the same id. Returns `true` if it was
/// added.
pub fn save_message(inbox: &mut Vec<InboxMessage>, message: InboxMessage, now: Timestamp) -> bool {
    prune_expired(inbox, now);
    if let Err(err) = message.validate() {
        log::warn!(target: "dengage", "not saving inbox message: {err}");
        return false;
    }
    if inbox.iter().any(|m| m.id == message.id) {
        log::debug!(target: "dengage", id = message.id.as_str(); "inbox message already saved");
        return false;
    }
    inbox.push(message);
    true
}

/// Returns `true` if a message was removed.
pub fn delete_message(inbox: &mut Vec<InboxMessage>, id: &str, now: Timestamp) -> bool {
    prune_expired(inbox, now);
    let before = inbox.len();
    inbox.retain(|m| m.id != id);
    inbox.len() != before
}

/// Returns `true` if the message exists.
pub fn mark_as_read(inbox: &mut Vec<InboxMessage>, id: &str, now: Timestamp) -> bool {
    prune_expired(inbox, now);
    match inbox.iter_mut().find(|m| m.id == id) {
        Some(message) => {
            message.is_read = true;
            true
        }
        None => false,
    }
}

fn prune_expired(inbox: &mut Vec<InboxMessage>, now: Timestamp) {
    inbox.retain(|m| !m.is_expired(now));
}

/// `deserialize_with` adapter: drops entries that fail to parse or validate.
pub(crate) fn deserialize_inbox<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<InboxMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<TryParse<InboxMessage>>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            TryParse::Parsed(message) if message.validate().is_ok() => Some(message),
            _ => {
                log::warn!(target: "dengage", "dropping malformed inbox message");
                None
            }
        })
        .collect())
}
