//! The in-app message model and its wire format.
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{screen::ScreenNameFilter, Error, Result};

/// Point in time used for every scheduling decision.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// An in-app message as received from the server and stored in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppMessage {
    /// Unique identifier of the message within the cache.
    pub message_id: String,
    /// Higher priority wins when several messages are eligible at once.
    #[serde(default)]
    pub priority: i32,
    /// What to render.
    pub content: Content,
    /// When and where the message may be shown.
    #[serde(default)]
    pub display_timing: DisplayTiming,
    /// The message is never shown at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_date: Option<Timestamp>,
    /// Per-message cooldown set after a recurring message has been shown. `None` means the
    /// message is eligible now.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "next_display_time"
    )]
    pub next_display_time: Option<Timestamp>,
}

/// Message payload. `props` is opaque to the engine and handed over to the renderer as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// Kind of payload in `props`.
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// Renderer input.
    #[serde(default)]
    pub props: serde_json::Map<String, serde_json::Value>,
}

/// Kinds of message content. Messages of unknown kinds are dropped when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// `props.html` holds the markup.
    Html,
}

impl Content {
    /// HTML markup of an html message.
    pub fn html(&self) -> Option<&str> {
        self.props.get("html").and_then(|value| value.as_str())
    }
}

/// Display rules of a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayTiming {
    /// Seconds to wait between selecting the message and rendering it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    /// Re-show interval. Absent or zero means the message is consumed by its first display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_every_x_minutes: Option<u64>,
    /// Screens the message is targeted at. Empty means untargeted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screen_name_filters: Vec<ScreenNameFilter>,
}

impl DisplayTiming {
    /// Render delay, zero if unset.
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay.unwrap_or(0))
    }

    /// Recurrence interval, `None` for one-shot messages.
    pub fn recurrence(&self) -> Option<chrono::Duration> {
        let minutes = self.show_every_x_minutes.filter(|&m| m != 0)?;
        chrono::Duration::try_minutes(i64::try_from(minutes).ok()?)
    }
}

impl InAppMessage {
    /// Returns `true` at or after the expiry date.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expire_date, Some(expire_date) if expire_date <= now)
    }

    /// Returns `true` while the per-message cooldown has not elapsed yet.
    pub fn is_cooling_down(&self, now: Timestamp) -> bool {
        matches!(self.next_display_time, Some(t) if now < t)
    }

    /// Checks invariants that the type system does not capture.
    pub fn validate(&self) -> Result<()> {
        if self.message_id.trim().is_empty() {
            return Err(Error::InvalidMessage("messageId is empty".to_owned()));
        }
        match self.content.content_type {
            ContentType::Html if self.content.html().is_none() => Err(Error::InvalidMessage(
                format!("message {} has no html payload", self.message_id),
            )),
            ContentType::Html => Ok(()),
        }
    }
}

/// `TryParse` allows an element to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// The element parsed.
    Parsed(T),
    /// The raw element, kept for logging.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// Keep messages that parsed and passed validation, logging the rest.
pub(crate) fn drop_malformed(batch: Vec<TryParse<InAppMessage>>) -> Vec<InAppMessage> {
    batch
        .into_iter()
        .filter_map(|entry| match entry {
            TryParse::Parsed(message) => match message.validate() {
                Ok(()) => Some(message),
                Err(err) => {
                    log::warn!(target: "dengage",
                               message_id = message.message_id.as_str();
                               "dropping invalid in-app message: {err}");
                    None
                }
            },
            TryParse::ParseFailed(value) => {
                let message_id = value
                    .get("messageId")
                    .and_then(|id| id.as_str())
                    .unwrap_or("<unknown>");
                log::warn!(target: "dengage",
                           message_id;
                           "dropping in-app message that failed to parse");
                None
            }
        })
        .collect()
}

/// `deserialize_with` adapter for message lists.
pub(crate) fn deserialize_messages<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<InAppMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    let batch = Vec::<TryParse<InAppMessage>>::deserialize(deserializer)?;
    Ok(drop_malformed(batch))
}

/// `nextDisplayTime` is written as RFC 3339, but epoch milliseconds are accepted too, where `0`
/// means "eligible now".
mod next_display_time {
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    use super::Timestamp;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Millis(i64),
        Instant(Timestamp),
    }

    pub fn serialize<S: Serializer>(
        value: &Option<Timestamp>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Timestamp>, D::Error> {
        match Option::<Wire>::deserialize(deserializer)? {
            None | Some(Wire::Millis(0)) => Ok(None),
            Some(Wire::Millis(millis)) => Timestamp::from_timestamp_millis(millis)
                .map(Some)
                .ok_or_else(|| D::Error::custom("nextDisplayTime is out of range")),
            Some(Wire::Instant(instant)) => Ok(Some(instant)),
        }
    }
}
