//! The Rust SDK for Dengage in-app messaging and event collection.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that keeps a local cache of [`InAppMessage`]s, refreshes
//! it from the remote service when the application comes to the foreground, and picks the best
//! message to show when the user navigates to a screen. The chosen message is handed to a
//! [`Renderer`] supplied by the host application.
//!
//! Message selection honors expiry, per-message recurrence (`showEveryXMinutes`), a global
//! cooldown between any two messages (`minSecondsBetweenMessages`), screen targeting, and
//! priority. At most one message is shown at a time.
//!
//! The client also collects behavioral events (sessions, page views, carts, orders, ...) through
//! [`Client::track`] and its helpers.
//!
//! Received push messages can be kept in a local inbox ([`InboxMessage`]) and listed later with
//! [`Client::inbox_messages`].
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Network and storage failures inside the engine are never surfaced to the host; they are
//! logged and the engine keeps working from its cache. Client methods return an error only when
//! the client could not be created or the engine has already stopped.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages under the `dengage` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into SDK operations.
//!
//! # Examples
//!
//! Examples can be found in the `demos` directory of the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod api;
mod cache_store;
mod client;
mod config;
mod coordinator;
mod eligibility;
mod engine;
mod error;
mod events;
mod inbox;
mod message;
mod renderer;
mod reporter;
mod scheduler;
mod screen;

pub use api::{HttpInAppApi, InAppApi};
pub use cache_store::{CacheState, CacheStore, FileStorage, MemoryStorage, Storage};
pub use client::Client;
pub use config::{ClientConfig, ContactKey, ContactKeyType, InAppSettings, Subject};
pub use coordinator::record_display;
pub use eligibility::{find_not_expired, select_message};
pub use error::{Error, Result};
pub use events::{
    Campaign, CollectedEvent, CustomEvent, EventCollector, EventDetails, CAMPAIGN_ATTRIBUTION_DAYS,
};
pub use inbox::InboxMessage;
pub use message::{Content, ContentType, DisplayTiming, InAppMessage, Timestamp, TryParse};
pub use renderer::Renderer;
pub use reporter::ActionReporter;
pub use scheduler::{apply_fetched, merge_messages, should_fetch};
pub use screen::{matches_screen, FilterValue, Operator, ScreenNameFilter, WILDCARD};
