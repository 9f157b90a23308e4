//! Decides when in-app messages are fetched and how fetched batches land in the cache.
use crate::{
    cache_store::CacheState,
    message::{InAppMessage, Timestamp},
};

/// Returns `true` if a remote fetch is due.
///
/// `last_fetch_time` is the instant of the last successful fetch; a fetch is due once
/// `fetch_interval_minutes` have elapsed since then, or immediately if nothing was fetched yet.
/// A disabled feature never fetches.
pub fn should_fetch(
    now: Timestamp,
    last_fetch_time: Option<Timestamp>,
    fetch_interval_minutes: u64,
    feature_enabled: bool,
) -> bool {
    if !feature_enabled {
        return false;
    }
    let Some(last_fetch_time) = last_fetch_time else {
        return true;
    };
    let interval = i64::try_from(fetch_interval_minutes)
        .ok()
        .and_then(chrono::Duration::try_minutes);
    match interval.and_then(|interval| last_fetch_time.checked_add_signed(interval)) {
        Some(next_fetch_time) => now >= next_fetch_time,
        // An interval too large to represent means "never again".
        None => false,
    }
}

/// Merge a fetched batch into the cache, keyed by `messageId`.
///
/// The fetched copy replaces the cached one, except that a locally recorded `nextDisplayTime`
/// survives when the fetched copy carries none. Duplicates within `fetched` collapse to the last
/// occurrence.
pub fn merge_messages(cached: &mut Vec<InAppMessage>, fetched: Vec<InAppMessage>) {
    for mut message in fetched {
        match cached
            .iter_mut()
            .find(|m| m.message_id == message.message_id)
        {
            Some(slot) => {
                if message.next_display_time.is_none() {
                    message.next_display_time = slot.next_display_time;
                }
                *slot = message;
            }
            None => cached.push(message),
        }
    }
}

/// Record a successful fetch at `now` and merge its batch, pruning expired messages.
pub fn apply_fetched(state: &mut CacheState, now: Timestamp, fetched: Vec<InAppMessage>) {
    merge_messages(&mut state.messages, fetched);
    state.prune_expired(now);
    state.last_fetch_time = Some(now);
}
