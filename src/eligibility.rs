//! Pure selection of the in-app message to show next.
use crate::{
    cache_store::CacheState,
    message::{InAppMessage, Timestamp},
    screen::matches_screen,
};

/// Messages that have not expired at `now`.
pub fn find_not_expired(
    now: Timestamp,
    messages: &[InAppMessage],
) -> impl Iterator<Item = &InAppMessage> {
    messages.iter().filter(move |m| !m.is_expired(now))
}

/// Select at most one message to show on `screen_name` at `now`.
///
/// Nothing is selected while the global cooldown (`next_show_time`) is pending. Otherwise the
/// candidates are the messages that are not expired, not cooling down, and targeted at the screen
/// (or untargeted). The winner has the highest priority, then the earliest expiry (messages
/// without expiry last), then comes first in the cache.
pub fn select_message<'a>(
    now: Timestamp,
    state: &'a CacheState,
    screen_name: Option<&str>,
) -> Option<&'a InAppMessage> {
    if matches!(state.next_show_time, Some(next_show_time) if now < next_show_time) {
        log::trace!(target: "dengage", "global cooldown pending, not selecting a message");
        return None;
    }

    // `min_by_key` returns the first of several equal minimums, which keeps cache order as the
    // last tie-break.
    let selected = find_not_expired(now, &state.messages)
        .filter(|m| !m.is_cooling_down(now))
        .filter(|m| matches_screen(&m.display_timing.screen_name_filters, screen_name))
        .min_by_key(|m| {
            (
                std::cmp::Reverse(m.priority),
                m.expire_date.is_none(),
                m.expire_date,
            )
        });

    log::trace!(target: "dengage",
                screen_name,
                message_id = selected.map(|m| m.message_id.as_str());
                "evaluated in-app messages");

    selected
}
