//! The show path: bookkeeping for a displayed message and its (possibly delayed) render.
use tokio::{sync::mpsc::WeakUnboundedSender, task::AbortHandle};

use crate::{
    cache_store::{CacheState, CacheStore},
    engine::Command,
    message::{InAppMessage, Timestamp},
    Renderer,
};

/// Update the cache for a message shown at `now`.
///
/// A recurring message stays cached with its cooldown moved to `now + showEveryXMinutes`; any
/// other message is removed. The global cooldown is moved to `now + min_between_messages` either
/// way.
pub fn record_display(
    state: &mut CacheState,
    message: &InAppMessage,
    now: Timestamp,
    min_between_messages: chrono::Duration,
) {
    let next_display_time = message
        .display_timing
        .recurrence()
        .and_then(|interval| now.checked_add_signed(interval));

    match next_display_time {
        Some(next_display_time) => {
            let mut message = message.clone();
            message.next_display_time = Some(next_display_time);
            state.upsert_message(message);
        }
        None => {
            state.remove_message(&message.message_id);
        }
    }

    state.next_show_time = Some(
        now.checked_add_signed(min_between_messages)
            .unwrap_or(Timestamp::MAX_UTC),
    );
    state.prune_expired(now);
}

struct PendingRender {
    generation: u64,
    message: InAppMessage,
    timer: AbortHandle,
}

/// Owns the single "currently shown" slot and the pending delayed render.
pub(crate) struct DisplayCoordinator {
    renderer: Box<dyn Renderer + Send>,
    timer_sender: WeakUnboundedSender<Command>,
    current: Option<String>,
    pending: Option<PendingRender>,
    generation: u64,
}

impl DisplayCoordinator {
    /// `timer_sender` receives [`Command::RenderDue`] when a delayed render fires.
    pub(crate) fn new(
        renderer: Box<dyn Renderer + Send>,
        timer_sender: WeakUnboundedSender<Command>,
    ) -> DisplayCoordinator {
        DisplayCoordinator {
            renderer,
            timer_sender,
            current: None,
            pending: None,
            generation: 0,
        }
    }

    /// Id of the message currently on screen.
    pub fn current_message_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// A message is on screen or waiting for its delay to elapse.
    pub fn is_busy(&self) -> bool {
        self.current.is_some() || self.pending.is_some()
    }

    /// Show `message`, selected at `now`.
    ///
    /// Records the display in the cache, then renders it after the message's delay. Reporting the
    /// display is left to the caller.
    pub fn show(
        &mut self,
        message: InAppMessage,
        now: Timestamp,
        store: &CacheStore,
        min_between_messages: chrono::Duration,
    ) {
        log::debug!(target: "dengage",
                    message_id = message.message_id.as_str();
                    "showing in-app message");

        store.update(|state| record_display(state, &message, now, min_between_messages));

        let delay = message.display_timing.delay();
        if delay.is_zero() {
            self.render(message);
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let timer_sender = self.timer_sender.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(sender) = timer_sender.upgrade() {
                let _ = sender.send(Command::RenderDue { generation });
            }
        })
        .abort_handle();

        log::debug!(target: "dengage",
                    message_id = message.message_id.as_str(), delay_secs = delay.as_secs();
                    "render scheduled");
        self.pending = Some(PendingRender {
            generation,
            message,
            timer,
        });
    }

    /// Render the pending message if `generation` is still the scheduled one. A timer that fires
    /// after [`DisplayCoordinator::teardown`] finds nothing to render.
    pub fn render_due(&mut self, generation: u64) {
        match self.pending.take() {
            Some(pending) if pending.generation == generation => self.render(pending.message),
            other => {
                self.pending = other;
                log::debug!(target: "dengage", generation; "ignoring stale render timer");
            }
        }
    }

    fn render(&mut self, message: InAppMessage) {
        self.current = Some(message.message_id.clone());
        self.renderer.render(&message);
    }

    /// Release the "currently shown" slot.
    pub fn release(&mut self) {
        if let Some(message_id) = self.current.take() {
            log::debug!(target: "dengage",
                        message_id = message_id.as_str();
                        "in-app message closed");
        }
    }

    /// Cancel a pending render.
    pub fn teardown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.abort();
            log::debug!(target: "dengage",
                        message_id = pending.message.message_id.as_str();
                        "pending render cancelled");
        }
    }
}
