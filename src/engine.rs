//! The in-app engine and the background thread it runs on.
//!
//! [`InAppEngine`] is the single owner of the message cache. Host calls, network completions, and
//! render timers all arrive as [`Command`]s on one channel and are handled one at a time, so every
//! cache mutation happens on the engine task.
use std::{future::Future, ops::ControlFlow, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender},
    task::JoinSet,
};

use crate::{
    api::InAppApi,
    cache_store::CacheStore,
    config::{ContactKey, InAppSettings, Subject},
    coordinator::DisplayCoordinator,
    eligibility::select_message,
    events::{Campaign, CustomEvent, EventCollector},
    inbox::{self, InboxMessage},
    message::{InAppMessage, Timestamp},
    reporter::ActionReporter,
    scheduler::{apply_fetched, should_fetch},
    Error, Renderer, Result,
};

/// How long the engine waits for pending reports and events when it stops.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Input of the engine loop.
#[derive(Debug)]
pub(crate) enum Command {
    Foreground,
    Background,
    Navigate {
        screen_name: Option<String>,
    },
    Clicked {
        message_id: String,
        button_id: Option<String>,
    },
    Dismissed {
        message_id: String,
    },
    Closed,
    UpdateSettings(InAppSettings),
    SetContactKey(Option<String>),
    Track(CustomEvent),
    SetCampaign {
        camp_id: String,
        send_id: Option<String>,
    },
    SaveInboxMessage(InboxMessage),
    DeleteInboxMessage {
        id: String,
    },
    MarkInboxMessageAsRead {
        id: String,
    },
    FetchCompleted(Result<Vec<InAppMessage>>),
    RenderDue {
        generation: u64,
    },
    Stop,
}

pub(crate) struct EngineConfig<A> {
    pub settings: InAppSettings,
    pub device_id: String,
    pub contact_key: Option<String>,
    pub store: Arc<CacheStore>,
    pub api: A,
    pub renderer: Box<dyn Renderer + Send>,
    pub events: EventCollector,
}

pub(crate) struct InAppEngine<A> {
    settings: InAppSettings,
    device_id: String,
    contact_key: Option<String>,
    store: Arc<CacheStore>,
    api: Arc<A>,
    reporter: ActionReporter<A>,
    coordinator: DisplayCoordinator,
    events: EventCollector,
    /// Action reports and event posts. Drained on stop.
    tasks: JoinSet<()>,
    /// Weak, so that dropping every [`Client`](crate::Client) handle ends the engine loop.
    sender: WeakUnboundedSender<Command>,
    fetch_in_flight: bool,
}

impl<A: InAppApi> InAppEngine<A> {
    pub(crate) fn new(config: EngineConfig<A>, sender: WeakUnboundedSender<Command>) -> Self {
        let api = Arc::new(config.api);
        let mut events = config.events;
        if let Some(campaign) = config.store.state().campaign.clone() {
            events.set_campaign(campaign);
        }
        InAppEngine {
            settings: config.settings,
            device_id: config.device_id,
            contact_key: config.contact_key,
            store: config.store,
            reporter: ActionReporter::new(Arc::clone(&api)),
            api,
            coordinator: DisplayCoordinator::new(config.renderer, sender.clone()),
            events,
            tasks: JoinSet::new(),
            sender,
            fetch_in_flight: false,
        }
    }

    /// Request keys, or `None` while the engine is disabled.
    fn subject(&self) -> Option<Subject> {
        if !self.settings.is_enabled() {
            return None;
        }
        Some(Subject {
            account_name: self.settings.account_name.clone()?,
            contact_key: ContactKey::resolve(self.contact_key.as_deref(), &self.device_id),
            device_id: self.device_id.clone(),
        })
    }

    pub(crate) async fn run(mut self, mut receiver: UnboundedReceiver<Command>) {
        log::debug!(target: "dengage", "in-app engine started");
        while let Some(command) = receiver.recv().await {
            if self.handle(command, Utc::now()).is_break() {
                break;
            }
        }
        self.coordinator.teardown();
        self.drain(SHUTDOWN_TIMEOUT).await;
        log::debug!(target: "dengage", "in-app engine stopped");
    }

    /// Wait for pending reports and events, up to `timeout`. Whatever is still running afterwards
    /// is aborted.
    async fn drain(&mut self, timeout: Duration) {
        if self.tasks.is_empty() {
            return;
        }
        log::debug!(target: "dengage",
                    pending = self.tasks.len();
                    "waiting for pending reports");
        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(err) = result {
                    log::warn!(target: "dengage", "report task failed: {err}");
                }
            }
        })
        .await;
        if drained.is_err() {
            log::warn!(target: "dengage",
                       dropped = self.tasks.len();
                       "gave up on pending reports at shutdown");
            self.tasks.abort_all();
        }
    }

    /// Run `task` on the engine runtime, tracked so that stopping waits for it.
    fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) {
        // Reap finished tasks so the set does not grow with every report.
        while self.tasks.try_join_next().is_some() {}
        self.tasks.spawn(task);
    }

    pub(crate) fn handle(&mut self, command: Command, now: Timestamp) -> ControlFlow<()> {
        match command {
            Command::Foreground => self.on_foreground(now),
            Command::Background => self.coordinator.teardown(),
            Command::Navigate { screen_name } => self.on_navigate(now, screen_name.as_deref()),
            Command::Clicked {
                message_id,
                button_id,
            } => self.on_clicked(&message_id, button_id.as_deref()),
            Command::Dismissed { message_id } => self.on_dismissed(&message_id),
            Command::Closed => self.coordinator.release(),
            Command::UpdateSettings(settings) => {
                self.settings = settings;
                if !self.settings.is_enabled() {
                    self.coordinator.teardown();
                }
            }
            Command::SetContactKey(contact_key) => self.contact_key = contact_key,
            Command::Track(event) => {
                let rows = self.events.build(event, now);
                let send = self.events.send(rows);
                self.spawn(send);
            }
            Command::SetCampaign { camp_id, send_id } => {
                let campaign = Campaign {
                    camp_id,
                    send_id,
                    started_at: now,
                };
                self.store
                    .update(|state| state.campaign = Some(campaign.clone()));
                self.events.set_campaign(campaign);
            }
            Command::SaveInboxMessage(message) => {
                self.store
                    .update(|state| inbox::save_message(&mut state.inbox, message, now));
            }
            Command::DeleteInboxMessage { id } => {
                self.store
                    .update(|state| inbox::delete_message(&mut state.inbox, &id, now));
            }
            Command::MarkInboxMessageAsRead { id } => {
                self.store
                    .update(|state| inbox::mark_as_read(&mut state.inbox, &id, now));
            }
            Command::FetchCompleted(result) => self.on_fetch_completed(now, result),
            Command::RenderDue { generation } => self.coordinator.render_due(generation),
            Command::Stop => {
                log::debug!(target: "dengage", "in-app engine received stop command");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn on_foreground(&mut self, now: Timestamp) {
        if self.fetch_in_flight {
            log::trace!(target: "dengage", "in-app message fetch already in flight");
            return;
        }
        let enabled = self.settings.is_enabled();
        if !should_fetch(
            now,
            self.store.last_fetch_time(),
            self.settings.fetch_interval_minutes,
            enabled,
        ) {
            return;
        }
        let Some(subject) = self.subject() else {
            return;
        };

        self.fetch_in_flight = true;
        let api = Arc::clone(&self.api);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = api.fetch_messages(&subject).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender.send(Command::FetchCompleted(result));
            }
        });
    }

    fn on_fetch_completed(&mut self, now: Timestamp, result: Result<Vec<InAppMessage>>) {
        self.fetch_in_flight = false;
        match result {
            Ok(messages) => {
                let count = messages.len();
                self.store
                    .update(|state| apply_fetched(state, now, messages));
                log::debug!(target: "dengage", count; "cached fetched in-app messages");
            }
            // The last fetch time is left as is, so the next foreground retries.
            Err(err) => {
                log::warn!(target: "dengage", "failed to fetch in-app messages: {err}");
            }
        }
    }

    fn on_navigate(&mut self, now: Timestamp, screen_name: Option<&str>) {
        let Some(subject) = self.subject() else {
            return;
        };
        if self.coordinator.is_busy() {
            log::trace!(target: "dengage",
                        screen_name;
                        "an in-app message is already being shown");
            return;
        }

        let state = self.store.state();
        let Some(message) = select_message(now, &state, screen_name).cloned() else {
            return;
        };

        let report = self.reporter.report_displayed(&subject, &message.message_id);
        self.coordinator.show(
            message,
            now,
            &self.store,
            self.settings.min_time_between_messages(),
        );
        self.spawn(report);
    }

    fn on_clicked(&mut self, message_id: &str, button_id: Option<&str>) {
        self.coordinator.release();
        let subject = self.subject();
        let report =
            self.reporter
                .report_clicked(&self.store, subject.as_ref(), message_id, button_id);
        if let Some(report) = report {
            self.spawn(report);
        }
    }

    fn on_dismissed(&mut self, message_id: &str) {
        self.coordinator.release();
        if let Some(subject) = self.subject() {
            let report = self.reporter.report_dismissed(&subject, message_id);
            self.spawn(report);
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &CacheStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn coordinator(&self) -> &DisplayCoordinator {
        &self.coordinator
    }
}

/// The engine thread.
///
/// Runs [`InAppEngine`] on a current-thread runtime in a dedicated thread. Use
/// [`Client`](crate::Client) to get an instance of it.
pub(crate) struct EngineThread {
    join_handle: std::thread::JoinHandle<()>,
    sender: UnboundedSender<Command>,
}

impl EngineThread {
    /// # Errors
    ///
    /// Returns an IO error if the thread failed to start.
    pub(crate) fn start<A: InAppApi>(
        engine: InAppEngine<A>,
        sender: UnboundedSender<Command>,
        receiver: UnboundedReceiver<Command>,
    ) -> std::io::Result<EngineThread> {
        let join_handle = std::thread::Builder::new()
            .name("dengage-inapp".to_owned())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        log::warn!(target: "dengage",
                                   "failed to start in-app engine runtime: {err}");
                        return;
                    }
                };
                runtime.block_on(engine.run(receiver));
            })?;

        Ok(EngineThread {
            join_handle,
            sender,
        })
    }

    /// Send a command to the engine. Fails only if the engine has stopped.
    pub(crate) fn send(&self, command: Command) -> Result<()> {
        self.sender.send(command).map_err(|_| Error::EngineStopped)
    }

    /// Stop the engine thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub(crate) fn stop(&self) {
        // Error means that the receiver was dropped (thread exited). Ignoring it as there's
        // nothing useful we can do.
        let _ = self.sender.send(Command::Stop);
    }

    /// Stop the engine thread and block until it has exited. Pending reports and events get a
    /// bounded time to complete first.
    pub(crate) fn shutdown(self) -> Result<()> {
        self.stop();

        // Error means that the thread has panicked and there's nothing useful we can do in that
        // case.
        self.join_handle
            .join()
            .map_err(|_| Error::EngineThreadPanicked)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use chrono::TimeZone;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

    use super::{Command, EngineConfig, EngineThread, InAppEngine};
    use crate::{
        cache_store::{CacheStore, MemoryStorage},
        config::InAppSettings,
        events::{CustomEvent, EventCollector, EventDetails},
        inbox::{list_messages, tests::inbox_message},
        message::{tests::html_message, InAppMessage, Timestamp},
        reporter::tests::MockApi,
        Error,
    };

    fn engine(
        settings: InAppSettings,
        api: Arc<MockApi>,
        store: Arc<CacheStore>,
        sender: &UnboundedSender<Command>,
        rendered: Arc<Mutex<Vec<String>>>,
    ) -> InAppEngine<Arc<MockApi>> {
        let renderer = move |message: &InAppMessage| {
            rendered.lock().unwrap().push(message.message_id.clone())
        };
        InAppEngine::new(
            EngineConfig {
                settings,
                device_id: "device".to_owned(),
                contact_key: None,
                store,
                api,
                renderer: Box::new(renderer),
                events: EventCollector::new("https://events.example.com", "ik", "device")
                    .unwrap(),
            },
            sender.downgrade(),
        )
    }

    struct Harness {
        engine: InAppEngine<Arc<MockApi>>,
        receiver: UnboundedReceiver<Command>,
        // Held so that timers and fetch tasks can still reach the engine.
        _sender: UnboundedSender<Command>,
        rendered: Arc<Mutex<Vec<String>>>,
        api: Arc<MockApi>,
    }

    impl Harness {
        fn new(settings: InAppSettings, api: MockApi, cached: Vec<InAppMessage>) -> Harness {
            let store = Arc::new(CacheStore::open(MemoryStorage::new()));
            store.update(|state| state.messages = cached);
            Harness::with_store(settings, api, store)
        }

        fn with_store(settings: InAppSettings, api: MockApi, store: Arc<CacheStore>) -> Harness {
            let (sender, receiver) = unbounded_channel();
            let rendered = Arc::new(Mutex::new(Vec::new()));
            let api = Arc::new(api);
            let engine = engine(settings, api.clone(), store, &sender, rendered.clone());
            Harness {
                engine,
                receiver,
                _sender: sender,
                rendered,
                api,
            }
        }

        fn api(&self) -> &MockApi {
            &self.api
        }

        fn rendered(&self) -> Vec<String> {
            self.rendered.lock().unwrap().clone()
        }

        /// Let detached tasks run, then feed every queued command back into the engine.
        async fn settle(&mut self, now: Timestamp) {
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            while let Ok(command) = self.receiver.try_recv() {
                let _ = self.engine.handle(command, now);
            }
        }
    }

    fn settings() -> InAppSettings {
        InAppSettings::for_account("acc")
            .with_fetch_interval_minutes(60)
            .with_min_seconds_between_messages(60)
    }

    fn t0() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn navigate(screen: &str) -> Command {
        Command::Navigate {
            screen_name: Some(screen.to_owned()),
        }
    }

    #[tokio::test]
    async fn foreground_fetches_and_caches() {
        let mut h = Harness::new(
            settings(),
            MockApi::with_messages(vec![html_message("m1")]),
            vec![],
        );

        let _ = h.engine.handle(Command::Foreground, t0());
        h.settle(t0()).await;

        assert_eq!(h.api().calls(), vec!["fetch".to_owned()]);
        assert_eq!(h.engine.store().messages().len(), 1);
        assert_eq!(h.engine.store().last_fetch_time(), Some(t0()));

        // Not due again until the interval elapses.
        let _ = h
            .engine
            .handle(Command::Foreground, t0() + chrono::Duration::minutes(59));
        h.settle(t0()).await;
        assert_eq!(h.api().calls().len(), 1);

        let _ = h
            .engine
            .handle(Command::Foreground, t0() + chrono::Duration::minutes(60));
        h.settle(t0() + chrono::Duration::minutes(60)).await;
        assert_eq!(h.api().calls().len(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_last_fetch_time() {
        let api = MockApi::default();
        *api.fetch_response.lock().unwrap() = Some(Err(Error::Unauthorized));
        let mut h = Harness::new(settings(), api, vec![]);

        let _ = h.engine.handle(Command::Foreground, t0());
        h.settle(t0()).await;

        assert_eq!(h.engine.store().last_fetch_time(), None);

        // Retries on the next foreground.
        let _ = h.engine.handle(Command::Foreground, t0());
        h.settle(t0()).await;
        assert_eq!(h.api().calls().len(), 2);
    }

    #[tokio::test]
    async fn disabled_engine_does_nothing() {
        let mut settings = settings();
        settings.in_app_enabled = false;
        let mut h = Harness::new(
            settings,
            MockApi::with_messages(vec![html_message("m2")]),
            vec![html_message("m1")],
        );

        let _ = h.engine.handle(Command::Foreground, t0());
        let _ = h.engine.handle(navigate("home"), t0());
        h.settle(t0()).await;

        assert!(h.api().calls().is_empty());
        assert!(h.rendered().is_empty());
    }

    #[tokio::test]
    async fn navigate_shows_and_consumes_message() {
        let mut h = Harness::new(settings(), MockApi::default(), vec![html_message("m1")]);

        let _ = h.engine.handle(navigate("home"), t0());
        h.settle(t0()).await;

        assert_eq!(h.rendered(), vec!["m1".to_owned()]);
        assert_eq!(h.api().calls(), vec!["displayed:m1".to_owned()]);
        assert!(h.engine.store().messages().is_empty());
        assert_eq!(
            h.engine.store().next_show_time(),
            Some(t0() + chrono::Duration::seconds(60))
        );
        assert_eq!(h.engine.coordinator().current_message_id(), Some("m1"));
    }

    #[tokio::test]
    async fn single_slot_and_global_cooldown() {
        let mut h = Harness::new(
            settings(),
            MockApi::default(),
            vec![html_message("m1"), html_message("m2")],
        );

        let _ = h.engine.handle(navigate("home"), t0());
        // Slot is taken until the message is closed.
        let _ = h
            .engine
            .handle(navigate("home"), t0() + chrono::Duration::seconds(61));
        assert_eq!(h.rendered(), vec!["m1".to_owned()]);

        let _ = h.engine.handle(Command::Closed, t0());
        let _ = h
            .engine
            .handle(navigate("home"), t0() + chrono::Duration::seconds(30));
        assert_eq!(h.rendered(), vec!["m1".to_owned()]);

        let _ = h
            .engine
            .handle(navigate("home"), t0() + chrono::Duration::seconds(61));
        assert_eq!(h.rendered(), vec!["m1".to_owned(), "m2".to_owned()]);
    }

    #[tokio::test]
    async fn click_removes_and_dismiss_keeps() {
        let mut recurring = html_message("m1");
        recurring.display_timing.show_every_x_minutes = Some(30);
        let mut h = Harness::new(settings(), MockApi::default(), vec![recurring]);

        let _ = h.engine.handle(navigate("home"), t0());
        let _ = h.engine.handle(
            Command::Dismissed {
                message_id: "m1".to_owned(),
            },
            t0(),
        );
        h.settle(t0()).await;
        assert_eq!(h.engine.store().messages().len(), 1);
        assert_eq!(h.engine.coordinator().current_message_id(), None);

        let later = t0() + chrono::Duration::minutes(31);
        let _ = h.engine.handle(navigate("home"), later);
        let _ = h.engine.handle(
            Command::Clicked {
                message_id: "m1".to_owned(),
                button_id: Some("cta".to_owned()),
            },
            later,
        );
        h.settle(later).await;

        assert!(h.engine.store().messages().is_empty());
        assert_eq!(
            h.api().calls(),
            vec![
                "displayed:m1".to_owned(),
                "dismissed:m1".to_owned(),
                "displayed:m1".to_owned(),
                "clicked:m1:cta".to_owned(),
            ]
        );

        let _ = h
            .engine
            .handle(navigate("home"), later + chrono::Duration::days(1));
        assert_eq!(h.rendered().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_render_fires_after_delay() {
        let mut message = html_message("m1");
        message.display_timing.delay = Some(5);
        let mut h = Harness::new(settings(), MockApi::default(), vec![message]);

        let _ = h.engine.handle(navigate("home"), t0());
        // Let the timer task register its sleep.
        h.settle(t0()).await;
        assert!(h.rendered().is_empty());
        assert!(h.engine.coordinator().is_busy());

        tokio::time::advance(Duration::from_secs(4)).await;
        h.settle(t0()).await;
        assert!(h.rendered().is_empty());

        tokio::time::advance(Duration::from_secs(2)).await;
        h.settle(t0()).await;
        assert_eq!(h.rendered(), vec!["m1".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn background_cancels_delayed_render() {
        let mut message = html_message("m1");
        message.display_timing.delay = Some(5);
        let mut h = Harness::new(settings(), MockApi::default(), vec![message]);

        let _ = h.engine.handle(navigate("home"), t0());
        h.settle(t0()).await;
        let _ = h.engine.handle(Command::Background, t0());
        assert!(!h.engine.coordinator().is_busy());

        tokio::time::advance(Duration::from_secs(10)).await;
        h.settle(t0()).await;

        // A timer that fires after teardown is a no-op.
        let _ = h.engine.handle(Command::RenderDue { generation: 1 }, t0());
        assert!(h.rendered().is_empty());
    }

    #[tokio::test]
    async fn stop_breaks_the_loop() {
        let mut h = Harness::new(settings(), MockApi::default(), vec![]);
        assert!(h.engine.handle(Command::Stop, t0()).is_break());
        assert!(h.engine.handle(Command::Closed, t0()).is_continue());
    }

    #[tokio::test]
    async fn missing_account_name_disables_engine() {
        let settings = InAppSettings {
            account_name: None,
            ..settings()
        };
        assert!(settings.in_app_enabled);
        let mut h = Harness::new(
            settings,
            MockApi::with_messages(vec![html_message("m2")]),
            vec![html_message("m1")],
        );

        let _ = h.engine.handle(Command::Foreground, t0());
        let _ = h.engine.handle(navigate("home"), t0());
        h.settle(t0()).await;

        assert!(h.api().calls().is_empty());
        assert!(h.rendered().is_empty());
        assert_eq!(h.engine.store().messages().len(), 1);
    }

    #[tokio::test]
    async fn click_while_disabled_removes_without_reporting() {
        let mut recurring = html_message("m1");
        recurring.display_timing.show_every_x_minutes = Some(30);
        let mut h = Harness::new(settings(), MockApi::default(), vec![recurring]);
        let _ = h.engine.handle(navigate("home"), t0());
        h.settle(t0()).await;
        assert_eq!(h.engine.store().messages().len(), 1);

        let mut disabled = settings();
        disabled.in_app_enabled = false;
        let _ = h.engine.handle(Command::UpdateSettings(disabled), t0());
        let _ = h.engine.handle(
            Command::Clicked {
                message_id: "m1".to_owned(),
                button_id: None,
            },
            t0(),
        );
        h.settle(t0()).await;

        assert!(h.engine.store().messages().is_empty());
        assert_eq!(h.engine.coordinator().current_message_id(), None);
        assert_eq!(h.api().calls(), vec!["displayed:m1".to_owned()]);
    }

    #[tokio::test]
    async fn campaign_survives_restart() {
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(CacheStore::open(storage.clone()));
        let mut h = Harness::with_store(settings(), MockApi::default(), store);
        let _ = h.engine.handle(
            Command::SetCampaign {
                camp_id: "camp".to_owned(),
                send_id: Some("send".to_owned()),
            },
            t0(),
        );
        drop(h);

        let reopened = Arc::new(CacheStore::open(storage));
        let h = Harness::with_store(settings(), MockApi::default(), reopened);
        let campaign = h.engine.events.campaign().unwrap();
        assert_eq!(campaign.started_at, t0());
        let mut order = EventDetails::new();
        order.insert("order_id".to_owned(), "o1".into());
        let rows = h
            .engine
            .events
            .build(CustomEvent::Order(order), t0() + chrono::Duration::hours(1));

        assert_eq!(rows[0].event_table, "order_events");
        assert_eq!(rows[0].event_details["camp_id"], "camp");
        assert_eq!(rows[0].event_details["send_id"], "send");
    }

    #[tokio::test]
    async fn inbox_commands_apply_in_order_while_disabled() {
        let mut settings = settings();
        settings.in_app_enabled = false;
        let mut h = Harness::new(settings, MockApi::default(), vec![]);

        for id in ["i1", "i2", "i3"] {
            let _ = h
                .engine
                .handle(Command::SaveInboxMessage(inbox_message(id)), t0());
        }
        let _ = h.engine.handle(
            Command::DeleteInboxMessage {
                id: "i2".to_owned(),
            },
            t0(),
        );
        let _ = h.engine.handle(
            Command::MarkInboxMessageAsRead {
                id: "i3".to_owned(),
            },
            t0(),
        );

        let inbox = list_messages(t0(), &h.engine.store().state().inbox);
        let ids: Vec<_> = inbox.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i3"]);
        assert!(!inbox[0].is_read);
        assert!(inbox[1].is_read);
        assert!(h.api().calls().is_empty());
    }

    #[test]
    fn shutdown_waits_for_pending_reports() {
        let (sender, receiver) = unbounded_channel();
        let api = Arc::new(MockApi::default());
        let store = Arc::new(CacheStore::open(MemoryStorage::new()));
        let engine = engine(
            settings(),
            api.clone(),
            store,
            &sender,
            Arc::new(Mutex::new(Vec::new())),
        );
        let thread = EngineThread::start(engine, sender, receiver).unwrap();

        thread
            .send(Command::Dismissed {
                message_id: "m1".to_owned(),
            })
            .unwrap();
        thread.shutdown().unwrap();

        assert_eq!(api.calls(), vec!["dismissed:m1".to_owned()]);
    }
}
