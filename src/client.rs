use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::unbounded_channel;

use crate::{
    api::{HttpInAppApi, InAppApi},
    cache_store::CacheStore,
    engine::{Command, EngineConfig, EngineThread, InAppEngine},
    events::{CustomEvent, EventCollector, EventDetails},
    inbox::{list_messages, InboxMessage},
    ClientConfig, InAppSettings, Result,
};

/// A client for the Dengage in-app and event APIs.
///
/// The client is a handle to a background engine thread. Every method only enqueues work for the
/// engine and returns immediately; it fails only with [`Error::EngineStopped`] after the engine
/// has shut down.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```no_run
/// # use dengage::{Client, ClientConfig, InAppSettings};
/// let client = Client::new(
///     ClientConfig::from_integration_key("integration-key")
///         .in_app_settings(InAppSettings::for_account("account")),
/// )
/// .unwrap();
/// client.on_foreground().unwrap();
/// client.on_navigate(Some("home")).unwrap();
/// ```
///
/// [`Error::EngineStopped`]: crate::Error::EngineStopped
pub struct Client {
    engine: EngineThread,
    /// Shared with the engine, which is its only writer.
    store: Arc<CacheStore>,
}

impl Client {
    /// Create a new `Client` talking to the HTTP in-app service at
    /// [`ClientConfig::base_url`].
    ///
    /// # Errors
    ///
    /// Returns an error if a configured URL is invalid, the cache directory cannot be created, or
    /// the engine thread fails to start.
    pub fn new(config: ClientConfig) -> Result<Client> {
        let api = HttpInAppApi::new(config.base_url.clone())?;
        Client::with_api(config, api)
    }

    /// Create a new `Client` using a custom [`InAppApi`] implementation.
    pub fn with_api(mut config: ClientConfig, api: impl InAppApi) -> Result<Client> {
        let storage = config.take_storage()?;

        if config.device_id.is_empty() {
            config.device_id = uuid::Uuid::new_v4().to_string();
            log::debug!(target: "dengage",
                        device_id = config.device_id.as_str();
                        "no device id configured, generated one");
        }

        let events = EventCollector::new(
            &config.event_url,
            config.integration_key,
            config.device_id.clone(),
        )?;

        let store = Arc::new(CacheStore::open(storage));
        let (sender, receiver) = unbounded_channel();
        let engine = InAppEngine::new(
            EngineConfig {
                settings: config.settings,
                device_id: config.device_id,
                contact_key: config.contact_key,
                store: Arc::clone(&store),
                api,
                renderer: config.renderer,
                events,
            },
            sender.downgrade(),
        );

        let engine = EngineThread::start(engine, sender, receiver)?;
        Ok(Client { engine, store })
    }

    /// The application came to the foreground. Fetches messages if the fetch interval has
    /// elapsed.
    pub fn on_foreground(&self) -> Result<()> {
        self.engine.send(Command::Foreground)
    }

    /// The application went to the background. Cancels a pending delayed render.
    pub fn on_background(&self) -> Result<()> {
        self.engine.send(Command::Background)
    }

    /// The user navigated to `screen_name`. Shows the best eligible message, if any.
    ///
    /// Without a screen name only messages that are not targeted at a screen are eligible.
    pub fn on_navigate(&self, screen_name: Option<&str>) -> Result<()> {
        self.engine.send(Command::Navigate {
            screen_name: screen_name.map(str::to_owned),
        })
    }

    /// A button of the shown message was clicked. The message is never shown again.
    pub fn message_clicked(
        &self,
        message_id: impl Into<String>,
        button_id: Option<&str>,
    ) -> Result<()> {
        self.engine.send(Command::Clicked {
            message_id: message_id.into(),
            button_id: button_id.map(str::to_owned),
        })
    }

    /// The user dismissed the shown message.
    pub fn message_dismissed(&self, message_id: impl Into<String>) -> Result<()> {
        self.engine.send(Command::Dismissed {
            message_id: message_id.into(),
        })
    }

    /// The shown message went away without user action. Frees the slot for the next message.
    pub fn message_closed(&self) -> Result<()> {
        self.engine.send(Command::Closed)
    }

    /// Replace the in-app settings. Disabling in-app messaging cancels a pending render.
    pub fn update_settings(&self, settings: InAppSettings) -> Result<()> {
        self.engine.send(Command::UpdateSettings(settings))
    }

    /// Set or clear the user-level contact key.
    pub fn set_contact_key(&self, contact_key: Option<&str>) -> Result<()> {
        self.engine
            .send(Command::SetContactKey(contact_key.map(str::to_owned)))
    }

    /// Attribute following events to a campaign for two days. The attribution is persisted and
    /// survives restarts.
    pub fn set_campaign(
        &self,
        camp_id: impl Into<String>,
        send_id: Option<&str>,
    ) -> Result<()> {
        self.engine.send(Command::SetCampaign {
            camp_id: camp_id.into(),
            send_id: send_id.map(str::to_owned),
        })
    }

    /// Send a behavioral event.
    pub fn track(&self, event: CustomEvent) -> Result<()> {
        self.engine.send(Command::Track(event))
    }

    /// Start a session. UTM parameters are read from `referrer`.
    pub fn session_start(&self, referrer: impl Into<String>) -> Result<()> {
        self.track(CustomEvent::SessionStart {
            referrer: referrer.into(),
        })
    }

    /// A page or screen was viewed.
    pub fn page_view(&self, details: EventDetails) -> Result<()> {
        self.track(CustomEvent::PageView(details))
    }

    /// Items were added to the cart. `cartItems` in `details` become detail rows.
    pub fn add_to_cart(&self, details: EventDetails) -> Result<()> {
        self.track(CustomEvent::AddToCart(details))
    }

    /// Items were removed from the cart.
    pub fn remove_from_cart(&self, details: EventDetails) -> Result<()> {
        self.track(CustomEvent::RemoveFromCart(details))
    }

    /// The cart was viewed.
    pub fn view_cart(&self, details: EventDetails) -> Result<()> {
        self.track(CustomEvent::ViewCart(details))
    }

    /// Checkout started.
    pub fn begin_checkout(&self, details: EventDetails) -> Result<()> {
        self.track(CustomEvent::BeginCheckout(details))
    }

    /// An order was placed. Carries the active campaign, if any.
    pub fn order(&self, details: EventDetails) -> Result<()> {
        self.track(CustomEvent::Order(details))
    }

    /// A search was made.
    pub fn search(&self, details: EventDetails) -> Result<()> {
        self.track(CustomEvent::Search(details))
    }

    /// Items were added to the wishlist.
    pub fn add_to_wishlist(&self, details: EventDetails) -> Result<()> {
        self.track(CustomEvent::AddToWishlist(details))
    }

    /// Items were removed from the wishlist.
    pub fn remove_from_wishlist(&self, details: EventDetails) -> Result<()> {
        self.track(CustomEvent::RemoveFromWishlist(details))
    }

    /// Send a row to an arbitrary event table.
    pub fn send_event(
        &self,
        table: impl Into<String>,
        key: impl Into<String>,
        details: EventDetails,
    ) -> Result<()> {
        self.track(CustomEvent::Raw {
            table: table.into(),
            key: key.into(),
            details,
        })
    }

    /// Save a message to the inbox. A message whose id is already saved is ignored.
    pub fn save_inbox_message(&self, message: InboxMessage) -> Result<()> {
        self.engine.send(Command::SaveInboxMessage(message))
    }

    /// Inbox messages that have not expired, soonest expiry first.
    ///
    /// Reads the latest cache snapshot. Inbox changes made through this client are applied by the
    /// engine in order and show up here once the engine has handled them.
    pub fn inbox_messages(&self) -> Vec<InboxMessage> {
        list_messages(Utc::now(), &self.store.state().inbox)
    }

    /// Remove a message from the inbox.
    pub fn delete_inbox_message(&self, id: impl Into<String>) -> Result<()> {
        self.engine
            .send(Command::DeleteInboxMessage { id: id.into() })
    }

    /// Mark an inbox message as read. The flag is persisted.
    pub fn mark_inbox_message_as_read(&self, id: impl Into<String>) -> Result<()> {
        self.engine
            .send(Command::MarkInboxMessageAsRead { id: id.into() })
    }

    /// Stop the engine thread and block waiting for it to exit. A pending delayed render is
    /// cancelled; pending reports and events get a few seconds to complete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineThreadPanicked`](crate::Error::EngineThreadPanicked) if the engine
    /// thread panicked.
    pub fn shutdown(self) -> Result<()> {
        self.engine.shutdown()
    }
}
