use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    cache_store::{FileStorage, MemoryStorage, Storage},
    renderer::NoopRenderer,
    Client, Renderer, Result,
};

/// In-app messaging settings, usually delivered by the remote settings endpoint.
///
/// Absence of `account_name` or `in_app_enabled = false` disables the in-app engine entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppSettings {
    /// Account the in-app service addresses requests to.
    #[serde(default)]
    pub account_name: Option<String>,
    /// Master switch for in-app messaging.
    #[serde(default)]
    pub in_app_enabled: bool,
    /// Minimum time between two fetches.
    #[serde(default = "default_fetch_interval_minutes")]
    pub fetch_interval_minutes: u64,
    /// Global cooldown after a message is shown.
    #[serde(default)]
    pub min_seconds_between_messages: u64,
}

fn default_fetch_interval_minutes() -> u64 {
    InAppSettings::DEFAULT_FETCH_INTERVAL_MINUTES
}

impl InAppSettings {
    /// Default value for [`InAppSettings::fetch_interval_minutes`].
    pub const DEFAULT_FETCH_INTERVAL_MINUTES: u64 = 60;

    /// Enabled settings for `account_name`.
    pub fn for_account(account_name: impl Into<String>) -> InAppSettings {
        InAppSettings {
            account_name: Some(account_name.into()),
            in_app_enabled: true,
            ..InAppSettings::default()
        }
    }

    /// Override [`InAppSettings::fetch_interval_minutes`].
    pub fn with_fetch_interval_minutes(mut self, minutes: u64) -> InAppSettings {
        self.fetch_interval_minutes = minutes;
        self
    }

    /// Override [`InAppSettings::min_seconds_between_messages`].
    pub fn with_min_seconds_between_messages(mut self, seconds: u64) -> InAppSettings {
        self.min_seconds_between_messages = seconds;
        self
    }

    /// In-app messaging is on and an account name is set.
    pub fn is_enabled(&self) -> bool {
        self.in_app_enabled
            && self
                .account_name
                .as_deref()
                .is_some_and(|name| !name.is_empty())
    }

    /// The global cooldown as a duration. Saturates on overflow.
    pub fn min_time_between_messages(&self) -> chrono::Duration {
        i64::try_from(self.min_seconds_between_messages)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for InAppSettings {
    fn default() -> InAppSettings {
        InAppSettings {
            account_name: None,
            in_app_enabled: false,
            fetch_interval_minutes: InAppSettings::DEFAULT_FETCH_INTERVAL_MINUTES,
            min_seconds_between_messages: 0,
        }
    }
}

/// How the user is addressed in the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactKeyType {
    /// User-level contact key.
    #[serde(rename = "c")]
    Contact,
    /// Device identifier used as the key.
    #[serde(rename = "d")]
    Device,
}

impl ContactKeyType {
    /// Wire value of the `type` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactKeyType::Contact => "c",
            ContactKeyType::Device => "d",
        }
    }
}

/// The key a user is addressed with, and what kind of key it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactKey {
    /// Contact key or device id.
    pub key: String,
    /// Kind of `key`.
    pub key_type: ContactKeyType,
}

impl ContactKey {
    /// Use `contact_key` when set and non-empty, otherwise fall back to the device id.
    pub fn resolve(contact_key: Option<&str>, device_id: &str) -> ContactKey {
        match contact_key.filter(|key| !key.is_empty()) {
            Some(key) => ContactKey {
                key: key.to_owned(),
                key_type: ContactKeyType::Contact,
            },
            None => ContactKey {
                key: device_id.to_owned(),
                key_type: ContactKeyType::Device,
            },
        }
    }
}

/// Keys every remote in-app request is addressed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Account name from the in-app settings.
    pub account_name: String,
    /// Resolved contact key.
    pub contact_key: ContactKey,
    /// Device identifier.
    pub device_id: String,
}

/// Configuration for [`Client`].
///
/// # Examples
/// ```no_run
/// # use dengage::{ClientConfig, InAppSettings};
/// let client = ClientConfig::from_integration_key("integration-key")
///     .device_id("device-id")
///     .in_app_settings(InAppSettings::for_account("account"))
///     .cache_path("/tmp/dengage/inapp.json")
///     .renderer(|message: &dengage::InAppMessage| {
///         println!("showing {}", message.message_id);
///     })
///     .to_client()
///     .unwrap();
/// ```
pub struct ClientConfig {
    pub(crate) integration_key: String,
    pub(crate) base_url: String,
    pub(crate) event_url: String,
    pub(crate) device_id: String,
    pub(crate) contact_key: Option<String>,
    pub(crate) settings: InAppSettings,
    pub(crate) cache_path: Option<PathBuf>,
    pub(crate) storage: Option<Box<dyn Storage>>,
    pub(crate) renderer: Box<dyn Renderer + Send>,
}

impl ClientConfig {
    /// Create a default configuration using the specified integration key.
    ///
    /// ```
    /// # use dengage::ClientConfig;
    /// ClientConfig::from_integration_key("integration-key");
    /// ```
    pub fn from_integration_key(integration_key: impl Into<String>) -> Self {
        ClientConfig {
            integration_key: integration_key.into(),
            base_url: ClientConfig::DEFAULT_BASE_URL.to_owned(),
            event_url: ClientConfig::DEFAULT_EVENT_URL.to_owned(),
            device_id: String::new(),
            contact_key: None,
            settings: InAppSettings::default(),
            cache_path: None,
            storage: None,
            renderer: Box::new(NoopRenderer),
        }
    }

    /// Default base URL for in-app API calls.
    pub const DEFAULT_BASE_URL: &'static str = "https://push.dengage.com";

    /// Default URL events are posted to.
    pub const DEFAULT_EVENT_URL: &'static str = "https://event.dengage.com/api/event";

    /// Override base URL for in-app API calls. Clients should use the default setting in most
    /// cases.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the URL events are posted to.
    pub fn event_url(mut self, event_url: impl Into<String>) -> Self {
        self.event_url = event_url.into();
        self
    }

    /// Device identifier. A random one is generated when left empty.
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    /// User-level contact key. Without one, requests are keyed by the device id.
    pub fn contact_key(mut self, contact_key: impl Into<String>) -> Self {
        self.contact_key = Some(contact_key.into());
        self
    }

    /// Initial in-app settings. In-app messaging is disabled until they name an account.
    pub fn in_app_settings(mut self, settings: InAppSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Persist the message cache as a JSON file at `path`.
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self.storage = None;
        self
    }

    /// Persist the message cache with a custom backend.
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self.cache_path = None;
        self
    }

    /// Set the renderer that displays selected messages.
    ///
    /// ```
    /// # use dengage::{ClientConfig, InAppMessage};
    /// let config = ClientConfig::from_integration_key("integration-key")
    ///     .renderer(|message: &InAppMessage| println!("{:?}", message.content.html()));
    /// ```
    pub fn renderer(mut self, renderer: impl Renderer + Send + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// Resolve the configured storage. Without a cache path or storage the cache lives in memory.
    pub(crate) fn take_storage(&mut self) -> Result<Box<dyn Storage>> {
        if let Some(storage) = self.storage.take() {
            return Ok(storage);
        }
        match self.cache_path.take() {
            Some(path) => Ok(Box::new(FileStorage::new(path)?)),
            None => {
                log::debug!(target: "dengage",
                            "no cache path configured, keeping in-app messages in memory");
                Ok(Box::new(MemoryStorage::new()))
            }
        }
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBaseUrl`](crate::Error::InvalidBaseUrl) if a URL does not parse.
    /// - [`Error::Io`](crate::Error::Io) if the cache directory cannot be created or the engine
    /// thread fails to start.
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}
