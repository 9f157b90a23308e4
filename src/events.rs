//! Behavioral event collection.
//!
//! Events are rows addressed to a server-side table (`eventTable`) and keyed by the device. Helper
//! events such as carts and orders expand into a header row plus one detail row per item.
//! Delivery failures are logged and dropped.
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{message::Timestamp, Error, Result};

/// Free-form event parameters.
pub type EventDetails = serde_json::Map<String, Value>;

/// Campaign attribution is attached to events for this long after [`EventCollector::set_campaign`].
pub const CAMPAIGN_ATTRIBUTION_DAYS: i64 = 2;

/// A single row posted to the event endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedEvent {
    /// Integration key of the application.
    pub integration_key: String,
    /// Row key, usually the device id.
    pub key: String,
    /// Server-side table receiving the row.
    pub event_table: String,
    /// Column values.
    pub event_details: EventDetails,
}

/// Events supported by the collector.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CustomEvent {
    /// Session started; UTM parameters are taken from `referrer`.
    SessionStart {
        /// Link or referrer the app was opened with.
        referrer: String,
    },
    /// A page or screen was viewed.
    PageView(EventDetails),
    /// Items added to the cart. `cartItems` becomes detail rows.
    AddToCart(EventDetails),
    /// Items removed from the cart.
    RemoveFromCart(EventDetails),
    /// The cart was viewed.
    ViewCart(EventDetails),
    /// Checkout started.
    BeginCheckout(EventDetails),
    /// Order placed. Carries campaign attribution while it is active.
    Order(EventDetails),
    /// A search was made.
    Search(EventDetails),
    /// Items added to the wishlist.
    AddToWishlist(EventDetails),
    /// Items removed from the wishlist.
    RemoveFromWishlist(EventDetails),
    /// A row for an arbitrary table, sent as is apart from the session id.
    Raw {
        /// Target table.
        table: String,
        /// Row key.
        key: String,
        /// Column values.
        details: EventDetails,
    },
}

/// The push campaign that opened the app. Persisted so attribution survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// Campaign id.
    pub camp_id: String,
    /// Send id of the push that opened the app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_id: Option<String>,
    /// Attribution lasts [`CAMPAIGN_ATTRIBUTION_DAYS`] from this instant.
    pub started_at: Timestamp,
}

impl Campaign {
    /// Returns `true` while events should carry this campaign.
    pub fn is_active(&self, now: Timestamp) -> bool {
        now - self.started_at < chrono::Duration::days(CAMPAIGN_ATTRIBUTION_DAYS)
    }
}

/// Builds event rows for one device session and posts them to the event endpoint.
pub struct EventCollector {
    client: reqwest::Client,
    event_url: Url,
    integration_key: String,
    device_id: String,
    session_id: String,
    campaign: Option<Campaign>,
}

impl EventCollector {
    /// Starts a new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseUrl`] if `event_url` cannot be parsed.
    pub fn new(
        event_url: &str,
        integration_key: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Result<EventCollector> {
        Ok(EventCollector {
            client: reqwest::Client::new(),
            event_url: Url::parse(event_url).map_err(Error::InvalidBaseUrl)?,
            integration_key: integration_key.into(),
            device_id: device_id.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            campaign: None,
        })
    }

    /// Identifier of the current session, attached to every row.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Campaign currently attributed, whether or not it is still active.
    pub fn campaign(&self) -> Option<&Campaign> {
        self.campaign.as_ref()
    }

    /// Attribute subsequent events to `campaign`.
    pub fn set_campaign(&mut self, campaign: Campaign) {
        log::debug!(target: "dengage",
                    camp_id = campaign.camp_id.as_str();
                    "campaign attribution started");
        self.campaign = Some(campaign);
    }

    /// Post `rows` in order. The returned future owns everything it needs so it can be spawned.
    pub fn send(&self, rows: Vec<CollectedEvent>) -> impl Future<Output = ()> + Send + 'static {
        let client = self.client.clone();
        let url = self.event_url.clone();
        async move {
            for row in rows {
                if let Err(err) = post(&client, url.clone(), &row).await {
                    log::warn!(target: "dengage",
                               event_table = row.event_table.as_str();
                               "failed to send event: {err}");
                }
            }
        }
    }

    /// Expand `event` into the rows to post.
    pub fn build(&self, event: CustomEvent, now: Timestamp) -> Vec<CollectedEvent> {
        match event {
            CustomEvent::SessionStart { referrer } => {
                let mut details = self.session_details(EventDetails::new());
                details.insert("referrer".to_owned(), referrer.clone().into());
                details.extend(utm_params(&referrer));
                self.attach_campaign(&mut details, now);
                vec![self.row("session_info", details)]
            }
            CustomEvent::PageView(details) => {
                vec![self.row("page_view_events", self.session_details(details))]
            }
            CustomEvent::AddToCart(details) => self.cart_events("add_to_cart", details),
            CustomEvent::RemoveFromCart(details) => self.cart_events("remove_from_cart", details),
            CustomEvent::ViewCart(details) => self.cart_events("view_cart", details),
            CustomEvent::BeginCheckout(details) => self.cart_events("begin_checkout", details),
            CustomEvent::Order(details) => self.order_events(details, now),
            CustomEvent::Search(details) => {
                vec![self.row("search_events", self.session_details(details))]
            }
            CustomEvent::AddToWishlist(details) => self.list_events(
                "wishlist_events",
                "wishlist_events_detail",
                "add",
                details,
            ),
            CustomEvent::RemoveFromWishlist(details) => self.list_events(
                "wishlist_events",
                "wishlist_events_detail",
                "remove",
                details,
            ),
            CustomEvent::Raw {
                table,
                key,
                details,
            } => vec![CollectedEvent {
                integration_key: self.integration_key.clone(),
                key,
                event_table: table,
                event_details: self.session_details(details),
            }],
        }
    }

    fn row(&self, table: &str, details: EventDetails) -> CollectedEvent {
        CollectedEvent {
            integration_key: self.integration_key.clone(),
            key: self.device_id.clone(),
            event_table: table.to_owned(),
            event_details: details,
        }
    }

    fn session_details(&self, mut details: EventDetails) -> EventDetails {
        details.insert("session_id".to_owned(), self.session_id.clone().into());
        details
    }

    fn attach_campaign(&self, details: &mut EventDetails, now: Timestamp) {
        let Some(campaign) = self.campaign.as_ref().filter(|c| c.is_active(now)) else {
            return;
        };
        details.insert("camp_id".to_owned(), campaign.camp_id.clone().into());
        if let Some(send_id) = &campaign.send_id {
            details.insert("send_id".to_owned(), send_id.clone().into());
        }
    }

    fn cart_events(&self, event_type: &str, details: EventDetails) -> Vec<CollectedEvent> {
        self.list_events(
            "shopping_cart_events",
            "shopping_cart_events_detail",
            event_type,
            details,
        )
    }

    /// Header row in `table` plus one row per cart item in `detail_table`, linked by `event_id`.
    fn list_events(
        &self,
        table: &str,
        detail_table: &str,
        event_type: &str,
        details: EventDetails,
    ) -> Vec<CollectedEvent> {
        let event_id = Value::from(uuid::Uuid::new_v4().to_string());
        let (mut header, items) = split_cart_items(self.session_details(details));
        header.insert("event_type".to_owned(), event_type.into());
        header.insert("event_id".to_owned(), event_id.clone());

        let mut rows = vec![self.row(table, header)];
        rows.extend(items.into_iter().map(|mut item| {
            item.insert("event_id".to_owned(), event_id.clone());
            self.row(detail_table, item)
        }));
        rows
    }

    fn order_events(&self, details: EventDetails, now: Timestamp) -> Vec<CollectedEvent> {
        let (mut order, items) = split_cart_items(self.session_details(details));
        self.attach_campaign(&mut order, now);
        let order_id = order.get("order_id").cloned().unwrap_or(Value::Null);

        let mut cart_event = self.session_details(EventDetails::new());
        cart_event.insert("event_type".to_owned(), "order".into());
        cart_event.insert(
            "event_id".to_owned(),
            uuid::Uuid::new_v4().to_string().into(),
        );

        let mut rows = vec![
            self.row("order_events", order),
            self.row("shopping_cart_events", cart_event),
        ];
        rows.extend(items.into_iter().map(|mut item| {
            item.insert("order_id".to_owned(), order_id.clone());
            self.row("order_events_details", item)
        }));
        rows
    }
}

/// Separate `cartItems` from the rest of the details. A missing or non-list `cartItems` counts
/// as no items; items that are not objects are dropped.
fn split_cart_items(mut details: EventDetails) -> (EventDetails, Vec<EventDetails>) {
    let items = match details.remove("cartItems") {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(item) => Some(item),
                other => {
                    log::warn!(target: "dengage",
                               "dropping cart item that is not an object: {other}");
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            log::warn!(target: "dengage", "ignoring cartItems that is not a list: {other}");
            Vec::new()
        }
    };
    (details, items)
}

const UTM_PARAMS: [&str; 5] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
];

fn utm_params(referrer: &str) -> EventDetails {
    let Ok(url) = Url::parse(referrer) else {
        return EventDetails::new();
    };
    url.query_pairs()
        .filter(|(name, _)| UTM_PARAMS.contains(&name.as_ref()))
        .map(|(name, value)| (name.into_owned(), Value::from(value.into_owned())))
        .collect()
}

async fn post(client: &reqwest::Client, url: Url, event: &CollectedEvent) -> Result<()> {
    client
        .post(url)
        .json(event)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
