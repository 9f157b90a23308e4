//! Remote in-app message service: fetching messages and reporting actions.
use std::{future::Future, sync::Arc};

use reqwest::{StatusCode, Url};

use crate::{
    config::Subject,
    message::{drop_malformed, InAppMessage, TryParse},
    Error, Result,
};

/// Remote Fetch and Action APIs consumed by the engine.
///
/// Implementations must not panic; every failure is returned as an [`Error`] and only logged by
/// the engine.
pub trait InAppApi: Send + Sync + 'static {
    /// Fetch the batch of messages addressed to `subject`. Malformed messages are dropped, the
    /// rest of the batch is returned.
    fn fetch_messages(
        &self,
        subject: &Subject,
    ) -> impl Future<Output = Result<Vec<InAppMessage>>> + Send;

    /// Report that the message was shown.
    fn mark_displayed(
        &self,
        subject: &Subject,
        message_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Report a click, with the button that was tapped if any.
    fn mark_clicked(
        &self,
        subject: &Subject,
        message_id: &str,
        button_id: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Report that the message was closed without a click.
    fn mark_dismissed(
        &self,
        subject: &Subject,
        message_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<T: InAppApi> InAppApi for Arc<T> {
    fn fetch_messages(
        &self,
        subject: &Subject,
    ) -> impl Future<Output = Result<Vec<InAppMessage>>> + Send {
        (**self).fetch_messages(subject)
    }

    fn mark_displayed(
        &self,
        subject: &Subject,
        message_id: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).mark_displayed(subject, message_id)
    }

    fn mark_clicked(
        &self,
        subject: &Subject,
        message_id: &str,
        button_id: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).mark_clicked(subject, message_id, button_id)
    }

    fn mark_dismissed(
        &self,
        subject: &Subject,
        message_id: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).mark_dismissed(subject, message_id)
    }
}

const GET_MESSAGES_ENDPOINT: &str = "/api/inapp/getMessages";
const SET_DISPLAYED_ENDPOINT: &str = "/api/inapp/setAsDisplayed";
const SET_CLICKED_ENDPOINT: &str = "/api/inapp/setAsClicked";
const SET_DISMISSED_ENDPOINT: &str = "/api/inapp/setAsDismissed";

/// HTTP implementation of [`InAppApi`].
pub struct HttpInAppApi {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    base_url: String,
}

impl HttpInAppApi {
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseUrl`] if `base_url` cannot be parsed.
    pub fn new(base_url: impl Into<String>) -> Result<HttpInAppApi> {
        let base_url = base_url.into();
        Url::parse(&base_url).map_err(Error::InvalidBaseUrl)?;
        Ok(HttpInAppApi {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, endpoint: &str, subject: &Subject, extra: &[(&str, &str)]) -> Result<Url> {
        let mut params = vec![
            ("acc", subject.account_name.as_str()),
            ("cdkey", subject.contact_key.key.as_str()),
            ("did", subject.device_id.as_str()),
            ("type", subject.contact_key.key_type.as_str()),
        ];
        params.extend_from_slice(extra);
        Url::parse_with_params(&format!("{}{}", self.base_url, endpoint), &params)
            .map_err(Error::InvalidBaseUrl)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response> {
        let response = self.client.get(url).send().await?;
        response.error_for_status().map_err(|err| {
            if err.status() == Some(StatusCode::UNAUTHORIZED) {
                log::warn!(target: "dengage",
                           "client is not authorized. Check your account name");
                Error::Unauthorized
            } else {
                log::warn!(target: "dengage",
                           "received non-200 response from in-app service: {:?}",
                           err.status());
                Error::from(err)
            }
        })
    }

    async fn report(
        &self,
        endpoint: &str,
        subject: &Subject,
        extra: &[(&str, &str)],
    ) -> Result<()> {
        let url = self.url(endpoint, subject, extra)?;
        self.send(url).await?;
        Ok(())
    }
}

impl InAppApi for HttpInAppApi {
    async fn fetch_messages(&self, subject: &Subject) -> Result<Vec<InAppMessage>> {
        let url = self.url(GET_MESSAGES_ENDPOINT, subject, &[])?;

        log::debug!(target: "dengage", "fetching in-app messages");
        let response = self.send(url).await?;

        // A null or empty body means there is nothing to show.
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let batch: Option<Vec<TryParse<InAppMessage>>> = serde_json::from_slice(&bytes)?;
        let messages = drop_malformed(batch.unwrap_or_default());

        log::debug!(target: "dengage",
                    count = messages.len();
                    "successfully fetched in-app messages");

        Ok(messages)
    }

    async fn mark_displayed(&self, subject: &Subject, message_id: &str) -> Result<()> {
        self.report(SET_DISPLAYED_ENDPOINT, subject, &[("id", message_id)])
            .await
    }

    async fn mark_clicked(
        &self,
        subject: &Subject,
        message_id: &str,
        button_id: Option<&str>,
    ) -> Result<()> {
        let mut extra = vec![("id", message_id)];
        if let Some(button_id) = button_id {
            extra.push(("button", button_id));
        }
        self.report(SET_CLICKED_ENDPOINT, subject, &extra).await
    }

    async fn mark_dismissed(&self, subject: &Subject, message_id: &str) -> Result<()> {
        self.report(SET_DISMISSED_ENDPOINT, subject, &[("id", message_id)])
            .await
    }
}
