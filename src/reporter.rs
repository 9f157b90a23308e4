//! Reporting of message actions to the remote service.
use std::{future::Future, sync::Arc};

use crate::{api::InAppApi, cache_store::CacheStore, config::Subject};

/// Reports displayed/clicked/dismissed actions.
///
/// Reports are returned as futures that own their inputs, so the caller decides where they run.
/// Failures are logged and never roll back local state.
pub struct ActionReporter<A> {
    api: Arc<A>,
}

impl<A: InAppApi> ActionReporter<A> {
    /// Create a reporter sending through `api`.
    pub fn new(api: Arc<A>) -> ActionReporter<A> {
        ActionReporter { api }
    }

    /// Report that the message was shown.
    pub fn report_displayed(
        &self,
        subject: &Subject,
        message_id: &str,
    ) -> impl Future<Output = ()> + Send + 'static {
        let api = Arc::clone(&self.api);
        let subject = subject.clone();
        let message_id = message_id.to_owned();
        async move {
            let result = api.mark_displayed(&subject, &message_id).await;
            log_report("displayed", &message_id, result);
        }
    }

    /// Removes the message from the cache right away, then reports the click if a `subject` is
    /// given. Clicked messages are never shown again, even if the report fails or is skipped.
    pub fn report_clicked(
        &self,
        store: &CacheStore,
        subject: Option<&Subject>,
        message_id: &str,
        button_id: Option<&str>,
    ) -> Option<impl Future<Output = ()> + Send + 'static> {
        let removed = store.update(|state| state.remove_message(message_id));
        if !removed {
            log::debug!(target: "dengage", message_id; "clicked message was not in the cache");
        }

        let api = Arc::clone(&self.api);
        let subject = subject?.clone();
        let message_id = message_id.to_owned();
        let button_id = button_id.map(str::to_owned);
        Some(async move {
            let result = api
                .mark_clicked(&subject, &message_id, button_id.as_deref())
                .await;
            log_report("clicked", &message_id, result);
        })
    }

    /// Reports a dismissal. The cache is left unchanged, so the message stays subject to its
    /// normal recurrence and expiry.
    pub fn report_dismissed(
        &self,
        subject: &Subject,
        message_id: &str,
    ) -> impl Future<Output = ()> + Send + 'static {
        let api = Arc::clone(&self.api);
        let subject = subject.clone();
        let message_id = message_id.to_owned();
        async move {
            let result = api.mark_dismissed(&subject, &message_id).await;
            log_report("dismissed", &message_id, result);
        }
    }
}

fn log_report(action: &str, message_id: &str, result: crate::Result<()>) {
    match result {
        Ok(()) => log::trace!(target: "dengage",
                              message_id, action;
                              "reported message action"),
        Err(err) => log::warn!(target: "dengage",
                               message_id, action;
                               "failed to report message action: {err}"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::ActionReporter;
    use crate::{
        api::InAppApi,
        cache_store::{CacheStore, MemoryStorage},
        config::{ContactKey, Subject},
        message::{tests::html_message, InAppMessage},
        Error, Result,
    };

    /// Records every call and answers fetches with a canned response.
    #[derive(Default)]
    pub(crate) struct MockApi {
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) fetch_response: Mutex<Option<Result<Vec<InAppMessage>>>>,
        pub(crate) fail_reports: bool,
    }

    impl MockApi {
        pub(crate) fn with_messages(messages: Vec<InAppMessage>) -> MockApi {
            MockApi {
                fetch_response: Mutex::new(Some(Ok(messages))),
                ..Default::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail_reports {
                Err(Error::Unauthorized)
            } else {
                Ok(())
            }
        }
    }

    impl InAppApi for MockApi {
        async fn fetch_messages(&self, _subject: &Subject) -> Result<Vec<InAppMessage>> {
            self.calls.lock().unwrap().push("fetch".to_owned());
            let response = self.fetch_response.lock().unwrap().clone();
            response.unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn mark_displayed(&self, _subject: &Subject, message_id: &str) -> Result<()> {
            self.record(format!("displayed:{message_id}"))
        }

        async fn mark_clicked(
            &self,
            _subject: &Subject,
            message_id: &str,
            button_id: Option<&str>,
        ) -> Result<()> {
            self.record(format!(
                "clicked:{message_id}:{}",
                button_id.unwrap_or_default()
            ))
        }

        async fn mark_dismissed(&self, _subject: &Subject, message_id: &str) -> Result<()> {
            self.record(format!("dismissed:{message_id}"))
        }
    }

    pub(crate) fn subject() -> Subject {
        Subject {
            account_name: "acc".to_owned(),
            contact_key: ContactKey::resolve(None, "device"),
            device_id: "device".to_owned(),
        }
    }

    #[tokio::test]
    async fn click_removes_message_even_if_report_fails() {
        let api = Arc::new(MockApi {
            fail_reports: true,
            ..Default::default()
        });
        let reporter = ActionReporter::new(api.clone());
        let store = CacheStore::open(MemoryStorage::new());
        store.update(|state| {
            state.upsert_message(html_message("m1"));
            state.upsert_message(html_message("m2"));
        });

        reporter
            .report_clicked(&store, Some(&subject()), "m1", Some("ok"))
            .unwrap()
            .await;

        assert_eq!(api.calls(), vec!["clicked:m1:ok".to_owned()]);
        let ids: Vec<_> = store.messages().into_iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec!["m2".to_owned()]);
    }

    #[tokio::test]
    async fn dismiss_keeps_message() {
        let api = Arc::new(MockApi::default());
        let reporter = ActionReporter::new(api.clone());
        let store = CacheStore::open(MemoryStorage::new());
        store.update(|state| state.upsert_message(html_message("m1")));

        reporter.report_dismissed(&subject(), "m1").await;
        reporter.report_displayed(&subject(), "m1").await;

        assert_eq!(
            api.calls(),
            vec!["dismissed:m1".to_owned(), "displayed:m1".to_owned()]
        );
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn click_without_subject_removes_locally_only() {
        let api = Arc::new(MockApi::default());
        let reporter = ActionReporter::new(api.clone());
        let store = CacheStore::open(MemoryStorage::new());
        store.update(|state| state.upsert_message(html_message("m1")));

        assert!(reporter
            .report_clicked(&store, None, "m1", None)
            .is_none());

        assert!(store.messages().is_empty());
        assert!(api.calls().is_empty());
    }
}
