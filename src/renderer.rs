use crate::InAppMessage;

/// Displays a selected in-app message.
///
/// The renderer is called on the engine thread and should hand the message over to the UI without
/// blocking. User interaction is reported back through [`Client::message_clicked`],
/// [`Client::message_dismissed`], and [`Client::message_closed`].
///
/// [`Client::message_clicked`]: crate::Client::message_clicked
/// [`Client::message_dismissed`]: crate::Client::message_dismissed
/// [`Client::message_closed`]: crate::Client::message_closed
pub trait Renderer {
    /// Show `message`.
    fn render(&self, message: &InAppMessage);
}

pub(crate) struct NoopRenderer;
impl Renderer for NoopRenderer {
    fn render(&self, _message: &InAppMessage) {}
}

impl<T: Fn(&InAppMessage)> Renderer for T {
    fn render(&self, message: &InAppMessage) {
        self(message);
    }
}
