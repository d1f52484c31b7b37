//! At-most-once reply delivery to a page

use tokio::sync::mpsc;
use tracing::warn;

use gnubby_core::WebReply;

/// Sends the single reply to one page request
///
/// A second reply, or a reply to a page that has gone away, is logged and
/// dropped rather than surfaced as an error.
#[derive(Debug)]
pub struct Responder {
    tx: Option<mpsc::UnboundedSender<WebReply>>,
}

impl Responder {
    pub fn new(tx: mpsc::UnboundedSender<WebReply>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A responder and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WebReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&mut self, reply: WebReply) {
        let Some(tx) = self.tx.take() else {
            warn!(
                "Dropping second response {} (code {})",
                reply.reply_type, reply.code
            );
            return;
        };

        if let Err(e) = tx.send(reply) {
            warn!("Page went away before response {} could be delivered", e.0.reply_type);
        }
    }

    pub fn is_sent(&self) -> bool {
        self.tx.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnubby_core::ErrorCode;

    #[test]
    fn test_second_send_swallowed() {
        let (mut responder, mut rx) = Responder::channel();

        responder.send(WebReply::error("sign_web_reply", ErrorCode::BadRequest, None));
        responder.send(WebReply::error("sign_web_reply", ErrorCode::UnknownError, None));

        assert!(responder.is_sent());
        assert_eq!(rx.try_recv().unwrap().code, ErrorCode::BadRequest);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_page_does_not_panic() {
        let (mut responder, rx) = Responder::channel();
        drop(rx);

        responder.send(WebReply::error("enroll_web_reply", ErrorCode::Ok, None));
        assert!(responder.is_sent());
    }
}
