//! Notification gateway.
//!
//! The daemon never blocks a lifecycle transition on delivery: a failed
//! notification is logged and surfaced as a flag in the receipt, and the
//! persisted state stands.

use async_trait::async_trait;

use gatepass_core::{AccessRequest, Otp};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification gateway unavailable: {0}")]
    Gateway(String),
}

/// Outbound notification channel to the network owner and to guests.
///
/// The production transport (mail relay, chat webhook) lives behind this
/// trait; the daemon only decides when to send and with what content.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell the owner about a new request, with one-click decision links.
    async fn notify_owner(
        &self,
        request: &AccessRequest,
        approve_url: &str,
        deny_url: &str,
    ) -> Result<(), NotifyError>;

    /// Send an approved guest their passcode.
    async fn notify_guest(&self, contact: &str, otp: &Otp) -> Result<(), NotifyError>;
}

/// Notifier that writes to the log instead of a real gateway.
///
/// Default for local operation; the owner reads the decision links from the
/// daemon log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_owner(
        &self,
        request: &AccessRequest,
        approve_url: &str,
        deny_url: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            request_id = %request.id,
            device_label = %request.device_label,
            contact = %request.contact,
            approve_url,
            deny_url,
            "owner notification"
        );
        Ok(())
    }

    async fn notify_guest(&self, contact: &str, _otp: &Otp) -> Result<(), NotifyError> {
        // The passcode itself stays out of the log.
        tracing::info!(contact, "guest passcode notification");
        Ok(())
    }
}
