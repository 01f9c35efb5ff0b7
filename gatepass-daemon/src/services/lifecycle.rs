//! Request lifecycle service.
//!
//! Drives every state transition through the store's guarded updates. The
//! guest-facing credential path fails closed with one generic message for
//! every rejection cause; the log carries the precise reason.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use gatepass_core::{AdminContext, Otp, RequestEvent, RequestId, RequestState};

use crate::notify::Notifier;
use crate::otp::OtpSource;
use crate::store::{RequestStore, StoreError};

/// Generic rejection message prevents probing which guard failed.
const CREDENTIAL_REJECTED: &str = "Invalid code or contact.";

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("request not found")]
    NotFound,
    #[error("request already {state}")]
    AlreadyDecided { state: RequestState },
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Outcome of submitting a new request.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub request_id: RequestId,
    pub message: String,
    /// False when the owner notification could not be delivered. The
    /// request stands either way.
    pub owner_notified: bool,
}

/// Outcome of an owner decision.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionReceipt {
    pub request_id: RequestId,
    pub state: RequestState,
    pub guest_notified: bool,
}

/// Outcome of a guest's credential submission. Never distinguishes why a
/// rejection happened.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialReceipt {
    pub success: bool,
    pub message: String,
}

/// Tunables carried from [`crate::config::DaemonConfig`].
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub base_url: String,
    pub otp_validity: Option<Duration>,
    pub hash_secrets: bool,
    pub admin_secret: Option<String>,
}

/// Drives request state transitions and notification fan-out.
#[derive(Clone)]
pub struct LifecycleService {
    store: RequestStore,
    otp_source: Arc<dyn OtpSource>,
    notifier: Arc<dyn Notifier>,
    options: LifecycleOptions,
}

impl LifecycleService {
    pub fn new(
        store: RequestStore,
        otp_source: Arc<dyn OtpSource>,
        notifier: Arc<dyn Notifier>,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            store,
            otp_source,
            notifier,
            options,
        }
    }

    /// Submit a new access request and notify the owner.
    ///
    /// Notification failure never rolls the request back: the owner can
    /// still find it via the admin listing.
    pub async fn submit(
        &self,
        device_label: &str,
        contact: &str,
    ) -> Result<SubmitReceipt, LifecycleError> {
        let device_label = device_label.trim();
        let contact = contact.trim();
        if device_label.is_empty() {
            return Err(LifecycleError::InvalidArgument("device label is required"));
        }
        if contact.is_empty() {
            return Err(LifecycleError::InvalidArgument("contact is required"));
        }

        let request = self.store.create(device_label, contact).await?;

        let approve_url = format!("{}/api/approve/{}", self.options.base_url, request.id);
        let deny_url = format!("{}/api/deny/{}", self.options.base_url, request.id);

        let owner_notified = match self
            .notifier
            .notify_owner(&request, &approve_url, &deny_url)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    request_id = %request.id,
                    error = %e,
                    "Owner notification failed, request kept"
                );
                false
            }
        };

        tracing::info!(
            request_id = %request.id,
            device_label = %request.device_label,
            contact = %request.contact,
            owner_notified,
            "Access request submitted"
        );

        Ok(SubmitReceipt {
            request_id: request.id,
            message: "Request submitted. You will be notified once it is reviewed.".to_string(),
            owner_notified,
        })
    }

    /// Owner approves a pending request. Issues a passcode in the same
    /// storage write that flips the state, then notifies the guest.
    pub async fn approve(&self, id: RequestId) -> Result<DecisionReceipt, LifecycleError> {
        let otp = self.otp_source.issue();
        let stored = self.stored_secret(otp.as_str());

        let request = self
            .store
            .apply_event(id, RequestEvent::Approved { otp: stored }, Utc::now())
            .await
            .map_err(map_decision_error)?;

        // The guest gets the plaintext code; storage may only hold a digest.
        let guest_notified = match self.notifier.notify_guest(&request.contact, &otp).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(request_id = %id, error = %e, "Guest notification failed");
                false
            }
        };

        tracing::info!(request_id = %id, guest_notified, "Request approved");

        Ok(DecisionReceipt {
            request_id: id,
            state: RequestState::Approved,
            guest_notified,
        })
    }

    /// Owner denies a pending request. No passcode is ever issued.
    pub async fn deny(&self, id: RequestId) -> Result<DecisionReceipt, LifecycleError> {
        self.store
            .apply_event(id, RequestEvent::Denied, Utc::now())
            .await
            .map_err(map_decision_error)?;

        tracing::info!(request_id = %id, "Request denied");

        Ok(DecisionReceipt {
            request_id: id,
            state: RequestState::Denied,
            guest_notified: false,
        })
    }

    /// Guest redeems their passcode and sets a credential.
    ///
    /// Every guard failure returns the same rejection receipt; only the log
    /// says which guard tripped. Storage errors still surface as errors.
    pub async fn set_credential(
        &self,
        contact: &str,
        otp_input: &str,
        credential: &str,
    ) -> Result<CredentialReceipt, LifecycleError> {
        let contact = contact.trim();
        if credential.is_empty() {
            return Err(LifecycleError::InvalidArgument("credential is required"));
        }

        let otp = match Otp::parse(otp_input) {
            Ok(otp) => otp,
            Err(_) => {
                tracing::info!(contact, reason = "malformed_otp", "Credential rejected");
                return Ok(rejected());
            }
        };

        let request = match self
            .store
            .get_by_contact(contact, RequestState::Approved)
            .await?
        {
            Some(r) => r,
            None => {
                tracing::info!(contact, reason = "no_approved_request", "Credential rejected");
                return Ok(rejected());
            }
        };

        let presented = self.stored_secret(otp.as_str());
        let matches = match request.otp.as_deref() {
            Some(stored) => bool::from(presented.as_bytes().ct_eq(stored.as_bytes())),
            None => false,
        };
        if !matches {
            tracing::info!(
                request_id = %request.id,
                reason = "otp_mismatch",
                "Credential rejected"
            );
            return Ok(rejected());
        }

        let now = Utc::now();
        // A window too large for chrono effectively never expires.
        let validity = self
            .options
            .otp_validity
            .and_then(|v| chrono::Duration::from_std(v).ok());
        let not_before = match validity {
            Some(validity) => {
                let expired = request
                    .decided_at
                    .map(|decided| decided + validity < now)
                    .unwrap_or(true);
                if expired {
                    tracing::info!(
                        request_id = %request.id,
                        reason = "otp_expired",
                        "Credential rejected"
                    );
                    return Ok(rejected());
                }
                Some(now - validity)
            }
            None => None,
        };

        // The update re-asserts state and passcode, so a concurrent redeem
        // or removal loses here even after the checks above passed.
        let credential_stored = self.stored_secret(credential);
        let applied = self
            .store
            .credential_approved(request.id, &presented, &credential_stored, not_before)
            .await?;

        if !applied {
            tracing::info!(
                request_id = %request.id,
                reason = "lost_update",
                "Credential rejected"
            );
            return Ok(rejected());
        }

        tracing::info!(request_id = %request.id, "Credential set");

        Ok(CredentialReceipt {
            success: true,
            message: "Credential set successfully.".to_string(),
        })
    }

    /// Remove a request. Privileged; works in any state.
    pub async fn remove(
        &self,
        ctx: &AdminContext,
        id: RequestId,
    ) -> Result<bool, LifecycleError> {
        let decision = ctx.verify(self.options.admin_secret.as_deref());
        if let Some(reason) = decision.deny_reason() {
            tracing::warn!(request_id = %id, reason, "Remove rejected");
            return Err(LifecycleError::Unauthorized(reason.to_string()));
        }

        let removed = self.store.remove(id).await?;
        if removed {
            tracing::info!(request_id = %id, "Request removed");
        }
        Ok(removed)
    }

    /// Stored form of a secret: plaintext, or a SHA-256 hex digest when the
    /// daemon is configured to hash at rest.
    fn stored_secret(&self, raw: &str) -> String {
        if self.options.hash_secrets {
            hash_secret(raw)
        } else {
            raw.to_string()
        }
    }
}

/// SHA-256 hex digest of a secret.
pub fn hash_secret(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn rejected() -> CredentialReceipt {
    CredentialReceipt {
        success: false,
        message: CREDENTIAL_REJECTED.to_string(),
    }
}

fn map_decision_error(e: StoreError) -> LifecycleError {
    match e {
        StoreError::NotFound => LifecycleError::NotFound,
        StoreError::InvalidTransition { from } => LifecycleError::AlreadyDecided { state: from },
        other => LifecycleError::Storage(other),
    }
}
