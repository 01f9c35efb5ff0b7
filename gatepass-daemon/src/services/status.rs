//! Read-only projections over the request store.
//!
//! The guest-facing status view carries only the id and state. Secrets never
//! leave the store on this path; the query itself does not select them.

use chrono::{DateTime, Utc};
use serde::Serialize;

use gatepass_core::{AccessRequest, AdminContext, RequestId, RequestState};

use crate::store::RequestStore;

/// Guest-facing status of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub id: RequestId,
    pub state: RequestState,
}

/// Full record view for the privileged listing.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    pub id: RequestId,
    pub device_label: String,
    pub contact: String,
    pub state: RequestState,
    pub otp: Option<String>,
    pub credential: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl From<&AccessRequest> for RequestView {
    fn from(r: &AccessRequest) -> Self {
        Self {
            id: r.id,
            device_label: r.device_label.clone(),
            contact: r.contact.clone(),
            state: r.state,
            otp: r.otp.clone(),
            credential: r.credential.clone(),
            created_at: r.created_at,
            decided_at: r.decided_at,
        }
    }
}

impl RequestView {
    /// Blank out stored secrets, keeping only whether they are set.
    pub fn redacted(mut self) -> Self {
        self.otp = self.otp.map(|_| "<set>".to_string());
        self.credential = self.credential.map(|_| "<set>".to_string());
        self
    }
}

/// Read-only query service.
#[derive(Clone)]
pub struct StatusService {
    store: RequestStore,
    admin_secret: Option<String>,
}

impl StatusService {
    pub fn new(store: RequestStore, admin_secret: Option<String>) -> Self {
        Self {
            store,
            admin_secret,
        }
    }

    /// Guest polling: id and state only, `None` for unknown ids.
    pub async fn status(
        &self,
        id: RequestId,
    ) -> Result<Option<StatusView>, crate::store::StoreError> {
        Ok(self
            .store
            .get_state(id)
            .await?
            .map(|state| StatusView { id, state }))
    }

    /// Privileged listing of every request, newest first.
    pub async fn list(
        &self,
        ctx: &AdminContext,
    ) -> Result<Vec<RequestView>, StatusError> {
        let decision = ctx.verify(self.admin_secret.as_deref());
        if let Some(reason) = decision.deny_reason() {
            tracing::warn!(reason, "List rejected");
            return Err(StatusError::Unauthorized(reason.to_string()));
        }

        let requests = self.store.list_all().await?;
        Ok(requests.iter().map(RequestView::from).collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Storage(#[from] crate::store::StoreError),
}
