//! Access request types and lifecycle state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Types
// ============================================================================

/// Unique identifier for an access request.
///
/// Assigned once by the store (monotonically increasing), never reused,
/// never mutated. Opaque to guests beyond equality; the owner's emailed
/// action links carry it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl RequestId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Submitted by the guest, awaiting the owner's decision.
    Pending,
    /// Owner approved; an OTP is bound to the record until consumed.
    Approved,
    /// Owner denied. Terminal.
    Denied,
    /// Guest proved OTP possession and set a credential. Terminal.
    Credentialed,
}

impl RequestState {
    /// Returns true if no further transitions are legal from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Denied | Self::Credentialed)
    }

    /// Canonical lowercase form, used for storage and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Credentialed => "credentialed",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing a stored state string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown request state: {0:?}")]
pub struct StateParseError(pub String);

impl FromStr for RequestState {
    type Err = StateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "credentialed" => Ok(Self::Credentialed),
            other => Err(StateParseError(other.to_string())),
        }
    }
}

// ============================================================================
// Lifecycle Events
// ============================================================================

/// An event applied to an access request by the lifecycle engine.
///
/// Every event is guarded: applying it to a record in the wrong state is a
/// rejected operation that leaves the record untouched (idempotent
/// rejection, never re-application).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestEvent {
    /// Owner approved the request and an OTP was minted for the guest.
    /// The payload is the stored form of the code (plaintext, or a digest
    /// when at-rest hashing is enabled).
    /// Transition: Pending -> Approved
    Approved { otp: String },

    /// Owner denied the request.
    /// Transition: Pending -> Denied
    Denied,

    /// Guest presented the matching OTP and set a credential.
    /// Transition: Approved -> Credentialed
    Credentialed { credential: String },
}

impl RequestEvent {
    /// Short name for error reporting and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approved { .. } => "Approved",
            Self::Denied => "Denied",
            Self::Credentialed { .. } => "Credentialed",
        }
    }
}

// ============================================================================
// Transition Errors
// ============================================================================

/// Error when a state transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: RequestState,
    pub event: &'static str,
    pub reason: String,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid transition: cannot apply '{}' to request in state '{}': {}",
            self.event, self.from, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

// ============================================================================
// Access Request
// ============================================================================

/// The persisted unit tracking one guest's access lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Unique identifier, assigned once at creation.
    pub id: RequestId,

    /// Free-text identifier of the requesting device. No uniqueness.
    pub device_label: String,

    /// The guest's identifying address, used for OTP delivery and for
    /// resolving an in-flight approved request without echoing the id.
    pub contact: String,

    /// Current lifecycle state.
    pub state: RequestState,

    /// Stored form of the one-time code bound to the record. Non-null iff
    /// `state == Approved`; cleared when the credential lands.
    pub otp: Option<String>,

    /// Credential chosen by the guest. Set at most once, only through a
    /// verified OTP submission.
    pub credential: Option<String>,

    /// Creation timestamp, immutable. Default listing order is descending
    /// on this key.
    pub created_at: DateTime<Utc>,

    /// When the owner's decision landed, if it has.
    pub decided_at: Option<DateTime<Utc>>,
}

impl AccessRequest {
    /// Create a new request in Pending state.
    pub fn new(
        id: RequestId,
        device_label: impl Into<String>,
        contact: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            device_label: device_label.into(),
            contact: contact.into(),
            state: RequestState::Pending,
            otp: None,
            credential: None,
            created_at,
            decided_at: None,
        }
    }

    /// Apply an event to this request, updating state accordingly.
    ///
    /// Returns an error and leaves the record untouched if the event's guard
    /// fails for the current state. This is the in-memory statement of the
    /// machine; the store enforces the same guards with conditional updates
    /// so that concurrent writers cannot interleave between check and write.
    pub fn apply(&mut self, event: RequestEvent, ts: DateTime<Utc>) -> Result<(), InvalidTransition> {
        match event {
            RequestEvent::Approved { otp } => {
                if self.state != RequestState::Pending {
                    return Err(InvalidTransition {
                        from: self.state,
                        event: "Approved",
                        reason: "request must be pending to approve".into(),
                    });
                }
                self.state = RequestState::Approved;
                self.otp = Some(otp);
                self.decided_at = Some(ts);
            }

            RequestEvent::Denied => {
                if self.state != RequestState::Pending {
                    return Err(InvalidTransition {
                        from: self.state,
                        event: "Denied",
                        reason: "request must be pending to deny".into(),
                    });
                }
                self.state = RequestState::Denied;
                self.decided_at = Some(ts);
            }

            RequestEvent::Credentialed { credential } => {
                if self.state != RequestState::Approved {
                    return Err(InvalidTransition {
                        from: self.state,
                        event: "Credentialed",
                        reason: "request must be approved to take a credential".into(),
                    });
                }
                self.state = RequestState::Credentialed;
                self.credential = Some(credential);
                // The OTP is consumed; it has no meaning past this point.
                self.otp = None;
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
