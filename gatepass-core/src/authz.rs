//! Explicit authorization context for privileged operations.
//!
//! Privileged operations (full listing, removal) take a caller-supplied
//! [`AdminContext`] instead of consulting ambient session state. The daemon
//! holds the expected secret in its configuration; if none is configured,
//! privileged operations are denied outright.

use subtle::ConstantTimeEq;

/// Credentials presented by a caller invoking a privileged operation.
#[derive(Debug, Clone)]
pub struct AdminContext {
    secret: String,
}

impl AdminContext {
    /// Wrap the secret the caller presented.
    pub fn presenting(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Check the presented secret against the configured one.
    ///
    /// `None` means no admin secret is configured; privileged operations are
    /// then denied rather than open. Comparison is constant-time.
    pub fn verify(&self, expected: Option<&str>) -> AuthzDecision {
        match expected {
            None => AuthzDecision::deny("no admin secret configured"),
            Some(expected) => {
                if bool::from(self.secret.as_bytes().ct_eq(expected.as_bytes())) {
                    AuthzDecision::allow()
                } else {
                    AuthzDecision::deny("invalid admin secret")
                }
            }
        }
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzDecision {
    /// Action is permitted.
    Allow,
    /// Action is denied with explanation.
    Deny { reason: String },
}

impl AuthzDecision {
    pub fn allow() -> Self {
        Self::Allow
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The denial reason, or `None` when allowed.
    pub fn deny_reason(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason } => Some(reason),
        }
    }
}
