//! # Gatepass Core
//!
//! Pure domain types and business logic for the Gatepass guest access
//! approval system.
//!
//! ## Design Principles
//!
//! This crate is intentionally **IO-free**:
//! - No filesystem operations
//! - No network calls
//! - No database interactions
//!
//! All types are plain Rust structs/enums with serde serialization. The
//! actual IO (persistence, notification delivery, the operator CLI) lives in
//! `gatepass-daemon`.
//!
//! ## Modules
//!
//! - [`request`] - The access request record and its lifecycle state machine
//! - [`otp`] - The one-time password value type
//! - [`authz`] - Explicit authorization context for privileged operations

pub mod authz;
pub mod otp;
pub mod request;

// Re-export commonly used types at crate root for convenience.

pub use authz::{AdminContext, AuthzDecision};
pub use otp::{Otp, OtpError};
pub use request::{
    AccessRequest, InvalidTransition, RequestEvent, RequestId, RequestState, StateParseError,
};
